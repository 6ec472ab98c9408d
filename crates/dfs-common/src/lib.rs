//! Shared types for the DFS verification runner.
//!
//! This crate contains:
//! - **Radio models**: bands, WiFi modes, test configurations, channel state
//! - **Telemetry models**: connection endpoints, snapshots, run results
//! - **Channel tables**: channel→frequency lookup and the DFS channel set
//! - **ID generation**: run identifiers and synthesized test identifiers
//! - **Severity**: the warning/fatal split shared by every remote interaction

pub mod channels;
pub mod error;
pub mod ids;
pub mod models;
