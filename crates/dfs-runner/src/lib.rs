//! DFS compliance sweep runner.
//!
//! Drives an AP controller into each configuration of a test matrix, runs
//! client traffic, injects one radar burst partway through the monitoring
//! window and checks that the AP left the DFS channel while traffic kept
//! flowing.
//!
//! - [`config`]: TOML configuration and precondition checks
//! - [`controller`]: controller commands, per-series parsing, sequencing
//! - [`radar`]: the RF tool conversation
//! - [`telemetry`]: counter polling and the monitoring window
//! - [`traffic`]: connection lifecycle on the traffic service
//! - [`evaluator`]: interval and run verdicts
//! - [`matrix`]: sweep enumeration
//! - [`driver`]: the per-configuration state machine
//! - [`report`]: CSV output

pub mod config;
pub mod controller;
pub mod driver;
pub mod evaluator;
pub mod matrix;
pub mod radar;
pub mod report;
pub mod telemetry;
pub mod traffic;
