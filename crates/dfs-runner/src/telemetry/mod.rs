//! Traffic telemetry.
//!
//! - [`client`]: counter retrieval from the traffic service
//! - [`monitor`]: the polling loop that turns counters into evaluated
//!   intervals and schedules the radar burst

pub mod client;
pub mod monitor;

pub use client::{HttpTelemetry, TelemetryError, TelemetrySource};
pub use monitor::{Monitor, MonitorOutcome, MonitorPlan};
