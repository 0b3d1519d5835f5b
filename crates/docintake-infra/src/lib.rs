//! Docintake Infrastructure Library
//!
//! Process-level plumbing shared by the binaries. Currently telemetry initialisation.

pub mod telemetry;

pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
