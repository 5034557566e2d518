//! Synthetic transport telemetry for exercising the regulator.
//!
//! Provides deterministic random-walk scenario generation and a replay
//! harness that drives a controller through scenario frames with injected
//! time, for integration testing without wall-clock sleeps or sockets.

pub mod harness;
pub mod scenario;
