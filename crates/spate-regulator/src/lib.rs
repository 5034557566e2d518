//! # spate-regulator
//!
//! Closed-loop video bitrate regulation for live outbound streams.
//!
//! A transport layer feeds periodic [`stats::StatsSnapshot`]s into a
//! [`controller::RegulatorController`]; the active strategy computes a new
//! target video bitrate under smoothing, hysteresis, cooldown timers, and
//! hard bounds, and the controller pushes changes into an encoder callback.
//! The regulator never reads media and never touches the network.
//!
//! ## Crate structure
//!
//! - [`stats`] — telemetry snapshot contract and smoothing filters
//! - [`config`] — bitrate bounds, strategy selection, TOML input layer
//! - [`regulator`] — strategy trait, factory, diagnostics snapshot
//! - [`threshold`] — send-buffer/RTT threshold cascade strategy
//! - [`dual_rate`] — dual-speed PIF/RTT strategy with an adaptive ceiling
//! - [`controller`] — polling-cadence controller and callback sink

pub mod config;
pub mod controller;
pub mod dual_rate;
pub mod regulator;
pub mod stats;
pub mod threshold;
