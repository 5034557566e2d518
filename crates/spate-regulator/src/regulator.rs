//! # Regulation Strategy Contract
//!
//! The trait both strategies implement, the factory that selects one, and
//! the diagnostics snapshot they expose. The strategies share the contract
//! but nothing else: each owns its state for the life of one streaming
//! session and is never shared between sessions.

use quanta::Instant;
use serde::Serialize;

use crate::config::{RegulatorConfig, RegulatorKind, SettingsProfile};
use crate::dual_rate::DualRateRegulator;
use crate::stats::StatsSnapshot;
use crate::threshold::ThresholdRegulator;

// ─── Trait ──────────────────────────────────────────────────────────────────

/// A bitrate regulation strategy.
///
/// `update` consumes one telemetry snapshot and adjusts the internal state;
/// all smoothing, cooldown, and bounding happens inside. The clock is
/// injected so tests drive time explicitly.
pub trait Regulator: Send {
    /// Process one valid snapshot.
    ///
    /// `current_video_bitrate` is what the encoder is producing right now;
    /// the first call seeds the adaptive state from it so ramp-up starts
    /// from where encoding already is. Returns the new target bitrate in
    /// bits/sec only when the bounded output differs from the previous one.
    fn update(
        &mut self,
        now: Instant,
        stats: &StatsSnapshot,
        current_video_bitrate: i64,
        current_audio_bitrate: i64,
    ) -> Option<i64>;

    /// Swap the tunables preset. Smoothing state, cooldown deadlines, and
    /// the current bitrate all survive the swap.
    fn set_profile(&mut self, profile: SettingsProfile);

    /// Diagnostics readout for telemetry display. No behavioral feedback.
    fn telemetry(&self) -> RegulatorTelemetry;

    /// Forget all adaptive state, as on stream restart.
    fn reset(&mut self);
}

// ─── Factory ────────────────────────────────────────────────────────────────

impl RegulatorKind {
    /// Construct the strategy this kind names.
    pub fn build(&self, config: &RegulatorConfig) -> Box<dyn Regulator> {
        match self {
            RegulatorKind::CongestionThreshold => Box::new(ThresholdRegulator::new(
                config.video_bitrate_range,
                config.minimum_bitrate,
                config.profile,
            )),
            RegulatorKind::DualRate => Box::new(DualRateRegulator::new(
                config.video_bitrate_range,
                config.profile,
            )),
        }
    }
}

// ─── Telemetry ──────────────────────────────────────────────────────────────

/// Point-in-time regulator diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RegulatorTelemetry {
    /// Strategy name.
    pub algorithm: String,
    /// Current target bitrate in bits/sec.
    pub bitrate_bps: i64,
    /// Ceiling the bitrate is scaled against: the adaptive maximum for the
    /// dual-rate strategy, the configured target for the threshold cascade.
    pub ceiling_bps: i64,
    /// Smoothed RTT in milliseconds.
    pub rtt_avg_ms: f64,
    /// Slow-smoothed packets-in-flight. Zero for the threshold cascade,
    /// which tracks send-buffer occupancy instead.
    pub smooth_packets_in_flight: f64,
    /// Fast-smoothed packets-in-flight. Zero for the threshold cascade.
    pub fast_packets_in_flight: f64,
}
