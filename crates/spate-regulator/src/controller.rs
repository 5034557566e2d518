//! # Regulator Controller
//!
//! Owns the active regulation strategy and turns its output into encoder
//! callbacks. The controller enforces the polling contract (minimum tick
//! spacing, RTT validity) and suppresses redundant emissions, so the
//! strategy behind it only ever sees well-formed, paced telemetry.
//!
//! Exactly one task drives a controller; all state mutation happens inside
//! `tick`, so no locking is needed. Concurrent sessions each own their own
//! controller/regulator pair.

use quanta::Instant;
use std::time::Duration;
use tracing::debug;

use crate::config::{ConfigError, RegulatorConfig, SettingsProfile};
use crate::regulator::{Regulator, RegulatorTelemetry};
use crate::stats::StatsSnapshot;

/// Minimum spacing between accepted ticks. Faster arrivals are dropped to
/// keep at-most-one-decision-per-interval semantics.
const MIN_TICK_SPACING: Duration = Duration::from_millis(200);

/// Sink for new target bitrates in bits/sec. Invoked at most once per tick,
/// only on change. Must not block; it runs on the polling task.
pub type BitrateCallback = Box<dyn FnMut(i64) + Send>;

/// Drives a regulation strategy at the polling cadence.
pub struct RegulatorController {
    regulator: Box<dyn Regulator>,
    on_bitrate: BitrateCallback,
    /// When the previous tick was accepted. Invalid ticks do not move this.
    last_accepted_tick: Option<Instant>,
    /// Previously emitted bitrate, for redundant-callback suppression.
    last_emitted: Option<i64>,
}

impl RegulatorController {
    /// Build a controller for the configured strategy.
    ///
    /// Fails only on malformed bounds; nothing after construction errors.
    pub fn new(config: RegulatorConfig, on_bitrate: BitrateCallback) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(RegulatorController {
            regulator: config.kind.build(&config),
            on_bitrate,
            last_accepted_tick: None,
            last_emitted: None,
        })
    }

    /// Feed one telemetry snapshot using the wall clock.
    pub fn tick(
        &mut self,
        stats: &StatsSnapshot,
        current_video_bitrate: i64,
        current_audio_bitrate: i64,
    ) -> Option<i64> {
        self.tick_at(
            Instant::now(),
            stats,
            current_video_bitrate,
            current_audio_bitrate,
        )
    }

    /// Same as [`tick`](Self::tick) with the clock injected, so tests drive
    /// time explicitly.
    ///
    /// Returns the bitrate handed to the callback, or `None` for dropped
    /// ticks and unchanged output. Never errors: bad telemetry is a no-op.
    pub fn tick_at(
        &mut self,
        now: Instant,
        stats: &StatsSnapshot,
        current_video_bitrate: i64,
        current_audio_bitrate: i64,
    ) -> Option<i64> {
        if let Some(last) = self.last_accepted_tick {
            if now.duration_since(last) < MIN_TICK_SPACING {
                return None;
            }
        }
        if !stats.is_valid() {
            return None;
        }
        self.last_accepted_tick = Some(now);

        let new_bitrate =
            self.regulator
                .update(now, stats, current_video_bitrate, current_audio_bitrate)?;
        if self.last_emitted == Some(new_bitrate) {
            return None;
        }
        self.last_emitted = Some(new_bitrate);
        debug!(bitrate_bps = new_bitrate, "applying new target bitrate");
        (self.on_bitrate)(new_bitrate);
        Some(new_bitrate)
    }

    /// Swap the active strategy's tunables preset without resetting state.
    pub fn set_profile(&mut self, profile: SettingsProfile) {
        self.regulator.set_profile(profile);
    }

    /// Diagnostics readout of the active strategy.
    pub fn telemetry(&self) -> RegulatorTelemetry {
        self.regulator.telemetry()
    }

    /// Forget all adaptive state, as on stream restart.
    pub fn reset(&mut self) {
        self.regulator.reset();
        self.last_accepted_tick = None;
        self.last_emitted = None;
    }
}
