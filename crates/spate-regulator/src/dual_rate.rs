//! # Dual-Rate PIF/RTT Regulator
//!
//! Keeps two views of congestion: slow-smoothed baselines that define what
//! normal looks like, and fast trackers that catch the current spike. An
//! adaptively-managed ceiling climbs while the link is quiet and takes
//! proportional cuts under sustained pressure; the instantaneous bitrate is
//! the ceiling scaled by how deep the current packets-in-flight spike cuts
//! into the allowed band. Two tunables profiles (fast/slow) can be swapped
//! live without discarding any smoothing state.

use quanta::Instant;
use tracing::debug;

use crate::config::{BitrateRange, SettingsProfile};
use crate::regulator::{Regulator, RegulatorTelemetry};
use crate::stats::{AsymmetricEwma, Ewma, StatsSnapshot};

/// Climb gate: fast RTT may exceed the average by at most this much (ms).
const ALLOWED_RTT_JITTER_MS: f64 = 15.0;
/// Climb gate: instantaneous PIF may exceed the smoothed value by at most this.
const ALLOWED_PIF_JITTER: f64 = 10.0;
/// Absolute smoothed-PIF level that always forces a ceiling cut.
const PIF_ABSOLUTE_CAP: f64 = 100.0;
/// Average RTT level that always forces a ceiling cut (ms).
const RTT_HIGH_MS: f64 = 250.0;
/// Factor and floor for the two absolute ceiling cuts.
const HIGH_DECREASE_FACTOR: f64 = 0.9;
const HIGH_MIN_DECREASE_BPS: i64 = 250_000;
/// Ceiling on the average-RTT estimator (ms).
const AVG_RTT_CAP_MS: f64 = 450.0;
/// Lazy ceiling decrease when the fast PIF spike overruns the threshold.
const LAZY_DECREASE_FACTOR: f64 = 0.95;
/// Extra flat cut when the spike saturates the threshold.
const SATURATION_CUT_BPS: i64 = 500_000;

// ─── Settings ───────────────────────────────────────────────────────────────

/// Tunables profile for the dual-rate regulator.
#[derive(Debug, Clone)]
pub struct DualRateSettings {
    /// Packets-in-flight level the spike band is measured against.
    pub packets_in_flight_threshold: f64,
    /// RTT spike above the average that triggers a ceiling cut (ms).
    pub rtt_spike_allowed_ms: f64,
    /// Multiplier kept after an RTT-spike cut (0.9 = cut 10%).
    pub rtt_spike_factor: f64,
    /// Smallest RTT-spike cut (bits/sec).
    pub rtt_spike_min_decrease: i64,
    /// Scale of the per-tick ceiling climb (bits/sec at an idle link).
    pub pif_diff_increase_factor: f64,
    /// Floor for the instantaneous bitrate (bits/sec).
    pub minimum_bitrate: i64,
}

impl DualRateSettings {
    /// Reacts quickly: low PIF threshold, strong climb, strict spike budget.
    pub fn fast() -> Self {
        DualRateSettings {
            packets_in_flight_threshold: 200.0,
            rtt_spike_allowed_ms: 50.0,
            rtt_spike_factor: 0.9,
            rtt_spike_min_decrease: 250_000,
            pif_diff_increase_factor: 100_000.0,
            minimum_bitrate: 250_000,
        }
    }

    /// Reacts gently: high PIF threshold, small climb, lenient spike budget.
    pub fn slow() -> Self {
        DualRateSettings {
            packets_in_flight_threshold: 500.0,
            rtt_spike_allowed_ms: 100.0,
            rtt_spike_factor: 0.95,
            rtt_spike_min_decrease: 100_000,
            pif_diff_increase_factor: 25_000.0,
            minimum_bitrate: 50_000,
        }
    }

    pub fn for_profile(profile: SettingsProfile) -> Self {
        match profile {
            SettingsProfile::Fast => Self::fast(),
            SettingsProfile::Slow => Self::slow(),
        }
    }
}

impl Default for DualRateSettings {
    fn default() -> Self {
        Self::fast()
    }
}

// ─── Regulator ──────────────────────────────────────────────────────────────

/// Dual-speed PIF/RTT regulator with an adaptive ceiling.
pub struct DualRateRegulator {
    settings: DualRateSettings,
    range: BitrateRange,

    /// Slow baseline of packets-in-flight; quick to relief, slow to alarm.
    smooth_pif: AsymmetricEwma,
    /// Fast tracker of instantaneous congestion.
    fast_pif: Ewma,
    /// RTT baseline, capped so a pathological path cannot drag it away.
    avg_rtt: AsymmetricEwma,
    /// Fast RTT tracker for the climb gate.
    fast_rtt: AsymmetricEwma,

    /// Adaptive ceiling the instantaneous bitrate is scaled against.
    ceiling: i64,
    bitrate: i64,
    previous_bitrate: i64,
    initialized: bool,
}

impl DualRateRegulator {
    pub fn new(range: BitrateRange, profile: SettingsProfile) -> Self {
        DualRateRegulator {
            settings: DualRateSettings::for_profile(profile),
            range,
            smooth_pif: AsymmetricEwma::new(0.03, 0.1),
            fast_pif: Ewma::new(0.33),
            avg_rtt: AsymmetricEwma::new(0.03, 0.1),
            fast_rtt: AsymmetricEwma::new(0.3, 0.1),
            ceiling: 0,
            bitrate: 0,
            previous_bitrate: 0,
            initialized: false,
        }
    }

    /// Current adaptive ceiling in bits/sec.
    pub fn ceiling_bps(&self) -> i64 {
        self.ceiling
    }
}

impl Regulator for DualRateRegulator {
    fn update(
        &mut self,
        _now: Instant,
        stats: &StatsSnapshot,
        current_video_bitrate: i64,
        _current_audio_bitrate: i64,
    ) -> Option<i64> {
        if !stats.is_valid() {
            return None;
        }

        if !self.initialized {
            // Ramp-up starts from where encoding already is.
            self.ceiling =
                current_video_bitrate.clamp(self.settings.minimum_bitrate, self.range.upper);
            self.bitrate = self.ceiling;
            self.initialized = true;
        }

        let pif = stats.packets_in_flight;
        let rtt = stats.rtt_ms;

        self.smooth_pif.update(pif);
        self.fast_pif.update(pif);
        self.avg_rtt.update(rtt);
        self.avg_rtt.clamp_max(AVG_RTT_CAP_MS);
        self.fast_rtt.update(rtt);

        let threshold = self.settings.packets_in_flight_threshold;
        let smooth = self.smooth_pif.value();
        let avg_rtt = self.avg_rtt.value();

        // ─── Ceiling climb ───
        // All three gates must hold: baseline PIF under the threshold, fast
        // RTT inside the jitter band, and no instantaneous PIF spike.
        let pif_spike = (pif - smooth).max(0.0);
        if smooth < threshold
            && self.fast_rtt.value() <= avg_rtt + ALLOWED_RTT_JITTER_MS
            && pif_spike < ALLOWED_PIF_JITTER
        {
            let climb =
                self.settings.pif_diff_increase_factor * (threshold - smooth) / threshold;
            self.ceiling = (self.ceiling + climb as i64).min(self.range.upper);
        }

        // ─── Ceiling cuts ───
        if smooth > PIF_ABSOLUTE_CAP {
            let cut = HIGH_MIN_DECREASE_BPS
                .max((self.ceiling as f64 * (1.0 - HIGH_DECREASE_FACTOR)) as i64);
            self.ceiling -= cut;
        }
        if avg_rtt > RTT_HIGH_MS {
            let cut = HIGH_MIN_DECREASE_BPS
                .max((self.ceiling as f64 * (1.0 - HIGH_DECREASE_FACTOR)) as i64);
            self.ceiling -= cut;
        }
        if rtt > avg_rtt + self.settings.rtt_spike_allowed_ms {
            let cut = self.settings.rtt_spike_min_decrease.max(
                (self.ceiling as f64 * (1.0 - self.settings.rtt_spike_factor)) as i64,
            );
            self.ceiling -= cut;
        }

        // ─── Instantaneous bitrate ───
        let fast_spike = self.fast_pif.value() - smooth;
        if fast_spike > threshold {
            self.ceiling = (self.ceiling as f64 * LAZY_DECREASE_FACTOR) as i64;
        }
        let clamped_spike = fast_spike.clamp(0.0, threshold);
        if clamped_spike >= threshold {
            self.ceiling -= SATURATION_CUT_BPS;
        }
        self.ceiling = self.ceiling.clamp(self.settings.minimum_bitrate, self.range.upper);

        let mut bitrate =
            (self.ceiling as f64 * (threshold - clamped_spike) / threshold) as i64;
        if pif - smooth > threshold * 2.0 {
            debug!(pif, smooth_pif = smooth, "runaway congestion, forcing floor");
            bitrate = self.settings.minimum_bitrate;
        }
        bitrate = bitrate.max(self.settings.minimum_bitrate);
        bitrate = self.range.clamp(bitrate);
        self.bitrate = bitrate;

        if bitrate != self.previous_bitrate {
            self.previous_bitrate = bitrate;
            Some(bitrate)
        } else {
            None
        }
    }

    fn set_profile(&mut self, profile: SettingsProfile) {
        self.settings = DualRateSettings::for_profile(profile);
    }

    fn telemetry(&self) -> RegulatorTelemetry {
        RegulatorTelemetry {
            algorithm: "dual-rate".to_string(),
            bitrate_bps: self.bitrate,
            ceiling_bps: self.ceiling,
            rtt_avg_ms: self.avg_rtt.value(),
            smooth_packets_in_flight: self.smooth_pif.value(),
            fast_packets_in_flight: self.fast_pif.value(),
        }
    }

    fn reset(&mut self) {
        self.smooth_pif.reset();
        self.fast_pif.reset();
        self.avg_rtt.reset();
        self.fast_rtt.reset();
        self.ceiling = 0;
        self.bitrate = 0;
        self.previous_bitrate = 0;
        self.initialized = false;
    }
}
