//! # Congestion-Threshold Regulator
//!
//! Estimates transport send-buffer occupancy from throughput and RTT, keeps
//! slow-moving baselines with peak-hold jitter envelopes on top of them, and
//! walks the bitrate through a strict-priority decision cascade: severe
//! overload snaps to the floor, escalating buffer/RTT thresholds trigger
//! fast or moderate cuts, and a quiet link earns a measured climb. Each
//! action arms its own cooldown deadline so repeated matches cannot thrash.

use quanta::Instant;
use std::time::Duration;
use tracing::debug;

use crate::config::{BitrateRange, SettingsProfile};
use crate::regulator::{Regulator, RegulatorTelemetry};
use crate::stats::{Ewma, SpikeFilter, StatsSnapshot};

/// Transport segment payload size, used to convert bytes to packets.
const PACKET_SIZE_BYTES: f64 = 1316.0;

/// Smallest adjustment applied by the proportional cuts and climbs (bits/sec).
const MIN_STEP_BPS: i64 = 100_000;

// ─── Settings ───────────────────────────────────────────────────────────────

/// Tunables for the threshold cascade.
#[derive(Debug, Clone)]
pub struct ThresholdSettings {
    /// Assumed end-to-end latency in milliseconds. The severe and fast RTT
    /// tiers fire at 1/3 and 1/5 of this value.
    pub assumed_latency_ms: f64,
    /// Cooldown armed by the severe and moderate cuts.
    pub decrease_cooldown: Duration,
    /// Cooldown armed by the fast proportional cut.
    pub fast_decrease_cooldown: Duration,
    /// Cooldown between climbs.
    pub increase_cooldown: Duration,
    /// Divisor for the proportional climb step: `bitrate / divisor`.
    pub increase_divisor: i64,
}

impl ThresholdSettings {
    /// Quick-reacting preset.
    pub fn fast() -> Self {
        ThresholdSettings {
            assumed_latency_ms: 2_000.0,
            decrease_cooldown: Duration::from_millis(200),
            fast_decrease_cooldown: Duration::from_millis(250),
            increase_cooldown: Duration::from_millis(400),
            increase_divisor: 30,
        }
    }

    /// Gentle preset: climbs half as often, half as steeply.
    pub fn slow() -> Self {
        ThresholdSettings {
            increase_cooldown: Duration::from_millis(800),
            increase_divisor: 60,
            ..Self::fast()
        }
    }

    pub fn for_profile(profile: SettingsProfile) -> Self {
        match profile {
            SettingsProfile::Fast => Self::fast(),
            SettingsProfile::Slow => Self::slow(),
        }
    }
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self::fast()
    }
}

// ─── Regulator ──────────────────────────────────────────────────────────────

/// Buffer/RTT threshold cascade regulator.
pub struct ThresholdRegulator {
    settings: ThresholdSettings,
    range: BitrateRange,
    /// Floor the severe tier snaps to (bits/sec).
    minimum_bitrate: i64,

    // ─── Smoothed estimators ───
    /// Send-buffer occupancy baseline, in packets.
    send_buffer_avg: Ewma,
    /// Peak-hold envelope of positive buffer growth.
    send_buffer_jitter: SpikeFilter,
    prev_send_buffer: Option<f64>,
    /// RTT baseline in ms.
    rtt_avg: Ewma,
    /// Signed average of tick-to-tick RTT movement.
    rtt_delta_avg: Ewma,
    /// Peak-hold envelope of positive RTT jumps.
    rtt_jitter: SpikeFilter,
    /// Slow-rising RTT floor; snaps down to a fresh jitter-stable low.
    rtt_min: f64,
    prev_rtt: Option<f64>,
    /// Throughput estimate in bits/sec, fed by send-rate samples only.
    throughput_bps: Ewma,

    // ─── Control state ───
    bitrate: i64,
    /// Ceiling the climb is bounded by; seeded from the range upper bound.
    target_bitrate: i64,
    previous_bitrate: i64,
    next_decrease: Option<Instant>,
    next_increase: Option<Instant>,
    initialized: bool,
}

impl ThresholdRegulator {
    pub fn new(range: BitrateRange, minimum_bitrate: i64, profile: SettingsProfile) -> Self {
        ThresholdRegulator {
            settings: ThresholdSettings::for_profile(profile),
            range,
            minimum_bitrate,
            send_buffer_avg: Ewma::new(0.01),
            send_buffer_jitter: SpikeFilter::new(0.99),
            prev_send_buffer: None,
            rtt_avg: Ewma::new(0.01),
            rtt_delta_avg: Ewma::new(0.2),
            rtt_jitter: SpikeFilter::new(0.99),
            rtt_min: 0.0,
            prev_rtt: None,
            throughput_bps: Ewma::new(0.03),
            bitrate: 0,
            target_bitrate: 0,
            previous_bitrate: 0,
            next_decrease: None,
            next_increase: None,
            initialized: false,
        }
    }

    /// Implied send-buffer occupancy in packets, from throughput and RTT.
    fn send_buffer_packets(&self, rtt_ms: f64) -> f64 {
        (self.throughput_bps.value() / 8.0) * (rtt_ms / 1_000.0) / PACKET_SIZE_BYTES
    }
}

impl Regulator for ThresholdRegulator {
    fn update(
        &mut self,
        now: Instant,
        stats: &StatsSnapshot,
        current_video_bitrate: i64,
        current_audio_bitrate: i64,
    ) -> Option<i64> {
        if !stats.is_valid() {
            return None;
        }
        let rtt = stats.rtt_ms;

        if !self.initialized {
            self.target_bitrate = self.range.upper;
            self.bitrate = current_video_bitrate.clamp(self.minimum_bitrate, self.range.upper);
            self.rtt_min = rtt;
            self.initialized = true;
        }

        // ─── Smoothed statistics ───
        if let Some(mbps) = stats.send_rate_mbps {
            self.throughput_bps.update(mbps * 1_000_000.0);
        }

        let send_buffer = self.send_buffer_packets(rtt);
        let buffer_delta = send_buffer - self.prev_send_buffer.unwrap_or(send_buffer);
        self.prev_send_buffer = Some(send_buffer);
        self.send_buffer_jitter.update(buffer_delta);
        self.send_buffer_avg.update(send_buffer);

        let rtt_delta = rtt - self.prev_rtt.unwrap_or(rtt);
        self.prev_rtt = Some(rtt);
        self.rtt_delta_avg.update(rtt_delta);
        self.rtt_jitter.update(rtt_delta);
        self.rtt_avg.update(rtt);

        // The floor creeps upward so stale lows age out; a fresh low only
        // replaces it while the path is jitter-stable.
        self.rtt_min *= 1.001;
        if rtt < self.rtt_min && self.rtt_delta_avg.value() < 1.0 {
            self.rtt_min = rtt;
        }

        // ─── Thresholds ───
        let bs_avg = self.send_buffer_avg.value();
        let bs_jitter = self.send_buffer_jitter.value();
        let th1 = bs_avg + bs_jitter * 2.0;
        let half_latency_packets = (self.settings.assumed_latency_ms / 2_000.0)
            * self.throughput_bps.value()
            / 8.0
            / PACKET_SIZE_BYTES;
        let th2 = (bs_avg + bs_jitter * 3.0).min(half_latency_packets);
        let th3 = bs_avg + bs_jitter * 4.0;

        let rtt_avg = self.rtt_avg.value();
        let rtt_jitter = self.rtt_jitter.value();
        let rtt_th_max = rtt_avg + (rtt_jitter * 4.0).max(rtt_avg * 0.15);
        let rtt_th_min = self.rtt_min + (rtt_jitter * 2.0).max(1.0);

        // ─── Decision cascade, first match wins ───
        let latency = self.settings.assumed_latency_ms;
        let decrease_open = self.next_decrease.is_none_or(|t| now >= t);
        let increase_open = self.next_increase.is_none_or(|t| now >= t);

        let mut bitrate = self.bitrate;
        if rtt >= latency / 3.0 || send_buffer > th3 {
            if bitrate > self.minimum_bitrate {
                debug!(rtt_ms = rtt, send_buffer, "severe congestion, snapping to minimum");
            }
            bitrate = self.minimum_bitrate;
            self.next_decrease = Some(now + self.settings.decrease_cooldown);
        } else if decrease_open && (rtt > latency / 5.0 || send_buffer > th2) {
            bitrate -= MIN_STEP_BPS.max(bitrate / 10);
            self.next_decrease = Some(now + self.settings.fast_decrease_cooldown);
        } else if decrease_open && (rtt > rtt_th_max || send_buffer > th1) {
            bitrate -= MIN_STEP_BPS;
            self.next_decrease = Some(now + self.settings.decrease_cooldown);
        } else if increase_open && rtt < rtt_th_min && self.rtt_delta_avg.value() < 0.01 {
            bitrate += MIN_STEP_BPS.max(bitrate / self.settings.increase_divisor);
            self.next_increase = Some(now + self.settings.increase_cooldown);
        }

        // The transport's estimate bounds the whole outbound stream, so the
        // video share is whatever it leaves after audio.
        if stats.bandwidth_estimate_mbps > 0.0 {
            let estimate = stats.bandwidth_estimate_mbps * 1_000_000.0;
            let cap = (estimate + 1_000_000.0).max(estimate * 1.7) as i64 - current_audio_bitrate;
            bitrate = bitrate.min(cap);
        }

        bitrate = bitrate.clamp(self.minimum_bitrate, self.target_bitrate);
        self.bitrate = bitrate;

        if bitrate != self.previous_bitrate {
            self.previous_bitrate = bitrate;
            Some(bitrate)
        } else {
            None
        }
    }

    fn set_profile(&mut self, profile: SettingsProfile) {
        self.settings = ThresholdSettings::for_profile(profile);
    }

    fn telemetry(&self) -> RegulatorTelemetry {
        RegulatorTelemetry {
            algorithm: "congestion-threshold".to_string(),
            bitrate_bps: self.bitrate,
            ceiling_bps: self.target_bitrate,
            rtt_avg_ms: self.rtt_avg.value(),
            smooth_packets_in_flight: 0.0,
            fast_packets_in_flight: 0.0,
        }
    }

    fn reset(&mut self) {
        self.send_buffer_avg.reset();
        self.send_buffer_jitter.reset();
        self.prev_send_buffer = None;
        self.rtt_avg.reset();
        self.rtt_delta_avg.reset();
        self.rtt_jitter.reset();
        self.rtt_min = 0.0;
        self.prev_rtt = None;
        self.throughput_bps.reset();
        self.bitrate = 0;
        self.target_bitrate = 0;
        self.previous_bitrate = 0;
        self.next_decrease = None;
        self.next_increase = None;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_range() -> BitrateRange {
        BitrateRange {
            lower: 250_000,
            upper: 6_000_000,
        }
    }

    fn regulator() -> ThresholdRegulator {
        ThresholdRegulator::new(test_range(), 250_000, SettingsProfile::Fast)
    }

    fn snap(rtt_ms: f64) -> StatsSnapshot {
        StatsSnapshot {
            rtt_ms,
            packets_in_flight: 0.0,
            send_rate_mbps: None,
            bandwidth_estimate_mbps: 0.0,
        }
    }

    // ─── Initialization ─────────────────────────────────────────────────

    #[test]
    fn first_tick_seeds_from_caller_bitrate() {
        let mut reg = regulator();
        let now = Instant::now();
        reg.update(now, &snap(40.0), 1_000_000, 0);
        // One quiet tick earns one climb step on top of the seed.
        assert_eq!(reg.telemetry().bitrate_bps, 1_100_000);
        assert_eq!(reg.telemetry().ceiling_bps, 6_000_000);
    }

    #[test]
    fn invalid_rtt_is_a_no_op() {
        let mut reg = regulator();
        let now = Instant::now();
        assert!(reg.update(now, &snap(0.0), 1_000_000, 0).is_none());
        assert!(reg.update(now, &snap(-5.0), 1_000_000, 0).is_none());
        assert_eq!(reg.telemetry().bitrate_bps, 0);
        assert_eq!(reg.telemetry().rtt_avg_ms, 0.0);
    }

    // ─── Severe tier ────────────────────────────────────────────────────

    #[test]
    fn severe_rtt_snaps_to_minimum_in_one_tick() {
        let mut reg = regulator();
        let now = Instant::now();
        // latency/3 with the 2s default = 666.7ms
        let emitted = reg.update(now, &snap(700.0), 6_000_000, 0);
        assert_eq!(emitted, Some(250_000));
    }

    #[test]
    fn severe_holds_minimum_while_congestion_persists() {
        let mut reg = regulator();
        let base = Instant::now();
        reg.update(base, &snap(700.0), 6_000_000, 0);
        for i in 1..10u64 {
            let emitted = reg.update(base + Duration::from_millis(i * 400), &snap(700.0), 250_000, 0);
            assert!(emitted.is_none(), "pinned bitrate must not re-emit");
            assert_eq!(reg.telemetry().bitrate_bps, 250_000);
        }
    }

    // ─── Fast tier ──────────────────────────────────────────────────────

    #[test]
    fn fast_tier_cuts_proportionally() {
        let mut reg = regulator();
        let now = Instant::now();
        // latency/5 = 400ms; 450 is over the fast tier but under severe.
        let emitted = reg.update(now, &snap(450.0), 6_000_000, 0);
        assert_eq!(emitted, Some(5_400_000), "expected a bitrate/10 cut");
    }

    #[test]
    fn fast_tier_walks_down_to_minimum_under_sustained_pressure() {
        let mut reg = regulator();
        let base = Instant::now();
        for i in 0..60u64 {
            reg.update(base + Duration::from_millis(i * 400), &snap(450.0), 6_000_000, 0);
        }
        assert_eq!(reg.telemetry().bitrate_bps, 250_000);
    }

    // ─── Moderate tier ──────────────────────────────────────────────────

    #[test]
    fn gradual_rtt_rise_triggers_flat_cut() {
        let mut reg = regulator();
        let base = Instant::now();
        let mut tick = 0u64;
        let mut at = |reg: &mut ThresholdRegulator, rtt: f64| {
            let now = base + Duration::from_millis(tick * 400);
            tick += 1;
            reg.update(now, &snap(rtt), 6_000_000, 0)
        };

        // Settle the baselines at a quiet 40ms.
        for _ in 0..10 {
            at(&mut reg, 40.0);
        }
        assert_eq!(reg.telemetry().bitrate_bps, 6_000_000);

        // Creep upward; once RTT clears the avg + jitter envelope the
        // moderate tier shaves a flat step.
        for rtt in [41.0, 42.0, 43.0, 44.0, 45.0, 46.0, 47.0, 48.0] {
            at(&mut reg, rtt);
        }
        assert!(
            reg.telemetry().bitrate_bps <= 5_900_000,
            "expected at least one flat cut, got {}",
            reg.telemetry().bitrate_bps
        );
    }

    #[test]
    fn rising_send_buffer_triggers_cut() {
        let mut reg = regulator();
        let base = Instant::now();
        let mut stats = StatsSnapshot {
            rtt_ms: 40.0,
            packets_in_flight: 0.0,
            send_rate_mbps: Some(10.0),
            bandwidth_estimate_mbps: 0.0,
        };
        reg.update(base, &stats, 6_000_000, 0);
        // RTT grows 4ms per tick, inflating the implied buffer occupancy
        // faster than its slow baseline can follow.
        for i in 1..10u64 {
            stats.rtt_ms = 40.0 + 4.0 * i as f64;
            reg.update(base + Duration::from_millis(i * 400), &stats, 6_000_000, 0);
        }
        assert!(
            reg.telemetry().bitrate_bps < 6_000_000,
            "buffer growth should have cut the bitrate, got {}",
            reg.telemetry().bitrate_bps
        );
    }

    // ─── Climb ──────────────────────────────────────────────────────────

    #[test]
    fn quiet_link_climbs_by_expected_steps() {
        let mut reg = regulator();
        let base = Instant::now();
        let mut expected = 1_000_000i64;
        for i in 0..60u64 {
            reg.update(base + Duration::from_millis(i * 400), &snap(40.0), 1_000_000, 0);
            expected = (expected + MIN_STEP_BPS.max(expected / 30)).min(6_000_000);
            assert_eq!(reg.telemetry().bitrate_bps, expected, "tick {i}");
        }
        assert_eq!(reg.telemetry().bitrate_bps, 6_000_000);
    }

    #[test]
    fn climb_respects_increase_cooldown() {
        let mut reg = regulator();
        let base = Instant::now();
        reg.update(base, &snap(40.0), 1_000_000, 0);
        let after_first = reg.telemetry().bitrate_bps;
        // 200ms later the 400ms increase cooldown is still armed.
        let emitted = reg.update(base + Duration::from_millis(200), &snap(40.0), 1_000_000, 0);
        assert!(emitted.is_none());
        assert_eq!(reg.telemetry().bitrate_bps, after_first);
    }

    // ─── Bandwidth cap ──────────────────────────────────────────────────

    #[test]
    fn bandwidth_estimate_caps_bitrate() {
        let mut reg = regulator();
        let now = Instant::now();
        let stats = StatsSnapshot {
            rtt_ms: 40.0,
            packets_in_flight: 0.0,
            send_rate_mbps: None,
            bandwidth_estimate_mbps: 2.0,
        };
        // Cap = max(2M + 1M, 2M * 1.7) = 3.4M
        let emitted = reg.update(now, &stats, 6_000_000, 0);
        assert_eq!(emitted, Some(3_400_000));
    }

    #[test]
    fn bandwidth_cap_deducts_audio_share() {
        let mut reg = regulator();
        let now = Instant::now();
        let stats = StatsSnapshot {
            rtt_ms: 40.0,
            packets_in_flight: 0.0,
            send_rate_mbps: None,
            bandwidth_estimate_mbps: 2.0,
        };
        let emitted = reg.update(now, &stats, 6_000_000, 128_000);
        assert_eq!(emitted, Some(3_400_000 - 128_000));
    }

    #[test]
    fn unknown_bandwidth_estimate_does_not_cap() {
        let mut reg = regulator();
        let now = Instant::now();
        reg.update(now, &snap(40.0), 6_000_000, 0);
        assert_eq!(reg.telemetry().bitrate_bps, 6_000_000);
    }

    // ─── Profile switch ─────────────────────────────────────────────────

    #[test]
    fn slow_profile_climbs_half_as_steeply() {
        let mut reg = regulator();
        let base = Instant::now();
        reg.update(base, &snap(40.0), 4_800_000, 0);
        let fast_step = reg.telemetry().bitrate_bps - 4_800_000;
        assert_eq!(fast_step, 160_000); // 4.8M / 30

        reg.set_profile(SettingsProfile::Slow);
        let before = reg.telemetry().bitrate_bps;
        let rtt_avg_before = reg.telemetry().rtt_avg_ms;
        reg.update(base + Duration::from_millis(400), &snap(40.0), before, 0);
        let slow_step = reg.telemetry().bitrate_bps - before;
        assert_eq!(slow_step, 100_000); // max(100k, 4.96M / 60)

        // Smoothing state survived the swap.
        assert!((reg.telemetry().rtt_avg_ms - rtt_avg_before).abs() < 1.0);
    }

    // ─── Reset ──────────────────────────────────────────────────────────

    #[test]
    fn reset_forgets_adaptive_state() {
        let mut reg = regulator();
        let now = Instant::now();
        reg.update(now, &snap(700.0), 6_000_000, 0);
        assert_eq!(reg.telemetry().bitrate_bps, 250_000);

        reg.reset();
        assert_eq!(reg.telemetry().bitrate_bps, 0);
        assert_eq!(reg.telemetry().rtt_avg_ms, 0.0);

        // Re-seeds from the caller on the next tick.
        reg.update(now + Duration::from_secs(1), &snap(40.0), 2_000_000, 0);
        assert_eq!(reg.telemetry().bitrate_bps, 2_100_000);
    }
}
