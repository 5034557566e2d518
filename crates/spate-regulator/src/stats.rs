//! # Transport Telemetry
//!
//! The per-tick statistics snapshot the transport layer hands to the
//! regulator, and the smoothing filters the regulation strategies share.

use serde::Serialize;

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// One measurement tick of transport health.
///
/// Produced by the transport collaborator once per polling interval. The
/// regulator never talks to the network itself; this readout is its only
/// view of the path.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsSnapshot {
    /// Round-trip time in milliseconds. Must be > 0; a non-positive value
    /// means the transport has no measurement yet and the tick is dropped.
    pub rtt_ms: f64,
    /// Packets sent but not yet acknowledged, held in the send buffer.
    pub packets_in_flight: f64,
    /// Instantaneous send-rate estimate in Mbit/s, when the transport has one.
    pub send_rate_mbps: Option<f64>,
    /// Link bandwidth estimate in Mbit/s. 0 when unknown. Used only as a
    /// ceiling, never as a target.
    pub bandwidth_estimate_mbps: f64,
}

impl StatsSnapshot {
    /// Whether this tick carries a usable RTT measurement.
    pub fn is_valid(&self) -> bool {
        self.rtt_ms > 0.0
    }
}

// ─── EWMA ───────────────────────────────────────────────────────────────────

/// Exponentially weighted moving average.
///
/// The first sample sets the value directly; NaN or infinite samples are
/// ignored so a bad measurement cannot poison the smoothed series.
#[derive(Debug, Clone)]
pub struct Ewma {
    /// Smoothing factor (0.0 - 1.0). Higher = more responsive.
    alpha: f64,
    /// Current smoothed value.
    value: f64,
    /// Whether the first sample has been applied.
    initialized: bool,
}

impl Ewma {
    /// Create a new EWMA with the given smoothing factor.
    pub fn new(alpha: f64) -> Self {
        Ewma {
            alpha,
            value: 0.0,
            initialized: false,
        }
    }

    /// Update with a new sample and return the smoothed value.
    pub fn update(&mut self, sample: f64) -> f64 {
        if sample.is_nan() || sample.is_infinite() {
            return self.value;
        }
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        }
        self.value
    }

    /// Get the current smoothed value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Reset to uninitialized state.
    pub fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}

// ─── Asymmetric EWMA ────────────────────────────────────────────────────────

/// EWMA with separate smoothing factors for rising and falling samples.
///
/// A small rise factor with a larger fall factor makes the estimator slow
/// to alarm and quick to register relief.
#[derive(Debug, Clone)]
pub struct AsymmetricEwma {
    /// Factor applied while the sample is above the current value.
    rise_alpha: f64,
    /// Factor applied while the sample is at or below the current value.
    fall_alpha: f64,
    value: f64,
    initialized: bool,
}

impl AsymmetricEwma {
    pub fn new(rise_alpha: f64, fall_alpha: f64) -> Self {
        AsymmetricEwma {
            rise_alpha,
            fall_alpha,
            value: 0.0,
            initialized: false,
        }
    }

    /// Update with a new sample and return the smoothed value.
    pub fn update(&mut self, sample: f64) -> f64 {
        if sample.is_nan() || sample.is_infinite() {
            return self.value;
        }
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            let alpha = if sample > self.value {
                self.rise_alpha
            } else {
                self.fall_alpha
            };
            self.value = alpha * sample + (1.0 - alpha) * self.value;
        }
        self.value
    }

    /// Clamp the smoothed value from above.
    pub fn clamp_max(&mut self, max: f64) {
        if self.value > max {
            self.value = max;
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.initialized = false;
    }
}

// ─── Spike filter ───────────────────────────────────────────────────────────

/// Decaying peak-hold filter for jitter tracking.
///
/// The held value decays by a fixed factor each sample and snaps up to any
/// positive delta that exceeds it, so the envelope remembers the largest
/// recent spike and forgets it gradually.
#[derive(Debug, Clone)]
pub struct SpikeFilter {
    /// Multiplicative decay per sample (e.g. 0.99).
    decay: f64,
    value: f64,
}

impl SpikeFilter {
    pub fn new(decay: f64) -> Self {
        SpikeFilter { decay, value: 0.0 }
    }

    /// Feed one delta. Negative deltas only decay the envelope.
    pub fn update(&mut self, delta: f64) -> f64 {
        if delta.is_nan() || delta.is_infinite() {
            return self.value;
        }
        self.value *= self.decay;
        if delta > self.value {
            self.value = delta;
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Snapshot Tests ─────────────────────────────────────────────────

    #[test]
    fn snapshot_valid_requires_positive_rtt() {
        let mut snap = StatsSnapshot {
            rtt_ms: 35.0,
            ..Default::default()
        };
        assert!(snap.is_valid());

        snap.rtt_ms = 0.0;
        assert!(!snap.is_valid());

        snap.rtt_ms = -1.0;
        assert!(!snap.is_valid());
    }

    #[test]
    fn snapshot_serializes() {
        let snap = StatsSnapshot {
            rtt_ms: 42.5,
            packets_in_flight: 17.0,
            send_rate_mbps: Some(5.2),
            bandwidth_estimate_mbps: 12.0,
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"rtt_ms\":42.5"));
        assert!(json.contains("\"packets_in_flight\":17.0"));
    }

    // ─── EWMA Tests ─────────────────────────────────────────────────────

    #[test]
    fn ewma_first_sample_sets_value() {
        let mut ewma = Ewma::new(0.01);
        ewma.update(100.0);
        assert_eq!(ewma.value(), 100.0);
    }

    #[test]
    fn ewma_smooths_toward_new_value() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(100.0);
        let v = ewma.update(200.0);
        assert!((v - 150.0).abs() < 0.001, "EWMA 0.5 should average: got {v}");
    }

    #[test]
    fn ewma_ignores_nan_and_inf() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(100.0);
        ewma.update(f64::NAN);
        ewma.update(f64::INFINITY);
        assert_eq!(ewma.value(), 100.0);
    }

    #[test]
    fn ewma_reset() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(100.0);
        ewma.reset();
        assert_eq!(ewma.value(), 0.0);
        ewma.update(50.0);
        assert_eq!(ewma.value(), 50.0);
    }

    // ─── Asymmetric EWMA Tests ──────────────────────────────────────────

    #[test]
    fn asymmetric_uses_rise_factor_on_rise() {
        let mut ewma = AsymmetricEwma::new(0.1, 0.5);
        ewma.update(100.0);
        let v = ewma.update(200.0);
        // 0.1 * 200 + 0.9 * 100 = 110
        assert!((v - 110.0).abs() < 0.001, "got {v}");
    }

    #[test]
    fn asymmetric_uses_fall_factor_on_fall() {
        let mut ewma = AsymmetricEwma::new(0.1, 0.5);
        ewma.update(100.0);
        let v = ewma.update(0.0);
        // 0.5 * 0 + 0.5 * 100 = 50
        assert!((v - 50.0).abs() < 0.001, "got {v}");
    }

    #[test]
    fn asymmetric_clamp_max() {
        let mut ewma = AsymmetricEwma::new(0.9, 0.9);
        ewma.update(500.0);
        ewma.clamp_max(450.0);
        assert_eq!(ewma.value(), 450.0);
    }

    // ─── Spike Filter Tests ─────────────────────────────────────────────

    #[test]
    fn spike_filter_snaps_to_positive_delta() {
        let mut jitter = SpikeFilter::new(0.99);
        jitter.update(10.0);
        assert_eq!(jitter.value(), 10.0);
    }

    #[test]
    fn spike_filter_decays_between_spikes() {
        let mut jitter = SpikeFilter::new(0.99);
        jitter.update(10.0);
        jitter.update(0.0);
        assert!((jitter.value() - 9.9).abs() < 1e-9);
    }

    #[test]
    fn spike_filter_holds_largest_recent_spike() {
        let mut jitter = SpikeFilter::new(0.99);
        jitter.update(10.0);
        jitter.update(4.0); // below the decayed envelope, ignored
        assert!((jitter.value() - 9.9).abs() < 1e-9);
        jitter.update(25.0); // new peak
        assert_eq!(jitter.value(), 25.0);
    }

    #[test]
    fn spike_filter_ignores_negative_deltas() {
        let mut jitter = SpikeFilter::new(0.99);
        jitter.update(-50.0);
        assert_eq!(jitter.value(), 0.0);
    }
}
