use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;

use spate_regulator::stats::StatsSnapshot;

/// Configuration for a deterministic telemetry scenario.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub duration: Duration,
    /// Tick spacing; the regulator expects roughly 200ms.
    pub step: Duration,
    pub link: LinkScenarioConfig,
}

/// Bounds and step sizes for the synthetic link's random walk.
#[derive(Debug, Clone)]
pub struct LinkScenarioConfig {
    /// RTT floor in milliseconds; the walk never goes below it.
    pub base_rtt_ms: f64,
    pub max_rtt_ms: f64,
    pub rtt_step_ms: f64,
    /// Packets-in-flight floor.
    pub base_pif: f64,
    pub max_pif: f64,
    pub pif_step: f64,
    /// Reported instantaneous send rate (Mbit/s); `None` omits the signal.
    pub send_rate_mbps: Option<f64>,
    /// Link bandwidth estimate (Mbit/s); 0 means unknown.
    pub bandwidth_mbps: f64,
}

/// A single tick of synthetic telemetry.
#[derive(Debug, Clone)]
pub struct ScenarioFrame {
    pub t: Duration,
    pub stats: StatsSnapshot,
}

/// Deterministic random-walk telemetry generator.
///
/// Given a seed, produces reproducible [`ScenarioFrame`] sequences where
/// RTT and packets-in-flight evolve via random-walk steps clamped to the
/// configured bounds.
#[derive(Debug)]
pub struct Scenario {
    cfg: ScenarioConfig,
    rng: StdRng,
    rtt_ms: f64,
    pif: f64,
}

impl Scenario {
    pub fn new(cfg: ScenarioConfig) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        let rtt_ms = cfg.link.base_rtt_ms;
        let pif = cfg.link.base_pif;
        Self {
            cfg,
            rng,
            rtt_ms,
            pif,
        }
    }

    /// A quiet, stable link with ample bandwidth headroom. No send-rate
    /// signal, so the threshold cascade regulates on RTT alone.
    pub fn clean(seed: u64, duration: Duration) -> Self {
        Self::new(ScenarioConfig {
            seed,
            duration,
            step: Duration::from_millis(200),
            link: LinkScenarioConfig {
                base_rtt_ms: 30.0,
                max_rtt_ms: 32.0,
                rtt_step_ms: 0.2,
                base_pif: 5.0,
                max_pif: 10.0,
                pif_step: 0.5,
                send_rate_mbps: None,
                bandwidth_mbps: 50.0,
            },
        })
    }

    /// A collapsed path: RTT pinned far over any tolerable latency, the
    /// send buffer backing up by the hundreds of packets.
    pub fn congested(seed: u64, duration: Duration) -> Self {
        Self::new(ScenarioConfig {
            seed,
            duration,
            step: Duration::from_millis(200),
            link: LinkScenarioConfig {
                base_rtt_ms: 700.0,
                max_rtt_ms: 900.0,
                rtt_step_ms: 25.0,
                base_pif: 600.0,
                max_pif: 1_200.0,
                pif_step: 50.0,
                send_rate_mbps: Some(5.0),
                bandwidth_mbps: 0.0,
            },
        })
    }

    /// A volatile link swinging between quiet and heavily queued.
    pub fn bursty(seed: u64, duration: Duration) -> Self {
        Self::new(ScenarioConfig {
            seed,
            duration,
            step: Duration::from_millis(200),
            link: LinkScenarioConfig {
                base_rtt_ms: 30.0,
                max_rtt_ms: 300.0,
                rtt_step_ms: 40.0,
                base_pif: 10.0,
                max_pif: 400.0,
                pif_step: 60.0,
                send_rate_mbps: Some(8.0),
                bandwidth_mbps: 0.0,
            },
        })
    }

    /// Generate the full frame sequence for this scenario.
    pub fn frames(&mut self) -> Vec<ScenarioFrame> {
        let total_steps =
            (self.cfg.duration.as_secs_f64() / self.cfg.step.as_secs_f64()).ceil() as u64;
        let mut frames = Vec::with_capacity(total_steps as usize + 1);

        for step_idx in 0..=total_steps {
            let t = self.cfg.step.mul_f64(step_idx as f64);
            let link = &self.cfg.link;

            let rtt_delta = rand_signed(&mut self.rng, link.rtt_step_ms);
            let pif_delta = rand_signed(&mut self.rng, link.pif_step);
            self.rtt_ms = (self.rtt_ms + rtt_delta).clamp(link.base_rtt_ms, link.max_rtt_ms);
            self.pif = (self.pif + pif_delta).clamp(link.base_pif, link.max_pif);

            frames.push(ScenarioFrame {
                t,
                stats: StatsSnapshot {
                    rtt_ms: self.rtt_ms,
                    packets_in_flight: self.pif,
                    send_rate_mbps: link.send_rate_mbps,
                    bandwidth_estimate_mbps: link.bandwidth_mbps,
                },
            });
        }

        frames
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    if max_step <= 0.0 {
        return 0.0;
    }
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() { mag } else { -mag }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_is_deterministic_for_seed() {
        let mut s1 = Scenario::bursty(42, Duration::from_secs(5));
        let mut s2 = Scenario::bursty(42, Duration::from_secs(5));

        let f1 = s1.frames();
        let f2 = s2.frames();

        assert_eq!(f1.len(), f2.len());
        for (a, b) in f1.iter().zip(f2.iter()) {
            assert_eq!(a.t, b.t);
            assert_eq!(a.stats.rtt_ms, b.stats.rtt_ms);
            assert_eq!(a.stats.packets_in_flight, b.stats.packets_in_flight);
        }
    }

    #[test]
    fn frames_respect_configured_bounds() {
        let mut scenario = Scenario::bursty(7, Duration::from_secs(30));
        for frame in scenario.frames() {
            assert!((30.0..=300.0).contains(&frame.stats.rtt_ms));
            assert!((10.0..=400.0).contains(&frame.stats.packets_in_flight));
        }
    }

    #[test]
    fn congested_frames_stay_over_the_severe_threshold() {
        let mut scenario = Scenario::congested(3, Duration::from_secs(10));
        for frame in scenario.frames() {
            assert!(frame.stats.rtt_ms >= 700.0);
        }
    }

    #[test]
    fn frame_cadence_matches_step() {
        let mut scenario = Scenario::clean(1, Duration::from_secs(2));
        let frames = scenario.frames();
        assert_eq!(frames.len(), 11); // 2s / 200ms, inclusive of t=0
        assert_eq!(frames[1].t - frames[0].t, Duration::from_millis(200));
    }
}
