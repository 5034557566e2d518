//! Replay harness: drives a controller through scenario frames with an
//! injected clock, feeding each emitted bitrate back in as the encoder's
//! current rate so the loop closes the way a live pipeline would.

use quanta::Instant;
use std::time::Duration;

use spate_regulator::controller::RegulatorController;
use spate_regulator::regulator::RegulatorTelemetry;

use crate::scenario::ScenarioFrame;

/// One applied bitrate change.
#[derive(Debug, Clone)]
pub struct Emission {
    pub t: Duration,
    pub bitrate_bps: i64,
}

/// Outcome of replaying a scenario against one controller.
#[derive(Debug)]
pub struct RunResult {
    pub emissions: Vec<Emission>,
    pub final_telemetry: RegulatorTelemetry,
}

impl RunResult {
    /// Bitrate the encoder ended the run at.
    pub fn final_bitrate_bps(&self) -> i64 {
        self.final_telemetry.bitrate_bps
    }

    /// Scenario time of the first emission at or above `target_bps`.
    pub fn first_reached(&self, target_bps: i64) -> Option<Duration> {
        self.emissions
            .iter()
            .find(|e| e.bitrate_bps >= target_bps)
            .map(|e| e.t)
    }
}

/// Replay `frames` through the controller.
pub fn drive(
    controller: &mut RegulatorController,
    frames: &[ScenarioFrame],
    initial_video_bps: i64,
    audio_bps: i64,
) -> RunResult {
    let base = Instant::now();
    let mut video_bps = initial_video_bps;
    let mut emissions = Vec::new();

    for frame in frames {
        if let Some(bitrate) =
            controller.tick_at(base + frame.t, &frame.stats, video_bps, audio_bps)
        {
            emissions.push(Emission {
                t: frame.t,
                bitrate_bps: bitrate,
            });
            video_bps = bitrate;
        }
    }

    RunResult {
        emissions,
        final_telemetry: controller.telemetry(),
    }
}
