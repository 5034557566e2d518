//! Replays a named telemetry scenario through the regulator and prints one
//! JSON line per bitrate emission, plus the final telemetry snapshot.
//!
//! Usage: spate_scenario <clean|congested|bursty> [--seed N] [--secs N]
//!        [--algorithm congestion-threshold|dual-rate] [--start-bitrate BPS]

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::info;

use spate_regulator::config::RegulatorConfig;
use spate_regulator::controller::RegulatorController;
use spate_sim::harness;
use spate_sim::scenario::Scenario;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        bail!("missing scenario name (clean/congested/bursty)");
    };

    let mut seed = 1u64;
    let mut secs = 60u64;
    let mut algorithm = "congestion-threshold".to_string();
    let mut start_bitrate = 1_000_000i64;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => {
                seed = args.next().expect("missing --seed value").parse()?;
            }
            "--secs" => {
                secs = args.next().expect("missing --secs value").parse()?;
            }
            "--algorithm" => {
                algorithm = args.next().expect("missing --algorithm value");
            }
            "--start-bitrate" => {
                start_bitrate = args.next().expect("missing --start-bitrate value").parse()?;
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let duration = Duration::from_secs(secs);
    let mut scenario = match name.as_str() {
        "clean" => Scenario::clean(seed, duration),
        "congested" => Scenario::congested(seed, duration),
        "bursty" => Scenario::bursty(seed, duration),
        other => bail!("unknown scenario: {other}"),
    };
    let frames = scenario.frames();

    let config = RegulatorConfig::from_toml_str(&format!("algorithm = {algorithm:?}"))?;
    let mut controller = RegulatorController::new(config, Box::new(|_| {}))?;

    info!(scenario = %name, frames = frames.len(), "replaying scenario");
    let result = harness::drive(&mut controller, &frames, start_bitrate, 128_000);
    info!(
        emissions = result.emissions.len(),
        final_bitrate_bps = result.final_bitrate_bps(),
        "scenario complete"
    );
    for emission in &result.emissions {
        println!(
            "{}",
            serde_json::json!({
                "t_ms": emission.t.as_millis() as u64,
                "bitrate_bps": emission.bitrate_bps,
            })
        );
    }
    println!("{}", serde_json::to_string(&result.final_telemetry)?);
    Ok(())
}
