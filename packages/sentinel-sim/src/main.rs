//! main.rs — Sentinel sensor simulator entry point
//!
//! Renders a motion scenario into 50 Hz multi-sensor frames, then either:
//!   - streams them to a running `sentinel-engine` over UDP in (scaled) real
//!     time, one envelope per tick, or
//!   - with `--offline`, feeds them straight into an in-process engine and
//!     prints what each detector concluded.

mod motion;
mod offline;
mod scenarios;
mod udp_tx;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sentinel_engine::DetectorConfig;
use sentinel_types::{DetectorKind, Vec3};
use tokio::time::interval;
use tracing::info;

use motion::{NoiseConfig, SensorSynth};
use scenarios::ScenarioKind;
use udp_tx::UdpTransmitter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sentinel-sim", about = "Sentinel multi-sensor motion simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Engine sensor bridge address
    #[arg(long, default_value = "127.0.0.1:5556")]
    engine_addr: String,
    /// Motion scenario to play
    #[arg(long, value_enum, default_value = "fall")]
    scenario: ScenarioKind,
    /// Playback speed multiplier (1.0 = real-time); UDP mode only
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// Run against an in-process engine instead of sending UDP
    #[arg(long)]
    offline: bool,
    /// Override the configured sample rate (Hz)
    #[arg(long)]
    rate: Option<f64>,
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct FullConfig {
    simulation: SimulationConfig,
    noise: NoiseConfig,
    magnetic: MagneticConfig,
    #[serde(default)]
    detectors: DetectorConfig,
}

#[derive(Debug, serde::Deserialize)]
struct SimulationConfig {
    rate_hz: f64,
    seed: u64,
    source_id: u32,
}

#[derive(Debug, serde::Deserialize)]
struct MagneticConfig {
    field_ut: [f32; 3],
}

fn load_config(path: &str) -> anyhow::Result<FullConfig> {
    let raw = std::fs::read_to_string(path).unwrap_or_else(|_| include_str!("../config.toml").to_string());
    toml::from_str(&raw).with_context(|| format!("invalid config {path}"))
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_sim=info,sentinel_engine=warn".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    let rate_hz = args.rate.unwrap_or(cfg.simulation.rate_hz);

    let phases = scenarios::timeline(args.scenario);
    let [fx, fy, fz] = cfg.magnetic.field_ut;
    let mut synth = SensorSynth::new(cfg.noise, Vec3::new(fx, fy, fz), rate_hz, cfg.simulation.seed);
    let frames = synth.render(&phases);

    info!(
        "📱 Scenario {:?}: {} phase(s), {:.1}s at {rate_hz} Hz ({} frames)",
        args.scenario,
        phases.len(),
        scenarios::duration_ms(&phases) as f64 / 1000.0,
        frames.len()
    );

    if args.offline {
        let report = offline::run_offline(&frames, cfg.detectors).await?;
        info!("Offline run: {} events processed", report.events);
        info!(
            "Primary: {} ({})",
            report.primary_state.as_str(),
            if report.escalated(DetectorKind::Primary) { "escalated" } else { "no escalation" }
        );
        info!(
            "Cascade: {} ({})",
            report.cascade_stage.as_str(),
            if report.escalated(DetectorKind::Cascade) { "escalated" } else { "no escalation" }
        );
        return Ok(());
    }

    let mut tx = UdpTransmitter::new(&args.engine_addr, cfg.simulation.source_id)
        .context("failed to bind UDP socket")?;

    let tick_ms = (synth.period_ms() as f64 / args.speed.clamp(0.1, 20.0)).max(1.0) as u64;
    let mut ticker = interval(Duration::from_millis(tick_ms));
    info!("📡 Streaming to {} every {tick_ms}ms", args.engine_addr);

    let mut phase_ends = phases.iter().scan(0u64, |end, p| {
        *end += p.duration_ms;
        Some((*end, p.label))
    });
    let mut current = phase_ends.next();
    if let Some((_, label)) = current {
        info!("▶ {label}");
    }

    for frame in &frames {
        ticker.tick().await;
        tx.send_frame(&frame.events);

        while let Some((end, _)) = current {
            if frame.t_ms < end {
                break;
            }
            current = phase_ends.next();
            if let Some((_, label)) = current {
                info!("▶ {label} (t={:.1}s)", frame.t_ms as f64 / 1000.0);
            }
        }
    }

    info!("Scenario complete: {} envelopes sent", frames.len());
    Ok(())
}
