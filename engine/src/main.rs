use anyhow::Context;
use tracing::{info, warn};

use sentinel_engine::incident_log::{self, IncidentLog};
use sentinel_engine::sensor_bridge::start_sensor_bridge;
use sentinel_engine::status_api::{self, AppState};
use sentinel_engine::{spawn_sequencer, DetectorConfig, EngineConfig};

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_engine=info,tower_http=warn".into()),
        )
        .init();

    info!("🛡  Sentinel detection engine starting...");

    let config = EngineConfig::default();
    let detectors = match &config.detector_config_path {
        Some(path) => {
            info!("Loading detector thresholds from {path}");
            DetectorConfig::load(path)?
        }
        None => DetectorConfig::default(),
    };

    // Incident chain. Detection keeps running without it.
    let incidents = match IncidentLog::open(&config.incident_log_path).await {
        Ok(log) => {
            if let Err(e) = log.log_session_start().await {
                warn!("Incident log {} not writable: {e}", config.incident_log_path);
            }
            info!("📜 Incident log at {}", config.incident_log_path);
            Some(log)
        }
        Err(e) => {
            warn!("Incident log {} unavailable: {e} (escalations will only be logged)", config.incident_log_path);
            None
        }
    };

    let (sequencer, outputs, task) = spawn_sequencer(detectors, config.history_capacity);
    let app = status_api::router(AppState::new(sequencer.clone(), &outputs, incidents.clone()));

    // Escalations → incident log
    let escalation_task = tokio::spawn(incident_log::record_escalations(outputs.escalations, incidents));

    // UDP sensor input
    let bridge = tokio::spawn(start_sensor_bridge(config.udp_port, sequencer.clone()));

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding HTTP {addr}"))?;
    info!("🚀 Status API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server")?;

    bridge.abort();
    drop(sequencer);
    if let Some(engine) = task.shutdown().await {
        info!(
            "Final state: primary={} cascade={}",
            engine.primary_state().as_str(),
            engine.cascade_stage().as_str()
        );
    }
    let recorded = escalation_task.await.unwrap_or_default();
    info!("👋 Sentinel stopped ({recorded} incident(s) recorded this session)");
    Ok(())
}
