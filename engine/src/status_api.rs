//! # status_api
//!
//! Read-mostly HTTP surface for dashboards and the alerting collaborator:
//!
//! | Route            | Purpose                                        |
//! |------------------|------------------------------------------------|
//! | `GET /health`    | liveness                                       |
//! | `GET /status`    | latest primary snapshot + cascade stage        |
//! | `GET /history`   | recent sequenced events, oldest first          |
//! | `POST /reset`    | `?target=primary\|cascade`, both when omitted  |
//!
//! Resets are queued through the sequencer like any sample.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sentinel_types::{CascadeStage, DetectionSnapshot, DetectorKind, SensorEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::incident_log::IncidentLog;
use crate::sequencer::{SequencerHandle, SequencerOutputs};

#[derive(Clone)]
pub struct AppState {
    pub sequencer: SequencerHandle,
    pub snapshots: watch::Receiver<Option<DetectionSnapshot>>,
    pub cascade_stage: watch::Receiver<CascadeStage>,
    pub incidents: Option<IncidentLog>,
}

impl AppState {
    pub fn new(sequencer: SequencerHandle, outputs: &SequencerOutputs, incidents: Option<IncidentLog>) -> Self {
        Self {
            sequencer,
            snapshots: outputs.snapshots.clone(),
            cascade_stage: outputs.cascade_stage.clone(),
            incidents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub snapshot: Option<DetectionSnapshot>,
    pub cascade_stage: CascadeStage,
    pub rejected_samples: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResetParams {
    pub target: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/history", get(history))
        .route("/reset", post(reset))
        .layer(cors)
        .with_state(state)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        snapshot: *state.snapshots.borrow(),
        cascade_stage: *state.cascade_stage.borrow(),
        rejected_samples: state.sequencer.rejected_count(),
    })
}

pub async fn history(State(state): State<AppState>) -> Result<Json<Vec<SensorEvent>>, ApiError> {
    state
        .sequencer
        .history()
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

pub async fn reset(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let target = params
        .target
        .as_deref()
        .map(str::parse::<DetectorKind>)
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    state
        .sequencer
        .reset(target)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    info!("API: reset requested ({})", params.target.as_deref().unwrap_or("both"));

    if let Some(log) = &state.incidents {
        if let Err(e) = log.log_reset(target).await {
            warn!("Incident log write failed: {e}");
        }
    }
    Ok(Json(json!({ "reset": target })))
}
