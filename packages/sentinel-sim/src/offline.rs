//! offline.rs — Runs a rendered scenario through an in-process engine
//!
//! Uses the same sequencer the host binary runs, so the outcome matches what
//! the engine would report if the frames arrived over UDP in order.

use sentinel_engine::{spawn_sequencer, DetectorConfig};
use sentinel_types::{CascadeStage, DetectionState, DetectorKind, EscalationEvent};
use tracing::warn;

use crate::motion::Frame;

#[derive(Debug)]
pub struct OfflineReport {
    pub events: usize,
    pub primary_state: DetectionState,
    pub cascade_stage: CascadeStage,
    pub escalations: Vec<EscalationEvent>,
}

impl OfflineReport {
    pub fn escalated(&self, source: DetectorKind) -> bool {
        self.escalations.iter().any(|e| e.source == source)
    }
}

pub async fn run_offline(frames: &[Frame], detectors: DetectorConfig) -> anyhow::Result<OfflineReport> {
    let (handle, mut outputs, task) = spawn_sequencer(detectors, 0);

    let mut events = 0;
    for frame in frames {
        for event in &frame.events {
            if let Err(e) = handle.submit_event(*event) {
                warn!("Offline: sample at t={}ms not submitted: {e}", frame.t_ms);
                continue;
            }
            events += 1;
        }
    }

    drop(handle);
    let engine = task
        .shutdown()
        .await
        .ok_or_else(|| anyhow::anyhow!("sequencer task failed"))?;

    let mut escalations = Vec::new();
    while let Some(escalation) = outputs.escalations.recv().await {
        escalations.push(escalation);
    }

    Ok(OfflineReport {
        events,
        primary_state: engine.primary_state(),
        cascade_stage: engine.cascade_stage(),
        escalations,
    })
}
