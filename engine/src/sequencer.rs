//! # sequencer
//!
//! Concurrency boundary between sensor producers and the detectors.
//!
//! ## Architecture
//! Producers (sensor callbacks, the UDP bridge, the simulator) may run on any
//! thread. They call [`SequencerHandle::submit`], which copies the values,
//! rejects non-finite samples and pushes onto an unbounded FIFO without
//! blocking. A single Tokio task drains that FIFO in arrival order and is the
//! only code that ever touches detector state, so no locks guard it.
//!
//! Results leave the task through channels:
//!   - latest primary snapshot on a `watch` channel
//!   - cascade stage on a `watch` channel
//!   - confirmed edges on an unbounded `mpsc` channel
//!
//! ## Shutdown
//! [`SequencerTask::shutdown`] stops the consumer after it drains whatever
//! was already queued. Dropping every handle has the same effect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sentinel_types::{CascadeStage, DetectionSnapshot, DetectorKind, EscalationEvent, SensorEvent, SensorKind, Vec3};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::engine::DetectionEngine;
use crate::error::{EngineError, Result};

// ── Queue messages ────────────────────────────────────────────────────────────

enum SequencerMessage {
    Sample(SensorEvent),
    /// Goes through the queue so it lands between samples, never inside one
    Reset(Option<DetectorKind>),
    History(oneshot::Sender<Vec<SensorEvent>>),
}

// ── Producer side ─────────────────────────────────────────────────────────────

/// Cheap to clone; safe to use from any thread.
#[derive(Clone)]
pub struct SequencerHandle {
    tx: mpsc::UnboundedSender<SequencerMessage>,
    rejected: Arc<AtomicU64>,
}

impl SequencerHandle {
    /// Copy a producer-owned value buffer into an event and enqueue it.
    pub fn submit(&self, kind: SensorKind, values: &[f32], timestamp_ns: u64) -> Result<()> {
        self.submit_event(SensorEvent::new(kind, Vec3::from_slice(values), timestamp_ns))
    }

    pub fn submit_event(&self, event: SensorEvent) -> Result<()> {
        if !event.vector.is_finite() {
            let total = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Sequencer: dropped non-finite {} sample at t={}ns ({total} rejected so far)",
                event.kind.as_str(),
                event.timestamp_ns
            );
            return Err(EngineError::NonFiniteSample {
                kind: event.kind,
                timestamp_ns: event.timestamp_ns,
            });
        }
        self.send(SequencerMessage::Sample(event))
    }

    pub fn reset(&self, target: Option<DetectorKind>) -> Result<()> {
        self.send(SequencerMessage::Reset(target))
    }

    /// Recent events, oldest first, as seen by the consumer at the time the
    /// request reaches the front of the queue.
    pub async fn history(&self) -> Result<Vec<SensorEvent>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SequencerMessage::History(reply_tx))?;
        reply_rx.await.map_err(|_| EngineError::SequencerClosed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn send(&self, msg: SequencerMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| EngineError::SequencerClosed)
    }
}

// ── Consumer outputs ──────────────────────────────────────────────────────────

pub struct SequencerOutputs {
    pub snapshots: watch::Receiver<Option<DetectionSnapshot>>,
    pub cascade_stage: watch::Receiver<CascadeStage>,
    pub escalations: mpsc::UnboundedReceiver<EscalationEvent>,
}

pub struct SequencerTask {
    stop: oneshot::Sender<()>,
    join: JoinHandle<DetectionEngine>,
}

impl SequencerTask {
    /// Stop after draining queued events; returns the final engine state.
    pub async fn shutdown(self) -> Option<DetectionEngine> {
        let _ = self.stop.send(());
        match self.join.await {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("Sequencer: consumer task ended abnormally: {e}");
                None
            }
        }
    }

    /// Wait for the consumer to end on its own (all handles dropped).
    pub async fn finished(self) -> Option<DetectionEngine> {
        let SequencerTask { stop, join } = self;
        let engine = join.await.ok();
        drop(stop);
        engine
    }
}

/// Spawn the single consumer task. Must be called inside a Tokio runtime.
pub fn spawn_sequencer(
    config: DetectorConfig,
    history_capacity: usize,
) -> (SequencerHandle, SequencerOutputs, SequencerTask) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(None);
    let (stage_tx, stage_rx) = watch::channel(CascadeStage::Idle);
    let (escalation_tx, escalation_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();

    let engine = DetectionEngine::new(config, history_capacity);
    let consumer = Consumer { engine, snapshot_tx, stage_tx, escalation_tx };
    let join = tokio::spawn(consumer.run(rx, stop_rx));

    info!("🛰  Sequencer started (history={history_capacity})");

    (
        SequencerHandle { tx, rejected: Arc::new(AtomicU64::new(0)) },
        SequencerOutputs { snapshots: snapshot_rx, cascade_stage: stage_rx, escalations: escalation_rx },
        SequencerTask { stop: stop_tx, join },
    )
}

// ── Consumer loop ─────────────────────────────────────────────────────────────

struct Consumer {
    engine: DetectionEngine,
    snapshot_tx: watch::Sender<Option<DetectionSnapshot>>,
    stage_tx: watch::Sender<CascadeStage>,
    escalation_tx: mpsc::UnboundedSender<EscalationEvent>,
}

impl Consumer {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<SequencerMessage>,
        mut stop: oneshot::Receiver<()>,
    ) -> DetectionEngine {
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    let mut drained = 0usize;
                    while let Ok(msg) = rx.try_recv() {
                        self.handle(msg);
                        drained += 1;
                    }
                    info!("Sequencer: shutdown requested, drained {drained} queued message(s)");
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => {
                        info!("Sequencer: all producers gone, stopping");
                        break;
                    }
                },
            }
        }
        self.engine
    }

    fn handle(&mut self, msg: SequencerMessage) {
        match msg {
            SequencerMessage::Sample(event) => {
                let outcome = self.engine.dispatch(event);
                if let Some(snapshot) = outcome.snapshot {
                    self.snapshot_tx.send_replace(Some(snapshot));
                }
                if let Some(stage) = outcome.cascade_stage {
                    self.publish_stage(stage);
                }
                if let Some(escalation) = outcome.escalation {
                    if self.escalation_tx.send(escalation).is_err() {
                        debug!("Sequencer: no escalation listener attached");
                    }
                }
            }
            SequencerMessage::Reset(target) => {
                self.engine.reset(target);
                if target != Some(DetectorKind::Cascade) {
                    self.snapshot_tx.send_replace(None);
                }
                self.publish_stage(self.engine.cascade_stage());
            }
            SequencerMessage::History(reply) => {
                let _ = reply.send(self.engine.history().snapshot());
            }
        }
    }

    fn publish_stage(&self, stage: CascadeStage) {
        self.stage_tx.send_if_modified(|current| {
            if *current != stage {
                *current = stage;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::DetectionState;

    const STILL: [f32; 3] = [0.05, 0.05, 0.05];

    fn ms(t: u64) -> u64 { t * 1_000_000 }

    #[tokio::test]
    async fn concurrent_producers_are_serialized_without_loss() {
        let (handle, _outputs, task) = spawn_sequencer(DetectorConfig::default(), 10_000);

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let h = handle.clone();
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        let ts = p * 1_000_000_000 + i;
                        h.submit(SensorKind::Gyroscope, &[p as f32, i as f32, 0.0], ts).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 2_000);

        // Per-producer submission order survives the merge.
        for p in 0..4u64 {
            let own: Vec<u64> = history
                .iter()
                .filter(|e| e.vector.x == p as f32)
                .map(|e| e.timestamp_ns)
                .collect();
            assert_eq!(own.len(), 500);
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }

        task.shutdown().await;
    }

    #[tokio::test]
    async fn non_finite_samples_are_rejected_and_counted() {
        let (handle, _outputs, task) = spawn_sequencer(DetectorConfig::default(), 16);

        let err = handle.submit(SensorKind::LinearAcceleration, &[f32::NAN, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, EngineError::NonFiniteSample { kind: SensorKind::LinearAcceleration, .. }));
        assert!(handle.submit(SensorKind::Gravity, &[0.0, f32::INFINITY, 0.0], 2).is_err());
        handle.submit(SensorKind::Gravity, &[0.0, 9.8, 0.0], 3).unwrap();

        assert_eq!(handle.rejected_count(), 2);
        assert_eq!(handle.history().await.unwrap().len(), 1);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn crash_produces_single_escalation_and_reset_clears_it() {
        let (handle, mut outputs, task) = spawn_sequencer(DetectorConfig::default(), 64);

        handle.submit(SensorKind::Gravity, &[0.0, 9.8, 0.0], ms(1_000)).unwrap();
        handle.submit(SensorKind::LinearAcceleration, &STILL, ms(1_020)).unwrap();
        handle.submit(SensorKind::LinearAcceleration, &[25.0, 0.0, 0.0], ms(1_040)).unwrap();
        let mut t = 1_040;
        while t < 1_040 + 33_000 {
            t += 20;
            handle.submit(SensorKind::LinearAcceleration, &STILL, ms(t)).unwrap();
        }

        let escalation = outputs.escalations.recv().await.unwrap();
        assert_eq!(escalation.source, DetectorKind::Primary);
        assert_eq!(escalation.timestamp_ns, ms(1_040 + 2_000 + 30_000));
        assert!(escalation.snapshot.map(|s| s.confirmed).unwrap_or(false));

        // Round-trip through the queue so every sample above has been handled.
        handle.history().await.unwrap();
        assert!(outputs.escalations.try_recv().is_err());
        let latest = outputs.snapshots.borrow().expect("snapshot published");
        assert_eq!(latest.state, DetectionState::ConfirmedAccident);

        handle.reset(None).unwrap();
        handle.history().await.unwrap();
        assert!(outputs.snapshots.borrow().is_none());

        let engine = task.shutdown().await.unwrap();
        assert_eq!(engine.primary_state(), DetectionState::Idle);
    }

    #[tokio::test]
    async fn cascade_stage_is_published() {
        let (handle, outputs, task) = spawn_sequencer(DetectorConfig::default(), 16);
        handle.submit(SensorKind::Accelerometer, &[0.0, 0.0, 2.0], ms(10)).unwrap();
        handle.history().await.unwrap();
        assert_eq!(*outputs.cascade_stage.borrow(), CascadeStage::FreeFallDetected);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events() {
        let (handle, _outputs, task) = spawn_sequencer(DetectorConfig::default(), 5_000);
        for i in 0..3_000u64 {
            handle.submit(SensorKind::Gyroscope, &[0.1, 0.0, 0.0], i + 1).unwrap();
        }
        let engine = task.shutdown().await.unwrap();
        assert_eq!(engine.history().len(), 3_000);

        assert!(matches!(
            handle.submit(SensorKind::Gyroscope, &[0.0, 0.0, 0.0], 9_999),
            Err(EngineError::SequencerClosed)
        ));
    }

    #[tokio::test]
    async fn dropping_all_handles_stops_consumer() {
        let (handle, _outputs, task) = spawn_sequencer(DetectorConfig::default(), 16);
        handle.submit(SensorKind::Gravity, &[0.0, 9.8, 0.0], 1).unwrap();
        drop(handle);
        let engine = task.finished().await.expect("consumer exits cleanly");
        assert_eq!(engine.history().len(), 1);
    }
}
