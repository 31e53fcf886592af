//! # incident_log
//!
//! Append-only, SHA-256 chained record of escalations and resets.
//!
//! Each line of the file is one JSON block whose hash covers the previous
//! block's hash, so editing or dropping any earlier line breaks the chain.
//! Raw sensor samples are never written here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_types::{DetectorKind, EscalationEvent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    /// A detector's confirmed flag went false → true
    Escalation,
    /// User acknowledged/dismissed; detector(s) reset
    Reset,
    /// Host process started a new session
    SessionStart,
}

impl IncidentKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Escalation => "ESCALATION",
            Self::Reset => "RESET",
            Self::SessionStart => "SESSION_START",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentBlock {
    pub block_seq: u64,
    pub incident_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Hex SHA-256 of the previous block; genesis is 64 zeros
    pub prev_hash: String,
    pub kind: IncidentKind,
    pub payload_json: String,
    /// SHA-256 of (prev_hash ‖ recorded_at ms ‖ kind ‖ payload_json)
    pub block_hash: String,
}

impl IncidentBlock {
    fn compute_hash(prev_hash: &str, recorded_at: &DateTime<Utc>, kind: IncidentKind, payload_json: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(recorded_at.timestamp_millis().to_le_bytes());
        hasher.update(kind.as_str().as_bytes());
        hasher.update(payload_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn new(block_seq: u64, prev_hash: String, kind: IncidentKind, payload_json: String) -> Self {
        let recorded_at = Utc::now();
        let block_hash = Self::compute_hash(&prev_hash, &recorded_at, kind, &payload_json);
        Self {
            block_seq,
            incident_id: Uuid::new_v4(),
            recorded_at,
            prev_hash,
            kind,
            payload_json,
            block_hash,
        }
    }

    pub fn verify(&self) -> bool {
        Self::compute_hash(&self.prev_hash, &self.recorded_at, self.kind, &self.payload_json) == self.block_hash
    }
}

/// True when every block hashes correctly and links to its predecessor.
pub fn verify_chain(blocks: &[IncidentBlock]) -> bool {
    let mut expected_prev = GENESIS_HASH;
    for (i, block) in blocks.iter().enumerate() {
        if block.block_seq != i as u64 || block.prev_hash != expected_prev || !block.verify() {
            return false;
        }
        expected_prev = &block.block_hash;
    }
    true
}

pub async fn read_blocks(path: impl AsRef<Path>) -> Result<Vec<IncidentBlock>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let mut blocks = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        blocks.push(serde_json::from_str(line)?);
    }
    Ok(blocks)
}

// ── Logger ────────────────────────────────────────────────────────────────────

struct ChainState {
    block_seq: u64,
    last_hash: String,
}

#[derive(Clone)]
pub struct IncidentLog {
    path: PathBuf,
    state: Arc<Mutex<ChainState>>,
}

impl IncidentLog {
    /// Open (or create on first append) the log at `path`, continuing an
    /// existing chain if the file already has blocks.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match read_blocks(&path).await {
            Ok(blocks) => match blocks.last() {
                Some(last) => {
                    info!("Incident log: resuming {} at block {}", path.display(), last.block_seq + 1);
                    ChainState { block_seq: last.block_seq + 1, last_hash: last.block_hash.clone() }
                }
                None => ChainState { block_seq: 0, last_hash: GENESIS_HASH.to_string() },
            },
            Err(crate::error::EngineError::IncidentLog(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                ChainState { block_seq: 0, last_hash: GENESIS_HASH.to_string() }
            }
            Err(e) => return Err(e),
        };
        Ok(Self { path, state: Arc::new(Mutex::new(state)) })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// The single write path. Holds the chain lock across the file append so
    /// blocks land in hash order.
    pub async fn append(&self, kind: IncidentKind, payload: serde_json::Value) -> Result<IncidentBlock> {
        let mut state = self.state.lock().await;
        let block = IncidentBlock::new(state.block_seq, state.last_hash.clone(), kind, payload.to_string());
        debug_assert!(block.verify());

        let line = format!("{}\n", serde_json::to_string(&block)?);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        state.last_hash = block.block_hash.clone();
        state.block_seq += 1;
        debug!("Incident[{}]: {} {}", block.block_seq, kind.as_str(), block.block_hash);
        Ok(block)
    }

    pub async fn log_escalation(&self, event: &EscalationEvent) -> Result<IncidentBlock> {
        self.append(IncidentKind::Escalation, serde_json::to_value(event)?).await
    }

    pub async fn log_reset(&self, target: Option<DetectorKind>) -> Result<IncidentBlock> {
        self.append(IncidentKind::Reset, serde_json::json!({ "target": target })).await
    }

    pub async fn log_session_start(&self) -> Result<IncidentBlock> {
        self.append(
            IncidentKind::SessionStart,
            serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
        )
        .await
    }
}

// ── Escalation consumer ───────────────────────────────────────────────────────

/// Drain escalations until the sequencer closes its sender, appending each to
/// `log` when one is configured. A failed write is logged and skipped.
pub async fn record_escalations(mut rx: mpsc::UnboundedReceiver<EscalationEvent>, log: Option<IncidentLog>) -> usize {
    let mut recorded = 0;
    while let Some(event) = rx.recv().await {
        warn!(
            "🚨 Escalation from {:?} detector at t={}ms",
            event.source,
            event.timestamp_ns / 1_000_000
        );
        let Some(log) = &log else { continue };
        match log.log_escalation(&event).await {
            Ok(block) => {
                recorded += 1;
                info!("Incident {} recorded (block {})", block.incident_id, block.block_seq);
            }
            Err(e) => warn!("Incident log write failed: {e}"),
        }
    }
    debug!("Escalation consumer: channel closed after {recorded} record(s)");
    recorded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("sentinel-incidents-{}.jsonl", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn chain_links_and_verifies() {
        let path = temp_path();
        let log = IncidentLog::open(&path).await.unwrap();
        log.log_session_start().await.unwrap();
        log.log_escalation(&EscalationEvent {
            source: DetectorKind::Cascade,
            timestamp_ns: 42,
            snapshot: None,
        })
        .await
        .unwrap();
        log.log_reset(Some(DetectorKind::Cascade)).await.unwrap();

        let blocks = read_blocks(&path).await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].prev_hash, GENESIS_HASH);
        assert_eq!(blocks[1].prev_hash, blocks[0].block_hash);
        assert_eq!(blocks[1].kind, IncidentKind::Escalation);
        assert!(verify_chain(&blocks));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn tampering_breaks_the_chain() {
        let path = temp_path();
        let log = IncidentLog::open(&path).await.unwrap();
        log.log_reset(None).await.unwrap();
        log.log_reset(Some(DetectorKind::Primary)).await.unwrap();

        let mut blocks = read_blocks(&path).await.unwrap();
        blocks[0].payload_json = r#"{"target":"cascade"}"#.to_string();
        assert!(!verify_chain(&blocks));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn reopening_resumes_the_chain() {
        let path = temp_path();
        {
            let log = IncidentLog::open(&path).await.unwrap();
            log.log_session_start().await.unwrap();
        }
        let log = IncidentLog::open(&path).await.unwrap();
        let block = log.log_session_start().await.unwrap();
        assert_eq!(block.block_seq, 1);

        let blocks = read_blocks(&path).await.unwrap();
        assert!(verify_chain(&blocks));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn escalations_are_recorded_until_channel_closes() {
        let path = temp_path();
        let log = IncidentLog::open(&path).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        for ts in [1, 2] {
            tx.send(EscalationEvent { source: DetectorKind::Primary, timestamp_ns: ts, snapshot: None }).unwrap();
        }
        drop(tx);

        assert_eq!(record_escalations(rx, Some(log)).await, 2);
        let blocks = read_blocks(&path).await.unwrap();
        assert!(blocks.iter().all(|b| b.kind == IncidentKind::Escalation));
        assert!(verify_chain(&blocks));

        let _ = std::fs::remove_file(&path);
    }
}
