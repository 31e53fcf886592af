//! # sensor_bridge
//!
//! Receives `SensorEnvelope` JSON datagrams over UDP (from a phone companion
//! or `sentinel-sim`) and feeds their events to the sequencer in order.
//!
//! Bad input never stops the listener: malformed packets, replayed sequence
//! numbers and non-finite samples are logged and skipped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use sentinel_types::SensorEnvelope;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::sequencer::SequencerHandle;

// ── Sequence tracking ─────────────────────────────────────────────────────────

/// Last accepted sequence number per source. Duplicates and large backward
/// jumps are treated as replays.
///
/// Sources are unauthenticated, so the table is bounded: sources silent for
/// longer than `IDLE_TIMEOUT` are evicted when a new one arrives, and at
/// `MAX_SOURCES` the least recently heard source makes room.
#[derive(Debug, Default)]
pub struct SeqTracker {
    last_seq: HashMap<u32, (u32, Instant)>,
}

impl SeqTracker {
    /// Forward gaps up to this size are accepted (dropped datagrams);
    /// anything that wraps further than this is considered going backwards.
    const MAX_FORWARD_GAP: u32 = 1_000;
    pub const MAX_SOURCES: usize = 64;
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Self { Self::default() }

    pub fn accept(&mut self, source_id: u32, seq_num: u32) -> bool {
        self.accept_at(source_id, seq_num, Instant::now())
    }

    pub fn accept_at(&mut self, source_id: u32, seq_num: u32, now: Instant) -> bool {
        match self.last_seq.get(&source_id).copied() {
            None => {
                self.make_room(now);
                self.last_seq.insert(source_id, (seq_num, now));
                true
            }
            Some((last, _)) => {
                let diff = seq_num.wrapping_sub(last);
                if diff == 0 || diff > Self::MAX_FORWARD_GAP {
                    warn!("Bridge: rejected envelope from source {source_id}: seq {seq_num} (last: {last})");
                    return false;
                }
                self.last_seq.insert(source_id, (seq_num, now));
                true
            }
        }
    }

    /// Forget a source so its next envelope starts a fresh sequence.
    pub fn forget(&mut self, source_id: u32) {
        self.last_seq.remove(&source_id);
    }

    pub fn len(&self) -> usize { self.last_seq.len() }

    pub fn is_empty(&self) -> bool { self.last_seq.is_empty() }

    fn make_room(&mut self, now: Instant) {
        if self.last_seq.len() < Self::MAX_SOURCES {
            return;
        }
        let before = self.last_seq.len();
        self.last_seq
            .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < Self::IDLE_TIMEOUT);
        if self.last_seq.len() < Self::MAX_SOURCES {
            debug!("Bridge: evicted {} idle source(s)", before - self.last_seq.len());
            return;
        }
        let oldest = self.last_seq.iter().min_by_key(|(_, (_, seen))| *seen).map(|(id, _)| *id);
        if let Some(id) = oldest {
            debug!("Bridge: source table full, evicting source {id}");
            self.last_seq.remove(&id);
        }
    }
}

// ── Packet handling ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketOutcome {
    pub accepted: usize,
    pub rejected: usize,
}

/// Decode one datagram and submit its events. Returns `None` when the packet
/// was malformed or replayed, so nothing reached the sequencer.
pub fn process_packet(
    data: &[u8],
    src: SocketAddr,
    seq_tracker: &mut SeqTracker,
    sequencer: &SequencerHandle,
) -> Option<std::result::Result<PacketOutcome, EngineError>> {
    let env: SensorEnvelope = match serde_json::from_slice(data) {
        Ok(e) => e,
        Err(e) => {
            debug!("Bridge: malformed packet from {src}: {e}");
            return None;
        }
    };

    if !seq_tracker.accept(env.source_id, env.seq_num) {
        return None;
    }

    let mut outcome = PacketOutcome::default();
    for event in env.events {
        match sequencer.submit_event(event) {
            Ok(()) => outcome.accepted += 1,
            Err(EngineError::NonFiniteSample { .. }) => outcome.rejected += 1,
            Err(e) => return Some(Err(e)),
        }
    }
    debug!(
        "Bridge: source {} seq {} → {} event(s), {} rejected",
        env.source_id, env.seq_num, outcome.accepted, outcome.rejected
    );
    Some(Ok(outcome))
}

// ── Listener task ─────────────────────────────────────────────────────────────

/// Bind the UDP port and forward envelopes until the sequencer closes.
pub async fn start_sensor_bridge(udp_port: u16, sequencer: SequencerHandle) {
    let addr = format!("0.0.0.0:{udp_port}");
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!("📡 Sensor bridge listening on UDP {addr}");
            s
        }
        Err(e) => {
            warn!("Sensor bridge: could not bind UDP {addr}: {e} (UDP input disabled)");
            return;
        }
    };
    run_bridge(socket, sequencer).await;
}

/// Receive loop over an already-bound socket.
pub async fn run_bridge(socket: UdpSocket, sequencer: SequencerHandle) {
    let mut seq_tracker = SeqTracker::new();
    let mut buf = vec![0u8; 65_536];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                if let Some(Err(e)) = process_packet(&buf[..len], src, &mut seq_tracker, &sequencer) {
                    info!("Sensor bridge: stopping ({e})");
                    return;
                }
            }
            Err(e) => warn!("Sensor bridge: UDP recv error: {e}"),
        }
    }
}
