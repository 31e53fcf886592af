//! udp_tx.rs — UDP transmitter for sensor envelopes
//!
//! One envelope per tick, sent to the engine's sensor bridge. Sequence numbers
//! increase per envelope so the bridge can drop replays. Send errors are
//! logged and never stop the simulator.

use std::net::UdpSocket;

use sentinel_types::{SensorEnvelope, SensorEvent};
use tracing::{debug, warn};

pub struct UdpTransmitter {
    socket: UdpSocket,
    engine_addr: String,
    source_id: u32,
    next_seq: u32,
}

impl UdpTransmitter {
    pub fn new(engine_addr: &str, source_id: u32) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self {
            socket,
            engine_addr: engine_addr.to_string(),
            source_id,
            next_seq: 1,
        })
    }

    /// Wrap one tick's events in an envelope and send it.
    pub fn send_frame(&mut self, events: &[SensorEvent]) {
        let envelope = SensorEnvelope {
            source_id: self.source_id,
            seq_num: self.next_seq,
            events: events.to_vec(),
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        let bytes = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => { warn!("UDP: serialize failed: {e}"); return; }
        };

        if let Err(e) = self.socket.send_to(&bytes, &self.engine_addr) {
            warn!("UDP: send to {} failed: {e}", self.engine_addr);
        } else {
            debug!("UDP → {} seq={} events={}", self.engine_addr, envelope.seq_num, envelope.events.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::{SensorKind, Vec3};

    #[test]
    fn envelopes_carry_increasing_sequence_numbers() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = rx.local_addr().unwrap().to_string();
        let mut tx = UdpTransmitter::new(&addr, 9).unwrap();

        let ev = SensorEvent::new(SensorKind::Gravity, Vec3::new(0.0, 9.81, 0.0), 5);
        tx.send_frame(&[ev]);
        tx.send_frame(&[ev, ev]);

        let mut buf = [0u8; 4096];
        let mut seqs = Vec::new();
        for _ in 0..2 {
            let (len, _) = rx.recv_from(&mut buf).unwrap();
            let env: SensorEnvelope = serde_json::from_slice(&buf[..len]).unwrap();
            assert_eq!(env.source_id, 9);
            seqs.push((env.seq_num, env.events.len()));
        }
        assert_eq!(seqs, vec![(1, 1), (2, 2)]);
    }
}
