//! J1939-21 transport protocol reassembly
//!
//! Passive reassembly of BAM and RTS/CTS sessions observed on the bus.
//! Used by the replay transport; live adapters normally get reassembled
//! messages from the kernel.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use super::packet::Packet;
use super::pgn;
use crate::error::CodecError;

const CM_RTS: u8 = 0x10;
const CM_BAM: u8 = 0x20;
const CM_ABORT: u8 = 0xFF;

#[derive(Debug)]
struct Session {
    pgn: u32,
    size: usize,
    packets: u8,
    data: Vec<u8>,
    next_sequence: u8,
}

/// Reassembles multi-packet messages from TP.CM / TP.DT frames
#[derive(Debug, Default)]
pub struct Reassembler {
    sessions: HashMap<(u8, u8), Session>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame. Returns a complete packet when a session finishes.
    ///
    /// Frames that are not transport protocol frames are returned unchanged.
    pub fn accept(&mut self, frame: Packet) -> Result<Option<Packet>, CodecError> {
        match frame.pgn {
            pgn::TP_CM => {
                self.on_connection_management(&frame)?;
                Ok(None)
            }
            pgn::TP_DT => self.on_data_transfer(frame),
            _ => Ok(Some(frame)),
        }
    }

    fn on_connection_management(&mut self, frame: &Packet) -> Result<(), CodecError> {
        if frame.data.len() < 8 {
            return Err(CodecError::TransportProtocol(format!(
                "TP.CM from 0x{:02X} is {} bytes",
                frame.source,
                frame.data.len()
            )));
        }
        let key = (frame.source, frame.destination);
        match frame.data[0] {
            CM_BAM | CM_RTS => {
                let size = u16::from_le_bytes([frame.data[1], frame.data[2]]) as usize;
                let packets = frame.data[3];
                let pgn = u32::from_le_bytes([frame.data[5], frame.data[6], frame.data[7], 0]);
                if self.sessions.contains_key(&key) {
                    warn!(source = frame.source, "TP session restarted before completion");
                }
                debug!(source = frame.source, pgn, size, packets, "TP session opened");
                self.sessions.insert(
                    key,
                    Session {
                        pgn,
                        size,
                        packets,
                        data: Vec::with_capacity(packets as usize * 7),
                        next_sequence: 1,
                    },
                );
            }
            CM_ABORT => {
                self.sessions.remove(&key);
            }
            _ => {}
        }
        Ok(())
    }

    fn on_data_transfer(&mut self, frame: Packet) -> Result<Option<Packet>, CodecError> {
        let key = (frame.source, frame.destination);
        let Some(session) = self.sessions.get_mut(&key) else {
            debug!(source = frame.source, "TP.DT without open session dropped");
            return Ok(None);
        };

        let sequence = frame.data.first().copied().unwrap_or(0);
        let expected = session.next_sequence;
        if sequence != expected {
            self.sessions.remove(&key);
            return Err(CodecError::TransportProtocol(format!(
                "TP.DT from 0x{:02X} out of sequence: expected {}, got {}",
                frame.source, expected, sequence
            )));
        }
        session.data.extend_from_slice(frame.data.get(1..).unwrap_or(&[]));
        session.next_sequence = session.next_sequence.wrapping_add(1);

        if sequence < session.packets {
            return Ok(None);
        }

        let Some(mut session) = self.sessions.remove(&key) else {
            return Ok(None);
        };
        session.data.truncate(session.size);
        let packet = Packet {
            pgn: session.pgn,
            priority: frame.priority,
            source: frame.source,
            destination: frame.destination,
            data: session.data,
            timestamp: frame.timestamp,
            ordinal: frame.ordinal,
            origin: frame.origin,
        };
        Ok(Some(packet))
    }
}

/// Split a payload into BAM frames (TP.CM followed by TP.DT)
pub fn bam_frames(message: &Packet, spacing: Duration) -> Vec<Packet> {
    let packets = message.data.len().div_ceil(7) as u8;
    let size = (message.data.len() as u16).to_le_bytes();
    let pgn_bytes = message.pgn.to_le_bytes();
    let mut frames = vec![Packet {
        pgn: pgn::TP_CM,
        data: vec![
            CM_BAM,
            size[0],
            size[1],
            packets,
            0xFF,
            pgn_bytes[0],
            pgn_bytes[1],
            pgn_bytes[2],
        ],
        ..message.clone()
    }];
    for (i, chunk) in message.data.chunks(7).enumerate() {
        let mut data = vec![i as u8 + 1];
        data.extend_from_slice(chunk);
        data.resize(8, 0xFF);
        frames.push(Packet {
            pgn: pgn::TP_DT,
            data,
            timestamp: message.timestamp + spacing * (i as u32 + 1),
            ..message.clone()
        });
    }
    frames
}
