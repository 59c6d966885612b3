//! J1939 packet as seen by the compliance engine

use std::fmt;
use std::time::Duration;

use j84_core::GLOBAL_ADDRESS;
use serde::{Deserialize, Serialize};

/// How a packet was obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PacketOrigin {
    /// Unsolicited periodic transmission
    #[default]
    Broadcast,
    /// Reply to a destination-specific request
    DirectRequest,
    /// Reply to a global request
    GlobalRequest,
}

impl PacketOrigin {
    pub fn is_request(&self) -> bool {
        !matches!(self, PacketOrigin::Broadcast)
    }
}

/// A (reassembled) J1939 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    pub data: Vec<u8>,
    /// Bus time the packet was received, relative to the start of the session
    pub timestamp: Duration,
    /// Monotonic receive counter assigned by the transport
    pub ordinal: u64,
    pub origin: PacketOrigin,
}

impl Packet {
    pub fn new(pgn: u32, source: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            pgn,
            priority: 6,
            source,
            destination: GLOBAL_ADDRESS,
            data: data.into(),
            timestamp: Duration::ZERO,
            ordinal: 0,
            origin: PacketOrigin::Broadcast,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_ordinal(mut self, ordinal: u64) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn with_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_origin(mut self, origin: PacketOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Little-endian u32 starting at `index`
    pub fn get_u32(&self, index: usize) -> Option<u32> {
        let bytes = self.data.get(index..index + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10.4} {:06X} {:02X} -> {:02X} [{}] {}",
            self.timestamp.as_secs_f64(),
            self.pgn,
            self.source,
            self.destination,
            self.data.len(),
            hex::encode_upper(&self.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_u32() {
        let packet = Packet::new(65248, 0, vec![0x01, 0x02, 0x03, 0x04, 0xFF]);
        assert_eq!(packet.get_u32(0), Some(0x0403_0201));
        assert_eq!(packet.get_u32(2), None);
    }

    #[test]
    fn test_display() {
        let packet = Packet::new(0xFECA, 0, vec![0x00, 0xFF])
            .with_timestamp(Duration::from_millis(1500));
        assert_eq!(packet.to_string(), "    1.5000 00FECA 00 -> FF [2] 00FF");
    }
}
