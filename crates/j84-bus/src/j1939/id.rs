//! 29-bit J1939 CAN identifier

use j84_core::GLOBAL_ADDRESS;

/// Decoded J1939 identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct J1939Id {
    pub priority: u8,
    /// Parameter group number (PS cleared for PDU1 formats)
    pub pgn: u32,
    pub source: u8,
    /// Destination address; global for PDU2 formats
    pub destination: u8,
}

impl J1939Id {
    pub fn from_raw(raw: u32) -> Self {
        let raw = raw & 0x1FFF_FFFF;
        let priority = ((raw >> 26) & 0x07) as u8;
        let edp_dp = (raw >> 24) & 0x03;
        let pf = (raw >> 16) & 0xFF;
        let ps = (raw >> 8) & 0xFF;
        let source = (raw & 0xFF) as u8;

        let (pgn, destination) = if pf < 240 {
            ((edp_dp << 16) | (pf << 8), ps as u8)
        } else {
            ((edp_dp << 16) | (pf << 8) | ps, GLOBAL_ADDRESS)
        };

        Self {
            priority,
            pgn,
            source,
            destination,
        }
    }

    pub fn to_raw(&self) -> u32 {
        let pf = (self.pgn >> 8) & 0xFF;
        let ps = if self.is_pdu1() {
            self.destination as u32
        } else {
            self.pgn & 0xFF
        };
        ((self.priority as u32 & 0x07) << 26)
            | (((self.pgn >> 16) & 0x03) << 24)
            | (pf << 16)
            | (ps << 8)
            | self.source as u32
    }

    /// PDU1 (destination specific) format
    pub fn is_pdu1(&self) -> bool {
        ((self.pgn >> 8) & 0xFF) < 240
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu2_broadcast_id() {
        // EEC1 from engine: 0x0CF00400
        let id = J1939Id::from_raw(0x0CF0_0400);
        assert_eq!(id.priority, 3);
        assert_eq!(id.pgn, 61444);
        assert_eq!(id.source, 0x00);
        assert_eq!(id.destination, GLOBAL_ADDRESS);
        assert!(!id.is_pdu1());
        assert_eq!(id.to_raw(), 0x0CF0_0400);
    }

    #[test]
    fn test_pdu1_request_id() {
        // Request from tool (0xF9) to engine (0x00)
        let id = J1939Id::from_raw(0x18EA_00F9);
        assert_eq!(id.priority, 6);
        assert_eq!(id.pgn, 0xEA00);
        assert_eq!(id.destination, 0x00);
        assert_eq!(id.source, 0xF9);
        assert!(id.is_pdu1());
        assert_eq!(id.to_raw(), 0x18EA_00F9);
    }

    #[test]
    fn test_dm24_id() {
        let id = J1939Id::from_raw(0x18FD_B600);
        assert_eq!(id.pgn, 64950);
        assert_eq!(id.source, 0);
    }
}
