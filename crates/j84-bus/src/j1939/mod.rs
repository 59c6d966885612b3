//! SAE J1939 protocol layer
//!
//! Identifier handling, packets, SPN decoding and the diagnostic
//! messages (DM1, DM5, DM24) used by the compliance steps.

pub mod catalog;
pub mod dm1;
pub mod dm24;
pub mod dm5;
mod id;
mod packet;
pub mod slot;
pub mod tp;

pub use catalog::{PgnDefinition, SpnCatalog, SpnDefinition};
pub use id::J1939Id;
pub use packet::{Packet, PacketOrigin};
pub use slot::{RawClass, SpnValue};

/// Parameter group numbers used by the engine
pub mod pgn {
    /// Request (PGN 59904)
    pub const REQUEST: u32 = 0xEA00;
    /// Acknowledgment (PGN 59392)
    pub const ACKNOWLEDGMENT: u32 = 0xE800;
    /// Transport protocol connection management (PGN 60416)
    pub const TP_CM: u32 = 0xEC00;
    /// Transport protocol data transfer (PGN 60160)
    pub const TP_DT: u32 = 0xEB00;
    /// DM1 active diagnostic trouble codes (PGN 65226)
    pub const DM1: u32 = 0xFECA;
    /// DM2 previously active diagnostic trouble codes (PGN 65227)
    pub const DM2: u32 = 0xFECB;
    /// DM5 diagnostic readiness 1 (PGN 65230)
    pub const DM5: u32 = 0xFECE;
    /// DM24 SPN support (PGN 64950)
    pub const DM24: u32 = 0xFDB6;
    /// Address claimed (PGN 60928)
    pub const ADDRESS_CLAIM: u32 = 0xEE00;
}

/// Human-readable acronym for diagnostic PGNs, used in messages
pub fn pgn_acronym(pgn: u32) -> Option<&'static str> {
    match pgn {
        pgn::DM1 => Some("DM1"),
        pgn::DM2 => Some("DM2"),
        pgn::DM5 => Some("DM5"),
        pgn::DM24 => Some("DM24"),
        pgn::REQUEST => Some("Request"),
        pgn::ACKNOWLEDGMENT => Some("Acknowledgment"),
        _ => None,
    }
}

/// Render a PGN for messages: the DM acronym when known, `PG <n>` otherwise
pub fn pgn_display(pgn: u32) -> String {
    match pgn_acronym(pgn) {
        Some(acronym) => acronym.to_string(),
        None => format!("PG {}", pgn),
    }
}
