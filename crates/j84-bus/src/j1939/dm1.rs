//! DM1 - Active Diagnostic Trouble Codes (PGN 65226)
//!
//! Two lamp bytes followed by four-byte DTC records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Combined lamp status and flash bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LampStatus {
    /// Status 0b00, flash 0b11
    Off,
    /// Status 0b00, flash 0b00: accepted by some steps as off
    AlternateOff,
    /// Status 0b01, flash 0b11
    On,
    SlowFlash,
    FastFlash,
    /// Status 0b10
    Error,
    /// Status 0b11
    NotSupported,
    /// Any other combination
    Other,
}

impl LampStatus {
    pub fn from_bits(status: u8, flash: u8) -> Self {
        match (status & 0x03, flash & 0x03) {
            (0b00, 0b11) => LampStatus::Off,
            (0b00, 0b00) => LampStatus::AlternateOff,
            (0b01, 0b11) => LampStatus::On,
            (0b01, 0b00) => LampStatus::SlowFlash,
            (0b01, 0b01) => LampStatus::FastFlash,
            (0b10, _) => LampStatus::Error,
            (0b11, _) => LampStatus::NotSupported,
            _ => LampStatus::Other,
        }
    }

    /// (status, flash) bit pairs for encoding
    pub fn to_bits(&self) -> (u8, u8) {
        match self {
            LampStatus::Off => (0b00, 0b11),
            LampStatus::AlternateOff => (0b00, 0b00),
            LampStatus::On => (0b01, 0b11),
            LampStatus::SlowFlash => (0b01, 0b00),
            LampStatus::FastFlash => (0b01, 0b01),
            LampStatus::Error => (0b10, 0b11),
            LampStatus::NotSupported => (0b11, 0b11),
            LampStatus::Other => (0b00, 0b01),
        }
    }
}

impl fmt::Display for LampStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LampStatus::Off => "off",
            LampStatus::AlternateOff => "alternate off",
            LampStatus::On => "on",
            LampStatus::SlowFlash => "slow flash",
            LampStatus::FastFlash => "fast flash",
            LampStatus::Error => "error",
            LampStatus::NotSupported => "not supported",
            LampStatus::Other => "other",
        };
        f.write_str(s)
    }
}

/// One diagnostic trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dtc {
    pub spn: u32,
    pub fmi: u8,
    /// SPN conversion method (SPN 1706); 1 means the legacy method
    pub conversion_method: bool,
    pub occurrence_count: u8,
}

impl Dtc {
    pub fn new(spn: u32, fmi: u8, occurrence_count: u8) -> Self {
        Self {
            spn,
            fmi,
            conversion_method: false,
            occurrence_count,
        }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            spn: ((bytes[2] as u32 & 0xE0) << 11) | ((bytes[1] as u32) << 8) | bytes[0] as u32,
            fmi: bytes[2] & 0x1F,
            conversion_method: bytes[3] & 0x80 != 0,
            occurrence_count: bytes[3] & 0x7F,
        }
    }

    fn to_bytes(self) -> [u8; 4] {
        [
            (self.spn & 0xFF) as u8,
            ((self.spn >> 8) & 0xFF) as u8,
            (((self.spn >> 11) & 0xE0) as u8) | (self.fmi & 0x1F),
            (if self.conversion_method { 0x80 } else { 0x00 }) | (self.occurrence_count & 0x7F),
        ]
    }
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SPN {} FMI {}", self.spn, self.fmi)
    }
}

/// Decoded DM1 (also fits DM2, DM6, DM12)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticTroubleCodes {
    pub mil: LampStatus,
    pub red_stop_lamp: LampStatus,
    pub amber_warning_lamp: LampStatus,
    pub protect_lamp: LampStatus,
    pub dtcs: Vec<Dtc>,
    /// Conversion method bit of the first record, even when it encodes
    /// "no DTC"
    pub conversion_method: bool,
}

impl DiagnosticTroubleCodes {
    pub fn has_active_dtcs(&self) -> bool {
        !self.dtcs.is_empty()
    }
}

/// Parse a DM1-style payload. Trailing bytes that do not form a full
/// record are padding.
pub fn parse(data: &[u8]) -> Result<DiagnosticTroubleCodes, CodecError> {
    if data.len() < 6 {
        return Err(CodecError::InvalidLength {
            message: "DM1",
            length: data.len(),
            reason: "shorter than lamp status plus one DTC".to_string(),
        });
    }

    let lamps = data[0];
    let flash = data[1];
    let records = &data[2..];

    let conversion_method = records[3] & 0x80 != 0;
    let dtcs = records
        .chunks_exact(4)
        .filter(|c| c[0..3] != [0x00, 0x00, 0x00] && **c != [0xFF, 0xFF, 0xFF, 0xFF])
        .map(Dtc::from_bytes)
        .collect();

    Ok(DiagnosticTroubleCodes {
        mil: LampStatus::from_bits(lamps >> 6, flash >> 6),
        red_stop_lamp: LampStatus::from_bits(lamps >> 4, flash >> 4),
        amber_warning_lamp: LampStatus::from_bits(lamps >> 2, flash >> 2),
        protect_lamp: LampStatus::from_bits(lamps, flash),
        dtcs,
        conversion_method,
    })
}

/// Encode a DM1 payload with all other lamps off; used by simulated modules
pub fn encode(mil: LampStatus, dtcs: &[Dtc], conversion_method: bool) -> Vec<u8> {
    let (mil_status, mil_flash) = mil.to_bits();
    let (off_status, off_flash) = LampStatus::Off.to_bits();
    let lamps = (mil_status << 6) | (off_status << 4) | (off_status << 2) | off_status;
    let flash = (mil_flash << 6) | (off_flash << 4) | (off_flash << 2) | off_flash;

    let mut data = vec![lamps, flash];
    if dtcs.is_empty() {
        data.extend_from_slice(&[0x00, 0x00, 0x00, if conversion_method { 0x80 } else { 0x00 }]);
    } else {
        for dtc in dtcs {
            data.extend_from_slice(&dtc.to_bytes());
        }
    }
    while data.len() < 8 {
        data.push(0xFF);
    }
    data
}
