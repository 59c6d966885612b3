//! DM5 - Diagnostic Readiness 1 (PGN 65230)

use serde::Serialize;

use crate::error::CodecError;

/// OBD compliance value for "not intended to meet OBD requirements"
pub const OBD_NOT_INTENDED: u8 = 0x05;

/// Decoded DM5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticReadiness {
    pub active_count: u8,
    pub previously_active_count: u8,
    /// SPN 1220 OBD compliance
    pub obd_compliance: u8,
}

impl DiagnosticReadiness {
    /// Whether the compliance byte claims any OBD standard
    pub fn is_obd(&self) -> bool {
        !matches!(self.obd_compliance, OBD_NOT_INTENDED | 0xFB..=0xFF | 0x00)
    }
}

pub fn parse(data: &[u8]) -> Result<DiagnosticReadiness, CodecError> {
    if data.len() < 8 {
        return Err(CodecError::InvalidLength {
            message: "DM5",
            length: data.len(),
            reason: "expected 8 bytes".to_string(),
        });
    }
    Ok(DiagnosticReadiness {
        active_count: data[0],
        previously_active_count: data[1],
        obd_compliance: data[2],
    })
}

/// Encode a DM5 with no monitor information; used by simulated modules
pub fn encode(obd_compliance: u8) -> Vec<u8> {
    vec![0x00, 0x00, obd_compliance, 0x00, 0x00, 0x00, 0x00, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hd_obd() {
        let dm5 = parse(&[0x00, 0x01, 0x13, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(dm5.previously_active_count, 1);
        assert_eq!(dm5.obd_compliance, 0x13);
        assert!(dm5.is_obd());
    }

    #[test]
    fn test_non_obd_values() {
        for value in [OBD_NOT_INTENDED, 0xFB, 0xFF, 0x00] {
            let dm5 = parse(&encode(value)).unwrap();
            assert!(!dm5.is_obd(), "0x{:02X} should not be OBD", value);
        }
    }

    #[test]
    fn test_parse_short() {
        assert!(parse(&[0x00; 7]).is_err());
    }
}
