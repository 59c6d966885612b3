//! DM24 - SPN Support (PGN 64950)
//!
//! Each four-byte record carries a 19-bit SPN, three support bits
//! (zero means supported) and the SPN data length.

use j84_core::SupportedSpn;

use crate::error::CodecError;

/// Support bit: scaled test results (bit 1 of byte 3)
const SCALED_TEST_RESULTS: u8 = 0x01;
/// Support bit: data stream (bit 2 of byte 3)
const DATA_STREAM: u8 = 0x02;
/// Support bit: expanded freeze frame (bit 3 of byte 3)
const FREEZE_FRAME: u8 = 0x04;

/// Parse a DM24 payload into support records, in transmitted order.
///
/// All-ones padding records are skipped. Duplicates are preserved so
/// callers can detect them.
pub fn parse(data: &[u8]) -> Result<Vec<SupportedSpn>, CodecError> {
    if data.len() % 4 != 0 {
        return Err(CodecError::InvalidLength {
            message: "DM24",
            length: data.len(),
            reason: "not a multiple of 4".to_string(),
        });
    }

    let spns = data
        .chunks_exact(4)
        .filter(|chunk| **chunk != [0xFF, 0xFF, 0xFF, 0xFF])
        .map(|chunk| {
            let spn = ((chunk[2] as u32 & 0xE0) << 11) | ((chunk[1] as u32) << 8) | chunk[0] as u32;
            let support = chunk[2];
            SupportedSpn {
                spn,
                data_stream: support & DATA_STREAM == 0,
                freeze_frame: support & FREEZE_FRAME == 0,
                scaled_test_results: support & SCALED_TEST_RESULTS == 0,
                length: chunk[3],
            }
        })
        .collect();
    Ok(spns)
}

/// Encode support records; used by simulated modules
pub fn encode(spns: &[SupportedSpn]) -> Vec<u8> {
    let mut data = Vec::with_capacity(spns.len() * 4);
    for s in spns {
        let mut support = 0x18u8; // reserved bits 4-5 set
        if !s.scaled_test_results {
            support |= SCALED_TEST_RESULTS;
        }
        if !s.data_stream {
            support |= DATA_STREAM;
        }
        if !s.freeze_frame {
            support |= FREEZE_FRAME;
        }
        data.push((s.spn & 0xFF) as u8);
        data.push(((s.spn >> 8) & 0xFF) as u8);
        data.push((((s.spn >> 11) & 0xE0) as u8) | support);
        data.push(s.length);
    }
    data
}

/// SPNs listed more than once with differing support flags or lengths
pub fn conflicting_duplicates(spns: &[SupportedSpn]) -> Vec<u32> {
    let mut conflicts: Vec<u32> = spns
        .iter()
        .enumerate()
        .filter(|(i, a)| spns[..*i].iter().any(|b| b.spn == a.spn && *b != **a))
        .map(|(_, a)| a.spn)
        .collect();
    conflicts.sort_unstable();
    conflicts.dedup();
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_records() {
        // SPN 92: data stream + freeze frame supported, 1 byte
        // SPN 12675 (0x3183): data stream only, 4 bytes
        // SPN 524287: nothing supported
        let data = [
            0x5C, 0x00, 0x19, 0x01, //
            0x83, 0x31, 0x1D, 0x04, //
            0xFF, 0xFF, 0xFF, 0x02, //
        ];
        let spns = parse(&data).unwrap();
        assert_eq!(
            spns,
            vec![
                SupportedSpn::new(92, true, true, false, 1),
                SupportedSpn::new(12675, true, false, false, 4),
                SupportedSpn::new(524287, false, false, false, 2),
            ]
        );
    }

    #[test]
    fn test_parse_skips_padding() {
        let data = [0x5C, 0x00, 0x19, 0x01, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(parse(&data).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        let err = parse(&[0x5C, 0x00, 0x1B]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "DM24 payload length 3 is invalid: not a multiple of 4"
        );
    }

    #[test]
    fn test_encode_parse() {
        let spns = vec![
            SupportedSpn::new(190, true, false, true, 2),
            SupportedSpn::new(12730, true, false, false, 4),
            SupportedSpn::new(0x7FFFF, false, true, false, 1),
        ];
        assert_eq!(parse(&encode(&spns)).unwrap(), spns);
    }

    #[test]
    fn test_conflicting_duplicates() {
        let spns = vec![
            SupportedSpn::data_stream(92, 1),
            SupportedSpn::data_stream(110, 1),
            SupportedSpn::data_stream(92, 1),
            SupportedSpn::new(110, false, true, false, 1),
        ];
        assert_eq!(conflicting_duplicates(&spns), vec![110]);
    }
}
