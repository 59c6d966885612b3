//! SPN value extraction and J1939-71 range classification

/// Classification of a raw SPN value by its bit pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawClass {
    /// Inside the valid range (up to 0xFA, 0xFAFF, 0xFAFFFFFF, ...)
    Valid,
    /// Reserved band between the valid range and the error indicator
    Reserved,
    /// Error indicator band (0xFE, 0xFExx, 0xFExxxxxx)
    Error,
    /// All ones
    NotAvailable,
}

/// Decoded SPN value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpnValue {
    Valid { raw: u64, value: f64 },
    Reserved { raw: u64 },
    Error { raw: u64 },
    NotAvailable,
}

impl SpnValue {
    pub fn is_not_available(&self) -> bool {
        matches!(self, SpnValue::NotAvailable)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            SpnValue::Valid { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<u64> {
        match self {
            SpnValue::Valid { raw, .. } | SpnValue::Reserved { raw } | SpnValue::Error { raw } => {
                Some(*raw)
            }
            SpnValue::NotAvailable => None,
        }
    }
}

fn all_ones(bit_length: u8) -> u64 {
    if bit_length >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_length) - 1
    }
}

/// Classify a raw value of `bit_length` bits
pub fn classify(raw: u64, bit_length: u8) -> RawClass {
    let ones = all_ones(bit_length);
    if raw == ones {
        return RawClass::NotAvailable;
    }
    if bit_length < 8 {
        // Bit fields: all ones is not available, all ones minus one is error
        return if raw == ones - 1 {
            RawClass::Error
        } else {
            RawClass::Valid
        };
    }

    let high_byte = (raw >> (bit_length - 8)) & 0xFF;
    match high_byte {
        0x00..=0xFA => RawClass::Valid,
        0xFE => RawClass::Error,
        _ => RawClass::Reserved,
    }
}

/// Read `bit_length` bits little endian starting at `start_byte`/`start_bit`.
///
/// Returns `None` when the payload is too short.
pub fn extract_raw(data: &[u8], start_byte: usize, start_bit: u8, bit_length: u8) -> Option<u64> {
    if bit_length == 0 || bit_length > 64 {
        return None;
    }
    let first_bit = start_byte * 8 + start_bit as usize;
    let last_bit = first_bit + bit_length as usize;
    let end_byte = last_bit.div_ceil(8);
    let bytes = data.get(start_byte..end_byte)?;

    let mut acc: u128 = 0;
    for (i, b) in bytes.iter().enumerate() {
        acc |= (*b as u128) << (8 * i);
    }
    let value = (acc >> start_bit) as u64;
    Some(value & all_ones(bit_length))
}

/// Extract and scale one SPN
pub fn decode(
    data: &[u8],
    start_byte: usize,
    start_bit: u8,
    bit_length: u8,
    scale: f64,
    offset: f64,
) -> Option<SpnValue> {
    let raw = extract_raw(data, start_byte, start_bit, bit_length)?;
    let value = match classify(raw, bit_length) {
        RawClass::Valid => SpnValue::Valid {
            raw,
            value: raw as f64 * scale + offset,
        },
        RawClass::Reserved => SpnValue::Reserved { raw },
        RawClass::Error => SpnValue::Error { raw },
        RawClass::NotAvailable => SpnValue::NotAvailable,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, 8, RawClass::Valid)]
    #[case(0xFA, 8, RawClass::Valid)]
    #[case(0xFB, 8, RawClass::Reserved)]
    #[case(0xFE, 8, RawClass::Error)]
    #[case(0xFF, 8, RawClass::NotAvailable)]
    #[case(0xFAFF, 16, RawClass::Valid)]
    #[case(0xFE12, 16, RawClass::Error)]
    #[case(0xFFFF, 16, RawClass::NotAvailable)]
    #[case(0xFF00, 16, RawClass::Reserved)]
    #[case(0xFAFF_FFFF, 32, RawClass::Valid)]
    #[case(0xFB00_0000, 32, RawClass::Reserved)]
    #[case(0xFFFF_FFFF, 32, RawClass::NotAvailable)]
    #[case(0b01, 2, RawClass::Valid)]
    #[case(0b10, 2, RawClass::Error)]
    #[case(0b11, 2, RawClass::NotAvailable)]
    fn test_classify(#[case] raw: u64, #[case] bits: u8, #[case] expected: RawClass) {
        assert_eq!(classify(raw, bits), expected);
    }

    #[test]
    fn test_extract_engine_speed() {
        // EEC1 bytes 4-5 = 0x1A40 -> 6720 * 0.125 = 840 rpm
        let data = [0xF0, 0x7D, 0x7D, 0x40, 0x1A, 0x00, 0xF0, 0x7D];
        let value = decode(&data, 3, 0, 16, 0.125, 0.0).unwrap();
        assert_eq!(value.value(), Some(840.0));
    }

    #[test]
    fn test_extract_bit_field() {
        // Bits 2..4 of byte 0
        let data = [0b0000_1100];
        assert_eq!(extract_raw(&data, 0, 2, 2), Some(0b11));
        let value = decode(&data, 0, 2, 2, 1.0, 0.0).unwrap();
        assert!(value.is_not_available());
    }

    #[test]
    fn test_not_available_distinct_from_zero() {
        let zero = decode(&[0x00, 0x00], 0, 0, 16, 1.0, 0.0).unwrap();
        let na = decode(&[0xFF, 0xFF], 0, 0, 16, 1.0, 0.0).unwrap();
        assert_eq!(zero.value(), Some(0.0));
        assert!(na.is_not_available());
        assert_eq!(na.value(), None);
    }

    #[test]
    fn test_short_payload() {
        assert_eq!(extract_raw(&[0x01], 0, 0, 16), None);
    }
}
