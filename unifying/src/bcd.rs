//! Packed binary-coded decimal as used in firmware version fields.

use crate::nibble;

/// Decodes one packed BCD byte (two decimal digits).
///
/// Returns [`None`] if either half is not a decimal digit.
pub fn decode_u8(packed: u8) -> Option<u8> {
    let (tens, ones) = nibble::split(packed);
    let (tens, ones) = (tens.to_lo(), ones.to_lo());

    (tens <= 9 && ones <= 9).then_some(tens * 10 + ones)
}

/// Decodes a big-endian packed BCD word (four decimal digits).
pub fn decode_u16(packed: u16) -> Option<u16> {
    let [hi, lo] = packed.to_be_bytes();

    Some(decode_u8(hi)? as u16 * 100 + decode_u8(lo)? as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_digits() {
        assert_eq!(decode_u8(0x12), Some(12));
        assert_eq!(decode_u16(0x0015), Some(15));
        assert_eq!(decode_u16(0x1234), Some(1234));
    }

    #[test]
    fn rejects_hex_digits() {
        assert_eq!(decode_u8(0x1a), None);
        assert_eq!(decode_u16(0xb015), None);
    }
}
