//! Base-128 varint decoding

use crate::common::VarintError;

/// Longest encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Decode one unsigned varint from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
#[inline]
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;

    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 {
            // Only the lowest bit of the 10th group fits in a u64
            if byte > 1 {
                return Err(VarintError::Overflow);
            }
            return Ok((value | (u64::from(byte) << 63), MAX_VARINT_LEN));
        }

        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return Ok((value, i + 1));
        }
    }

    Err(VarintError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        prost::encoding::encode_varint(value, &mut buf);
        buf
    }

    #[test]
    fn test_single_byte() {
        assert_eq!(decode_varint(&[0x00]), Ok((0, 1)));
        assert_eq!(decode_varint(&[0x7f, 0xff]), Ok((127, 1)));
    }

    #[test]
    fn test_multi_byte() {
        assert_eq!(decode_varint(&[0xac, 0x02]), Ok((300, 2)));
        assert_eq!(decode_varint(&[0x80, 0x80, 0x01]), Ok((1 << 14, 3)));
    }

    #[test]
    fn test_round_trip() {
        let values = [
            0u64,
            1,
            127,
            128,
            16_383,
            16_384,
            u32::MAX as u64,
            (1 << 56) - 1,
            1 << 56,
            (1 << 63) - 1,
            1 << 63,
            u64::MAX,
        ];

        for value in values {
            let buf = encode(value);
            assert_eq!(decode_varint(&buf), Ok((value, buf.len())), "value {}", value);
        }

        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        for _ in 0..1000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let buf = encode(state);
            assert_eq!(decode_varint(&buf), Ok((state, buf.len())));
        }
    }

    #[test]
    fn test_truncated() {
        assert_eq!(decode_varint(&[]), Err(VarintError::Truncated));
        assert_eq!(decode_varint(&[0x80]), Err(VarintError::Truncated));
        assert_eq!(decode_varint(&[0xff, 0xff, 0xff]), Err(VarintError::Truncated));

        let full = encode(u64::MAX);
        assert_eq!(
            decode_varint(&full[..full.len() - 1]),
            Err(VarintError::Truncated)
        );
    }

    #[test]
    fn test_overflow() {
        let mut buf = vec![0xff; 9];
        buf.push(0x02);
        assert_eq!(decode_varint(&buf), Err(VarintError::Overflow));

        let mut buf = vec![0xff; 10];
        buf.push(0x01);
        assert_eq!(decode_varint(&buf), Err(VarintError::Overflow));
    }
}
