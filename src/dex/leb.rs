use crate::dex::error::{DexError, DexErrorKind};

/// DEX uleb128 values are 32-bit, so valid encodings are at most 5 bytes.
const MAX_ULEB128_LEN: usize = 5;

/// Emits `value` as uleb128, low groups first. Only the test fixtures write DEX data.
#[cfg(test)]
pub(crate) fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut out = vec![];
    let mut rest = value;
    loop {
        let group = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(group);
            return out;
        }
        out.push(group | 0x80);
    }
}

/// Decodes a uleb128 from the start of `encoded`, returning the value and the
/// number of bytes consumed.
///
/// Bits of a 5th byte beyond the 32-bit range are dropped, as the runtime does.
pub fn decode_uleb128(encoded: &[u8]) -> Result<(u32, usize), DexError> {
    let mut value: u32 = 0;

    for (count, &byte) in encoded.iter().take(MAX_ULEB128_LEN).enumerate() {
        let low = (byte & 0x7F) as u32;
        value |= low.wrapping_shl(7 * count as u32);

        if byte & 0x80 == 0 {
            return Ok((value, count + 1));
        }
    }

    // Either the span ran out or the 5th byte still asked for more
    Err(DexError::new(DexErrorKind::MalformedVarint { offset: 0 }))
}

/// Cursor flavour of [`decode_uleb128`], reporting failures at the absolute offset.
pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError> {
    let start = *ix;
    let tail = match bytes.get(start..) {
        Some(tail) if !tail.is_empty() => tail,
        _ => return Err(DexError::truncated(start, 1, bytes.len())),
    };
    match decode_uleb128(tail) {
        Ok((val, size)) => {
            *ix += size;
            Ok(val)
        }
        Err(_) => Err(DexError::new(DexErrorKind::MalformedVarint { offset: start })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
            (u32::MAX, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x01], 1, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x01], 128, 2),
            (vec![0x80, 0x7F], 16256, 2),
            (vec![0xE5, 0x8E, 0x26], 624485, 3),
            (vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX, 5),
        ];

        for (encoded, expected, used) in cases {
            assert_eq!(decode_uleb128(&encoded).unwrap(), (expected, used));
        }
    }

    #[test]
    fn decode_stops_at_first_terminator() {
        // trailing bytes belong to whatever follows
        assert_eq!(decode_uleb128(&[0x05, 0x80, 0x80]).unwrap(), (5, 1));
    }

    #[test]
    fn decode_round_trips_across_byte_boundaries() {
        let mut v: u32 = 1;
        let mut samples = vec![0u32, u32::MAX];
        while let Some(next) = v.checked_mul(3) {
            samples.push(v);
            samples.push(v - 1);
            v = next;
        }
        for shift in 0..32 {
            samples.push(1 << shift);
            samples.push((1u32 << shift).wrapping_sub(1));
        }
        for s in samples {
            let encoded = encode_uleb128(s);
            assert_eq!(decode_uleb128(&encoded).unwrap(), (s, encoded.len()), "value {}", s);
        }
    }

    #[test]
    fn exhausted_span_is_malformed() {
        let e = decode_uleb128(&[0x80, 0x80]).unwrap_err();
        assert!(matches!(e.kind(), DexErrorKind::MalformedVarint { .. }));
        assert!(decode_uleb128(&[]).is_err());
    }

    #[test]
    fn six_byte_encoding_is_malformed() {
        let e = decode_uleb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert!(matches!(e.kind(), DexErrorKind::MalformedVarint { .. }));
    }

    #[test]
    fn cursor_read_reports_absolute_offset() {
        let bytes = [0x00, 0x00, 0x81, 0x01, 0x80];
        let mut ix = 2;
        assert_eq!(read_uleb128(&bytes, &mut ix).unwrap(), 129);
        assert_eq!(ix, 4);
        let e = read_uleb128(&bytes, &mut ix).unwrap_err();
        assert_eq!(e.kind(), &DexErrorKind::MalformedVarint { offset: 4 });
        assert_eq!(ix, 4);
    }

    #[test]
    fn cursor_past_end_is_truncated() {
        let bytes = [0x01, 0x02];
        for start in [2, 40] {
            let mut ix = start;
            let e = read_uleb128(&bytes, &mut ix).unwrap_err();
            assert_eq!(e.kind(), &DexErrorKind::TruncatedBuffer { offset: start, wanted: 1, len: 2 });
            assert_eq!(ix, start);
        }
    }
}
