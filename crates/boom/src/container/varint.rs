//! Zigzag variable-length integer codec.
//!
//! Signed integers are zigzag-mapped to unsigned (`0 → 0, -1 → 1, 1 → 2, ...`)
//! and then written as little-endian groups of seven bits, the high bit of
//! every byte flagging that another byte follows. A 64-bit value occupies at
//! most 10 bytes, a 32-bit value at most 5.
//!
//! Length-prefixed byte strings and the container metadata map are built on
//! top of the same primitive.

use crate::error::{BoomError, Result};
use std::collections::BTreeMap;
use std::io::Read;

/// Maximum encoded width of a 64-bit varint.
pub const MAX_LONG_BYTES: usize = 10;

/// Maximum encoded width of a 32-bit varint.
pub const MAX_INT_BYTES: usize = 5;

/// Maps a signed 64-bit integer onto the unsigned zigzag space.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Appends the varint encoding of `n` to `buf`.
pub fn put_long(buf: &mut Vec<u8>, n: i64) {
    let mut value = zigzag_encode(n);
    while value & !0x7F != 0 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Appends the varint encoding of a 32-bit integer to `buf`.
///
/// The zigzag mapping of an `i32` is identical to that of the same value
/// widened to `i64`, so the bytes never exceed [`MAX_INT_BYTES`].
pub fn put_int(buf: &mut Vec<u8>, n: i32) {
    put_long(buf, n as i64);
}

/// Appends a varint length followed by the raw bytes.
pub fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_long(buf, bytes.len() as i64);
    buf.extend_from_slice(bytes);
}

/// Appends a length-prefixed UTF-8 string.
pub fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_bytes(buf, s.as_bytes());
}

/// Encodes a single signed integer into a fresh buffer.
pub fn encode_long(n: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_LONG_BYTES);
    put_long(&mut buf, n);
    buf
}

/// Reads raw (un-zigzagged) varint bits, allowing at most `max_bytes` bytes.
fn read_raw<R: Read>(reader: &mut R, max_bytes: usize) -> Result<u64> {
    let mut value = 0u64;
    let mut byte = [0u8; 1];

    for i in 0..max_bytes {
        if let Err(e) = reader.read_exact(&mut byte) {
            // Running dry before the first byte is a plain truncation; running
            // dry inside a value means the value itself is damaged.
            return Err(if i == 0 {
                BoomError::from_read(e, "varint")
            } else if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BoomError::MalformedVarint { bytes: i }
            } else {
                BoomError::Io(e)
            });
        }
        value |= ((byte[0] & 0x7F) as u64) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }

    Err(BoomError::MalformedVarint { bytes: max_bytes })
}

/// Reads a zigzag varint as a signed 64-bit integer.
///
/// # Errors
///
/// Returns `BoomError::TruncatedInput` if the stream is empty,
/// `BoomError::MalformedVarint` if it ends mid-value or the value does not
/// terminate within 10 bytes.
pub fn read_long<R: Read>(reader: &mut R) -> Result<i64> {
    read_raw(reader, MAX_LONG_BYTES).map(zigzag_decode)
}

/// Reads a zigzag varint as a signed 32-bit integer (at most 5 bytes).
///
/// A fifth byte carrying bits past the 32nd is rejected as `MalformedVarint`.
pub fn read_int<R: Read>(reader: &mut R) -> Result<i32> {
    let raw = u32::try_from(read_raw(reader, MAX_INT_BYTES)?).map_err(|_| {
        BoomError::MalformedVarint {
            bytes: MAX_INT_BYTES,
        }
    })?;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

/// Reads exactly `len` bytes.
///
/// The buffer grows with the data actually read, so a corrupt length cannot
/// force a huge up-front allocation.
pub fn read_exact_vec<R: Read>(reader: &mut R, len: usize, context: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(64 * 1024));
    reader
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| BoomError::from_read(e, context))?;
    if buf.len() < len {
        return Err(BoomError::TruncatedInput { context });
    }
    Ok(buf)
}

/// Reads a varint length followed by that many bytes.
///
/// # Errors
///
/// Returns `BoomError::TruncatedInput` if fewer bytes are available than the
/// length announces, and `BoomError::MalformedRecord` for a negative length.
pub fn read_length_prefixed_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_long(reader)?;
    if len < 0 {
        return Err(BoomError::MalformedRecord(format!(
            "negative length prefix {}",
            len
        )));
    }
    read_exact_vec(reader, len as usize, "length-prefixed bytes")
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let bytes = read_length_prefixed_bytes(reader)?;
    String::from_utf8(bytes).map_err(|e| BoomError::InvalidUtf8(format!("string: {}", e)))
}

/// Reads a metadata map of `string → bytes` entries.
///
/// The map is a sequence of counted entry blocks terminated by a zero count.
/// A negative count `-n` announces `n` entries preceded by the block's byte
/// size, which is read and ignored.
pub fn read_metadata_map<R: Read>(reader: &mut R) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut map = BTreeMap::new();
    loop {
        let mut count = read_long(reader)?;
        if count == 0 {
            break;
        }
        if count < 0 {
            count = count.checked_neg().ok_or_else(|| {
                BoomError::MalformedRecord("metadata block count overflow".to_string())
            })?;
            let _block_size = read_long(reader)?;
        }
        for _ in 0..count {
            let key = read_string(reader)?;
            let value = read_length_prefixed_bytes(reader)?;
            map.insert(key, value);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<i64> {
        let mut cursor = bytes;
        read_long(&mut cursor)
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode_long(0), vec![0x00]);
        assert_eq!(encode_long(-1), vec![0x01]);
        assert_eq!(encode_long(1), vec![0x02]);
        assert_eq!(encode_long(-64), vec![0x7F]);
        assert_eq!(encode_long(64), vec![0x80, 0x01]);
        assert_eq!(encode_long(1000), vec![0xD0, 0x0F]);
    }

    #[test]
    fn test_extreme_values() {
        for n in [i64::MIN, i64::MAX, i64::MIN + 1, i64::MAX - 1] {
            let bytes = encode_long(n);
            assert_eq!(bytes.len(), MAX_LONG_BYTES);
            assert_eq!(decode(&bytes).unwrap(), n);
        }
    }

    #[test]
    fn test_int_width() {
        let mut buf = Vec::new();
        put_int(&mut buf, i32::MIN);
        assert_eq!(buf.len(), MAX_INT_BYTES);
        let mut cursor = buf.as_slice();
        assert_eq!(read_int(&mut cursor).unwrap(), i32::MIN);

        let mut cursor: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        assert_eq!(read_int(&mut cursor).unwrap(), i32::MIN);
    }

    #[test]
    fn test_int_out_of_range_rejected() {
        for bytes in [
            [0xFFu8, 0xFF, 0xFF, 0xFF, 0x7F],
            [0x80, 0x80, 0x80, 0x80, 0x10],
            [0xFE, 0xFF, 0xFF, 0xFF, 0x1F],
        ] {
            let mut cursor: &[u8] = &bytes;
            assert!(matches!(
                read_int(&mut cursor),
                Err(BoomError::MalformedVarint { bytes: 5 })
            ));
        }
        // The same bytes are a valid long.
        let mut cursor: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
        assert!(read_long(&mut cursor).is_ok());
    }

    #[test]
    fn test_overlong_varint_rejected() {
        let bytes = [0xFFu8; 11];
        assert!(matches!(
            decode(&bytes),
            Err(BoomError::MalformedVarint { bytes: 10 })
        ));

        let mut cursor: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
        assert!(matches!(
            read_int(&mut cursor),
            Err(BoomError::MalformedVarint { bytes: 5 })
        ));
    }

    #[test]
    fn test_eof_handling() {
        assert!(matches!(decode(&[]), Err(BoomError::TruncatedInput { .. })));
        assert!(matches!(
            decode(&[0x80, 0x80]),
            Err(BoomError::MalformedVarint { bytes: 2 })
        ));
    }

    #[test]
    fn test_length_prefixed_truncated() {
        let mut buf = Vec::new();
        put_long(&mut buf, 10);
        buf.extend_from_slice(b"short");
        let mut cursor = buf.as_slice();
        assert!(matches!(
            read_length_prefixed_bytes(&mut cursor),
            Err(BoomError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_metadata_map_negative_count() {
        let mut buf = Vec::new();
        // -2 entries, followed by a block size that is ignored
        put_long(&mut buf, -2);
        put_long(&mut buf, 99);
        put_string(&mut buf, "a");
        put_bytes(&mut buf, b"1");
        put_string(&mut buf, "b");
        put_bytes(&mut buf, b"2");
        put_long(&mut buf, 1);
        put_string(&mut buf, "x.custom");
        put_bytes(&mut buf, &[0, 1, 2]);
        put_long(&mut buf, 0);

        let mut cursor = buf.as_slice();
        let map = read_metadata_map(&mut cursor).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["a"], b"1");
        assert_eq!(map["b"], b"2");
        assert_eq!(map["x.custom"], vec![0, 1, 2]);
        assert!(cursor.is_empty());
    }
}
