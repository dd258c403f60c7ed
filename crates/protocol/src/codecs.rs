//! VarInt helpers over raw byte queues
//!
//! The stream layers work on `BytesMut` read-ahead buffers where a frame may
//! only be partially received. These helpers distinguish "not enough bytes
//! yet" from "malformed", which [`MinecraftBuffer`](crate::MinecraftBuffer)
//! cannot do since it treats its backing as complete.

use crate::buffer::{encode_var_int, BufferError, Result};
use bytes::{BufMut, BytesMut};

/// Largest value a 3-byte VarInt can carry, and the maximum frame length
pub const MAX_FRAME_LENGTH: usize = 2_097_151;

/// Append a VarInt
///
/// # Format
/// 7-bit little-endian groups, `0x80` marks a following group.
#[inline]
pub fn put_var_int(buf: &mut BytesMut, value: i32) {
    let mut scratch = [0u8; 5];
    let size = encode_var_int(value, &mut scratch);
    buf.put_slice(&scratch[..size]);
}

/// Decode a VarInt at the start of `bytes` without consuming it
///
/// # Returns
/// - `Ok(Some((value, size)))` when a complete VarInt is present
/// - `Ok(None)` when more bytes are needed
/// - `Err(Malformed)` when a sixth group would be needed
#[inline]
pub fn peek_var_int(bytes: &[u8]) -> Result<Option<(i32, usize)>> {
    let mut result: u32 = 0;

    for (group, byte) in bytes.iter().take(5).enumerate() {
        result |= ((byte & 0x7F) as u32) << (7 * group);

        if byte & 0x80 == 0 {
            return Ok(Some((result as i32, group + 1)));
        }
    }

    if bytes.len() >= 5 {
        return Err(BufferError::Malformed("VarInt is too big".into()));
    }

    Ok(None)
}

/// Decode a frame length prefix at the start of `bytes`
///
/// Returns the body length and the prefix size, or `None` when the prefix is
/// incomplete. Negative lengths are malformed; lengths above
/// [`MAX_FRAME_LENGTH`] are reported to the caller, which treats them as
/// fatal for the stream.
pub fn peek_frame_length(bytes: &[u8]) -> Result<Option<(usize, usize)>> {
    match peek_var_int(bytes)? {
        Some((length, _)) if length < 0 => Err(BufferError::Malformed(format!(
            "frame length {} is negative",
            length
        ))),
        Some((length, size)) => Ok(Some((length as usize, size))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_var_int_matches_buffer() {
        for value in [0, 1, 300, 2097151, -1] {
            let mut buf = BytesMut::new();
            put_var_int(&mut buf, value);
            assert_eq!(buf.len(), crate::MinecraftBuffer::var_int_size(value));
            assert_eq!(peek_var_int(&buf).unwrap(), Some((value, buf.len())));
        }
    }

    #[test]
    fn test_peek_incomplete() {
        assert_eq!(peek_var_int(&[]).unwrap(), None);
        assert_eq!(peek_var_int(&[0x80, 0x80]).unwrap(), None);
        assert_eq!(peek_var_int(&[0x80, 0x01, 0xFF]).unwrap(), Some((128, 2)));
    }

    #[test]
    fn test_peek_too_big() {
        assert!(peek_var_int(&[0x80, 0x80, 0x80, 0x80, 0x80]).is_err());
    }

    #[test]
    fn test_frame_length() {
        let mut buf = BytesMut::new();
        put_var_int(&mut buf, MAX_FRAME_LENGTH as i32);
        assert_eq!(buf.len(), 3);
        assert_eq!(peek_frame_length(&buf).unwrap(), Some((MAX_FRAME_LENGTH, 3)));

        let mut buf = BytesMut::new();
        put_var_int(&mut buf, -5);
        assert!(peek_frame_length(&buf).is_err());
    }
}
