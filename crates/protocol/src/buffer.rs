//! Minecraft binary buffer codec
//!
//! [`MinecraftBuffer`] is a cursor over borrowed bytes. It is created for the
//! duration of one encode or decode call and never outlives the caller's
//! frame. Four backings are supported:
//!
//! - **Mutable**: a contiguous `&mut [u8]`, readable and writable in place
//! - **ReadOnly**: a contiguous `&[u8]`
//! - **Sequence**: a chunked, read-only list of segments
//! - **Growable**: a `BytesMut` that is extended when writes pass its end
//!
//! Every operation checks bounds and advances the position. Primitive reads
//! copy into fixed-size arrays, so no backing allocates for them, not even a
//! sequence whose value straddles two segments.
//!
//! ## Wire formats
//!
//! | Type      | Encoding                                                     |
//! |-----------|--------------------------------------------------------------|
//! | VarInt    | 7-bit little-endian groups, `0x80` continuation, ≤ 5 groups  |
//! | VarLong   | same scheme, ≤ 10 groups                                     |
//! | VarShort  | `u16` low 15 bits, `0x8000` flags one extra byte (bits 15-22) |
//! | String    | VarInt byte length + UTF-8                                   |
//! | UUID      | two big-endian `i64`, or four big-endian `i32`               |

use bytes::BytesMut;
use mcproxy_core::ProxyError;
use std::borrow::Cow;
use std::io::SeekFrom;
use uuid::Uuid;

/// Default maximum number of characters accepted by [`MinecraftBuffer::read_string`]
pub const DEFAULT_MAX_STRING_LENGTH: usize = 32767;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;
const MAX_VAR_INT_GROUPS: usize = 5;
const MAX_VAR_LONG_GROUPS: usize = 10;

/// Buffer-level errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    /// Read or write past the available bytes
    #[error("End of buffer: {requested} bytes requested at position {position}, length {length}")]
    EndOfBuffer {
        position: usize,
        requested: usize,
        length: usize,
    },

    /// Structurally invalid data
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Write attempted on a read-only backing
    #[error("Buffer is read-only")]
    ReadOnlyViolation,

    /// Seek target outside `[0, length]`
    #[error("Seek to {target} is outside of [0, {length}]")]
    SeekOutOfRange { target: i64, length: usize },
}

impl From<BufferError> for ProxyError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer {
                position,
                requested,
                length,
            } => ProxyError::EndOfBuffer {
                position,
                requested,
                length,
            },
            BufferError::Malformed(message) => ProxyError::Malformed(message),
            BufferError::ReadOnlyViolation => ProxyError::ReadOnlyViolation,
            other @ BufferError::SeekOutOfRange { .. } => ProxyError::Malformed(other.to_string()),
        }
    }
}

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;

/// Signed game profile property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

enum Backing<'a> {
    Mutable(&'a mut [u8]),
    ReadOnly(&'a [u8]),
    Sequence {
        segments: &'a [&'a [u8]],
        length: usize,
    },
    Growable(&'a mut BytesMut),
}

/// Cursor over borrowed protocol bytes
pub struct MinecraftBuffer<'a> {
    backing: Backing<'a>,
    position: usize,
}

impl<'a> MinecraftBuffer<'a> {
    /// Readable and writable buffer over a mutable slice
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            backing: Backing::Mutable(data),
            position: 0,
        }
    }

    /// Read-only buffer over a slice
    pub fn read_only(data: &'a [u8]) -> Self {
        Self {
            backing: Backing::ReadOnly(data),
            position: 0,
        }
    }

    /// Read-only buffer over a chunked sequence of segments
    pub fn sequence(segments: &'a [&'a [u8]]) -> Self {
        let length = segments.iter().map(|segment| segment.len()).sum();
        Self {
            backing: Backing::Sequence { segments, length },
            position: 0,
        }
    }

    /// Buffer over a `BytesMut`; writes past the end extend it
    pub fn growable(data: &'a mut BytesMut) -> Self {
        Self {
            backing: Backing::Growable(data),
            position: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn length(&self) -> usize {
        match &self.backing {
            Backing::Mutable(data) => data.len(),
            Backing::ReadOnly(data) => data.len(),
            Backing::Sequence { length, .. } => *length,
            Backing::Growable(data) => data.len(),
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.length() - self.position
    }

    #[inline]
    pub fn has_data(&self) -> bool {
        self.position < self.length()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.backing, Backing::ReadOnly(_) | Backing::Sequence { .. })
    }

    /// Move the cursor. The new position must stay within `[0, length]`.
    pub fn seek(&mut self, target: SeekFrom) -> Result<usize> {
        let length = self.length();
        let absolute = match target {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(offset) => (self.position as i64).saturating_add(offset),
            SeekFrom::End(offset) => (length as i64).saturating_add(offset),
        };

        if absolute < 0 || absolute > length as i64 {
            return Err(BufferError::SeekOutOfRange {
                target: absolute,
                length,
            });
        }

        self.position = absolute as usize;
        Ok(self.position)
    }

    /// Rewind to the start
    pub fn reset(&mut self) {
        self.position = 0;
    }

    fn check_available(&self, requested: usize) -> Result<()> {
        if requested > self.remaining() {
            return Err(BufferError::EndOfBuffer {
                position: self.position,
                requested,
                length: self.length(),
            });
        }
        Ok(())
    }

    /// Copy `dst.len()` bytes at the cursor into `dst`
    fn read_exact_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_available(dst.len())?;
        let start = self.position;

        match &self.backing {
            Backing::Mutable(data) => dst.copy_from_slice(&data[start..start + dst.len()]),
            Backing::ReadOnly(data) => dst.copy_from_slice(&data[start..start + dst.len()]),
            Backing::Growable(data) => dst.copy_from_slice(&data[start..start + dst.len()]),
            Backing::Sequence { segments, .. } => copy_from_segments(segments, start, dst),
        }

        self.position += dst.len();
        Ok(())
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.read_exact_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Read `length` raw bytes.
    ///
    /// Borrowed from the backing unless the bytes span two segments of a
    /// sequence, in which case they are gathered into an owned vector.
    pub fn read(&mut self, length: usize) -> Result<Cow<'_, [u8]>> {
        self.check_available(length)?;
        let start = self.position;
        self.position += length;

        let bytes = match &self.backing {
            Backing::Mutable(data) => Cow::Borrowed(&data[start..start + length]),
            Backing::ReadOnly(data) => Cow::Borrowed(&data[start..start + length]),
            Backing::Growable(data) => Cow::Borrowed(&data[start..start + length]),
            Backing::Sequence { segments, .. } => {
                let (index, offset) = locate_segment(segments, start);
                match segments.get(index) {
                    Some(segment) if offset + length <= segment.len() => {
                        Cow::Borrowed(&segment[offset..offset + length])
                    }
                    _ => {
                        let mut gathered = vec![0u8; length];
                        copy_from_segments(segments, start, &mut gathered);
                        Cow::Owned(gathered)
                    }
                }
            }
        };

        Ok(bytes)
    }

    /// Read every byte between the cursor and the end
    pub fn read_to_end(&mut self) -> Result<Cow<'_, [u8]>> {
        let remaining = self.remaining();
        self.read(remaining)
    }

    /// Write raw bytes at the cursor
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.position;
        let end = start + bytes.len();

        match &mut self.backing {
            Backing::ReadOnly(_) | Backing::Sequence { .. } => {
                return Err(BufferError::ReadOnlyViolation)
            }
            Backing::Mutable(data) => {
                if end > data.len() {
                    return Err(BufferError::EndOfBuffer {
                        position: start,
                        requested: bytes.len(),
                        length: data.len(),
                    });
                }
                data[start..end].copy_from_slice(bytes);
            }
            Backing::Growable(data) => {
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(bytes);
            }
        }

        self.position = end;
        Ok(())
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    /// Any non-zero byte reads as `true`
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    /// Read a VarInt
    ///
    /// # Errors
    /// `Malformed` when a sixth group would be needed.
    pub fn read_var_int(&mut self) -> Result<i32> {
        let mut result: u32 = 0;

        for group in 0..MAX_VAR_INT_GROUPS {
            let byte = self.read_u8()?;
            result |= ((byte & SEGMENT_BITS) as u32) << (7 * group);

            if byte & CONTINUE_BIT == 0 {
                return Ok(result as i32);
            }
        }

        Err(BufferError::Malformed("VarInt is too big".into()))
    }

    /// Write a VarInt using the minimal number of groups
    pub fn write_var_int(&mut self, value: i32) -> Result<()> {
        let mut scratch = [0u8; MAX_VAR_INT_GROUPS];
        let size = encode_var_int(value, &mut scratch);
        self.write(&scratch[..size])
    }

    /// Read a VarLong
    ///
    /// # Errors
    /// `Malformed` when an eleventh group would be needed.
    pub fn read_var_long(&mut self) -> Result<i64> {
        let mut result: u64 = 0;

        for group in 0..MAX_VAR_LONG_GROUPS {
            let byte = self.read_u8()?;
            result |= ((byte & SEGMENT_BITS) as u64) << (7 * group);

            if byte & CONTINUE_BIT == 0 {
                return Ok(result as i64);
            }
        }

        Err(BufferError::Malformed("VarLong is too big".into()))
    }

    pub fn write_var_long(&mut self, value: i64) -> Result<()> {
        let mut scratch = [0u8; MAX_VAR_LONG_GROUPS];
        let mut remaining = value as u64;
        let mut size = 0;

        loop {
            if remaining & !(SEGMENT_BITS as u64) == 0 {
                scratch[size] = remaining as u8;
                size += 1;
                break;
            }

            scratch[size] = (remaining as u8 & SEGMENT_BITS) | CONTINUE_BIT;
            size += 1;
            remaining >>= 7;
        }

        self.write(&scratch[..size])
    }

    /// Read a legacy VarShort (up to 23 bits)
    ///
    /// # Format
    /// - `u16`: low 15 bits, `0x8000` set when a high byte follows
    /// - optional `u8`: bits 15-22
    pub fn read_var_short(&mut self) -> Result<i32> {
        let low = self.read_u16()?;

        if low & 0x8000 == 0 {
            return Ok(low as i32);
        }

        let high = self.read_u8()?;
        Ok(((high as i32) << 15) | (low & 0x7FFF) as i32)
    }

    pub fn write_var_short(&mut self, value: i32) -> Result<()> {
        let mut low = (value & 0x7FFF) as u16;
        let high = ((value & 0x7F8000) >> 15) as u8;

        if high != 0 {
            low |= 0x8000;
        }

        self.write_u16(low)?;

        if high != 0 {
            self.write_u8(high)?;
        }

        Ok(())
    }

    /// Read a string of at most [`DEFAULT_MAX_STRING_LENGTH`] characters
    pub fn read_string(&mut self) -> Result<String> {
        self.read_string_bounded(DEFAULT_MAX_STRING_LENGTH)
    }

    /// Read a string of at most `max_length` characters
    ///
    /// # Errors
    /// - `Malformed` for a negative length, invalid UTF-8 or too many characters
    /// - `EndOfBuffer` when the declared length is not available
    pub fn read_string_bounded(&mut self, max_length: usize) -> Result<String> {
        let length = self.read_var_int()?;
        if length < 0 {
            return Err(BufferError::Malformed(format!("string length {} is negative", length)));
        }

        let length = length as usize;
        // a character is at most four UTF-8 bytes
        if length > max_length.saturating_mul(4) {
            return Err(BufferError::Malformed(format!(
                "string ({} bytes) exceeded maximum length ({})",
                length, max_length
            )));
        }

        let bytes = self.read(length)?;
        let value = std::str::from_utf8(&bytes)
            .map_err(|e| BufferError::Malformed(format!("invalid UTF-8 string: {}", e)))?
            .to_owned();

        let characters = value.chars().count();
        if characters > max_length {
            return Err(BufferError::Malformed(format!(
                "string ({}) exceeded maximum length ({})",
                characters, max_length
            )));
        }

        Ok(value)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let length = i32::try_from(value.len())
            .map_err(|_| BufferError::Malformed(format!("string of {} bytes is too long", value.len())))?;
        self.write_var_int(length)?;
        self.write(value.as_bytes())
    }

    /// Read a UUID as two big-endian 64-bit halves
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let most = self.read_i64()? as u64;
        let least = self.read_i64()? as u64;
        Ok(Uuid::from_u64_pair(most, least))
    }

    pub fn write_uuid(&mut self, value: &Uuid) -> Result<()> {
        let (most, least) = value.as_u64_pair();
        self.write_i64(most as i64)?;
        self.write_i64(least as i64)
    }

    /// Read a UUID as four big-endian 32-bit integers
    pub fn read_uuid_int_array(&mut self) -> Result<Uuid> {
        let most_high = self.read_i32()? as u32 as u64;
        let most_low = self.read_i32()? as u32 as u64;
        let least_high = self.read_i32()? as u32 as u64;
        let least_low = self.read_i32()? as u32 as u64;

        Ok(Uuid::from_u64_pair(
            (most_high << 32) | most_low,
            (least_high << 32) | least_low,
        ))
    }

    pub fn write_uuid_int_array(&mut self, value: &Uuid) -> Result<()> {
        let (most, least) = value.as_u64_pair();
        self.write_i32((most >> 32) as i32)?;
        self.write_i32(most as i32)?;
        self.write_i32((least >> 32) as i32)?;
        self.write_i32(least as i32)
    }

    pub fn read_property(&mut self) -> Result<Property> {
        let name = self.read_string()?;
        let value = self.read_string()?;
        let signature = if self.read_bool()? {
            Some(self.read_string()?)
        } else {
            None
        };

        Ok(Property {
            name,
            value,
            signature,
        })
    }

    /// Write a property
    ///
    /// # Errors
    /// `Malformed` when the signature is present but blank.
    pub fn write_property(&mut self, property: &Property) -> Result<()> {
        self.write_string(&property.name)?;
        self.write_string(&property.value)?;
        self.write_bool(property.signature.is_some())?;

        if let Some(signature) = &property.signature {
            if signature.trim().is_empty() {
                return Err(BufferError::Malformed(
                    "property is signed but its signature is blank".into(),
                ));
            }
            self.write_string(signature)?;
        }

        Ok(())
    }

    /// Read a VarInt-counted property array
    pub fn read_property_array(&mut self) -> Result<Vec<Property>> {
        let count = self.read_var_int()?;
        if count < 0 {
            return Err(BufferError::Malformed(format!("property count {} is negative", count)));
        }

        // each property takes at least three bytes
        let capacity = (count as usize).min(self.remaining() / 3);
        let mut properties = Vec::with_capacity(capacity);
        for _ in 0..count {
            properties.push(self.read_property()?);
        }

        Ok(properties)
    }

    pub fn write_property_array(&mut self, properties: &[Property]) -> Result<()> {
        self.write_var_int(properties.len() as i32)?;
        for property in properties {
            self.write_property(property)?;
        }
        Ok(())
    }

    /// Number of bytes `value` occupies as a VarInt
    pub fn var_int_size(value: i32) -> usize {
        let mut scratch = [0u8; MAX_VAR_INT_GROUPS];
        encode_var_int(value, &mut scratch)
    }
}

/// Encode a VarInt into `scratch`, returning the number of bytes used
#[inline]
pub(crate) fn encode_var_int(value: i32, scratch: &mut [u8; MAX_VAR_INT_GROUPS]) -> usize {
    let mut remaining = value as u32;
    let mut size = 0;

    loop {
        if remaining & !(SEGMENT_BITS as u32) == 0 {
            scratch[size] = remaining as u8;
            return size + 1;
        }

        scratch[size] = (remaining as u8 & SEGMENT_BITS) | CONTINUE_BIT;
        size += 1;
        remaining >>= 7;
    }
}

/// Segment index and offset within it for an absolute position
fn locate_segment(segments: &[&[u8]], position: usize) -> (usize, usize) {
    let mut skipped = 0;
    for (index, segment) in segments.iter().enumerate() {
        if position < skipped + segment.len() {
            return (index, position - skipped);
        }
        skipped += segment.len();
    }
    (segments.len(), 0)
}

fn copy_from_segments(segments: &[&[u8]], position: usize, dst: &mut [u8]) {
    let (mut index, mut offset) = locate_segment(segments, position);
    let mut copied = 0;

    while copied < dst.len() {
        let segment = segments[index];
        let take = (segment.len() - offset).min(dst.len() - copied);
        dst[copied..copied + take].copy_from_slice(&segment[offset..offset + take]);
        copied += take;
        index += 1;
        offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn encoded(write: impl FnOnce(&mut MinecraftBuffer<'_>) -> Result<()>) -> Vec<u8> {
        let mut bytes = BytesMut::new();
        let mut buffer = MinecraftBuffer::growable(&mut bytes);
        write(&mut buffer).unwrap();
        bytes.to_vec()
    }

    #[test]
    fn test_var_int_sampled_values() {
        let mut rng = rand::thread_rng();
        let mut values = vec![0, 1, 127, 128, 255, 25565, 2097151, i32::MAX, i32::MIN, -1];
        values.extend((0..500).map(|_| rng.gen::<i32>()));

        for value in values {
            let bytes = encoded(|buffer| buffer.write_var_int(value));
            assert!(bytes.len() <= 5, "{} took {} bytes", value, bytes.len());
            assert_eq!(bytes.len(), MinecraftBuffer::var_int_size(value));

            let mut buffer = MinecraftBuffer::read_only(&bytes);
            assert_eq!(buffer.read_var_int().unwrap(), value);
            assert!(!buffer.has_data());
        }
    }

    #[test]
    fn test_var_int_known_encodings() {
        assert_eq!(encoded(|b| b.write_var_int(0)), vec![0x00]);
        assert_eq!(encoded(|b| b.write_var_int(128)), vec![0x80, 0x01]);
        assert_eq!(encoded(|b| b.write_var_int(25565)), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encoded(|b| b.write_var_int(-1)), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_var_int_too_big() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert!(matches!(buffer.read_var_int(), Err(BufferError::Malformed(_))));
    }

    #[test]
    fn test_var_long_sampled_values() {
        let mut rng = rand::thread_rng();
        let mut values = vec![0, 1, i64::MAX, i64::MIN, -1];
        values.extend((0..500).map(|_| rng.gen::<i64>()));

        for value in values {
            let bytes = encoded(|buffer| buffer.write_var_long(value));
            assert!(bytes.len() <= 10);

            let mut buffer = MinecraftBuffer::read_only(&bytes);
            assert_eq!(buffer.read_var_long().unwrap(), value);
        }
    }

    #[test]
    fn test_var_long_too_big() {
        let bytes = [0xFF; 11];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert!(matches!(buffer.read_var_long(), Err(BufferError::Malformed(_))));
    }

    #[test]
    fn test_var_short_sizes() {
        let mut rng = rand::thread_rng();
        let mut values = vec![0, 0x7FFF, 0x8000, 0x7FFFFF];
        values.extend((0..500).map(|_| rng.gen_range(0..=0x7FFFFF)));

        for value in values {
            let bytes = encoded(|buffer| buffer.write_var_short(value));
            let expected = if value < 0x8000 { 2 } else { 3 };
            assert_eq!(bytes.len(), expected, "size of {:#x}", value);

            let mut buffer = MinecraftBuffer::read_only(&bytes);
            assert_eq!(buffer.read_var_short().unwrap(), value);
        }
    }

    #[test]
    fn test_string_values() {
        for value in ["", "Notch", "§aColored", "日本語のテキスト", "emoji 🎮"] {
            let bytes = encoded(|buffer| buffer.write_string(value));
            let mut buffer = MinecraftBuffer::read_only(&bytes);
            assert_eq!(buffer.read_string().unwrap(), value);
        }
    }

    #[test]
    fn test_string_length_exceeded() {
        let bytes = encoded(|buffer| buffer.write_string("abcdefghijklmnopq"));
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert!(matches!(
            buffer.read_string_bounded(16),
            Err(BufferError::Malformed(_))
        ));

        // limit counts characters, not bytes
        let bytes = encoded(|buffer| buffer.write_string("ééé"));
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert_eq!(buffer.read_string_bounded(3).unwrap(), "ééé");
    }

    #[test]
    fn test_string_invalid_utf8() {
        let bytes = [0x02, 0xC3, 0x28];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert!(matches!(buffer.read_string(), Err(BufferError::Malformed(_))));
    }

    #[test]
    fn test_string_truncated() {
        let bytes = [0x05, b'a', b'b'];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert!(matches!(
            buffer.read_string(),
            Err(BufferError::EndOfBuffer { requested: 5, .. })
        ));
    }

    #[test]
    fn test_uuid_encodings_agree() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let uuid = Uuid::from_u128(rng.gen());

            let long_form = encoded(|buffer| buffer.write_uuid(&uuid));
            let int_form = encoded(|buffer| buffer.write_uuid_int_array(&uuid));
            assert_eq!(long_form.len(), 16);
            assert_eq!(long_form, int_form);

            let mut buffer = MinecraftBuffer::read_only(&long_form);
            assert_eq!(buffer.read_uuid().unwrap(), uuid);
            let mut buffer = MinecraftBuffer::read_only(&int_form);
            assert_eq!(buffer.read_uuid_int_array().unwrap(), uuid);
        }
    }

    #[test]
    fn test_property_array() {
        let properties = vec![
            Property {
                name: "textures".into(),
                value: "eyJ0aW1lc3RhbXAiOjB9".into(),
                signature: Some("c2lnbmF0dXJl".into()),
            },
            Property {
                name: "unsigned".into(),
                value: "value".into(),
                signature: None,
            },
        ];

        let bytes = encoded(|buffer| buffer.write_property_array(&properties));
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert_eq!(buffer.read_property_array().unwrap(), properties);
    }

    #[test]
    fn test_blank_signature_rejected() {
        let property = Property {
            name: "textures".into(),
            value: "value".into(),
            signature: Some("  ".into()),
        };
        let mut bytes = BytesMut::new();
        let mut buffer = MinecraftBuffer::growable(&mut bytes);
        assert!(buffer.write_property(&property).is_err());
    }

    #[test]
    fn test_read_past_end() {
        let bytes = [0x01, 0x02];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert_eq!(
            buffer.read_i32(),
            Err(BufferError::EndOfBuffer {
                position: 0,
                requested: 4,
                length: 2
            })
        );
        assert_eq!(buffer.position(), 0);
    }

    #[test]
    fn test_read_only_violation() {
        let bytes = [0u8; 4];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        assert_eq!(buffer.write_u8(1), Err(BufferError::ReadOnlyViolation));

        let segments: [&[u8]; 1] = [&bytes];
        let mut buffer = MinecraftBuffer::sequence(&segments);
        assert_eq!(buffer.write_var_int(1), Err(BufferError::ReadOnlyViolation));
    }

    #[test]
    fn test_mutable_backing_is_fixed_size() {
        let mut bytes = [0u8; 3];
        let mut buffer = MinecraftBuffer::new(&mut bytes);
        buffer.write_u16(0xCAFE).unwrap();
        assert!(matches!(buffer.write_u16(1), Err(BufferError::EndOfBuffer { .. })));

        buffer.reset();
        assert_eq!(buffer.read_u16().unwrap(), 0xCAFE);
    }

    #[test]
    fn test_seek_bounds() {
        let bytes = [0u8; 8];
        let mut buffer = MinecraftBuffer::read_only(&bytes);

        assert_eq!(buffer.seek(SeekFrom::Start(8)).unwrap(), 8);
        assert!(!buffer.has_data());
        assert_eq!(buffer.seek(SeekFrom::Current(-3)).unwrap(), 5);
        assert_eq!(buffer.seek(SeekFrom::End(-8)).unwrap(), 0);
        assert!(buffer.seek(SeekFrom::Current(-1)).is_err());
        assert!(buffer.seek(SeekFrom::End(1)).is_err());
        assert_eq!(buffer.position(), 0);
    }

    #[test]
    fn test_seek_extreme_offsets() {
        let bytes = [0u8; 8];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        buffer.seek(SeekFrom::Start(1)).unwrap();

        assert!(matches!(
            buffer.seek(SeekFrom::Current(i64::MAX)),
            Err(BufferError::SeekOutOfRange { .. })
        ));
        assert!(matches!(
            buffer.seek(SeekFrom::End(i64::MAX)),
            Err(BufferError::SeekOutOfRange { .. })
        ));
        assert!(matches!(
            buffer.seek(SeekFrom::Current(i64::MIN)),
            Err(BufferError::SeekOutOfRange { .. })
        ));
        assert!(buffer.seek(SeekFrom::Start(u64::MAX)).is_err());
        assert_eq!(buffer.position(), 1);
    }

    #[test]
    fn test_sequence_spanning_segments() {
        let value: i64 = 0x0102_0304_0506_0708;
        let bytes = value.to_be_bytes();
        let segments: [&[u8]; 3] = [&bytes[..3], &bytes[3..5], &bytes[5..]];

        let mut buffer = MinecraftBuffer::sequence(&segments);
        assert_eq!(buffer.length(), 8);
        assert_eq!(buffer.read_i64().unwrap(), value);

        let mut buffer = MinecraftBuffer::sequence(&segments);
        assert!(matches!(buffer.read(2).unwrap(), Cow::Borrowed(_)));
        let spanning = buffer.read(3).unwrap();
        assert!(matches!(spanning, Cow::Owned(_)));
        assert_eq!(&spanning[..], &[3, 4, 5]);
    }

    #[test]
    fn test_sequence_var_int_across_boundary() {
        let bytes = encoded(|buffer| buffer.write_var_int(2097151));
        let segments: [&[u8]; 2] = [&bytes[..1], &bytes[1..]];
        let mut buffer = MinecraftBuffer::sequence(&segments);
        assert_eq!(buffer.read_var_int().unwrap(), 2097151);
    }

    #[test]
    fn test_growable_overwrites_then_extends() {
        let mut bytes = BytesMut::from(&[9u8, 9][..]);
        let mut buffer = MinecraftBuffer::growable(&mut bytes);
        buffer.write(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.length(), 3);
        assert_eq!(&bytes[..], &[1, 2, 3]);
    }

    #[test]
    fn test_read_to_end() {
        let bytes = [1u8, 2, 3, 4];
        let mut buffer = MinecraftBuffer::read_only(&bytes);
        buffer.read_u8().unwrap();
        assert_eq!(&buffer.read_to_end().unwrap()[..], &[2, 3, 4]);
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_error_conversion() {
        let err: ProxyError = BufferError::Malformed("VarInt is too big".into()).into();
        assert!(err.is_message_local());
        let err: ProxyError = BufferError::ReadOnlyViolation.into();
        assert!(!err.is_message_local());
    }
}
