//! Threshold-gated zlib compression of frame bodies
//!
//! Once compression is enabled every frame body is prefixed with the
//! uncompressed length:
//!
//! ```text
//! {VarInt packetLength}{VarInt dataLength}{body}
//! ```
//!
//! `dataLength == 0` marks an uncompressed body. Otherwise the body is zlib
//! data inflating to exactly `dataLength` bytes. The outer `packetLength` is
//! added by the framing layer, not here.

use crate::codecs::{peek_var_int, put_var_int};
use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use mcproxy_core::{ProxyError, Result};
use std::io::{Read, Write};

/// Largest body a peer may announce as `dataLength`
pub const MAX_UNCOMPRESSED_LENGTH: usize = 8 * 1024 * 1024;

/// Compress data with zlib
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate zlib data that must produce exactly `expected` bytes
pub fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(expected);
    // one extra byte so an oversized stream is detected instead of truncated
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| ProxyError::Compression(format!("corrupt zlib stream: {}", e)))?;

    if decompressed.len() != expected {
        return Err(ProxyError::Compression(format!(
            "received dataLength is {}, but uncompressed data length is {}",
            expected,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

/// Frame body transform applied once `SetCompression` is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionCodec {
    threshold: usize,
}

impl CompressionCodec {
    /// Codec for a non-negative threshold
    ///
    /// A negative threshold disables compression, so there is no codec.
    pub fn new(threshold: i32) -> Option<Self> {
        usize::try_from(threshold).ok().map(|threshold| Self { threshold })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append the compressed form of `body` (packet id + payload) to `out`
    pub fn encode(&self, body: &[u8], out: &mut BytesMut) -> Result<()> {
        if body.len() < self.threshold {
            put_var_int(out, 0);
            out.put_slice(body);
            return Ok(());
        }

        let data_length = i32::try_from(body.len())
            .map_err(|_| ProxyError::Compression(format!("body of {} bytes is too large", body.len())))?;

        put_var_int(out, data_length);
        out.put_slice(&compress(body)?);
        Ok(())
    }

    /// Recover the packet id + payload from a compressed-format body
    pub fn decode(&self, frame: Bytes) -> Result<Bytes> {
        let (data_length, prefix) = peek_var_int(&frame)?
            .ok_or_else(|| ProxyError::Compression("frame is missing its data length".into()))?;

        if data_length == 0 {
            return Ok(frame.slice(prefix..));
        }

        let data_length = usize::try_from(data_length)
            .map_err(|_| ProxyError::Compression(format!("negative data length {}", data_length)))?;

        if data_length > MAX_UNCOMPRESSED_LENGTH {
            return Err(ProxyError::Compression(format!(
                "data length {} exceeds the limit of {}",
                data_length, MAX_UNCOMPRESSED_LENGTH
            )));
        }

        Ok(Bytes::from(decompress(&frame[prefix..], data_length)?))
    }
}
