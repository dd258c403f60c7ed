//! # Stream Layers
//!
//! Transforms between a socket byte stream and frame bodies
//! (`{VarInt packetId}{payload}`).
//!
//! ```text
//! socket ⇄ encryption ⇄ framing ⇄ compression ⇄ frame body
//! ```
//!
//! Framing is always present. Compression and encryption are inserted
//! mid-stream, at a frame boundary, when the connection reaches the packet
//! that enables them.

use bytes::{Buf, Bytes, BytesMut};
use mcproxy_core::{ProxyError, Result};
use mcproxy_protocol::{
    peek_frame_length, put_var_int, CompressionCodec, MinecraftBuffer, StreamDecryptor, StreamEncryptor,
    MAX_FRAME_LENGTH,
};
use std::io;
use tracing::debug;

/// Broken framing cannot be resynchronised, so it ends the stream
fn framing_error(error: impl std::fmt::Display) -> ProxyError {
    ProxyError::Io(io::Error::new(io::ErrorKind::InvalidData, format!("bad frame: {}", error)))
}

/// Layers of a read half
#[derive(Debug, Default)]
pub struct InboundLayers {
    compression: Option<CompressionCodec>,
    decryption: Option<StreamDecryptor>,
}

impl InboundLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.decryption.is_some()
    }

    /// Insert, replace or (for a negative threshold) remove the compression layer
    pub fn set_compression(&mut self, threshold: i32) {
        self.compression = CompressionCodec::new(threshold);
        debug!("Inbound compression threshold set to {}", threshold);
    }

    /// Insert the decryption layer.
    ///
    /// `read_ahead` holds the bytes already received but not yet framed.
    /// They were sent encrypted and are decrypted in place.
    pub fn enable_encryption(&mut self, secret: &[u8], read_ahead: &mut [u8]) -> Result<()> {
        if self.decryption.is_some() {
            return Err(ProxyError::LinkState("inbound encryption is already enabled".into()));
        }

        let mut decryptor = StreamDecryptor::new(secret)?;
        decryptor.decrypt(read_ahead);
        self.decryption = Some(decryptor);

        debug!("Inbound encryption enabled ({} bytes read ahead)", read_ahead.len());
        Ok(())
    }

    /// Decrypt bytes just received from the socket
    #[inline]
    pub fn receive(&mut self, fresh: &mut [u8]) {
        if let Some(decryptor) = &mut self.decryption {
            decryptor.decrypt(fresh);
        }
    }

    /// Split the next complete frame off `buffer` and return its body
    ///
    /// # Returns
    /// - `Ok(Some(body))` - `{VarInt packetId}{payload}` of the next frame
    /// - `Ok(None)` - more bytes are needed
    ///
    /// # Errors
    /// - `FrameTooLarge` for frames above [`MAX_FRAME_LENGTH`]
    /// - `Io(InvalidData)` for a malformed length prefix
    /// - `Compression` for a body that does not inflate to its data length
    pub fn next_body(&self, buffer: &mut BytesMut) -> Result<Option<Bytes>> {
        let Some((length, prefix)) = peek_frame_length(&buffer[..]).map_err(framing_error)? else {
            return Ok(None);
        };

        if length > MAX_FRAME_LENGTH {
            return Err(ProxyError::FrameTooLarge(length));
        }

        if buffer.len() < prefix + length {
            buffer.reserve(prefix + length - buffer.len());
            return Ok(None);
        }

        buffer.advance(prefix);
        let frame = buffer.split_to(length).freeze();

        match &self.compression {
            Some(codec) => codec.decode(frame).map(Some),
            None => Ok(Some(frame)),
        }
    }
}

/// Layers of a write half
#[derive(Debug, Default)]
pub struct OutboundLayers {
    compression: Option<CompressionCodec>,
    encryption: Option<StreamEncryptor>,
}

impl OutboundLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn set_compression(&mut self, threshold: i32) {
        self.compression = CompressionCodec::new(threshold);
        debug!("Outbound compression threshold set to {}", threshold);
    }

    pub fn enable_encryption(&mut self, secret: &[u8]) -> Result<()> {
        if self.encryption.is_some() {
            return Err(ProxyError::LinkState("outbound encryption is already enabled".into()));
        }

        self.encryption = Some(StreamEncryptor::new(secret)?);
        debug!("Outbound encryption enabled");
        Ok(())
    }

    /// Wrap a frame body into the bytes to put on the socket
    ///
    /// # Format
    /// ```text
    /// {VarInt frameLength}{frame}
    /// ```
    /// where `frame` is the body, or its compressed form once compression is
    /// on. The whole output is encrypted once encryption is on.
    pub fn frame(&mut self, body: &[u8], out: &mut BytesMut) -> Result<()> {
        let start = out.len();

        let compressed;
        let frame = match &self.compression {
            Some(codec) => {
                let mut buf = BytesMut::with_capacity(body.len() + 5);
                codec.encode(body, &mut buf)?;
                compressed = buf;
                &compressed[..]
            }
            None => body,
        };

        if frame.len() > MAX_FRAME_LENGTH {
            return Err(ProxyError::FrameTooLarge(frame.len()));
        }

        out.reserve(MinecraftBuffer::var_int_size(frame.len() as i32) + frame.len());
        put_var_int(out, frame.len() as i32);
        out.extend_from_slice(frame);

        if let Some(encryptor) = &mut self.encryption {
            encryptor.encrypt(&mut out[start..]);
        }

        Ok(())
    }
}
