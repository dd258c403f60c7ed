//! AES-128/CFB8 stream encryption
//!
//! After the login encryption exchange both peers encrypt the whole byte
//! stream, framing included. The 16-byte shared secret is both the key and
//! the IV, and each direction keeps its own cipher state.

use aes::Aes128;
use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use mcproxy_core::{ProxyError, Result};

/// Length of the shared secret
pub const SHARED_SECRET_LENGTH: usize = 16;

fn check_secret(secret: &[u8]) -> Result<()> {
    if secret.len() != SHARED_SECRET_LENGTH {
        return Err(ProxyError::Encryption(format!(
            "shared secret must be {} bytes, got {}",
            SHARED_SECRET_LENGTH,
            secret.len()
        )));
    }
    Ok(())
}

/// Encrypting half, used on the write side of a channel
pub struct StreamEncryptor {
    cipher: cfb8::Encryptor<Aes128>,
}

impl StreamEncryptor {
    pub fn new(secret: &[u8]) -> Result<Self> {
        check_secret(secret)?;
        let cipher = cfb8::Encryptor::<Aes128>::new_from_slices(secret, secret)
            .map_err(|e| ProxyError::Encryption(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt `data` in place
    pub fn encrypt(&mut self, data: &mut [u8]) {
        // CFB8 works on one-byte blocks
        for byte in data.chunks_mut(1) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

/// Decrypting half, used on the read side of a channel
pub struct StreamDecryptor {
    cipher: cfb8::Decryptor<Aes128>,
}

impl StreamDecryptor {
    pub fn new(secret: &[u8]) -> Result<Self> {
        check_secret(secret)?;
        let cipher = cfb8::Decryptor::<Aes128>::new_from_slices(secret, secret)
            .map_err(|e| ProxyError::Encryption(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Decrypt `data` in place
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl std::fmt::Debug for StreamEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamEncryptor(AES-128/CFB8)")
    }
}

impl std::fmt::Debug for StreamDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamDecryptor(AES-128/CFB8)")
    }
}
