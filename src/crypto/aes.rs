//! Stateful AES-128-CFB contexts for the tunnel traffic streams.
//!
//! Key material on the wire is 32 bytes per stream, of which the
//! 128-bit cipher consumes only the first 16. The asymmetry is part
//! of the inter-node format and must not be corrected. CFB is
//! stream-length-preserving and stateful: one context per logical
//! stream, fed every chunk of that stream in order.

use aes::cipher::KeyIvInit;
use aes::Aes128;
use cfb_mode::{BufDecryptor, BufEncryptor};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, Result};

/// Bytes of key material carried per stream on the wire.
pub const KEY_MATERIAL_LEN: usize = 32;

/// IV length.
pub const IV_LEN: usize = 16;

/// Bytes of the key material actually consumed by AES-128.
pub const CIPHER_KEY_LEN: usize = 16;

/// One stream's key material: 32 key bytes plus a 16-byte IV.
#[derive(Clone)]
pub struct KeyIv {
    key: [u8; KEY_MATERIAL_LEN],
    iv: [u8; IV_LEN],
}

impl KeyIv {
    /// Draw fresh random material for one stream.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_MATERIAL_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Rebuild material received from the peer.
    pub fn from_parts(key: &[u8], iv: &[u8]) -> Result<Self> {
        if key.len() != KEY_MATERIAL_LEN {
            return Err(CryptoError::BadKeyMaterial {
                expected: KEY_MATERIAL_LEN,
                actual: key.len(),
            }
            .into());
        }
        if iv.len() != IV_LEN {
            return Err(CryptoError::BadKeyMaterial {
                expected: IV_LEN,
                actual: iv.len(),
            }
            .into());
        }
        let mut this = Self {
            key: [0u8; KEY_MATERIAL_LEN],
            iv: [0u8; IV_LEN],
        };
        this.key.copy_from_slice(key);
        this.iv.copy_from_slice(iv);
        Ok(this)
    }

    pub fn key(&self) -> &[u8; KEY_MATERIAL_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

impl std::fmt::Debug for KeyIv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material stays out of logs
        f.debug_struct("KeyIv").finish_non_exhaustive()
    }
}

/// A primed CFB context. Encrypting and decrypting contexts are
/// distinct types underneath; both transform buffers in place and
/// preserve length.
pub enum CipherCtx {
    Encrypt(BufEncryptor<Aes128>),
    Decrypt(BufDecryptor<Aes128>),
}

impl CipherCtx {
    /// Context for the local outbound stream.
    pub fn encryptor(material: &KeyIv) -> Result<Self> {
        let inner = BufEncryptor::<Aes128>::new_from_slices(
            &material.key[..CIPHER_KEY_LEN],
            &material.iv,
        )
        .map_err(|_| CryptoError::BadKeyMaterial {
            expected: CIPHER_KEY_LEN,
            actual: material.key.len(),
        })?;
        Ok(Self::Encrypt(inner))
    }

    /// Context for the peer's inbound stream.
    pub fn decryptor(material: &KeyIv) -> Result<Self> {
        let inner = BufDecryptor::<Aes128>::new_from_slices(
            &material.key[..CIPHER_KEY_LEN],
            &material.iv,
        )
        .map_err(|_| CryptoError::BadKeyMaterial {
            expected: CIPHER_KEY_LEN,
            actual: material.key.len(),
        })?;
        Ok(Self::Decrypt(inner))
    }

    /// Transform the next chunk of the stream in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Encrypt(ctx) => ctx.encrypt(data),
            Self::Decrypt(ctx) => ctx.decrypt(data),
        }
    }

    pub fn is_encryptor(&self) -> bool {
        matches!(self, Self::Encrypt(_))
    }
}

impl std::fmt::Debug for CipherCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encrypt(_) => write!(f, "CipherCtx::Encrypt"),
            Self::Decrypt(_) => write!(f, "CipherCtx::Decrypt"),
        }
    }
}
