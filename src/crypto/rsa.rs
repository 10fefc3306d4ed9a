//! RSA keypair generation and single-shot PKCS#1 v1.5 operations.
//!
//! Keys travel between the nodes as PKCS#1 PEM text; the keypair is
//! generated only on the decryption node and its public half is
//! handed to the encryption node during negotiation.

use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{CryptoError, Result};

/// Modulus size of generated keypairs.
pub const RSA_KEY_BITS: usize = 1024;

/// Ciphertext size for a 1024-bit key.
pub const RSA_CIPHERTEXT_LEN: usize = RSA_KEY_BITS / 8;

/// Largest plaintext a single PKCS#1 v1.5 operation can carry with a
/// 1024-bit key (modulus bytes minus 11 padding bytes).
pub const RSA_MAX_PLAINTEXT: usize = RSA_CIPHERTEXT_LEN - 11;

/// A generated keypair, serialized as PEM text.
#[derive(Debug, Clone)]
pub struct RsaKeypair {
    public_pem: String,
    private_pem: String,
}

impl RsaKeypair {
    /// Generate a fresh 1024-bit keypair.
    pub fn generate() -> Result<Self> {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|e| {
            CryptoError::KeyGeneration {
                reason: e.to_string(),
            }
        })?;
        let public = RsaPublicKey::from(&private);

        let private_pem =
            private
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| CryptoError::KeyGeneration {
                    reason: e.to_string(),
                })?;
        let public_pem =
            public
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| CryptoError::KeyGeneration {
                    reason: e.to_string(),
                })?;

        Ok(Self {
            public_pem,
            private_pem: private_pem.to_string(),
        })
    }

    /// PEM text of the public key, as sent on the wire.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// PEM text of the private key. Never leaves the process.
    pub fn private_pem(&self) -> &str {
        &self.private_pem
    }
}

/// Encrypt `plaintext` under the PEM-encoded public key.
/// Single-shot; `plaintext` must not exceed [`RSA_MAX_PLAINTEXT`].
pub fn encrypt(public_pem: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.len() > RSA_MAX_PLAINTEXT {
        return Err(CryptoError::Encrypt {
            reason: format!("plaintext of {} bytes exceeds PKCS#1 capacity", plaintext.len()),
        }
        .into());
    }
    let public = RsaPublicKey::from_pkcs1_pem(public_pem).map_err(|e| CryptoError::InvalidPem {
        reason: e.to_string(),
    })?;
    let mut rng = OsRng;
    let ciphertext = public
        .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| CryptoError::Encrypt {
            reason: e.to_string(),
        })?;
    Ok(ciphertext)
}

/// Decrypt `ciphertext` with the PEM-encoded private key.
pub fn decrypt(private_pem: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let private =
        RsaPrivateKey::from_pkcs1_pem(private_pem).map_err(|e| CryptoError::InvalidPem {
            reason: e.to_string(),
        })?;
    let plaintext = private
        .decrypt(Pkcs1v15Encrypt, ciphertext)
        .map_err(|e| CryptoError::Decrypt {
            reason: e.to_string(),
        })?;
    Ok(plaintext)
}
