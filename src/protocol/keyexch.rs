//! RSA public-key delivery and AES key/IV exchange.
//!
//! Both frames travel in cleartext; everything after them is carried
//! under the negotiated AES streams.
//!
//! Public-key request (encryption -> decryption):
//!
//! ```text
//! +------+------+
//! | 0x0F | 0x0A |
//! +------+------+
//! ```
//!
//! Public-key response (decryption -> encryption):
//!
//! ```text
//! +------+----------+-------------+
//! | 0x0E | u32 LEN  | PEM pubkey  |
//! +------+----------+-------------+
//! ```
//!
//! Key exchange (encryption -> decryption), RSA ciphertext over
//! `key ‖ iv ‖ key_peer ‖ iv_peer` (32+16+32+16 bytes):
//!
//! ```text
//! +----------+----------------+
//! | u32 LEN  | RSA ciphertext |
//! +----------+----------------+
//! ```
//!
//! The receiver installs the first pair as its inbound (peer) cipher
//! and the second as its outbound cipher, then answers with a single
//! cleartext `0x0F` ACK. The sender must not emit encrypted bytes
//! before that ACK arrives: without it the authentication frame can
//! reach a peer whose cipher contexts do not exist yet.

use log::info;

use crate::crypto::aes::{CipherCtx, KeyIv, IV_LEN, KEY_MATERIAL_LEN};
use crate::crypto::rsa;
use crate::error::{CryptoError, ProtocolError, Result};
use crate::transport::Buffer;
use crate::tunnel::{Ep, Tunnel};

/// Type byte of the public-key request.
pub const REQUEST_TYPE: u8 = 0x0f;
/// Second request byte: the modulus length exponent (2^10 bits).
pub const REQUEST_BITS: u8 = 0x0a;
/// Type byte of the public-key response.
pub const RESPONSE_TYPE: u8 = 0x0e;
/// The cleartext ACK byte closing the AES exchange.
pub const ACK_BYTE: u8 = 0x0f;

/// Upper bound on the PEM and RSA-ciphertext frames.
const MAX_FRAME: usize = 4096;

/// Plaintext size of the key-exchange blob.
const KEY_BLOB_LEN: usize = 2 * (KEY_MATERIAL_LEN + IV_LEN);

/// Encryption side: request the peer's public key over ep1 and store
/// the PEM it answers with.
pub async fn request_public_key(tunnel: &mut Tunnel) -> Result<()> {
    let mut buf = Buffer::with_capacity(MAX_FRAME);
    buf.push(&[REQUEST_TYPE, REQUEST_BITS]);
    tunnel.write_ep1_eq(2, &mut buf).await?;
    buf.clear();

    let got = tunnel.read_ep1_eq(5, &mut buf).await?;
    if got != 5 {
        return Err(ProtocolError::ShortRead {
            expected: 5,
            actual: got,
        }
        .into());
    }
    let head = buf.readable();
    if head[0] != RESPONSE_TYPE {
        return Err(ProtocolError::UnexpectedType {
            expected: RESPONSE_TYPE,
            actual: head[0],
        }
        .into());
    }
    let key_len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]);
    if key_len == 0 || key_len as usize > MAX_FRAME - 5 {
        return Err(ProtocolError::BadLength { length: key_len }.into());
    }
    buf.consume(5);

    let key_len = key_len as usize;
    let got = tunnel.read_ep1_eq(key_len, &mut buf).await?;
    if got != key_len {
        return Err(ProtocolError::ShortRead {
            expected: key_len,
            actual: got,
        }
        .into());
    }
    let pem = String::from_utf8(buf.readable().to_vec()).map_err(|e| CryptoError::InvalidPem {
        reason: e.to_string(),
    })?;
    tunnel.set_peer_public_pem(pem);
    Ok(())
}

/// Decryption side: answer the public-key request on ep0 with this
/// server's PEM public key.
pub async fn respond_public_key(tunnel: &mut Tunnel) -> Result<()> {
    let mut buf = Buffer::with_capacity(MAX_FRAME);
    let got = tunnel.read_ep0_eq(2, &mut buf).await?;
    if got != 2 {
        return Err(ProtocolError::ShortRead {
            expected: 2,
            actual: got,
        }
        .into());
    }
    let head = buf.readable();
    if head[0] != REQUEST_TYPE {
        return Err(ProtocolError::UnexpectedType {
            expected: REQUEST_TYPE,
            actual: head[0],
        }
        .into());
    }
    if head[1] != REQUEST_BITS {
        return Err(ProtocolError::UnexpectedType {
            expected: REQUEST_BITS,
            actual: head[1],
        }
        .into());
    }
    buf.clear();

    let keypair = tunnel
        .server()
        .rsa_keypair()
        .ok_or(CryptoError::KeypairUnavailable)?;
    let pem = keypair.public_pem().as_bytes().to_vec();

    buf.push(&[RESPONSE_TYPE]);
    buf.push(&(pem.len() as u32).to_be_bytes());
    buf.push(&pem);
    let frame_len = buf.len();
    tunnel.write_ep0_eq(frame_len, &mut buf).await?;
    Ok(())
}

/// Encryption side: draw two fresh (key, iv) pairs, deliver them under
/// the peer's RSA key over ep1, install the local cipher contexts, and
/// block until the peer's ACK confirms its contexts exist.
pub async fn deliver_keys(tunnel: &mut Tunnel) -> Result<()> {
    let send_material = KeyIv::generate();
    let recv_material = KeyIv::generate();

    let mut blob = Vec::with_capacity(KEY_BLOB_LEN);
    blob.extend_from_slice(send_material.key());
    blob.extend_from_slice(send_material.iv());
    blob.extend_from_slice(recv_material.key());
    blob.extend_from_slice(recv_material.iv());

    let ciphertext = rsa::encrypt(tunnel.peer_public_pem()?, &blob)?;

    let mut buf = Buffer::with_capacity(4 + ciphertext.len());
    buf.push(&(ciphertext.len() as u32).to_be_bytes());
    buf.push(&ciphertext);
    let frame_len = buf.len();
    tunnel.write_ep1_eq(frame_len, &mut buf).await?;

    tunnel.install_ciphers(
        CipherCtx::encryptor(&send_material)?,
        CipherCtx::decryptor(&recv_material)?,
    );

    receive_ack(tunnel, Ep::Ep1).await?;
    Ok(())
}

/// Decryption side: receive the RSA-encrypted key material on ep0,
/// install the cipher contexts with the mandatory role swap, and send
/// the cleartext ACK.
pub async fn accept_keys(tunnel: &mut Tunnel) -> Result<()> {
    let mut buf = Buffer::with_capacity(MAX_FRAME);
    let got = tunnel.read_ep0_eq(4, &mut buf).await?;
    if got != 4 {
        return Err(ProtocolError::ShortRead {
            expected: 4,
            actual: got,
        }
        .into());
    }
    let head = buf.readable();
    let ct_len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    if ct_len == 0 || ct_len as usize > MAX_FRAME - 4 {
        return Err(ProtocolError::BadLength { length: ct_len }.into());
    }
    buf.consume(4);

    let ct_len = ct_len as usize;
    let got = tunnel.read_ep0_eq(ct_len, &mut buf).await?;
    if got != ct_len {
        return Err(ProtocolError::ShortRead {
            expected: ct_len,
            actual: got,
        }
        .into());
    }

    let keypair = tunnel
        .server()
        .rsa_keypair()
        .ok_or(CryptoError::KeypairUnavailable)?;
    let blob = rsa::decrypt(keypair.private_pem(), buf.readable())?;
    if blob.len() != KEY_BLOB_LEN {
        return Err(CryptoError::LengthMismatch {
            expected: KEY_BLOB_LEN,
            actual: blob.len(),
        }
        .into());
    }

    // role swap: the first pair is the peer's send stream, so it
    // becomes this side's inbound (decrypt) context
    let peer_material = KeyIv::from_parts(
        &blob[..KEY_MATERIAL_LEN],
        &blob[KEY_MATERIAL_LEN..KEY_MATERIAL_LEN + IV_LEN],
    )?;
    let local_material = KeyIv::from_parts(
        &blob[KEY_MATERIAL_LEN + IV_LEN..2 * KEY_MATERIAL_LEN + IV_LEN],
        &blob[2 * KEY_MATERIAL_LEN + IV_LEN..],
    )?;

    tunnel.install_ciphers(
        CipherCtx::encryptor(&local_material)?,
        CipherCtx::decryptor(&peer_material)?,
    );
    info!(
        "tunnel {} ({}): AES contexts installed",
        tunnel.handle().id(),
        tunnel.ep0().peer()
    );

    send_ack(tunnel, Ep::Ep0).await?;
    Ok(())
}

/// Send the single cleartext ACK byte.
pub async fn send_ack(tunnel: &mut Tunnel, ep: Ep) -> Result<()> {
    let mut buf = Buffer::with_capacity(1);
    buf.push(&[ACK_BYTE]);
    match ep {
        Ep::Ep0 => tunnel.write_ep0_eq(1, &mut buf).await?,
        Ep::Ep1 => tunnel.write_ep1_eq(1, &mut buf).await?,
    };
    Ok(())
}

/// Block until the single cleartext ACK byte arrives.
pub async fn receive_ack(tunnel: &mut Tunnel, ep: Ep) -> Result<()> {
    let mut buf = Buffer::with_capacity(1);
    let got = match ep {
        Ep::Ep0 => tunnel.read_ep0_eq(1, &mut buf).await?,
        Ep::Ep1 => tunnel.read_ep1_eq(1, &mut buf).await?,
    };
    if got != 1 {
        return Err(ProtocolError::ShortRead {
            expected: 1,
            actual: got,
        }
        .into());
    }
    let byte = buf.readable()[0];
    if byte != ACK_BYTE {
        return Err(ProtocolError::BadAck { actual: byte }.into());
    }
    Ok(())
}
