//! Shared-secret authentication, sent under the AES stream.
//!
//! ```text
//! +----------+----------+----------+----------+
//! | u32 ULEN | username | u32 PLEN | password |
//! +----------+----------+----------+----------+
//! ```
//!
//! Both fields are capped at 64 bytes on both sides. The mismatch
//! detail stays in the log; the peer only ever observes the tunnel
//! closing.

use log::{error, info};

use crate::config::{PASSWORD_MAX_LENGTH, USERNAME_MAX_LENGTH};
use crate::error::{ProtocolError, Result};
use crate::tunnel::{Ep, Tunnel};

/// Serialize the credential frame (cleartext form).
pub fn encode_credentials(username: &str, password: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + username.len() + password.len());
    frame.extend_from_slice(&(username.len() as u32).to_be_bytes());
    frame.extend_from_slice(username.as_bytes());
    frame.extend_from_slice(&(password.len() as u32).to_be_bytes());
    frame.extend_from_slice(password.as_bytes());
    frame
}

/// Encryption side: send the configured credentials to ep1 under the
/// local stream cipher.
pub async fn send_credentials(tunnel: &mut Tunnel) -> Result<()> {
    let (username, password) = tunnel.server().credentials();
    if username.len() > USERNAME_MAX_LENGTH {
        return Err(ProtocolError::BadLength {
            length: username.len() as u32,
        }
        .into());
    }
    if password.len() > PASSWORD_MAX_LENGTH {
        return Err(ProtocolError::BadLength {
            length: password.len() as u32,
        }
        .into());
    }
    let frame = encode_credentials(&username, &password);
    tunnel.write_encrypted(Ep::Ep1, &frame).await
}

/// Decryption side: read the credential frame from ep0 through the
/// decrypt helpers and compare against the configured values.
pub async fn verify_credentials(tunnel: &mut Tunnel) -> Result<()> {
    let ulen = tunnel.read_decrypted_u32(Ep::Ep0).await?;
    if ulen as usize > USERNAME_MAX_LENGTH {
        return Err(ProtocolError::BadLength { length: ulen }.into());
    }
    let username = tunnel.read_decrypted_bytes(Ep::Ep0, ulen as usize).await?;

    let plen = tunnel.read_decrypted_u32(Ep::Ep0).await?;
    if plen as usize > PASSWORD_MAX_LENGTH {
        return Err(ProtocolError::BadLength { length: plen }.into());
    }
    let password = tunnel.read_decrypted_bytes(Ep::Ep0, plen as usize).await?;

    let (want_username, want_password) = tunnel.server().credentials();
    if username != want_username.as_bytes() || password != want_password.as_bytes() {
        error!(
            "tunnel {} ({}): credential mismatch, got user {:?}",
            tunnel.handle().id(),
            tunnel.ep0().peer(),
            String::from_utf8_lossy(&username),
        );
        return Err(ProtocolError::AuthRejected.into());
    }

    info!(
        "tunnel {} ({}): authenticated as {}",
        tunnel.handle().id(),
        tunnel.ep0().peer(),
        String::from_utf8_lossy(&username)
    );
    Ok(())
}
