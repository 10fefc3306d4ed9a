//! Full-duplex transmission phase.
//!
//! Two pumps per tunnel, one per direction, joined before the flow
//! fires the completion event. Each pump owns one read half, one
//! write half, and at most one cipher context, so CFB state is never
//! shared between directions. EOF on a direction ends that pump
//! cleanly; an I/O error fails it. Either way the sibling direction
//! keeps running until it observes its own EOF or error.

use std::io;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::crypto::aes::CipherCtx;
use crate::error::{Result, TunnelError};
use crate::transport::{read_once, write_exact, Buffer};
use crate::tunnel::{Tunnel, TunnelHandle};

/// Relay chunk size.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// How the relay transforms each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Encryption node: ep0 plaintext in, ep1 ciphertext out.
    EncryptOutbound,
    /// Decryption node: ep0 ciphertext in, ep1 plaintext out.
    DecryptOutbound,
    /// Transmission node: bytes pass through untouched.
    Plain,
}

/// Per-direction results, available only after both pumps joined.
pub struct RelayOutcome {
    /// ep0 -> ep1 bytes, or the error that ended the direction
    pub forward: io::Result<u64>,
    /// ep1 -> ep0 bytes, or the error that ended the direction
    pub reverse: io::Result<u64>,
}

impl RelayOutcome {
    /// Both directions drained to EOF.
    pub fn succeeded(&self) -> bool {
        self.forward.is_ok() && self.reverse.is_ok()
    }
}

/// Run the relay until both directions finish. The caller still owns
/// the tunnel and fires the state-machine completion event afterwards.
pub async fn transmit(tunnel: &mut Tunnel, orientation: Orientation) -> Result<RelayOutcome> {
    let server = tunnel.server().clone();
    let io = tunnel.relay_io()?;

    let (forward_ctx, reverse_ctx) = match orientation {
        Orientation::EncryptOutbound => {
            let send = io.send_ctx.ok_or(TunnelError::CipherNotReady)?;
            let recv = io.recv_ctx.ok_or(TunnelError::CipherNotReady)?;
            (Some(send), Some(recv))
        }
        Orientation::DecryptOutbound => {
            let send = io.send_ctx.ok_or(TunnelError::CipherNotReady)?;
            let recv = io.recv_ctx.ok_or(TunnelError::CipherNotReady)?;
            (Some(recv), Some(send))
        }
        Orientation::Plain => (None, None),
    };

    let (read0, write0) = io.ep0.split_mut();
    let (read1, write1) = io.ep1.split_mut();
    let counters = server.counters();

    let forward = pump(
        read0,
        write1,
        forward_ctx,
        io.handle,
        counters.forward_tally(),
    );
    let reverse = pump(
        read1,
        write0,
        reverse_ctx,
        io.handle,
        counters.reverse_tally(),
    );

    let (forward, reverse) = tokio::join!(forward, reverse);
    Ok(RelayOutcome { forward, reverse })
}

/// Move chunks from `reader` to `writer` until EOF or error,
/// transforming them with `cipher` when present and crediting every
/// written byte to `tally`.
pub(crate) async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    mut cipher: Option<&mut CipherCtx>,
    handle: &TunnelHandle,
    tally: &AtomicI64,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Buffer::with_capacity(CHUNK_SIZE);
    let mut total = 0u64;
    loop {
        buf.clear();
        let n = read_once(&mut reader, &mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        handle.touch();
        if let Some(ctx) = cipher.as_deref_mut() {
            ctx.apply(buf.readable_mut());
        }
        let wrote = write_exact(&mut writer, n, &mut buf).await?;
        tally.fetch_add(wrote as i64, Ordering::Relaxed);
        total += wrote as u64;
        handle.touch();
    }
}
