//! The tunnel: one accepted connection, its optional outbound
//! counterpart, the per-connection cipher contexts, and the state
//! machine driving the whole exchange.

pub mod stm;

mod registry;

pub use registry::{TunnelHandle, TunnelRegistry};

use std::io;
use std::sync::Arc;

use log::{error, info};

use crate::crypto::aes::CipherCtx;
use crate::error::{CryptoError, ProtocolError, Result, TunnelError};
use crate::server::Server;
use crate::transport::{Buffer, Endpoint};

use stm::{Event, State};

/// Endpoint selector for the framed helpers. On the encryption node
/// ep0 is the SOCKS5 client and ep1 the peer decryption node; on the
/// decryption node ep0 is the peer and ep1 the real destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ep {
    Ep0,
    Ep1,
}

/// Per-connection entity. Uniquely owns both sockets and both cipher
/// contexts; observed from outside only through its [`TunnelHandle`].
pub struct Tunnel {
    ep0: Endpoint,
    ep1: Option<Endpoint>,
    state: State,
    handle: Arc<TunnelHandle>,
    server: Arc<Server>,
    peer_public_pem: Option<String>,
    /// Local outbound cipher (`aes_ctx`)
    send_ctx: Option<CipherCtx>,
    /// Cipher for traffic arriving from the peer (`aes_ctx_peer`)
    recv_ctx: Option<CipherCtx>,
}

impl Tunnel {
    /// Wrap an accepted connection in a tunnel starting at `state`.
    pub fn new(ep0: Endpoint, server: Arc<Server>, state: State) -> Self {
        let handle = TunnelHandle::new(server.allocate_tunnel_id(), ep0.peer().to_string());
        Self {
            ep0,
            ep1: None,
            state,
            handle,
            server,
            peer_public_pem: None,
            send_ctx: None,
            recv_ctx: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn handle(&self) -> &Arc<TunnelHandle> {
        &self.handle
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Address pair used in log lines.
    pub fn route(&self) -> String {
        match &self.ep1 {
            Some(ep1) => format!("{} <-> {}", self.ep0.peer(), ep1.peer()),
            None => format!("{} <-> (unconnected)", self.ep0.peer()),
        }
    }

    /// Fire an event against the transition table. A hit updates the
    /// state and logs the transition; a miss logs an error and leaves
    /// the state untouched.
    pub fn switch_state(&mut self, event: Event) -> Result<()> {
        match stm::next_state(self.state, event) {
            Some(to) => {
                info!(
                    "tunnel {} ({}): {} -> {} on {}",
                    self.handle.id(),
                    self.ep0.peer(),
                    self.state,
                    to,
                    event
                );
                self.state = to;
                Ok(())
            }
            None => {
                error!(
                    "tunnel {} ({}): no transition from {} on {}",
                    self.handle.id(),
                    self.ep0.peer(),
                    self.state,
                    event
                );
                Err(TunnelError::InvalidTransition {
                    state: self.state.to_string(),
                    event: event.to_string(),
                }
                .into())
            }
        }
    }

    pub fn ep0(&self) -> &Endpoint {
        &self.ep0
    }

    pub fn ep1(&self) -> Option<&Endpoint> {
        self.ep1.as_ref()
    }

    /// Attach the outbound endpoint once its connect succeeded.
    pub fn set_ep1(&mut self, ep1: Endpoint) {
        self.ep1 = Some(ep1);
    }

    fn ep1_mut(&mut self) -> Result<&mut Endpoint> {
        self.ep1
            .as_mut()
            .ok_or_else(|| TunnelError::EndpointMissing.into())
    }

    pub async fn read_ep0_eq(&mut self, n: usize, buf: &mut Buffer) -> io::Result<usize> {
        let got = self.ep0.read_eq(n, buf).await?;
        self.handle.touch();
        Ok(got)
    }

    pub async fn write_ep0_eq(&mut self, n: usize, buf: &mut Buffer) -> io::Result<usize> {
        let put = self.ep0.write_eq(n, buf).await?;
        self.handle.touch();
        Ok(put)
    }

    pub async fn read_ep1_eq(&mut self, n: usize, buf: &mut Buffer) -> Result<usize> {
        let ep1 = self.ep1_mut()?;
        let got = ep1.read_eq(n, buf).await?;
        self.handle.touch();
        Ok(got)
    }

    pub async fn write_ep1_eq(&mut self, n: usize, buf: &mut Buffer) -> Result<usize> {
        let ep1 = self.ep1_mut()?;
        let put = ep1.write_eq(n, buf).await?;
        self.handle.touch();
        Ok(put)
    }

    /// PEM public key learned from the peer during RSA negotiation.
    pub fn peer_public_pem(&self) -> Result<&str> {
        self.peer_public_pem
            .as_deref()
            .ok_or_else(|| TunnelError::CipherNotReady.into())
    }

    pub fn set_peer_public_pem(&mut self, pem: String) {
        self.peer_public_pem = Some(pem);
    }

    /// Install both stream ciphers. After this point the decrypt
    /// helpers and encrypted writes become usable.
    pub fn install_ciphers(&mut self, send_ctx: CipherCtx, recv_ctx: CipherCtx) {
        debug_assert!(send_ctx.is_encryptor() && !recv_ctx.is_encryptor());
        self.send_ctx = Some(send_ctx);
        self.recv_ctx = Some(recv_ctx);
    }

    pub fn ciphers_ready(&self) -> bool {
        self.send_ctx.is_some() && self.recv_ctx.is_some()
    }

    /// Read exactly `n` encrypted bytes from the chosen endpoint and
    /// decrypt them with the peer stream cipher. The decrypt helpers
    /// are the only place where reads couple to decryption.
    pub async fn read_decrypted_bytes(&mut self, ep: Ep, n: usize) -> Result<Vec<u8>> {
        let mut buf = Buffer::with_capacity(n);
        let got = match ep {
            Ep::Ep0 => self.ep0.read_eq(n, &mut buf).await?,
            Ep::Ep1 => self.ep1_mut()?.read_eq(n, &mut buf).await?,
        };
        self.handle.touch();
        if got != n {
            return Err(ProtocolError::ShortRead {
                expected: n,
                actual: got,
            }
            .into());
        }
        let ctx = self
            .recv_ctx
            .as_mut()
            .ok_or(TunnelError::CipherNotReady)?;
        ctx.apply(buf.readable_mut());
        if buf.len() != n {
            return Err(CryptoError::LengthMismatch {
                expected: n,
                actual: buf.len(),
            }
            .into());
        }
        Ok(buf.readable().to_vec())
    }

    /// Read one encrypted byte.
    pub async fn read_decrypted_byte(&mut self, ep: Ep) -> Result<u8> {
        let bytes = self.read_decrypted_bytes(ep, 1).await?;
        Ok(bytes[0])
    }

    /// Read one encrypted network-order u32.
    pub async fn read_decrypted_u32(&mut self, ep: Ep) -> Result<u32> {
        let bytes = self.read_decrypted_bytes(ep, 4).await?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Encrypt `payload` with the local stream cipher and write all of
    /// it to the chosen endpoint.
    pub async fn write_encrypted(&mut self, ep: Ep, payload: &[u8]) -> Result<()> {
        let ctx = self
            .send_ctx
            .as_mut()
            .ok_or(TunnelError::CipherNotReady)?;
        let mut buf = Buffer::with_capacity(payload.len());
        buf.push(payload);
        ctx.apply(buf.readable_mut());
        let n = buf.len();
        match ep {
            Ep::Ep0 => {
                self.ep0.write_eq(n, &mut buf).await?;
            }
            Ep::Ep1 => {
                self.ep1_mut()?.write_eq(n, &mut buf).await?;
            }
        }
        self.handle.touch();
        Ok(())
    }

    /// Mutable views for the relay phase: both endpoints, both cipher
    /// contexts, and the shared handle.
    pub fn relay_io(&mut self) -> Result<RelayIo<'_>> {
        let ep1 = self
            .ep1
            .as_mut()
            .ok_or(TunnelError::EndpointMissing)?;
        Ok(RelayIo {
            ep0: &mut self.ep0,
            ep1,
            send_ctx: self.send_ctx.as_mut(),
            recv_ctx: self.recv_ctx.as_mut(),
            handle: &self.handle,
        })
    }
}

/// Disjoint mutable borrows of the tunnel pieces the relay needs.
pub struct RelayIo<'a> {
    pub ep0: &'a mut Endpoint,
    pub ep1: &'a mut Endpoint,
    pub send_ctx: Option<&'a mut CipherCtx>,
    pub recv_ctx: Option<&'a mut CipherCtx>,
    pub handle: &'a TunnelHandle,
}
