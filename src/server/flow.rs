//! Per-mode tunnel flows.
//!
//! One accepted connection is driven by one task through its mode's
//! state chain. The whole chain runs inside a `select!` against the
//! tunnel's eviction signal, so the GC can cancel a flow at any
//! suspension point; dropping the tunnel closes both endpoints.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::TcpStream;

use crate::config::Mode;
use crate::error::Result;
use crate::protocol::relay::{self, Orientation};
use crate::protocol::{auth, keyexch, socks5};
use crate::transport::Endpoint;
use crate::tunnel::stm::{Event, State};
use crate::tunnel::Tunnel;

use super::Server;

/// Entry point of the task spawned per accepted connection.
pub(crate) async fn drive(stream: TcpStream, peer: std::net::SocketAddr, server: Arc<Server>) {
    let ep0 = Endpoint::from_accepted(stream, peer);
    let result = match server.mode() {
        Mode::Encryption => encryption_flow(ep0, server).await,
        Mode::Decryption => decryption_flow(ep0, server).await,
        Mode::Transmission => transmission_flow(ep0, server).await,
    };
    if let Err(e) = result {
        debug!("tunnel from {} ended: {}", peer, e);
    }
}

async fn encryption_flow(ep0: Endpoint, server: Arc<Server>) -> Result<()> {
    let mut tunnel = Tunnel::new(ep0, server, State::EncryptionReady);
    tunnel.server().registry().register(tunnel.handle());
    tunnel.switch_state(Event::Establish)?;

    let handle = tunnel.handle().clone();
    tokio::select! {
        result = encryption_chain(&mut tunnel) => result,
        _ = handle.closed() => {
            info!("tunnel {} ({}) closed by idle eviction", handle.id(), handle.peer());
            Ok(())
        }
    }
}

async fn encryption_chain(tunnel: &mut Tunnel) -> Result<()> {
    let (remote_host, remote_port) = tunnel.server().remote_addr()?;
    match Endpoint::connect(&remote_host, remote_port).await {
        Ok(ep1) => tunnel.set_ep1(ep1),
        Err(e) => {
            error!(
                "tunnel {} ({}): connect to peer {}:{} failed: {}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                remote_host,
                remote_port,
                e
            );
            let _ = tunnel.switch_state(Event::RsaNegotiatingFail);
            return Err(e.into());
        }
    }

    match keyexch::request_public_key(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::RsaPubkeyReceive)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): rsa negotiation failed: {}",
                tunnel.handle().id(),
                tunnel.route(),
                e
            );
            let _ = tunnel.switch_state(Event::RsaNegotiatingFail);
            return Err(e);
        }
    }

    match keyexch::deliver_keys(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::AesKeySend)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): aes negotiation failed: {}",
                tunnel.handle().id(),
                tunnel.route(),
                e
            );
            let _ = tunnel.switch_state(Event::AesNegotiatingFail);
            return Err(e);
        }
    }

    match auth::send_credentials(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::AuthenticatingOk)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): sending credentials failed: {}",
                tunnel.handle().id(),
                tunnel.route(),
                e
            );
            let _ = tunnel.switch_state(Event::AuthenticatingFail);
            return Err(e);
        }
    }

    finish_transmit(tunnel, Orientation::EncryptOutbound).await
}

async fn decryption_flow(ep0: Endpoint, server: Arc<Server>) -> Result<()> {
    let mut tunnel = Tunnel::new(ep0, server, State::DecryptionReady);
    tunnel.server().registry().register(tunnel.handle());
    tunnel.switch_state(Event::Establish)?;

    let handle = tunnel.handle().clone();
    tokio::select! {
        result = decryption_chain(&mut tunnel) => result,
        _ = handle.closed() => {
            info!("tunnel {} ({}) closed by idle eviction", handle.id(), handle.peer());
            Ok(())
        }
    }
}

async fn decryption_chain(tunnel: &mut Tunnel) -> Result<()> {
    match keyexch::respond_public_key(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::RsaPubkeySend)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): rsa negotiation failed: {}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                e
            );
            let _ = tunnel.switch_state(Event::RsaNegotiatingFail);
            return Err(e);
        }
    }

    match keyexch::accept_keys(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::AesKeyReceive)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): aes negotiation failed: {}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                e
            );
            let _ = tunnel.switch_state(Event::AesNegotiatingFail);
            return Err(e);
        }
    }

    match auth::verify_credentials(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::AuthenticatingOk)?,
        Err(e) => {
            let _ = tunnel.switch_state(Event::AuthenticatingFail);
            return Err(e);
        }
    }

    match socks5::handshake(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::Socks5HandshakeOk)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): socks5 handshake failed: {}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                e
            );
            let _ = tunnel.switch_state(Event::Socks5HandshakeFail);
            return Err(e);
        }
    }

    match socks5::handle_request(tunnel).await {
        Ok(()) => tunnel.switch_state(Event::Socks5RequestOk)?,
        Err(e) => {
            error!(
                "tunnel {} ({}): socks5 request failed: {}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                e
            );
            let _ = tunnel.switch_state(Event::Socks5RequestFail);
            return Err(e);
        }
    }

    finish_transmit(tunnel, Orientation::DecryptOutbound).await
}

async fn transmission_flow(ep0: Endpoint, server: Arc<Server>) -> Result<()> {
    let mut tunnel = Tunnel::new(ep0, server, State::TransmissionReady);
    tunnel.server().registry().register(tunnel.handle());
    tunnel.switch_state(Event::Establish)?;

    let handle = tunnel.handle().clone();
    tokio::select! {
        result = transmission_chain(&mut tunnel) => result,
        _ = handle.closed() => {
            info!("tunnel {} ({}) closed by idle eviction", handle.id(), handle.peer());
            Ok(())
        }
    }
}

async fn transmission_chain(tunnel: &mut Tunnel) -> Result<()> {
    let (remote_host, remote_port) = tunnel.server().remote_addr()?;
    match Endpoint::connect(&remote_host, remote_port).await {
        Ok(ep1) => tunnel.set_ep1(ep1),
        Err(e) => {
            error!(
                "tunnel {} ({}): connect to {}:{} failed: {}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                remote_host,
                remote_port,
                e
            );
            let _ = tunnel.switch_state(Event::TransmitFail);
            return Err(e.into());
        }
    }

    finish_transmit(tunnel, Orientation::Plain).await
}

/// Run the relay and fire the completion event once both directions
/// have joined.
async fn finish_transmit(tunnel: &mut Tunnel, orientation: Orientation) -> Result<()> {
    let outcome = match relay::transmit(tunnel, orientation).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = tunnel.switch_state(Event::TransmitFail);
            return Err(e);
        }
    };

    if outcome.succeeded() {
        tunnel.switch_state(Event::TransmitOk)?;
        Ok(())
    } else {
        let _ = tunnel.switch_state(Event::TransmitFail);
        match (outcome.forward, outcome.reverse) {
            (Err(e), _) | (_, Err(e)) => Err(e.into()),
            _ => Ok(()),
        }
    }
}
