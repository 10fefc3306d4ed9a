//! SOCKS5 dialogue on the decryption side.
//!
//! The client speaks standard SOCKS5, but every byte of it rides the
//! inter-node AES stream: reads from ep0 go through the decrypt
//! helpers and replies are encrypted before transmission. Only the
//! CONNECT command is honored, with IPv4 and domain targets; IPv6 is
//! rejected without opening ep1.

use std::net::Ipv4Addr;

use log::{error, info};

use crate::error::{ProtocolError, Result};
use crate::transport::Endpoint;
use crate::tunnel::{Ep, Tunnel};

pub const VERSION: u8 = 0x05;

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xff;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

fn method_name(method: u8) -> &'static str {
    match method {
        0x00 => "no authentication required",
        0x01 => "gssapi",
        0x02 => "username/password",
        _ => "unknown",
    }
}

/// Method negotiation. Selects "no authentication" when offered;
/// otherwise answers `0xFF` and fails the tunnel.
pub async fn handshake(tunnel: &mut Tunnel) -> Result<()> {
    let version = tunnel.read_decrypted_byte(Ep::Ep0).await?;
    if version != VERSION {
        return Err(ProtocolError::UnsupportedVersion(version).into());
    }

    let nmethods = tunnel.read_decrypted_byte(Ep::Ep0).await?;
    let methods = tunnel
        .read_decrypted_bytes(Ep::Ep0, nmethods as usize)
        .await?;
    for method in &methods {
        info!(
            "tunnel {} ({}): client offers {}",
            tunnel.handle().id(),
            tunnel.ep0().peer(),
            method_name(*method)
        );
    }

    if methods.contains(&METHOD_NO_AUTH) {
        tunnel
            .write_encrypted(Ep::Ep0, &[VERSION, METHOD_NO_AUTH])
            .await?;
        Ok(())
    } else {
        tunnel
            .write_encrypted(Ep::Ep0, &[VERSION, METHOD_NO_ACCEPTABLE])
            .await?;
        Err(ProtocolError::NoAcceptableMethod.into())
    }
}

/// CONNECT request: parse the target, resolve domains to one IPv4
/// address, open ep1, and confirm with the bound address reply.
pub async fn handle_request(tunnel: &mut Tunnel) -> Result<()> {
    let head = tunnel.read_decrypted_bytes(Ep::Ep0, 4).await?;
    let (version, command, reserved, atyp) = (head[0], head[1], head[2], head[3]);

    if version != VERSION {
        return Err(ProtocolError::UnsupportedVersion(version).into());
    }
    if reserved != 0x00 {
        return Err(ProtocolError::BadReserved(reserved).into());
    }

    let target = match atyp {
        ATYP_IPV4 => {
            let octets = tunnel.read_decrypted_bytes(Ep::Ep0, 4).await?;
            let addr = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
            TargetAddr::Ip(addr)
        }
        ATYP_DOMAIN => {
            let len = tunnel.read_decrypted_byte(Ep::Ep0).await?;
            let name = tunnel.read_decrypted_bytes(Ep::Ep0, len as usize).await?;
            let name = String::from_utf8(name)
                .map_err(|_| ProtocolError::Malformed { what: "domain name" })?;
            TargetAddr::Domain(name)
        }
        ATYP_IPV6 => {
            // drain the address so the failure is a clean protocol
            // error rather than a desynced stream
            let _ = tunnel.read_decrypted_bytes(Ep::Ep0, 16).await?;
            let _ = tunnel.read_decrypted_bytes(Ep::Ep0, 2).await?;
            error!(
                "tunnel {} ({}): IPv6 targets are not supported",
                tunnel.handle().id(),
                tunnel.ep0().peer()
            );
            return Err(ProtocolError::UnsupportedAddressType(atyp).into());
        }
        other => {
            return Err(ProtocolError::UnsupportedAddressType(other).into());
        }
    };

    let port_bytes = tunnel.read_decrypted_bytes(Ep::Ep0, 2).await?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);

    if command != CMD_CONNECT {
        error!(
            "tunnel {} ({}): unsupported command {:#04x} for {}:{}",
            tunnel.handle().id(),
            tunnel.ep0().peer(),
            command,
            target,
            port
        );
        return Err(ProtocolError::UnsupportedCommand(command).into());
    }

    let addr = match &target {
        TargetAddr::Ip(addr) => *addr,
        TargetAddr::Domain(name) => {
            let resolved = tunnel.server().resolver().resolve(name).await?;
            info!(
                "tunnel {} ({}): requests [domain]{}({}):{}",
                tunnel.handle().id(),
                tunnel.ep0().peer(),
                name,
                resolved,
                port
            );
            resolved
        }
    };
    if matches!(target, TargetAddr::Ip(_)) {
        info!(
            "tunnel {} ({}): requests [ipv4]{}:{}",
            tunnel.handle().id(),
            tunnel.ep0().peer(),
            addr,
            port
        );
    }

    let ep1 = Endpoint::connect(&addr.to_string(), port).await.map_err(|e| {
        error!(
            "tunnel {} ({}): connect to {}:{} failed: {}",
            tunnel.handle().id(),
            tunnel.ep0().peer(),
            addr,
            port,
            e
        );
        e
    })?;
    tunnel.set_ep1(ep1);

    let mut reply = Vec::with_capacity(10);
    reply.extend_from_slice(&[VERSION, 0x00, 0x00, ATYP_IPV4]);
    reply.extend_from_slice(&addr.octets());
    reply.extend_from_slice(&port.to_be_bytes());
    tunnel.write_encrypted(Ep::Ep0, &reply).await?;

    Ok(())
}

enum TargetAddr {
    Ip(Ipv4Addr),
    Domain(String),
}

impl std::fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(name) => f.write_str(name),
        }
    }
}
