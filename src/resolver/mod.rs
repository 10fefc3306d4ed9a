//! Name resolution seam.
//!
//! The SOCKS5 request handler only ever needs `resolve(name) -> IPv4`;
//! the trait keeps the system resolver swappable for a scripted one in
//! tests.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;

use crate::error::{ResolveError, Result};

/// Resolve a host name to a single IPv4 address.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Ipv4Addr>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Ipv4Addr> {
        let addrs = tokio::net::lookup_host((host, 0u16))
            .await
            .map_err(|e| ResolveError::Lookup {
                host: host.to_string(),
                source: e,
            })?;
        for addr in addrs {
            if let SocketAddr::V4(v4) = addr {
                return Ok(*v4.ip());
            }
        }
        Err(ResolveError::NoIpv4 {
            host: host.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_ip_literals() {
        let resolver = SystemResolver::new();
        let addr = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addr, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let resolver = SystemResolver::new();
        let addr = resolver.resolve("localhost").await.unwrap();
        assert!(addr.is_loopback());
    }
}
