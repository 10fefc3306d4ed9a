//! Wire protocols spoken by the proxy.
//!
//! `keyexch` and `auth` implement the inter-node negotiation
//! (RSA public-key delivery, AES key/IV exchange, shared-secret
//! authentication), `socks5` the client dialogue carried under the
//! AES stream on the decryption side, and `relay` the full-duplex
//! transmission phase every mode ends in.

pub mod auth;
pub mod keyexch;
pub mod relay;
pub mod socks5;
