//! Tri-mode TCP proxy that tunnels SOCKS5 client traffic across an
//! untrusted network segment.
//!
//! One binary runs in one of three modes:
//!
//! - **encryption**: accepts plain SOCKS5 clients and forwards their
//!   traffic, AES-encrypted, to a peer decryption node;
//! - **decryption**: accepts the encrypted inter-node link, terminates
//!   the SOCKS5 dialogue, and connects to the real destinations;
//! - **transmission**: a plain TCP relay. It carries no encryption and
//!   no authentication whatsoever; deploy it only where that is
//!   acceptable.
//!
//! The inter-node link negotiates per-connection AES-128-CFB keys over
//! an RSA-1024 delivery, then authenticates with a shared username and
//! password. The peer's public key is accepted without verification,
//! so the scheme protects confidentiality against passive observers
//! only; an active man-in-the-middle can substitute its own keypair.

pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod resolver;
pub mod server;
pub mod transport;
pub mod tunnel;

pub use error::{Error, Result};
