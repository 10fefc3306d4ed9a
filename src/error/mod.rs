//! Error types for the tunnel proxy.

mod types;

pub use types::{
    ConfigError, CryptoError, Error, ProtocolError, ResolveError, Result, TunnelError,
};
