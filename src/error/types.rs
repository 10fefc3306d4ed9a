//! Error categories used across the proxy:
//! configuration, cryptography, wire protocol, tunnel lifecycle,
//! name resolution, and plain I/O.

use thiserror::Error;

/// Main error type for the proxy.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cryptographic operation errors
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Inter-node or SOCKS5 wire protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Tunnel lifecycle errors
    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Name resolution errors
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Underlying parser error
    #[error("parse error: {0}")]
    Parsing(#[from] config::ConfigError),

    /// A key required by the selected mode is absent
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// A key is present but its value is unusable
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    /// Credential exceeds the wire-format bound
    #[error("{field} longer than {max} bytes")]
    CredentialTooLong { field: &'static str, max: usize },
}

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// RSA keypair generation failed
    #[error("RSA key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// PEM text could not be parsed into a key
    #[error("invalid PEM key: {reason}")]
    InvalidPem { reason: String },

    /// RSA encryption failed (input too large, bad key)
    #[error("RSA encrypt failed: {reason}")]
    Encrypt { reason: String },

    /// RSA decryption failed (padding, bad key)
    #[error("RSA decrypt failed: {reason}")]
    Decrypt { reason: String },

    /// Key or IV material has the wrong length
    #[error("bad key material: expected {expected} bytes, got {actual}")]
    BadKeyMaterial { expected: usize, actual: usize },

    /// Decrypted payload length does not match the expectation
    #[error("plaintext length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Keypair requested in a mode that does not generate one
    #[error("no RSA keypair available in this mode")]
    KeypairUnavailable,
}

/// Wire protocol errors, distinguished so the tunnel boundary can
/// log and fail with the precise framing violation.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A frame began with a type byte other than the expected one
    #[error("unexpected type byte: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedType { expected: u8, actual: u8 },

    /// A length prefix is zero or exceeds the frame bound
    #[error("unacceptable length field: {length}")]
    BadLength { length: u32 },

    /// The peer closed before a full frame arrived
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// The cleartext ACK after AES key delivery never arrived intact
    #[error("missing ack byte, got {actual:#04x}")]
    BadAck { actual: u8 },

    /// Credentials did not match the configured values
    #[error("authentication rejected")]
    AuthRejected,

    /// SOCKS version other than 5
    #[error("unsupported SOCKS version {0}")]
    UnsupportedVersion(u8),

    /// None of the offered SOCKS5 methods is acceptable
    #[error("no acceptable SOCKS5 method")]
    NoAcceptableMethod,

    /// SOCKS5 command other than CONNECT
    #[error("unsupported SOCKS5 command {0:#04x}")]
    UnsupportedCommand(u8),

    /// Non-zero SOCKS5 reserved byte
    #[error("non-zero SOCKS5 reserved byte {0:#04x}")]
    BadReserved(u8),

    /// SOCKS5 address type the proxy does not serve (IPv6)
    #[error("unsupported SOCKS5 address type {0:#04x}")]
    UnsupportedAddressType(u8),

    /// A field parsed but carried nonsense (bad UTF-8 domain name)
    #[error("malformed {what}")]
    Malformed { what: &'static str },
}

/// Tunnel lifecycle errors.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The transition table has no row for (state, event)
    #[error("no transition from {state} on {event}")]
    InvalidTransition { state: String, event: String },

    /// A decrypt helper was called before AES negotiation finished
    #[error("cipher context not negotiated yet")]
    CipherNotReady,

    /// An operation needed ep1 before the outbound connect happened
    #[error("ep1 endpoint not connected yet")]
    EndpointMissing,
}

/// Name resolution errors.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The system resolver failed outright
    #[error("resolving {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but yielded no IPv4 address
    #[error("no IPv4 address for {host}")]
    NoIpv4 { host: String },
}

/// Result type alias for the proxy.
pub type Result<T> = std::result::Result<T, Error>;
