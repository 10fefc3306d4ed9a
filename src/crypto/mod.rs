//! Crypto wrappers: RSA-1024/PKCS#1 v1.5 for key delivery and
//! AES-128-CFB for the per-connection traffic streams.

pub mod aes;
pub mod rsa;

#[cfg(test)]
mod tests;
