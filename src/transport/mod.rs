//! Byte buffers and TCP endpoints with exact-count framed I/O.

mod buffer;
mod endpoint;

pub use buffer::Buffer;
pub use endpoint::{read_once, write_exact, Endpoint};

#[cfg(test)]
mod tests;
