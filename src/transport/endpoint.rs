//! TCP endpoint wrapper: a stream plus the remembered peer address,
//! with exact-count read/write primitives over a [`Buffer`].

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use super::Buffer;

/// One best-effort read into the buffer's writable region.
/// Returns the byte count; 0 means peer EOF (or a full buffer).
pub async fn read_once<R>(reader: &mut R, buf: &mut Buffer) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    if buf.free() == 0 {
        return Ok(0);
    }
    let n = reader.read(buf.writable()).await?;
    buf.commit(n);
    Ok(n)
}

/// Write exactly `n` bytes from the buffer's readable region,
/// advancing its read cursor.
pub async fn write_exact<W>(writer: &mut W, n: usize, buf: &mut Buffer) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    if n > buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "write larger than buffered payload",
        ));
    }
    writer.write_all(&buf.readable()[..n]).await?;
    buf.consume(n);
    Ok(n)
}

/// One side of a tunnel: a connected stream and its peer `host:port`.
pub struct Endpoint {
    stream: TcpStream,
    peer: String,
}

impl Endpoint {
    pub fn new(stream: TcpStream, peer: String) -> Self {
        Self { stream, peer }
    }

    /// Wrap an accepted connection.
    pub fn from_accepted(stream: TcpStream, addr: SocketAddr) -> Self {
        Self::new(stream, addr.to_string())
    }

    /// Open an outbound connection and remember the target address.
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self::new(stream, format!("{}:{}", host, port)))
    }

    /// Peer address this endpoint talks to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read exactly `n` bytes, appending to the buffer. Returns `n` on
    /// success, 0 on EOF before any byte, or the partial count when the
    /// peer closed mid-frame.
    pub async fn read_eq(&mut self, n: usize, buf: &mut Buffer) -> io::Result<usize> {
        if n > buf.free() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "read larger than buffer space",
            ));
        }
        let mut got = 0;
        while got < n {
            let read = self.stream.read(&mut buf.writable()[..n - got]).await?;
            if read == 0 {
                break;
            }
            buf.commit(read);
            got += read;
        }
        Ok(got)
    }

    /// Write exactly `n` bytes from the buffer's readable region.
    pub async fn write_eq(&mut self, n: usize, buf: &mut Buffer) -> io::Result<usize> {
        write_exact(&mut self.stream, n, buf).await
    }

    /// Borrowed read/write halves for the full-duplex relay phase.
    pub fn split_mut(&mut self) -> (ReadHalf<'_>, WriteHalf<'_>) {
        self.stream.split()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("peer", &self.peer).finish()
    }
}
