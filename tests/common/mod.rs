//! Shared helpers for the end-to-end tests: spawning servers on
//! ephemeral ports, a scripted encryption-node peer, and a local echo
//! destination.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tunnel_proxy_rs::config::Settings;
use tunnel_proxy_rs::crypto::aes::{CipherCtx, KeyIv};
use tunnel_proxy_rs::crypto::rsa;
use tunnel_proxy_rs::protocol::auth::encode_credentials;
use tunnel_proxy_rs::resolver::Resolve;
use tunnel_proxy_rs::server::Server;

pub const TEST_USER: &str = "u";
pub const TEST_PASS: &str = "p";

/// INI text for a decryption node on an ephemeral port.
pub fn decryption_ini(statistic_interval: u64, max_idle_time: u64) -> String {
    format!(
        "\
[proxy]
local_host = 127.0.0.1
local_port = 0
mode = decryption
statistic_interval = {}
max_idle_time = {}

[auth]
username = {}
password = {}
",
        statistic_interval, max_idle_time, TEST_USER, TEST_PASS
    )
}

/// INI text for an encryption node targeting `remote`.
pub fn encryption_ini(remote: SocketAddr) -> String {
    format!(
        "\
[proxy]
local_host = 127.0.0.1
local_port = 0
mode = encryption
remote_host = {}
remote_port = {}

[auth]
username = {}
password = {}
",
        remote.ip(),
        remote.port(),
        TEST_USER,
        TEST_PASS
    )
}

/// Bind a server from INI text and run its accept loop in the
/// background. Returns the server and its bound address.
pub async fn start_server(ini: &str) -> (Arc<Server>, SocketAddr) {
    let settings = Settings::from_ini_str(ini).expect("test settings must parse");
    let server = Server::new(settings, None).expect("server setup");
    serve_in_background(server).await
}

/// Same with a scripted resolver.
pub async fn start_server_with_resolver(
    ini: &str,
    resolver: Box<dyn Resolve>,
) -> (Arc<Server>, SocketAddr) {
    let settings = Settings::from_ini_str(ini).expect("test settings must parse");
    let server = Server::with_resolver(settings, None, resolver).expect("server setup");
    serve_in_background(server).await
}

async fn serve_in_background(server: Arc<Server>) -> (Arc<Server>, SocketAddr) {
    let listener = server.bind().await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let task_server = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = task_server.serve(listener).await;
    });
    (server, addr)
}

/// Destination that echoes every byte back, one connection at a time.
pub async fn spawn_echo_destination() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("echo bind");
    let addr = listener.local_addr().expect("echo addr");
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// A scripted encryption-node peer: performs the inter-node
/// negotiation against a decryption server and keeps the two stream
/// ciphers for the encrypted phases that follow.
pub struct PeerLink {
    pub stream: TcpStream,
    enc: CipherCtx,
    dec: CipherCtx,
}

impl PeerLink {
    /// Run RSA delivery and AES key exchange, then send the credential
    /// frame. Leaves the link ready for the SOCKS5 dialogue.
    pub async fn negotiate(addr: SocketAddr, username: &str, password: &str) -> Self {
        let mut link = Self::negotiate_keys_only(addr).await;
        link.send_encrypted(&encode_credentials(username, password))
            .await;
        link
    }

    /// Run only the cleartext negotiation (RSA + AES + ACK).
    pub async fn negotiate_keys_only(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.expect("connect");

        stream.write_all(&[0x0f, 0x0a]).await.expect("marker");

        let mut head = [0u8; 5];
        stream.read_exact(&mut head).await.expect("pubkey head");
        assert_eq!(head[0], 0x0e, "unexpected pubkey response type");
        let len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]) as usize;
        assert!(len > 0);
        let mut pem = vec![0u8; len];
        stream.read_exact(&mut pem).await.expect("pubkey body");
        let pem = String::from_utf8(pem).expect("pem utf8");

        let send_material = KeyIv::generate();
        let recv_material = KeyIv::generate();
        let mut blob = Vec::with_capacity(96);
        blob.extend_from_slice(send_material.key());
        blob.extend_from_slice(send_material.iv());
        blob.extend_from_slice(recv_material.key());
        blob.extend_from_slice(recv_material.iv());

        let ciphertext = rsa::encrypt(&pem, &blob).expect("rsa encrypt");
        stream
            .write_all(&(ciphertext.len() as u32).to_be_bytes())
            .await
            .expect("key frame len");
        stream.write_all(&ciphertext).await.expect("key frame");

        let mut ack = [0u8; 1];
        stream.read_exact(&mut ack).await.expect("ack");
        assert_eq!(ack[0], 0x0f, "bad ack byte");

        Self {
            stream,
            enc: CipherCtx::encryptor(&send_material).expect("enc ctx"),
            dec: CipherCtx::decryptor(&recv_material).expect("dec ctx"),
        }
    }

    /// Encrypt and send one chunk on the link.
    pub async fn send_encrypted(&mut self, data: &[u8]) {
        let mut buf = data.to_vec();
        self.enc.apply(&mut buf);
        self.stream.write_all(&buf).await.expect("encrypted write");
    }

    /// Read exactly `n` bytes and decrypt them.
    pub async fn recv_decrypted(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).await.expect("encrypted read");
        self.dec.apply(&mut buf);
        buf
    }

    /// True once the server has closed the link (EOF or reset).
    pub async fn reached_eof(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.stream.read(&mut byte).await, Ok(0) | Err(_))
    }
}
