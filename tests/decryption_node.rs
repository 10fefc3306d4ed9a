//! End-to-end tests against a decryption-mode server: inter-node
//! negotiation, authentication, and the SOCKS5 dialogue through the
//! encrypted link.

mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use tunnel_proxy_rs::error::Result;
use tunnel_proxy_rs::resolver::Resolve;

use common::{
    decryption_ini, spawn_echo_destination, start_server, start_server_with_resolver, PeerLink,
    TEST_PASS, TEST_USER,
};

#[tokio::test]
async fn socks5_connect_by_ipv4_reaches_the_destination() {
    let (_server, addr) = start_server(&decryption_ini(2, 120)).await;
    let destination = spawn_echo_destination().await;

    let mut link = PeerLink::negotiate(addr, TEST_USER, TEST_PASS).await;

    // method negotiation: offer "no auth" only
    link.send_encrypted(&[0x05, 0x01, 0x00]).await;
    assert_eq!(link.recv_decrypted(2).await, vec![0x05, 0x00]);

    // CONNECT 127.0.0.1:<echo port>
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&Ipv4Addr::LOCALHOST.octets());
    request.extend_from_slice(&destination.port().to_be_bytes());
    link.send_encrypted(&request).await;

    let mut expected = vec![0x05, 0x00, 0x00, 0x01];
    expected.extend_from_slice(&Ipv4Addr::LOCALHOST.octets());
    expected.extend_from_slice(&destination.port().to_be_bytes());
    assert_eq!(link.recv_decrypted(10).await, expected);

    // relay phase: bytes echo back through the encrypted link
    link.send_encrypted(b"ping through the tunnel").await;
    assert_eq!(
        link.recv_decrypted(23).await,
        b"ping through the tunnel".to_vec()
    );
}

#[tokio::test]
async fn socks5_connect_by_domain_uses_the_resolver() {
    struct StaticResolver;

    #[async_trait]
    impl Resolve for StaticResolver {
        async fn resolve(&self, host: &str) -> Result<Ipv4Addr> {
            assert_eq!(host, "echo.internal");
            Ok(Ipv4Addr::LOCALHOST)
        }
    }

    let (_server, addr) =
        start_server_with_resolver(&decryption_ini(2, 120), Box::new(StaticResolver)).await;
    let destination = spawn_echo_destination().await;

    let mut link = PeerLink::negotiate(addr, TEST_USER, TEST_PASS).await;
    link.send_encrypted(&[0x05, 0x01, 0x00]).await;
    assert_eq!(link.recv_decrypted(2).await, vec![0x05, 0x00]);

    let name = b"echo.internal";
    let mut request = vec![0x05, 0x01, 0x00, 0x03, name.len() as u8];
    request.extend_from_slice(name);
    request.extend_from_slice(&destination.port().to_be_bytes());
    link.send_encrypted(&request).await;

    let reply = link.recv_decrypted(10).await;
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    assert_eq!(&reply[4..8], &Ipv4Addr::LOCALHOST.octets());

    link.send_encrypted(b"hello").await;
    assert_eq!(link.recv_decrypted(5).await, b"hello".to_vec());
}

#[tokio::test]
async fn wrong_password_closes_the_tunnel() {
    let (server, addr) = start_server(&decryption_ini(2, 120)).await;

    let mut link = PeerLink::negotiate(addr, TEST_USER, "not-the-password").await;
    assert!(
        timeout(Duration::from_secs(5), link.reached_eof())
            .await
            .expect("server should close the link")
    );

    // give the driving task a moment to drop the tunnel
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.registry().sweep(Duration::from_secs(3600));
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn wrong_username_closes_the_tunnel() {
    let (_server, addr) = start_server(&decryption_ini(2, 120)).await;
    let mut link = PeerLink::negotiate(addr, "somebody-else", TEST_PASS).await;
    assert!(
        timeout(Duration::from_secs(5), link.reached_eof())
            .await
            .expect("server should close the link")
    );
}

#[tokio::test]
async fn unsupported_ipv6_target_fails_without_a_reply() {
    let (_server, addr) = start_server(&decryption_ini(2, 120)).await;

    let mut link = PeerLink::negotiate(addr, TEST_USER, TEST_PASS).await;
    link.send_encrypted(&[0x05, 0x01, 0x00]).await;
    assert_eq!(link.recv_decrypted(2).await, vec![0x05, 0x00]);

    let mut request = vec![0x05, 0x01, 0x00, 0x04];
    request.extend_from_slice(&[0u8; 16]);
    request.extend_from_slice(&443u16.to_be_bytes());
    link.send_encrypted(&request).await;

    // no reply: the next observable event is the tunnel closing
    assert!(
        timeout(Duration::from_secs(5), link.reached_eof())
            .await
            .expect("server should close the link")
    );
}

#[tokio::test]
async fn rejected_socks_method_gets_the_0xff_reply() {
    let (_server, addr) = start_server(&decryption_ini(2, 120)).await;

    let mut link = PeerLink::negotiate(addr, TEST_USER, TEST_PASS).await;
    // offer only username/password auth
    link.send_encrypted(&[0x05, 0x01, 0x02]).await;
    assert_eq!(link.recv_decrypted(2).await, vec![0x05, 0xff]);
    assert!(
        timeout(Duration::from_secs(5), link.reached_eof())
            .await
            .expect("server should close the link")
    );
}

#[tokio::test]
async fn bad_rsa_request_marker_closes_the_link() {
    let (_server, addr) = start_server(&decryption_ini(2, 120)).await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x0d, 0x0a]).await.unwrap();

    let mut byte = [0u8; 1];
    let eof = timeout(Duration::from_secs(5), async {
        matches!(
            tokio::io::AsyncReadExt::read(&mut stream, &mut byte).await,
            Ok(0) | Err(_)
        )
    })
    .await
    .expect("server should close the link");
    assert!(eof);
}
