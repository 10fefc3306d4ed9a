use proptest::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use super::{Buffer, Endpoint};

#[test]
fn buffer_cursors_track_reads_and_writes() {
    let mut buf = Buffer::with_capacity(8);
    assert!(buf.is_empty());
    assert_eq!(buf.free(), 8);

    assert_eq!(buf.push(b"abcd"), 4);
    assert_eq!(buf.len(), 4);
    assert_eq!(buf.readable(), b"abcd");

    buf.consume(2);
    assert_eq!(buf.readable(), b"cd");
    assert_eq!(buf.free(), 4);

    assert_eq!(buf.push(b"efghij"), 4);
    assert!(buf.is_full());
    assert_eq!(buf.readable(), b"cdefgh");

    buf.clear();
    assert!(buf.is_empty());
    assert_eq!(buf.free(), 8);
}

#[test]
fn buffer_commit_after_external_write() {
    let mut buf = Buffer::with_capacity(4);
    buf.writable()[..3].copy_from_slice(b"xyz");
    buf.commit(3);
    assert_eq!(buf.readable(), b"xyz");
}

#[test]
#[should_panic]
fn buffer_consume_past_payload_panics() {
    let mut buf = Buffer::with_capacity(4);
    buf.push(b"ab");
    buf.consume(3);
}

#[test]
#[should_panic]
fn buffer_commit_past_capacity_panics() {
    let mut buf = Buffer::with_capacity(2);
    buf.commit(3);
}

proptest! {
    // 0 <= start <= cur <= capacity after any operation sequence
    #[test]
    fn buffer_invariant_holds(ops in proptest::collection::vec((0u8..4, 0usize..16), 0..64)) {
        let mut buf = Buffer::with_capacity(32);
        for (op, n) in ops {
            match op {
                0 => {
                    let data = vec![0xa5u8; n];
                    buf.push(&data);
                }
                1 => {
                    let n = n.min(buf.len());
                    buf.consume(n);
                }
                2 => {
                    let n = n.min(buf.free());
                    buf.commit(n);
                }
                _ => buf.clear(),
            }
            prop_assert!(buf.len() + buf.free() <= buf.capacity());
            prop_assert_eq!(buf.readable().len(), buf.len());
        }
    }
}

#[tokio::test]
async fn read_eq_collects_exactly_n_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let writer = tokio::spawn(async move {
        let (mut peer, _) = listener.accept().await.unwrap();
        // two small writes, the reader must still collect one frame
        peer.write_all(b"hel").await.unwrap();
        peer.write_all(b"lo!").await.unwrap();
        peer
    });

    let mut endpoint = Endpoint::connect("127.0.0.1", addr.port()).await.unwrap();
    let mut buf = Buffer::with_capacity(16);
    let n = endpoint.read_eq(6, &mut buf).await.unwrap();
    assert_eq!(n, 6);
    assert_eq!(buf.readable(), b"hello!");
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn read_eq_reports_partial_count_on_mid_frame_eof() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut peer, _) = listener.accept().await.unwrap();
        peer.write_all(b"abc").await.unwrap();
        // drop closes the connection mid-frame
    });

    let mut endpoint = Endpoint::connect("127.0.0.1", addr.port()).await.unwrap();
    let mut buf = Buffer::with_capacity(16);
    let n = endpoint.read_eq(8, &mut buf).await.unwrap();
    assert_eq!(n, 3);
}

#[tokio::test]
async fn read_eq_returns_zero_on_immediate_eof() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (peer, _) = listener.accept().await.unwrap();
        drop(peer);
    });

    let mut endpoint = Endpoint::connect("127.0.0.1", addr.port()).await.unwrap();
    let mut buf = Buffer::with_capacity(16);
    let n = endpoint.read_eq(4, &mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn write_eq_consumes_the_payload() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let reader = tokio::spawn(async move {
        let (peer, _) = listener.accept().await.unwrap();
        let mut endpoint = Endpoint::new(peer, "client".to_string());
        let mut buf = Buffer::with_capacity(16);
        let n = endpoint.read_eq(5, &mut buf).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(buf.readable(), b"12345");
    });

    let mut endpoint = Endpoint::connect("127.0.0.1", addr.port()).await.unwrap();
    let mut buf = Buffer::with_capacity(16);
    buf.push(b"12345");
    let n = endpoint.write_eq(5, &mut buf).await.unwrap();
    assert_eq!(n, 5);
    assert!(buf.is_empty());
    reader.await.unwrap();
}
