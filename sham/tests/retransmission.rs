//! Sender timeout and retry behaviour against a scripted raw peer.
//!
//! The peer is a bare [`Socket`] that completes the handshake by hand and
//! then decides, datagram by datagram, whether to acknowledge.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

use sham::{
    config::{Config, SERVER_ISN},
    connection::{ConnError, Connection},
    event_log::EventLog,
    packet::{Flags, Segment},
    socket::Socket,
    state::ConnectionState,
};

fn test_config() -> Config {
    Config::default()
        .with_rto(Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(10))
        .with_idle_poll(Duration::from_millis(100))
}

async fn bind_loopback() -> (Socket, SocketAddr) {
    let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = socket.local_addr;
    (socket, addr)
}

/// Play the passive side of the handshake by hand; returns the client address.
async fn raw_accept(peer: &Socket) -> SocketAddr {
    let (syn, client) = peer.recv_from().await.unwrap();
    assert!(syn.has_exact_flags(Flags::SYN));
    let syn_ack = Segment::control(
        SERVER_ISN,
        syn.header.seq_num + 1,
        Flags::SYN | Flags::ACK,
        u16::MAX,
    );
    peer.send_to(&syn_ack, client).await.unwrap();
    let (ack, _) = peer.recv_from().await.unwrap();
    assert!(ack.has_exact_flags(Flags::ACK));
    client
}

fn ack_for(next_expected: u32) -> Segment {
    Segment::control(0, next_expected, Flags::ACK, u16::MAX)
}

#[tokio::test]
async fn withheld_ack_triggers_exactly_one_identical_retransmission() {
    let (peer, peer_addr) = bind_loopback().await;
    let (client_socket, _) = bind_loopback().await;
    let (events, recorder) = EventLog::memory();

    let client_task = tokio::spawn(async move {
        let mut conn = Connection::connect(client_socket, peer_addr, test_config(), events).await?;
        let data = vec![0x5a_u8; 300];
        conn.send_stream(data.as_slice()).await
    });

    let client = raw_accept(&peer).await;

    let (first, _) = peer.recv_from().await.unwrap();
    assert_eq!(first.header.seq_num, 101);
    assert_eq!(first.payload.len(), 300);
    let sent_at = Instant::now();

    // No ACK: the same segment must come back after one RTO.
    let (again, _) = peer.recv_from().await.unwrap();
    assert!(sent_at.elapsed() >= Duration::from_millis(80));
    assert_eq!(again, first);

    peer.send_to(&ack_for(401), client).await.unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(5), client_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.retransmissions, 1);
    assert_eq!(stats.segments_sent, 1);
    assert_eq!(recorder.count("TIMEOUT SEQ=101"), 1);
    assert_eq!(recorder.count("RETX DATA SEQ=101 LEN=300"), 1);

    let extra = peer
        .recv_until(Instant::now() + Duration::from_millis(200))
        .await
        .unwrap();
    assert!(extra.is_none(), "nothing more after the ACK: {extra:?}");
}

#[tokio::test]
async fn only_expired_segments_are_retransmitted() {
    let (peer, peer_addr) = bind_loopback().await;
    let (client_socket, _) = bind_loopback().await;

    let client_task = tokio::spawn(async move {
        let mut conn =
            Connection::connect(client_socket, peer_addr, test_config(), EventLog::disabled())
                .await?;
        let data = vec![1u8; 3 * 1024];
        conn.send_stream(data.as_slice()).await
    });

    let client = raw_accept(&peer).await;
    for expected in [101, 1125, 2149] {
        let (seg, _) = peer.recv_from().await.unwrap();
        assert_eq!(seg.header.seq_num, expected);
    }
    // Acknowledge the first two; only the third may time out.
    peer.send_to(&ack_for(2149), client).await.unwrap();

    let (retx, _) = peer.recv_from().await.unwrap();
    assert_eq!(retx.header.seq_num, 2149);
    peer.send_to(&ack_for(3173), client).await.unwrap();

    let stats = client_task.await.unwrap().unwrap();
    assert_eq!(stats.retransmissions, 1);
}

/// After `max_retries` retransmissions without an ACK the sender gives up,
/// closes the connection and sends nothing more.
#[tokio::test]
async fn retries_are_exhausted_after_max_retransmissions() {
    let (peer, peer_addr) = bind_loopback().await;
    let (client_socket, _) = bind_loopback().await;
    let config = test_config()
        .with_rto(Duration::from_millis(50))
        .with_max_retries(3);

    let client_task = tokio::spawn(async move {
        let mut conn = Connection::connect(client_socket, peer_addr, config, EventLog::disabled())
            .await
            .unwrap();
        let data = vec![9u8; 100];
        let result = conn.send_stream(data.as_slice()).await;
        (result, conn.state)
    });

    raw_accept(&peer).await;

    let (result, state) = tokio::time::timeout(Duration::from_secs(5), client_task)
        .await
        .unwrap()
        .unwrap();
    assert!(
        matches!(
            result,
            Err(ConnError::RetriesExhausted {
                seq: 101,
                retries: 3
            })
        ),
        "got {result:?}"
    );
    assert_eq!(state, ConnectionState::Closed);

    // One original transmission plus three retransmissions, then silence.
    let mut copies = 0;
    while let Some((seg, _)) = peer
        .recv_until(Instant::now() + Duration::from_millis(200))
        .await
        .unwrap()
    {
        assert_eq!(seg.header.seq_num, 101);
        copies += 1;
    }
    assert_eq!(copies, 4);
}
