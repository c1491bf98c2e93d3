//! Integration tests for tunnel lifecycle
//!
//! These tests drive real TCP listeners through the forwarding core with an
//! in-memory session transport standing in for the SSH client.

use sshfwd_control::{ForwardConfig, ForwardHandler, Session, TunnelState};
use sshfwd_proto::ForwardRequest;
use sshfwd_router::{ListenerAddr, ListenerRegistry, ProxyRegistry};
use sshfwd_transport::memory::{MemoryTransport, OpenedChannel};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn tcp_addr(addr: &ListenerAddr) -> SocketAddr {
    match addr {
        ListenerAddr::Tcp(addr) => *addr,
        other => panic!("expected TCP listener, got {:?}", other),
    }
}

struct Harness {
    handler: ForwardHandler,
    session: Arc<Session<MemoryTransport>>,
    messages: mpsc::Receiver<String>,
    opened: mpsc::UnboundedReceiver<OpenedChannel>,
}

fn harness(remote: &str) -> Harness {
    let handler = ForwardHandler::new(
        ForwardConfig::default(),
        ListenerRegistry::new(),
        ProxyRegistry::new(),
    );
    let (transport, opened) = MemoryTransport::new(remote);
    let (session, messages) = handler.session(transport);
    Harness {
        handler,
        session,
        messages,
        opened,
    }
}

/// Bytes survive the round trip through listener, relay and channel
#[tokio::test]
async fn test_relay_preserves_bytes() {
    init_tracing();
    let mut h = harness("192.0.2.10:40000");

    let tunnel = h
        .handler
        .open(&h.session, ForwardRequest::new("127.0.0.1", 0))
        .await
        .unwrap();
    let addr = tcp_addr(tunnel.addr());
    let run = tokio::spawn(tunnel.run());

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut channel = timeout(WAIT, h.opened.recv()).await.unwrap().unwrap();

    // The channel names the requested address, not the resolved one
    assert_eq!(channel.payload.addr, "127.0.0.1");
    assert_eq!(channel.payload.port, 0);
    assert_eq!(channel.payload.origin_addr, "127.0.0.1");
    assert_eq!(channel.payload.origin_port, 0);

    let upstream: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    let downstream: Vec<u8> = (0..=255u8).rev().cycle().take(150_000).collect();

    let (mut client_read, mut client_write) = client.split();
    let (mut chan_read, mut chan_write) = tokio::io::split(&mut channel.stream);

    let send_up = async {
        client_write.write_all(&upstream).await.unwrap();
    };
    let recv_up = async {
        let mut buf = vec![0u8; upstream.len()];
        chan_read.read_exact(&mut buf).await.unwrap();
        buf
    };
    let send_down = async {
        chan_write.write_all(&downstream).await.unwrap();
    };
    let recv_down = async {
        let mut buf = vec![0u8; downstream.len()];
        client_read.read_exact(&mut buf).await.unwrap();
        buf
    };

    let (_, received_up, _, received_down) =
        timeout(WAIT, async { tokio::join!(send_up, recv_up, send_down, recv_down) })
            .await
            .unwrap();
    assert_eq!(received_up, upstream);
    assert_eq!(received_down, downstream);

    h.session.close();
    let state = timeout(WAIT, run).await.unwrap().unwrap();
    assert_eq!(state, TunnelState::Closed);
}

/// A failed channel open only affects the connection that triggered it
#[tokio::test]
async fn test_channel_failure_is_isolated() {
    init_tracing();
    let mut h = harness("192.0.2.11:40000");

    let tunnel = h
        .handler
        .open(&h.session, ForwardRequest::new("127.0.0.1", 0))
        .await
        .unwrap();
    let addr = tcp_addr(tunnel.addr());
    let handle = tunnel.handle();
    let run = tokio::spawn(tunnel.run());

    let greeting = h.messages.recv().await.unwrap();
    assert!(greeting.starts_with("Connections being forwarded to"));

    h.session.transport().fail_next_opens(1);

    // First connection is dropped and the client is told why
    let mut rejected = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    let read = timeout(WAIT, rejected.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    let notice = timeout(WAIT, h.messages.recv()).await.unwrap().unwrap();
    assert_eq!(notice, "ssh: rejected: connect failed (mock)");

    // The listener keeps serving
    assert!(!handle.is_closed());
    let mut accepted = TcpStream::connect(addr).await.unwrap();
    let mut channel = timeout(WAIT, h.opened.recv()).await.unwrap().unwrap();
    accepted.write_all(b"still here").await.unwrap();
    let mut buf = [0u8; 10];
    channel.stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"still here");
    assert_eq!(h.session.transport().open_attempts(), 2);

    handle.close();
    timeout(WAIT, run).await.unwrap().unwrap();
}

/// Closing the listener withdraws it from both registries, exactly once
#[tokio::test]
async fn test_listener_close_unregisters() {
    init_tracing();
    let h = harness("192.0.2.12:40000");

    let tunnel = h
        .handler
        .open(&h.session, ForwardRequest::new("127.0.0.1", 0))
        .await
        .unwrap();
    let addr = tunnel.addr().clone();
    let handle = tunnel.handle();
    assert!(h.handler.listeners().contains(&addr));
    assert!(h.session.listeners().contains(&addr));

    let run = tokio::spawn(tunnel.run());
    handle.close();
    handle.close();
    timeout(WAIT, run).await.unwrap().unwrap();

    assert!(!h.handler.listeners().contains(&addr));
    assert!(!h.session.listeners().contains(&addr));

    // The port is free again
    tokio::net::TcpListener::bind(tcp_addr(&addr)).await.unwrap();

    // The session itself is unaffected
    assert!(!h.session.is_closed());
}

/// Tunnels of one session are independent of another session's tunnels
#[tokio::test]
async fn test_sessions_share_global_registry() {
    init_tracing();
    let listeners = ListenerRegistry::new();
    let handler = ForwardHandler::new(ForwardConfig::default(), listeners.clone(), ProxyRegistry::new());

    let (first, _first_messages) = handler.session(MemoryTransport::new("192.0.2.13:1").0);
    let (second, _second_messages) = handler.session(MemoryTransport::new("192.0.2.14:1").0);

    let mut runs = Vec::new();
    for session in [&first, &first, &second] {
        let tunnel = handler
            .open(session, ForwardRequest::new("127.0.0.1", 0))
            .await
            .unwrap();
        runs.push(tokio::spawn(tunnel.run()));
    }

    assert_eq!(listeners.len(), 3);
    assert_eq!(first.listeners().len(), 2);
    assert_eq!(second.listeners().len(), 1);
    for (addr, handle) in listeners.entries() {
        assert_eq!(handle.addr(), &addr);
    }

    first.close();
    let mut runs = runs.into_iter();
    for run in runs.by_ref().take(2) {
        timeout(WAIT, run).await.unwrap().unwrap();
    }

    assert_eq!(listeners.len(), 1);
    assert!(first.listeners().is_empty());
    assert_eq!(second.listeners().len(), 1);
    let entries = listeners.entries();
    let (_, survivor) = &entries[0];
    assert_eq!(survivor.session_id(), "192.0.2.14:1");

    second.close();
    for run in runs {
        timeout(WAIT, run).await.unwrap().unwrap();
    }
    assert!(listeners.is_empty());
}
