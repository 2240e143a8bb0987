//! End-to-end listener/client scenarios over the loopback interface.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use wsock::{Data, Event, Server, ServerEvent, Socket};

async fn spawn_server(protocols: Option<Vec<String>>) -> (Server, u16) {
    let mut server = Server::new(protocols);
    server.listen(0, "127.0.0.1").await.unwrap();
    match server.next_event().await {
        Some(ServerEvent::Listening) => {}
        other => panic!("expected listening event, got {other:?}"),
    }
    let port = server.address().unwrap().port();
    (server, port)
}

async fn expect_connection(server: &mut Server) -> Socket {
    match timeout(Duration::from_secs(5), server.next_event()).await {
        Ok(Some(ServerEvent::Connection(socket))) => socket,
        other => panic!("expected connection event, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_round_trip_and_normal_close() {
    let (mut server, port) = spawn_server(None).await;

    let mut client = wsock::connect(port, None);
    assert!(client.connecting());

    let mut accepted = expect_connection(&mut server).await;
    assert_eq!(accepted.remote_address(), "127.0.0.1");
    assert!(accepted.remote_port() != 0);
    assert!(server.connections() >= 1);

    match timeout(Duration::from_secs(5), client.next_event()).await {
        Ok(Some(Event::Connect)) => {}
        other => panic!("expected connect event, got {other:?}"),
    }
    assert!(!client.connecting());

    client.write(Bytes::from_static(b"hello wsock"));
    match timeout(Duration::from_secs(5), accepted.next_event()).await {
        Ok(Some(Event::Data(Data::Binary(bytes)))) => assert_eq!(&bytes[..], b"hello wsock"),
        other => panic!("expected data event, got {other:?}"),
    }
    assert_eq!(accepted.bytes_read(), 11);

    // Echo back the other way.
    accepted.write(Bytes::from_static(b"right back"));
    match timeout(Duration::from_secs(5), client.next_event()).await {
        Ok(Some(Event::Data(Data::Binary(bytes)))) => assert_eq!(&bytes[..], b"right back"),
        other => panic!("expected data event, got {other:?}"),
    }

    // A client-initiated normal closure reaches the server as a single
    // close event with no preceding error.
    client.destroy(None);
    match client.next_event().await {
        Some(Event::Close) => {}
        other => panic!("expected close event, got {other:?}"),
    }
    assert!(client.next_event().await.is_none());

    match timeout(Duration::from_secs(5), accepted.next_event()).await {
        Ok(Some(Event::Close)) => {}
        other => panic!("expected silent close, got {other:?}"),
    }
    assert!(accepted.next_event().await.is_none());
    assert!(accepted.destroyed());

    server.close().await.unwrap();
    match server.next_event().await {
        Some(ServerEvent::Close) => {}
        other => panic!("expected server close event, got {other:?}"),
    }
    assert!(!server.listening());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subprotocol_negotiation() {
    let (mut server, port) = spawn_server(Some(vec!["chat".to_string()])).await;

    let mut client = Socket::new();
    client.connect(port, Some("127.0.0.1"), false, &["chat"]);

    let _accepted = expect_connection(&mut server).await;
    match timeout(Duration::from_secs(5), client.next_event()).await {
        Ok(Some(Event::Connect)) => {}
        other => panic!("expected connect event, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_plain_http_gets_cors_200_and_no_connection() {
    let (mut server, port) = spawn_server(None).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    let lower = response.to_lowercase();
    assert!(lower.contains("access-control-allow-origin: *"), "got: {response}");
    assert!(
        lower.contains("access-control-allow-methods: get,head,options"),
        "got: {response}"
    );
    assert!(response.ends_with("\r\n\r\n"), "expected empty body: {response}");

    // No connection event for a plain request.
    assert!(
        timeout(Duration::from_millis(300), server.next_event())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_upgrade_is_rejected_without_connection() {
    let (mut server, port) = spawn_server(None).await;

    // Upgrade-shaped request with no Sec-WebSocket-Key.
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(
            b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\n\
              Upgrade: websocket\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .await
        .unwrap();

    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]).to_string();
    assert!(response.starts_with("HTTP/1.1 400"), "got: {response}");

    assert!(
        timeout(Duration::from_millis(300), server.next_event())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_dial_surfaces_handshake_error_then_close() {
    // Bind and immediately close a listener to get a dead port.
    let (mut server, port) = spawn_server(None).await;
    server.close().await.unwrap();

    let mut client = wsock::connect(port, None);

    match timeout(Duration::from_secs(5), client.next_event()).await {
        Ok(Some(Event::Error(err))) => {
            assert!(matches!(err, wsock::Error::Handshake(_)), "got {err:?}");
        }
        other => panic!("expected handshake error, got {other:?}"),
    }

    // The socket then self-destroys: an abnormal-closure error and the
    // terminal close.
    let mut saw_close = false;
    while let Some(event) = client.next_event().await {
        if matches!(event, Event::Close) {
            saw_close = true;
        }
    }
    assert!(saw_close);
    assert!(client.destroyed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_connections_drops_excess_accepts() {
    let (mut server, port) = spawn_server(None).await;
    server.set_max_connections(1);

    let mut first = wsock::connect(port, None);
    let _accepted = expect_connection(&mut server).await;
    match timeout(Duration::from_secs(5), first.next_event()).await {
        Ok(Some(Event::Connect)) => {}
        other => panic!("expected connect event, got {other:?}"),
    }

    // The second dial lands while the first connection is held and is
    // dropped before any upgrade happens.
    let mut second = wsock::connect(port, None);
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), second.next_event())
        .await
        .expect("second socket should fail promptly")
    {
        events.push(event);
    }
    assert!(
        events.iter().all(|event| !matches!(event, Event::Connect)),
        "capped connection must not complete: {events:?}"
    );
    assert!(matches!(events.last(), Some(Event::Close)));
}
