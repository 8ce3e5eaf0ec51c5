//! Integration tests for the broadcast server and viewer subscription
//!
//! Every test runs a real server on a loopback port and talks to it with
//! `reqwest` for uploads and `tokio-tungstenite` for viewers.

use framecast_broadcast::*;
use framecast_core::{
    encode_frame, CycleOutcome, Frame, FrameMailbox, HttpTransport, RelayUplink,
};
use framecast_diagnostics::ConnectionState;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_test::assert_ok;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> RunningServer {
    start_server_with(ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    })
    .await
}

async fn start_server_with(config: ServerConfig) -> RunningServer {
    framecast_diagnostics::init_test_logging();
    assert_ok!(BroadcastServer::bind(config).await)
}

async fn connect_viewer(server: &RunningServer) -> Viewer {
    let url = format!("ws://{}/ws", server.local_addr());
    let (viewer, _response) = assert_ok!(connect_async(url).await);
    viewer
}

async fn upload(server: &RunningServer, body: Vec<u8>) -> (u16, String) {
    let url = format!("http://{}/upload-frame", server.local_addr());
    let response = assert_ok!(
        reqwest::Client::new()
            .post(url)
            .header("content-type", "application/octet-stream")
            .body(body)
            .send()
            .await
    );
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

async fn next_binary(viewer: &mut Viewer) -> Vec<u8> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), viewer.next())
            .await
            .expect("no message in time")
            .expect("viewer stream ended")
            .unwrap();
        if let Message::Binary(data) = message {
            return data;
        }
    }
}

async fn wait_for_viewers(server: &RunningServer, count: usize) {
    for _ in 0..100 {
        if server.connection_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} viewers, have {}",
        count,
        server.connection_count()
    );
}

fn encoded(width: u32, height: u32, fill: u8) -> Vec<u8> {
    let frame = Frame::new(width, height, vec![fill; (width * height * 4) as usize]).unwrap();
    encode_frame(&frame).to_vec()
}

// ============================================================================
// UPLOAD ENDPOINT TESTS
// ============================================================================

#[tokio::test]
async fn test_short_upload_is_rejected() {
    let server = start_server().await;

    let (status, body) = upload(&server, vec![0; 7]).await;
    assert_eq!(status, 400);
    assert_eq!(body, "invalid frame");
    assert_eq!(server.stats().rejected(), 1);
    assert_eq!(server.stats().uploads(), 0);
}

#[tokio::test]
async fn test_header_only_upload_is_accepted() {
    let server = start_server().await;

    let (status, body) = upload(&server, vec![0; 8]).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");
    assert_eq!(server.stats().uploads(), 1);
}

#[tokio::test]
async fn test_oversized_upload_hits_body_limit() {
    let server = start_server_with(ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_upload_bytes: 64,
        ..Default::default()
    })
    .await;

    let (status, _) = upload(&server, encoded(4, 4, 1)).await;
    assert_eq!(status, 413);
    assert_eq!(server.stats().uploads(), 0);
}

#[tokio::test]
async fn test_mismatched_upload_is_still_forwarded() {
    let server = start_server().await;
    let mut viewer = connect_viewer(&server).await;
    wait_for_viewers(&server, 1).await;

    // Header claims 2x2 (16 pixel bytes) but carries 5
    let mut payload = vec![2, 0, 0, 0, 2, 0, 0, 0];
    payload.extend_from_slice(&[9; 5]);

    let (status, _) = upload(&server, payload.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(next_binary(&mut viewer).await, payload);
    assert_eq!(server.stats().mismatched(), 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_server().await;
    let url = format!("http://{}/health", server.local_addr());

    let response = assert_ok!(reqwest::get(url).await);
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

// ============================================================================
// FAN-OUT TESTS
// ============================================================================

#[tokio::test]
async fn test_viewers_receive_identical_payloads() {
    let server = start_server().await;
    let mut first = connect_viewer(&server).await;
    let mut second = connect_viewer(&server).await;
    let mut third = connect_viewer(&server).await;
    wait_for_viewers(&server, 3).await;

    let payload = encoded(3, 2, 7);
    let (status, _) = upload(&server, payload.clone()).await;
    assert_eq!(status, 200);

    assert_eq!(next_binary(&mut first).await, payload);
    assert_eq!(next_binary(&mut second).await, payload);
    assert_eq!(next_binary(&mut third).await, payload);
}

#[tokio::test]
async fn test_departed_viewer_does_not_affect_others() {
    let server = start_server().await;
    let mut first = connect_viewer(&server).await;
    let mut second = connect_viewer(&server).await;
    let mut leaving = connect_viewer(&server).await;
    wait_for_viewers(&server, 3).await;

    assert_ok!(leaving.close(None).await);
    drop(leaving);
    wait_for_viewers(&server, 2).await;

    let payload = encoded(2, 2, 3);
    let (status, _) = upload(&server, payload.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(next_binary(&mut first).await, payload);
    assert_eq!(next_binary(&mut second).await, payload);
}

#[tokio::test]
async fn test_viewer_text_is_ignored() {
    let server = start_server().await;
    let mut viewer = connect_viewer(&server).await;
    wait_for_viewers(&server, 1).await;

    assert_ok!(viewer.send(Message::Text("hello".to_string())).await);

    let payload = encoded(1, 1, 5);
    upload(&server, payload.clone()).await;
    assert_eq!(next_binary(&mut viewer).await, payload);
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_in_process_broadcast() {
    let server = start_server().await;
    let mut viewer = connect_viewer(&server).await;
    wait_for_viewers(&server, 1).await;

    let report = server.broadcast(&bytes::Bytes::from(encoded(1, 1, 8)));
    assert_eq!(report.delivered, 1);
    assert_eq!(next_binary(&mut viewer).await, encoded(1, 1, 8));
}

#[tokio::test]
async fn test_shutdown_closes_viewers() {
    let server = start_server().await;
    let mut viewer = connect_viewer(&server).await;
    wait_for_viewers(&server, 1).await;

    assert_ok!(server.shutdown().await);

    let next = tokio::time::timeout(Duration::from_secs(2), viewer.next())
        .await
        .expect("viewer not closed in time");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

// ============================================================================
// SUBSCRIBER TESTS
// ============================================================================

#[tokio::test]
async fn test_subscriber_retries_dead_endpoint_at_fixed_delay() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let delay = Duration::from_millis(50);
    let (subscriber, mut events) = assert_ok!(FrameSubscriber::spawn(SubscriberConfig {
        url: format!("ws://{}/ws", addr),
        reconnect_delay: delay,
        event_capacity: 16,
    }));

    let mut states = Vec::new();
    while states.len() < 6 {
        match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Some(SubscriberEvent::StateChanged(state))) => states.push((state, Instant::now())),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    let kinds: Vec<_> = states.iter().map(|(state, _)| *state).collect();
    assert_eq!(
        kinds,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
        ]
    );

    // Each new attempt waits out the delay after the previous failure
    let gap = states[2].1.duration_since(states[1].1);
    assert!(gap >= delay - Duration::from_millis(5), "gap was {:?}", gap);
    assert!(subscriber.info().attempts >= 3);
}

#[tokio::test]
async fn test_subscriber_reconnects_after_server_restart() {
    let server = start_server().await;
    let addr = server.local_addr();
    let (subscriber, mut events) = assert_ok!(FrameSubscriber::spawn(SubscriberConfig {
        url: format!("ws://{}/ws", addr),
        reconnect_delay: Duration::from_millis(50),
        event_capacity: 16,
    }));

    wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_ok!(server.shutdown().await);
    wait_for_state(&mut events, ConnectionState::Reconnecting).await;

    let restarted = start_server_with(ServerConfig {
        bind_addr: addr,
        ..Default::default()
    })
    .await;
    wait_for_state(&mut events, ConnectionState::Connected).await;
    wait_for_viewers(&restarted, 1).await;
    assert!(subscriber.info().attempts >= 2);
}

async fn wait_for_state(
    events: &mut tokio::sync::mpsc::Receiver<SubscriberEvent>,
    wanted: ConnectionState,
) {
    loop {
        match tokio::time::timeout(Duration::from_secs(3), events.recv()).await {
            Ok(Some(SubscriberEvent::StateChanged(state))) if state == wanted => return,
            Ok(Some(_)) => continue,
            other => panic!("waiting for {:?}, got {:?}", wanted, other),
        }
    }
}

// ============================================================================
// END TO END TESTS
// ============================================================================

#[tokio::test]
async fn test_relay_to_subscriber_end_to_end() {
    let server = start_server().await;
    let (subscriber, mut events) = assert_ok!(FrameSubscriber::spawn(SubscriberConfig {
        url: format!("ws://{}/ws", server.local_addr()),
        ..Default::default()
    }));
    wait_for_state(&mut events, ConnectionState::Connected).await;
    wait_for_viewers(&server, 1).await;

    let mailbox = Arc::new(FrameMailbox::new());
    let transport = assert_ok!(HttpTransport::new(
        format!("http://{}/upload-frame", server.local_addr()),
        Duration::from_secs(2),
    ));
    let mut relay = RelayUplink::new(mailbox.reader(), transport, Duration::from_millis(100));

    let pixels: Vec<u8> = (0..16).collect();
    assert_ok!(mailbox.publish(Frame::new(2, 2, pixels.clone()).unwrap()));
    assert_eq!(relay.publish_cycle(), CycleOutcome::Dispatched(24));

    let received = loop {
        match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Some(SubscriberEvent::Frame(data))) => break data,
            Ok(Some(_)) => continue,
            other => panic!("no frame received: {:?}", other),
        }
    };

    assert_eq!(&received[..8], &[2, 0, 0, 0, 2, 0, 0, 0]);
    assert_eq!(&received[8..], &pixels[..]);
    assert_eq!(subscriber.info().messages_received, 1);
    assert_eq!(subscriber.info().bytes_received, 24);
}
