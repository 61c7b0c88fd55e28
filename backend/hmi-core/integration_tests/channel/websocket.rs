use crate::helpers::{FakeAdapter, Received, WAIT, closed_port, next_event};

use hmi_core::channel::{
    ChannelSettings, DeviceDetail, InboundEvent, OutboundEvent, Transport, WebSocketTransport,
};
use hmi_core::session::AdapterAddress;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

// ============================================================================
// WebSocketTransport against a live socket
// ============================================================================

fn localhost(port: u16) -> AdapterAddress {
    AdapterAddress::new("127.0.0.1", port).expect("valid address")
}

fn fast_retry(attempts: u32) -> ChannelSettings {
    ChannelSettings {
        namespace: "/api".to_string(),
        reconnection_attempts: attempts,
        initial_retry: Duration::from_millis(10),
        max_retry: Duration::from_millis(20),
    }
}

/// **VALUE**: A channel connects, delivers outbound events as JSON frames and parses inbound
/// frames into typed events.
///
/// **WHY THIS MATTERS**: This is the whole wire contract with an adapter. Everything the
/// session does rides on it.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - `connect` is not emitted once the handshake completes
/// - Events queued before the handshake are lost
/// - Frames are sent as binary or with the wrong argument layout
/// - Inbound camelCase payloads are not parsed
#[tokio::test]
async fn given_live_adapter_when_channel_opened_then_frames_flow_both_ways() {
    // GIVEN: A fake adapter and a channel opened against it
    let mut adapter = FakeAdapter::start().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::default();
    let channel = transport.open(7, &localhost(adapter.port), events_tx);

    // WHEN: Sending before the handshake has finished
    channel.send(OutboundEvent::GetDevicesDetailed);

    // THEN: Connect is emitted and the queued event arrives
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);
    assert_eq!(adapter.next_text().await, r#"["get_devices_detailed",null]"#);

    // WHEN: The adapter answers
    adapter.send(r#"["devices_detailed",[{"deviceId":"D1","connected":true}]]"#);
    adapter.send(r#"["connected","D1"]"#);

    // THEN: Both frames surface as typed events in order
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::DevicesDetailed(vec![DeviceDetail {
            device_id: "D1".to_string(),
            common1: None,
            connected: true,
        }])
    );
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::DeviceConnected("D1".to_string())
    );
}

/// **VALUE**: Malformed frames are dropped without ending the channel.
///
/// **BUG THIS CATCHES**: One bad frame from an adapter tearing the connection down.
#[tokio::test]
async fn given_malformed_frame_when_received_then_dropped_and_channel_survives() {
    let adapter = FakeAdapter::start().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let _channel = WebSocketTransport::default().open(1, &localhost(adapter.port), events_tx);
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    adapter.send("not json");
    adapter.send(r#"["connect"]"#);
    adapter.send(r#"["disconnected","D9"]"#);

    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::DeviceDisconnected("D9".to_string())
    );
}

/// **VALUE**: Closing the channel sends a close frame and reports `disconnect`.
///
/// **WHY THIS MATTERS**: A user-initiated disconnect must read as a clean shutdown, not
/// as a lost adapter.
#[tokio::test]
async fn given_connected_channel_when_closed_then_close_frame_and_disconnect() {
    // GIVEN: A connected channel
    let mut adapter = FakeAdapter::start().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut channel = WebSocketTransport::default().open(1, &localhost(adapter.port), events_tx);
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    // WHEN: Closing it
    channel.close();

    // THEN: The adapter sees a close frame and the session hears disconnect
    assert_eq!(adapter.next().await, Received::Close);
    assert_eq!(next_event(&mut events).await, InboundEvent::Disconnect);
}

#[tokio::test]
async fn given_connected_channel_when_adapter_closes_then_disconnect() {
    let adapter = FakeAdapter::start().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let _channel = WebSocketTransport::default().open(1, &localhost(adapter.port), events_tx);
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    adapter.close();

    assert_eq!(next_event(&mut events).await, InboundEvent::Disconnect);
}

/// **VALUE**: A connection that vanishes without a closing handshake reports `close`.
///
/// **BUG THIS CATCHES**: Treating a dead adapter as a protocol error (Failed) instead of
/// as unavailable.
#[tokio::test]
async fn given_connected_channel_when_connection_dropped_then_close() {
    let adapter = FakeAdapter::start().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let _channel = WebSocketTransport::default().open(1, &localhost(adapter.port), events_tx);
    assert_eq!(next_event(&mut events).await, InboundEvent::Connect);

    adapter.drop_connection();

    assert_eq!(next_event(&mut events).await, InboundEvent::Close);
}

/// **VALUE**: An unreachable adapter yields one `connect_error` per failed attempt, then
/// `close` once the attempts are used up.
///
/// **WHY THIS MATTERS**: The session counts these errors to escalate the adapter to Failed.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Retries never stop
/// - Failures are not reported individually
/// - The channel gives up one attempt early or late
#[tokio::test]
async fn given_unreachable_adapter_when_opened_then_connect_errors_then_close() {
    // GIVEN: Nothing listening and two retries allowed
    let port = closed_port().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(fast_retry(2));

    // WHEN: Opening a channel
    let _channel = transport.open(1, &localhost(port), events_tx);

    // THEN: Three connect errors, then close
    for attempt in 1..=3 {
        assert!(
            matches!(
                next_event(&mut events).await,
                InboundEvent::ConnectError { .. }
            ),
            "attempt {attempt} should report connect_error"
        );
    }
    assert_eq!(next_event(&mut events).await, InboundEvent::Close);
}

#[tokio::test]
async fn given_unreachable_adapter_when_closed_while_retrying_then_no_close_event() {
    let port = closed_port().await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let transport = WebSocketTransport::new(ChannelSettings {
        initial_retry: Duration::from_secs(2),
        max_retry: Duration::from_secs(2),
        ..fast_retry(5)
    });
    let mut channel = transport.open(1, &localhost(port), events_tx);
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::ConnectError { .. }
    ));

    channel.close();

    // The task stops quietly and drops its sink
    let rest = timeout(WAIT, events.recv())
        .await
        .expect("Channel task did not stop");
    assert_eq!(rest.map(|envelope| envelope.event), None);
}
