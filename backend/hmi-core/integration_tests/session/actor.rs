use crate::helpers::{FakeAdapter, Received, WAIT, closed_port, schema_path, schema_paths};

use hmi_core::channel::WebSocketTransport;
use hmi_core::clock::SystemClock;
use hmi_core::config::HmiConfig;
use hmi_core::decoder::{MessageKind, SchemaCatalog, SchemaState};
use hmi_core::session::{
    AdapterSpec, AdapterStatus, DeviceStatus, HmiSnapshot, SessionCommand, SessionHandle,
    SessionSettings,
};

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

fn spawn_session() -> SessionHandle {
    SessionHandle::spawn(
        Arc::new(WebSocketTransport::default()),
        SessionSettings::default(),
        Arc::new(SystemClock),
    )
}

async fn wait_until(
    snapshots: &mut watch::Receiver<HmiSnapshot>,
    what: &str,
    predicate: impl FnMut(&HmiSnapshot) -> bool,
) -> HmiSnapshot {
    timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {what}"))
        .expect("Session actor stopped")
        .clone()
}

/// **VALUE**: Drives the session actor end to end against a live adapter: connect, inventory,
/// device connect and a decoded share response.
///
/// **WHY THIS MATTERS**: Each layer is unit tested against fakes. This proves the actor, the
/// registry, the WebSocket transport and the decoder agree with each other on a real socket.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Channel events never reach the actor
/// - Snapshots are not republished after channel events
/// - Device requests are routed to the wrong channel
/// - Share payloads relayed by the adapter cannot be decoded with the runtime schema
#[tokio::test]
async fn given_live_adapter_when_session_driven_then_snapshot_follows() {
    // GIVEN: A session with an adapter and schemas loading
    let mut adapter = FakeAdapter::start().await;
    let session = spawn_session();
    let mut snapshots = session.subscribe();
    session.load_schemas(schema_paths());

    let adapter_id = session
        .add_adapter(AdapterSpec::new(None, "Bench", "127.0.0.1", adapter.port).unwrap())
        .await
        .unwrap();

    // WHEN: Connecting the adapter
    session
        .update(SessionCommand::ConnectAdapter(adapter_id))
        .await
        .unwrap();

    // THEN: It becomes the connected, active adapter
    let snapshot = wait_until(&mut snapshots, "adapter connected", |s| {
        s.adapters
            .first()
            .is_some_and(|a| a.status == AdapterStatus::Connected)
    })
    .await;
    assert_eq!(snapshot.active_adapter, Some(adapter_id));

    // WHEN: Requesting the inventory
    session.update(SessionCommand::RequestDevices).await.unwrap();
    assert_eq!(adapter.next_text().await, r#"["get_devices_detailed",null]"#);
    adapter.send(r#"["devices_detailed",[{"deviceId":"D1","connected":false}]]"#);

    // THEN: The device is tracked under the adapter
    let snapshot = wait_until(&mut snapshots, "inventory", |s| s.devices.len() == 1).await;
    assert_eq!(snapshot.devices[0].id, "D1");
    assert_eq!(snapshot.devices[0].adapter_id, adapter_id);
    assert_eq!(snapshot.devices[0].status, DeviceStatus::Disconnected);

    // WHEN: Connecting the device and the adapter confirming it
    session
        .update(SessionCommand::ConnectDevice("D1".to_string()))
        .await
        .unwrap();
    assert_eq!(adapter.next_text().await, r#"["connect_device","D1"]"#);
    adapter.send(r#"["connected","D1"]"#);

    // THEN: The device is Connected
    wait_until(&mut snapshots, "device connected", |s| {
        s.devices
            .first()
            .is_some_and(|d| d.status == DeviceStatus::Connected)
    })
    .await;

    // WHEN: The adapter relays a share response once the schema is ready
    wait_until(&mut snapshots, "share schema", |s| {
        s.share_schema == SchemaState::Ready
    })
    .await;
    let catalog = SchemaCatalog::load(MessageKind::Share, &schema_path(MessageKind::Share)).unwrap();
    let bytes = catalog
        .encode(1, &json!({"startingNumber": 1, "endingNumber": 9, "counter": 4}))
        .unwrap();
    adapter.send(&format!(
        r#"["message_data",{{"actionType":5,"shareId":1,"data":"{}"}}]"#,
        STANDARD.encode(bytes)
    ));

    // THEN: The decoded message is logged
    let snapshot = wait_until(&mut snapshots, "decoded message", |s| s.message_count == 1).await;
    let latest = &snapshot.latest_messages[0];
    assert_eq!(latest.kind, MessageKind::Share);
    assert_eq!(latest.share_id, 1);
    assert_eq!(latest.payload["counter"], 4);
    assert_eq!(latest.payload["endingNumber"], 9);
}

/// **VALUE**: Losing the adapter's connection leaves it Unavailable and clears its devices.
///
/// **BUG THIS CATCHES**: Devices of a vanished adapter lingering in the snapshot as if they
/// could still be driven.
#[tokio::test]
async fn given_connected_session_when_adapter_vanishes_then_unavailable_and_devices_purged() {
    // GIVEN: A connected adapter with one device
    let mut adapter = FakeAdapter::start().await;
    let session = spawn_session();
    let mut snapshots = session.subscribe();
    let adapter_id = session
        .add_adapter(AdapterSpec::new(None, "Bench", "127.0.0.1", adapter.port).unwrap())
        .await
        .unwrap();
    session
        .update(SessionCommand::ConnectAdapter(adapter_id))
        .await
        .unwrap();
    session.update(SessionCommand::RequestDevices).await.unwrap();
    assert_eq!(adapter.next_text().await, r#"["get_devices_detailed",null]"#);
    adapter.send(r#"["devices_detailed",[{"deviceId":"D1","connected":true}]]"#);
    wait_until(&mut snapshots, "inventory", |s| s.devices.len() == 1).await;

    // WHEN: The connection drops without a closing handshake
    adapter.drop_connection();

    // THEN: Adapter is Unavailable, inactive, and its devices are gone
    let snapshot = wait_until(&mut snapshots, "adapter unavailable", |s| {
        s.adapters
            .first()
            .is_some_and(|a| a.status == AdapterStatus::Unavailable)
    })
    .await;
    assert!(snapshot.devices.is_empty());
    assert_eq!(snapshot.active_adapter, None);
}

#[tokio::test]
async fn given_connected_session_when_disconnect_requested_then_adapter_sees_close() {
    let mut adapter = FakeAdapter::start().await;
    let session = spawn_session();
    let mut snapshots = session.subscribe();
    let adapter_id = session
        .add_adapter(AdapterSpec::new(None, "Bench", "127.0.0.1", adapter.port).unwrap())
        .await
        .unwrap();
    session
        .update(SessionCommand::ConnectAdapter(adapter_id))
        .await
        .unwrap();
    wait_until(&mut snapshots, "adapter connected", |s| {
        s.active_adapter == Some(adapter_id)
            && s.adapters[0].status == AdapterStatus::Connected
    })
    .await;

    session
        .update(SessionCommand::DisconnectAdapter(adapter_id))
        .await
        .unwrap();

    assert_eq!(adapter.next().await, Received::Close);
    let snapshot = wait_until(&mut snapshots, "adapter disconnected", |s| {
        s.adapters[0].status == AdapterStatus::Disconnected
    })
    .await;
    assert_eq!(snapshot.active_adapter, None);
}

/// **VALUE**: With any config that validates, an unreachable adapter ends up Failed rather
/// than Unavailable.
///
/// **WHY THIS MATTERS**: The transport gives up with `close` once its retries run out. If that
/// came before the connect error that crosses the threshold, Failed would be unreachable and
/// the operator would see a retryable Unavailable for an adapter that never answered.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Validation accepts fewer reconnection attempts than the unavailable threshold
/// - The late `close` from the torn-down channel overwrites Failed
#[tokio::test]
async fn given_smallest_valid_retry_budget_when_adapter_unreachable_then_failed() {
    // GIVEN: A validated config whose retry budget equals the threshold, with fast retries
    let mut config = HmiConfig::default();
    config.channel.reconnection_attempts = config.session.unavailable_threshold;
    config.channel.initial_retry_ms = 1;
    config.channel.max_retry_ms = 2;
    config.validate().unwrap();

    let session = SessionHandle::spawn(
        Arc::new(WebSocketTransport::new(config.channel_settings())),
        config.session_settings(),
        Arc::new(SystemClock),
    );
    let mut snapshots = session.subscribe();
    let port = closed_port().await;
    let adapter_id = session
        .add_adapter(AdapterSpec::new(None, "Gone", "127.0.0.1", port).unwrap())
        .await
        .unwrap();

    // WHEN: Connecting it
    session
        .update(SessionCommand::ConnectAdapter(adapter_id))
        .await
        .unwrap();

    // THEN: The retries escalate it to Failed
    let snapshot = wait_until(&mut snapshots, "adapter failed", |s| {
        s.adapters
            .first()
            .is_some_and(|a| {
                !matches!(
                    a.status,
                    AdapterStatus::Connecting | AdapterStatus::Disconnected
                )
            })
    })
    .await;
    assert_eq!(snapshot.adapters[0].status, AdapterStatus::Failed);
    assert_eq!(snapshot.active_adapter, None);

    // THEN: It stays Failed once the transport has given up
    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        session.subscribe().borrow().adapters[0].status,
        AdapterStatus::Failed
    );
}
