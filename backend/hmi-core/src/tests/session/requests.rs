// Outbound requests issued through HmiSession

use crate::channel::{DeviceDetail, InboundEvent, MessageData, OutboundEvent};
use crate::decoder::MessageKind;
use crate::error::decode::DecodeError;
use crate::error::session::SessionError;
use crate::proto::Action;
use crate::session::DeviceStatus;
use crate::tests::support::{Common1, Share1, TestSession};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use prost::Message as ProstMessage;
use serde_json::json;

fn with_device(test: &mut TestSession) {
    test.add(1, "10.0.0.5", 9000);
    test.connected(1);
    test.inbound(
        1,
        InboundEvent::DevicesDetailed(vec![DeviceDetail {
            device_id: "D1".to_string(),
            common1: None,
            connected: false,
        }]),
    );
}

#[test]
fn given_active_adapter_when_devices_requested_then_inventory_request_sent() {
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.connected(1);

    assert!(test.session.request_devices());

    assert_eq!(
        test.transport.sent(1),
        vec![OutboundEvent::GetDevicesDetailed]
    );
}

#[test]
fn given_no_active_adapter_when_devices_requested_then_noop() {
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);

    assert!(!test.session.request_devices());
    assert_eq!(test.transport.opened(), 0);
}

/// **VALUE**: Device connect is optimistic locally and forwarded to the owning adapter.
///
/// **BUG THIS CATCHES**: The request going out without the status change (UI shows nothing
/// pending) or the status changing without the request going out.
#[test]
fn given_known_device_when_connect_requested_then_connecting_and_request_sent() {
    // GIVEN: D1 known and disconnected
    let mut test = TestSession::new();
    with_device(&mut test);

    // WHEN: Requesting a connect
    assert!(test.session.request_connect_device("D1"));

    // THEN: Connecting, and connect_device queued
    assert_eq!(
        test.session.device("D1").unwrap().status,
        DeviceStatus::Connecting
    );
    assert_eq!(
        test.transport.sent(1),
        vec![OutboundEvent::ConnectDevice {
            device_id: "D1".to_string()
        }]
    );

    // WHEN: The adapter confirms
    test.inbound(1, InboundEvent::DeviceConnected("D1".to_string()));

    // THEN: Connected
    assert_eq!(
        test.session.device("D1").unwrap().status,
        DeviceStatus::Connected
    );
}

#[test]
fn given_unknown_device_when_requests_issued_then_all_noop() {
    let mut test = TestSession::new();
    with_device(&mut test);

    assert!(!test.session.request_connect_device("ghost"));
    assert!(!test.session.request_disconnect_device("ghost"));
    assert!(!test.session.request_message(MessageKind::Share, "ghost", 1));
    assert!(!test.session.set_scheduled(MessageKind::Share, "ghost", 1, 100));
    assert!(!test.session.clear_scheduled(MessageKind::Share, "ghost", 1));
    assert!(test.transport.sent(1).is_empty());
}

#[test]
fn given_device_when_data_requests_issued_then_kind_selects_event() {
    let mut test = TestSession::new();
    with_device(&mut test);

    assert!(test.session.request_message(MessageKind::Common, "D1", 2));
    assert!(test.session.set_scheduled(MessageKind::Share, "D1", 1, 250));
    assert!(test.session.clear_scheduled(MessageKind::Share, "D1", 1));

    let frames: Vec<String> = test
        .transport
        .sent(1)
        .iter()
        .map(OutboundEvent::to_frame)
        .collect();
    assert_eq!(
        frames,
        vec![
            r#"["request_common","D1",2]"#.to_string(),
            r#"["set_scheduled_share","D1",1,250]"#.to_string(),
            r#"["clear_scheduled_share","D1",1]"#.to_string(),
        ]
    );
}

/// **VALUE**: Inventory from an adapter that is not the active one is ignored.
///
/// **BUG THIS CATCHES**: Late inventory from a just-disconnected adapter resurrecting its devices.
#[test]
fn given_inactive_adapter_when_inventory_arrives_then_ignored() {
    // GIVEN: Adapter 1 was connected, adapter 2 is now the active one
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.add(2, "10.0.0.6", 9000);
    test.connected(1);
    test.session.request_disconnect(1);
    test.session.request_connect(2);

    // WHEN: Both report an inventory, adapter 1 on its old channel
    test.inbound(
        2,
        InboundEvent::DevicesDetailed(vec![DeviceDetail {
            device_id: "D2".to_string(),
            common1: None,
            connected: true,
        }]),
    );
    test.transport.emit_on(
        0,
        InboundEvent::DevicesDetailed(vec![DeviceDetail {
            device_id: "D1".to_string(),
            common1: None,
            connected: true,
        }]),
    );
    test.pump();

    // THEN: Only adapter 2's device exists
    assert!(test.session.device("D1").is_none());
    assert_eq!(test.session.device("D2").unwrap().adapter_id, 2);
}

/// **VALUE**: The identity block in the inventory is decoded with the Common schema.
#[test]
fn given_common_schema_when_inventory_has_identity_block_then_details_decoded() {
    // GIVEN: Schemas loaded and a connected adapter
    let mut test = TestSession::with_schemas();
    test.add(1, "10.0.0.5", 9000);
    test.connected(1);
    let identity = Common1 {
        id: 4,
        device_name: "pump".to_string(),
        serial_number: 1234,
        ..Default::default()
    };

    // WHEN: Inventory carries the encoded block
    test.inbound(
        1,
        InboundEvent::DevicesDetailed(vec![DeviceDetail {
            device_id: "D1".to_string(),
            common1: Some(STANDARD.encode(identity.encode_to_vec())),
            connected: true,
        }]),
    );

    // THEN: Details hold the decoded fields, defaults included
    let details = test.session.device("D1").unwrap().details.clone().unwrap();
    assert_eq!(details["deviceName"], json!("pump"));
    assert_eq!(details["serialNumber"], json!(1234));
    assert_eq!(details["firmwareVersion"], json!(0));
}

/// **VALUE**: Share publishes are schema-encoded and standard base64.
///
/// **BUG THIS CATCHES**: Publishing raw JSON, or using the wrong base64 alphabet for the kind.
#[test]
fn given_share_value_when_published_then_encoded_payload_sent() {
    // GIVEN: Schemas loaded, D1 known
    let mut test = TestSession::with_schemas();
    with_device(&mut test);

    // WHEN: Publishing Share1
    let sent = test
        .session
        .publish(
            MessageKind::Share,
            "D1",
            1,
            &json!({"startingNumber": 1, "endingNumber": 10, "counter": 5}),
        )
        .unwrap();

    // THEN: publish_share carries decodable Share1 bytes
    assert!(sent);
    let events = test.transport.sent(1);
    let [OutboundEvent::Publish {
        kind,
        device_id,
        share_id,
        payload,
    }] = events.as_slice()
    else {
        panic!("expected one publish, got {events:?}");
    };
    assert_eq!(*kind, MessageKind::Share);
    assert_eq!(device_id, "D1");
    assert_eq!(*share_id, 1);
    let decoded = Share1::decode(STANDARD.decode(payload).unwrap().as_slice()).unwrap();
    assert_eq!(
        decoded,
        Share1 {
            starting_number: 1,
            ending_number: 10,
            counter: 5
        }
    );
}

#[test]
fn given_common_value_when_published_then_url_safe_encoded() {
    let mut test = TestSession::with_schemas();
    with_device(&mut test);

    let sent = test
        .session
        .publish(
            MessageKind::Common,
            "D1",
            1,
            &json!({"deviceName": "renamed"}),
        )
        .unwrap();

    assert!(sent);
    let events = test.transport.sent(1);
    let [OutboundEvent::Publish { payload, .. }] = events.as_slice() else {
        panic!("expected one publish, got {events:?}");
    };
    assert_eq!(events[0].name(), "publish_common");
    let decoded = Common1::decode(URL_SAFE.decode(payload).unwrap().as_slice()).unwrap();
    assert_eq!(decoded.device_name, "renamed");
}

#[test]
fn given_schema_missing_when_published_then_error_and_nothing_sent() {
    let mut test = TestSession::new();
    with_device(&mut test);

    let result = test
        .session
        .publish(MessageKind::Share, "D1", 1, &json!({"counter": 1}));

    assert!(matches!(
        result,
        Err(SessionError::Publish {
            source: DecodeError::SchemaUnavailable { .. }
        })
    ));
    assert!(test.transport.sent(1).is_empty());
}

#[test]
fn given_unknown_device_when_published_then_false() {
    let mut test = TestSession::with_schemas();
    with_device(&mut test);

    let sent = test
        .session
        .publish(MessageKind::Share, "ghost", 1, &json!({"counter": 1}))
        .unwrap();

    assert!(!sent);
}

/// **VALUE**: Inbound message_data lands in the log and the snapshot.
#[test]
fn given_message_data_when_received_then_logged_with_clock_time() {
    let mut test = TestSession::with_schemas();
    with_device(&mut test);
    test.clock.set(10_000);

    let data = Share1 {
        counter: 3,
        ..Default::default()
    };
    test.inbound(
        1,
        InboundEvent::MessageData(MessageData {
            action_type: Action::ShareResponse as i32,
            share_id: 1,
            data: STANDARD.encode(data.encode_to_vec()),
        }),
    );

    let log = test.session.messages();
    assert_eq!(log.len(), 1);
    let message = log.latest(MessageKind::Share, 1).unwrap();
    assert_eq!(message.created_at_ms, 10_000);
    assert_eq!(message.payload["counter"], json!(3));
    assert_eq!(test.session.snapshot().latest_messages.len(), 1);
}
