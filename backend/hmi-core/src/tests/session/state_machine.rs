// Adapter lifecycle driven through HmiSession with an in-memory transport

use crate::channel::{DeviceDetail, InboundEvent};
use crate::session::{AdapterStatus, DeviceStatus, SessionSettings};
use crate::tests::support::TestSession;

fn detail(device_id: &str, connected: bool) -> DeviceDetail {
    DeviceDetail {
        device_id: device_id.to_string(),
        common1: None,
        connected,
    }
}

fn connect_error() -> InboundEvent {
    InboundEvent::ConnectError {
        message: "connection refused".to_string(),
    }
}

/// **VALUE**: The end-to-end operator flow: connect, discover a device, disconnect.
///
/// **WHY THIS MATTERS**: This is the path every harness session takes. Each step depends on
/// the previous transition having been applied to the right adapter.
///
/// **BUG THIS CATCHES**: Devices surviving an adapter disconnect, or the `connect` event not
/// promoting the adapter to Connected.
#[test]
fn given_connected_adapter_with_device_when_disconnected_then_device_removed() {
    // GIVEN: Adapter 1 at 10.0.0.5:9000
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);

    // WHEN: Connecting and the channel reports connect
    test.session.request_connect(1);
    assert_eq!(
        test.session.adapter(1).unwrap().status,
        AdapterStatus::Connecting
    );
    test.inbound(1, InboundEvent::Connect);

    // THEN: Adapter is Connected
    assert_eq!(
        test.session.adapter(1).unwrap().status,
        AdapterStatus::Connected
    );

    // WHEN: The adapter lists D1 as connected
    test.inbound(1, InboundEvent::DevicesDetailed(vec![detail("D1", true)]));

    // THEN: D1 exists, owned by adapter 1, Connected
    let device = test.session.device("D1").expect("D1 should be created");
    assert_eq!(device.adapter_id, 1);
    assert_eq!(device.status, DeviceStatus::Connected);

    // WHEN: Disconnecting the adapter
    assert!(test.session.request_disconnect(1));

    // THEN: Adapter is Disconnected and D1 is gone
    assert_eq!(
        test.session.adapter(1).unwrap().status,
        AdapterStatus::Disconnected
    );
    assert!(test.session.device("D1").is_none());
    assert!(test.session.devices().is_empty());
    assert!(test.transport.was_closed(1), "channel should be closed");
}

/// **VALUE**: Connecting a second adapter disconnects the first.
///
/// **WHY THIS MATTERS**: Both adapters feed the same event consumer. Two live adapters would
/// interleave device inventories.
///
/// **BUG THIS CATCHES**: The single-active-adapter rule being skipped, or A's devices
/// surviving B's connect.
#[test]
fn given_adapter_a_connected_when_connecting_b_then_only_b_is_active() {
    // GIVEN: Adapter 1 connected with a device
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.add(2, "10.0.0.6", 9000);
    test.connected(1);
    test.inbound(1, InboundEvent::DevicesDetailed(vec![detail("D1", true)]));

    // WHEN: Connecting adapter 2
    test.session.request_connect(2);

    // THEN: Only adapter 2 is active, adapter 1 is Disconnected with no devices
    let a = test.session.adapter(1).unwrap();
    let b = test.session.adapter(2).unwrap();
    assert_eq!(a.status, AdapterStatus::Disconnected);
    assert!(b.status.is_active());
    assert_eq!(test.session.active_adapter(), Some(2));
    assert_eq!(
        test.session
            .devices()
            .iter()
            .filter(|d| d.adapter_id == 1)
            .count(),
        0
    );
    assert!(test.session.registry().get(1).is_none());

    let active = test
        .session
        .adapters()
        .iter()
        .filter(|a| a.status.is_active())
        .count();
    assert_eq!(active, 1);
}

/// **VALUE**: Three connect errors keep retrying, the fourth escalates to Failed.
///
/// **BUG THIS CATCHES**: Off-by-one in the threshold comparison (`>=` instead of `>`).
#[test]
fn given_connecting_adapter_when_connect_errors_arrive_then_fails_only_past_threshold() {
    // GIVEN: Adapter connecting
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.session.request_connect(1);

    // WHEN: Three connect errors
    for _ in 0..3 {
        test.inbound(1, connect_error());
    }

    // THEN: Still Connecting, counter at 3
    let adapter = test.session.adapter(1).unwrap();
    assert_eq!(adapter.status, AdapterStatus::Connecting);
    assert_eq!(adapter.unavailable_count, 3);

    // WHEN: A fourth one
    test.inbound(1, connect_error());

    // THEN: Failed, channel torn down, no longer active
    assert_eq!(test.session.adapter(1).unwrap().status, AdapterStatus::Failed);
    assert_eq!(test.session.active_adapter(), None);
    assert!(test.transport.was_closed(1));
}

/// **VALUE**: A Failed adapter recovers only through an explicit connect, which resets the counter.
///
/// **BUG THIS CATCHES**: The counter carrying over into the next attempt so a single error
/// after reconnecting fails the adapter immediately.
#[test]
fn given_failed_adapter_when_reconnected_then_counter_resets() {
    // GIVEN: Adapter escalated to Failed
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.session.request_connect(1);
    for _ in 0..4 {
        test.inbound(1, connect_error());
    }
    assert_eq!(test.session.adapter(1).unwrap().status, AdapterStatus::Failed);

    // WHEN: Connecting again and seeing one error
    test.session.request_connect(1);
    test.inbound(1, connect_error());

    // THEN: Connecting with a count of 1
    let adapter = test.session.adapter(1).unwrap();
    assert_eq!(adapter.status, AdapterStatus::Connecting);
    assert_eq!(adapter.unavailable_count, 1);
    assert_eq!(test.transport.opened(), 2);
}

#[test]
fn given_threshold_of_one_when_two_connect_errors_then_failed() {
    let mut test = TestSession::with_settings(SessionSettings {
        unavailable_threshold: 1,
    });
    test.add(1, "10.0.0.5", 9000);
    test.session.request_connect(1);

    test.inbound(1, connect_error());
    assert_eq!(
        test.session.adapter(1).unwrap().status,
        AdapterStatus::Connecting
    );

    test.inbound(1, connect_error());
    assert_eq!(test.session.adapter(1).unwrap().status, AdapterStatus::Failed);
}

/// **VALUE**: Transport-ended events map to their documented statuses and purge devices.
///
/// **BUG THIS CATCHES**: `close` and `disconnect` swapped, or an `error` leaving the adapter
/// marked active with a dead channel.
#[test]
fn given_connected_adapter_when_transport_ends_then_status_matches_event() {
    let cases = [
        (InboundEvent::Disconnect, AdapterStatus::Disconnected),
        (InboundEvent::Close, AdapterStatus::Unavailable),
        (
            InboundEvent::Error {
                message: "reset by peer".to_string(),
            },
            AdapterStatus::Failed,
        ),
    ];

    for (event, expected) in cases {
        // GIVEN: Connected adapter with a device
        let mut test = TestSession::new();
        test.add(1, "10.0.0.5", 9000);
        test.connected(1);
        test.inbound(1, InboundEvent::DevicesDetailed(vec![detail("D1", true)]));

        // WHEN: The transport ends
        let name = event.name();
        test.inbound(1, event);

        // THEN: Expected status, inactive, devices gone
        let adapter = test.session.adapter(1).unwrap();
        assert_eq!(adapter.status, expected, "after '{name}'");
        assert_eq!(test.session.active_adapter(), None, "after '{name}'");
        assert!(test.session.devices().is_empty(), "after '{name}'");
        assert!(test.session.registry().get(1).is_none(), "after '{name}'");
    }
}

/// **VALUE**: Events from a channel that was replaced are ignored.
///
/// **WHY THIS MATTERS**: A reconnect opens a new channel while the old transport may still be
/// flushing. Its late `close` must not mark the fresh connection Unavailable.
///
/// **BUG THIS CATCHES**: Routing envelopes by adapter id alone.
#[test]
fn given_reconnected_adapter_when_old_channel_reports_then_ignored() {
    // GIVEN: Adapter connected twice (channel 0 then channel 1)
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.connected(1);
    test.connected(1);
    assert_eq!(test.transport.opened(), 2);

    // WHEN: The first channel reports close
    test.transport.emit_on(0, InboundEvent::Close);
    let handled = test.pump();

    // THEN: Delivered but ignored; adapter still Connected
    assert_eq!(handled, 1);
    assert_eq!(
        test.session.adapter(1).unwrap().status,
        AdapterStatus::Connected
    );
    assert_eq!(test.session.active_adapter(), Some(1));
}

#[test]
fn given_unknown_adapter_when_connect_requested_then_noop() {
    let mut test = TestSession::new();

    assert!(!test.session.request_connect(42));
    assert!(!test.session.request_disconnect(42));
    assert_eq!(test.transport.opened(), 0);
    assert_eq!(test.session.active_adapter(), None);
}

/// **VALUE**: Inbound events and requests refresh the adapter's last-activity stamp.
#[test]
fn given_clock_advanced_when_event_handled_then_last_activity_updated() {
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);

    test.clock.set(1_000);
    test.session.request_connect(1);
    assert_eq!(test.session.adapter(1).unwrap().last_activity_ms, Some(1_000));

    test.clock.set(2_500);
    test.inbound(1, InboundEvent::Connect);
    assert_eq!(test.session.adapter(1).unwrap().last_activity_ms, Some(2_500));
}

#[test]
fn given_connected_adapter_when_removed_then_channel_closed_and_record_gone() {
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.connected(1);

    assert!(test.session.remove_adapter(1));

    assert!(test.session.adapter(1).is_none());
    assert_eq!(test.session.active_adapter(), None);
    assert!(test.transport.was_closed(1));
    assert!(!test.session.remove_adapter(1), "second removal is a no-op");
}

/// **VALUE**: The snapshot mirrors session state for the presentation layer.
#[test]
fn given_connected_session_when_snapshot_taken_then_reflects_state() {
    let mut test = TestSession::new();
    test.add(1, "10.0.0.5", 9000);
    test.connected(1);
    test.inbound(1, InboundEvent::DevicesDetailed(vec![detail("D1", false)]));
    test.session.select_device("D1");

    let snapshot = test.session.snapshot();

    assert_eq!(snapshot.adapters.len(), 1);
    assert_eq!(snapshot.adapters[0].status, AdapterStatus::Connected);
    assert_eq!(snapshot.active_adapter, Some(1));
    assert_eq!(snapshot.devices.len(), 1);
    assert_eq!(snapshot.selected_device.as_deref(), Some("D1"));
    assert_eq!(snapshot.message_count, 0);
    assert_eq!(snapshot.throughput, None);
}
