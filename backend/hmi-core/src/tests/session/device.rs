use crate::session::{DeviceSignal, DeviceStatus, DeviceTracker, InventoryEntry};

use serde_json::json;

fn entry(device_id: &str, connected: bool) -> InventoryEntry {
    InventoryEntry {
        device_id: device_id.to_string(),
        connected,
        details: None,
    }
}

fn tracker_with(adapter_id: u32, entries: &[(&str, bool)]) -> DeviceTracker {
    let mut tracker = DeviceTracker::new();
    tracker.apply_inventory(
        adapter_id,
        entries.iter().map(|(id, c)| entry(id, *c)).collect(),
    );
    tracker
}

/// **VALUE**: Inventory creates devices with the status the adapter reports.
#[test]
fn given_inventory_when_applied_then_devices_created_with_reported_status() {
    // GIVEN/WHEN: Adapter 1 lists D1 (connected) and D2 (not)
    let tracker = tracker_with(1, &[("D1", true), ("D2", false)]);

    // THEN: Both exist with matching status
    assert_eq!(tracker.len(), 2);
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Connected);
    assert_eq!(tracker.get("D2").unwrap().status, DeviceStatus::Disconnected);
    assert_eq!(tracker.owner("D2"), Some(1));
}

/// **VALUE**: A fresh inventory is authoritative for its adapter.
///
/// **BUG THIS CATCHES**: Devices unplugged from the adapter lingering forever in the list.
#[test]
fn given_known_devices_when_inventory_omits_one_then_it_is_removed() {
    // GIVEN: D1 and D2 known
    let mut tracker = tracker_with(1, &[("D1", true), ("D2", true)]);

    // WHEN: The next inventory only lists D2, now disconnected
    tracker.apply_inventory(1, vec![entry("D2", false)]);

    // THEN: D1 gone, D2 updated
    assert!(tracker.get("D1").is_none());
    assert_eq!(tracker.get("D2").unwrap().status, DeviceStatus::Disconnected);
}

/// **VALUE**: Device ids are unique across adapters.
///
/// **BUG THIS CATCHES**: A second adapter silently taking over (or duplicating) a device that
/// another adapter owns.
#[test]
fn given_device_owned_by_other_adapter_when_inventory_lists_it_then_skipped() {
    let mut tracker = tracker_with(1, &[("D1", true)]);

    tracker.apply_inventory(2, vec![entry("D1", false), entry("D9", true)]);

    assert_eq!(tracker.owner("D1"), Some(1));
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Connected);
    assert_eq!(tracker.owner("D9"), Some(2));
    assert_eq!(tracker.len(), 2);
}

#[test]
fn given_entry_with_details_when_applied_then_details_kept_until_replaced() {
    let mut tracker = DeviceTracker::new();
    tracker.apply_inventory(
        1,
        vec![InventoryEntry {
            device_id: "D1".to_string(),
            connected: true,
            details: Some(json!({"deviceName": "pump"})),
        }],
    );

    // A later inventory without a decodable identity block keeps the old one
    tracker.apply_inventory(1, vec![entry("D1", true)]);

    assert_eq!(
        tracker.get("D1").unwrap().details,
        Some(json!({"deviceName": "pump"}))
    );
}

/// **VALUE**: The request/confirm cycle for device connections.
#[test]
fn given_disconnected_device_when_connect_requested_and_confirmed_then_connected() {
    let mut tracker = tracker_with(1, &[("D1", false)]);

    assert!(tracker.begin_connect("D1"));
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Connecting);

    tracker.apply_signal(1, "D1", DeviceSignal::Connected);
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Connected);

    assert!(tracker.begin_disconnect("D1"));
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Disconnecting);

    tracker.apply_signal(1, "D1", DeviceSignal::Disconnected);
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Disconnected);
}

/// **VALUE**: `*_failed` only resolves a pending request.
///
/// **BUG THIS CATCHES**: A stray `connected_failed` marking a healthy, connected device Failed.
#[test]
fn given_failure_signals_when_applied_then_only_pending_requests_fail() {
    let mut tracker = tracker_with(1, &[("D1", true), ("D2", false)]);

    // Connected device ignores connected_failed
    tracker.apply_signal(1, "D1", DeviceSignal::ConnectFailed);
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Connected);

    // Pending connect fails
    tracker.begin_connect("D2");
    tracker.apply_signal(1, "D2", DeviceSignal::ConnectFailed);
    assert_eq!(tracker.get("D2").unwrap().status, DeviceStatus::Failed);

    // Pending disconnect fails
    tracker.begin_disconnect("D1");
    tracker.apply_signal(1, "D1", DeviceSignal::DisconnectFailed);
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Failed);
}

#[test]
fn given_unknown_device_when_requested_or_signalled_then_noop() {
    let mut tracker = tracker_with(1, &[("D1", true)]);

    assert!(!tracker.begin_connect("ghost"));
    tracker.apply_signal(1, "ghost", DeviceSignal::Connected);
    // Signal from a non-owning adapter is ignored too
    tracker.apply_signal(2, "D1", DeviceSignal::Disconnected);

    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.get("D1").unwrap().status, DeviceStatus::Connected);
}

/// **VALUE**: Purging an adapter clears the selection exactly when it held a purged device.
///
/// **BUG THIS CATCHES**: A dangling selection pointing at a device that no longer exists, or
/// a selection on another adapter's device being cleared needlessly.
#[test]
fn given_selection_when_adapter_purged_then_cleared_only_if_device_removed() {
    // GIVEN: D1 on adapter 1, D2 on adapter 2, D2 selected
    let mut tracker = tracker_with(1, &[("D1", true)]);
    tracker.apply_inventory(2, vec![entry("D2", true)]);
    assert!(tracker.select("D2"));

    // WHEN: Purging adapter 1
    assert_eq!(tracker.purge_adapter(1), 1);

    // THEN: Selection intact
    assert_eq!(tracker.selected_id().map(String::as_str), Some("D2"));

    // WHEN: Purging adapter 2
    assert_eq!(tracker.purge_adapter(2), 1);

    // THEN: Selection cleared
    assert!(tracker.selected().is_none());
    assert!(tracker.is_empty());
}

#[test]
fn given_unknown_device_when_selected_then_rejected() {
    let mut tracker = tracker_with(1, &[("D1", true)]);

    assert!(!tracker.select("ghost"));
    assert!(tracker.selected().is_none());

    assert!(tracker.select("D1"));
    tracker.clear_selection();
    assert!(tracker.selected_id().is_none());
}
