//! Device records nested under the connected adapter.
//!
//! Devices only ever come from an adapter's inventory; nothing here fabricates
//! one. Every device is purged when its owning adapter leaves the connected
//! session, and the selection is cleared with it.

use crate::session::adapter::AdapterId;

use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FormatResult};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

pub type DeviceId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Failed,
}

/// Authoritative device lifecycle notification relayed by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSignal {
    Connected,
    Disconnected,
    ConnectFailed,
    DisconnectFailed,
}

impl DeviceStatus {
    /// Next status for `signal`, or `None` when the signal does not apply.
    ///
    /// `connected`/`disconnected` always win. The `*_failed` signals only
    /// resolve a pending request.
    pub fn on_signal(self, signal: DeviceSignal) -> Option<DeviceStatus> {
        match (self, signal) {
            (_, DeviceSignal::Connected) => Some(DeviceStatus::Connected),
            (_, DeviceSignal::Disconnected) => Some(DeviceStatus::Disconnected),
            (DeviceStatus::Connecting, DeviceSignal::ConnectFailed) => Some(DeviceStatus::Failed),
            (DeviceStatus::Disconnecting, DeviceSignal::DisconnectFailed) => {
                Some(DeviceStatus::Failed)
            }
            _ => None,
        }
    }
}

impl Display for DeviceSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            DeviceSignal::Connected => "connected",
            DeviceSignal::Disconnected => "disconnected",
            DeviceSignal::ConnectFailed => "connected_failed",
            DeviceSignal::DisconnectFailed => "disconnected_failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub adapter_id: AdapterId,
    pub status: DeviceStatus,
    /// Last decoded identity payload (Common share 1) reported in the inventory.
    pub details: Option<Value>,
}

/// One entry of an adapter's device inventory, already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    pub device_id: DeviceId,
    pub connected: bool,
    pub details: Option<Value>,
}

#[derive(Debug, Default)]
pub struct DeviceTracker {
    devices: Vec<Device>,
    selected: Option<DeviceId>,
}

impl DeviceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    fn get_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == device_id)
    }

    pub fn owner(&self, device_id: &str) -> Option<AdapterId> {
        self.get(device_id).map(|d| d.adapter_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn as_slice(&self) -> &[Device] {
        &self.devices
    }

    pub fn owned_by(&self, adapter_id: AdapterId) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(move |d| d.adapter_id == adapter_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Reconcile the devices of `adapter_id` against its inventory.
    ///
    /// Listed devices are created or refreshed, unlisted ones owned by the
    /// adapter are removed. Identities owned by another adapter are skipped.
    pub fn apply_inventory(&mut self, adapter_id: AdapterId, entries: Vec<InventoryEntry>) {
        let mut listed = HashSet::new();

        for entry in entries {
            if entry.device_id.is_empty() {
                warn!("Adapter {adapter_id} reported a device without an id, skipping");
                continue;
            }

            let status = if entry.connected {
                DeviceStatus::Connected
            } else {
                DeviceStatus::Disconnected
            };

            match self.get_mut(&entry.device_id) {
                Some(device) if device.adapter_id != adapter_id => {
                    warn!(
                        "Device {} already belongs to adapter {}, ignoring it in adapter {adapter_id} inventory",
                        device.id, device.adapter_id
                    );
                    continue;
                }
                Some(device) => {
                    device.status = status;
                    if entry.details.is_some() {
                        device.details = entry.details;
                    }
                }
                None => {
                    info!(
                        "Discovered device {} on adapter {adapter_id} ({status:?})",
                        entry.device_id
                    );
                    self.devices.push(Device {
                        id: entry.device_id.clone(),
                        adapter_id,
                        status,
                        details: entry.details,
                    });
                }
            }
            listed.insert(entry.device_id);
        }

        let stale: Vec<DeviceId> = self
            .owned_by(adapter_id)
            .filter(|d| !listed.contains(&d.id))
            .map(|d| d.id.clone())
            .collect();
        for device_id in stale {
            debug!("Device {device_id} no longer listed by adapter {adapter_id}");
            self.remove(&device_id);
        }
    }

    /// Optimistically mark a connect request. Returns false for unknown ids.
    pub fn begin_connect(&mut self, device_id: &str) -> bool {
        self.begin(device_id, DeviceStatus::Connecting)
    }

    /// Optimistically mark a disconnect request. Returns false for unknown ids.
    pub fn begin_disconnect(&mut self, device_id: &str) -> bool {
        self.begin(device_id, DeviceStatus::Disconnecting)
    }

    fn begin(&mut self, device_id: &str, status: DeviceStatus) -> bool {
        match self.get_mut(device_id) {
            Some(device) => {
                debug!("Device {device_id}: {:?} -> {status:?}", device.status);
                device.status = status;
                true
            }
            None => {
                warn!("Ignoring request for unknown device {device_id}");
                false
            }
        }
    }

    /// Apply an inbound lifecycle signal from `adapter_id`.
    pub fn apply_signal(&mut self, adapter_id: AdapterId, device_id: &str, signal: DeviceSignal) {
        let Some(device) = self.get_mut(device_id) else {
            warn!("Adapter {adapter_id} sent '{signal}' for unknown device {device_id}");
            return;
        };

        if device.adapter_id != adapter_id {
            warn!(
                "Adapter {adapter_id} sent '{signal}' for device {device_id} owned by adapter {}",
                device.adapter_id
            );
            return;
        }

        match device.status.on_signal(signal) {
            Some(next) => {
                info!("Device {device_id}: {:?} -> {next:?} ('{signal}')", device.status);
                device.status = next;
            }
            None => warn!(
                "Device {device_id}: '{signal}' does not apply while {:?}",
                device.status
            ),
        }
    }

    /// Remove every device owned by `adapter_id`. Returns how many were removed.
    pub fn purge_adapter(&mut self, adapter_id: AdapterId) -> usize {
        let before = self.devices.len();
        self.devices.retain(|d| d.adapter_id != adapter_id);
        self.clear_dangling_selection();

        let purged = before - self.devices.len();
        if purged > 0 {
            info!("Purged {purged} device(s) of adapter {adapter_id}");
        }
        purged
    }

    fn remove(&mut self, device_id: &str) -> bool {
        let before = self.devices.len();
        self.devices.retain(|d| d.id != device_id);
        self.clear_dangling_selection();
        before != self.devices.len()
    }

    fn clear_dangling_selection(&mut self) {
        if let Some(selected) = &self.selected {
            if self.get(selected).is_none() {
                debug!("Clearing selection of removed device {selected}");
                self.selected = None;
            }
        }
    }

    pub fn select(&mut self, device_id: &str) -> bool {
        if self.get(device_id).is_none() {
            warn!("Cannot select unknown device {device_id}");
            return false;
        }
        self.selected = Some(device_id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&Device> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    pub fn selected_id(&self) -> Option<&DeviceId> {
        self.selected.as_ref()
    }
}
