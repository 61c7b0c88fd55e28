//! The HMI session context: adapters, devices, channels and decoded messages.
//!
//! [`HmiSession`] is a plain value. Every mutation goes through one of its
//! methods, called either directly (tests) or one at a time by the session
//! actor, so no transition ever interleaves with another.
//!
//! # Adapter lifecycle
//!
//! | Trigger                     | Status                                  |
//! |-----------------------------|-----------------------------------------|
//! | `request_connect`           | Connecting, counter reset, now active   |
//! | `connect`                   | Connected                               |
//! | `connect_error`             | Connecting, counter + 1, Failed past threshold |
//! | `disconnect` / disconnect   | Disconnected                            |
//! | `close`                     | Unavailable                             |
//! | `error`                     | Failed                                  |
//!
//! Leaving Connecting/Connected always closes the channel, clears the active
//! marker and purges the adapter's devices.

pub mod actor;
pub mod adapter;
pub mod device;

pub use actor::{SessionCommand, SessionHandle};
pub use adapter::{Adapter, AdapterAddress, AdapterId, AdapterSpec, AdapterStatus, AdapterStore};
pub use device::{
    Device, DeviceId, DeviceSignal, DeviceStatus, DeviceTracker, InventoryEntry,
};

use crate::channel::event::{DeviceDetail, InboundEvent, OutboundEvent};
use crate::channel::{ChannelEnvelope, Transport};
use crate::clock::Clock;
use crate::decoder::{
    DecodedMessage, MessageKind, MessageLog, MessageRouter, SchemaCatalog, SchemaState,
};
use crate::error::decode::DecodeError;
use crate::error::session::SessionError;
use crate::registry::ConnectionRegistry;

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

pub const DEFAULT_UNAVAILABLE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// `connect_error` count above which an adapter escalates to Failed.
    pub unavailable_threshold: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            unavailable_threshold: DEFAULT_UNAVAILABLE_THRESHOLD,
        }
    }
}

/// Point-in-time copy of everything a presentation layer renders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HmiSnapshot {
    pub adapters: Vec<Adapter>,
    pub devices: Vec<Device>,
    pub active_adapter: Option<AdapterId>,
    pub selected_device: Option<DeviceId>,
    pub message_count: usize,
    pub throughput: Option<f64>,
    /// Newest decoded message per (kind, share).
    pub latest_messages: Vec<DecodedMessage>,
    pub common_schema: SchemaState,
    pub share_schema: SchemaState,
}

pub struct HmiSession {
    adapters: AdapterStore,
    devices: DeviceTracker,
    registry: ConnectionRegistry,
    router: MessageRouter,
    active_adapter: Option<AdapterId>,
    unavailable_threshold: u32,
    clock: Arc<dyn Clock>,
}

impl HmiSession {
    /// Build a session whose channels report into `events`.
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            adapters: AdapterStore::new(),
            devices: DeviceTracker::new(),
            registry: ConnectionRegistry::new(transport, events),
            router: MessageRouter::new(Arc::clone(&clock)),
            active_adapter: None,
            unavailable_threshold: settings.unavailable_threshold,
            clock,
        }
    }

    // ============================================
    // ADAPTERS
    // ============================================

    pub fn add_adapter(&mut self, spec: AdapterSpec) -> Result<AdapterId, SessionError> {
        self.adapters.add(spec)
    }

    /// Rename or re-address an adapter. A live channel keeps its old address
    /// until the next connect.
    pub fn update_adapter(
        &mut self,
        adapter_id: AdapterId,
        name: String,
        address: AdapterAddress,
    ) -> bool {
        let updated = self.adapters.update(adapter_id, name, address);
        if !updated {
            warn!("Cannot update unknown adapter {adapter_id}");
        }
        updated
    }

    /// Disconnect and forget an adapter.
    pub fn remove_adapter(&mut self, adapter_id: AdapterId) -> bool {
        if self.adapters.get(adapter_id).is_none() {
            warn!("Cannot remove unknown adapter {adapter_id}");
            return false;
        }
        self.teardown(adapter_id, AdapterStatus::Disconnected);
        self.adapters.remove(adapter_id)
    }

    pub fn adapter(&self, adapter_id: AdapterId) -> Option<&Adapter> {
        self.adapters.get(adapter_id)
    }

    pub fn adapters(&self) -> &[Adapter] {
        self.adapters.as_slice()
    }

    pub fn active_adapter(&self) -> Option<AdapterId> {
        self.active_adapter
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Make `adapter_id` the active adapter and open its channel.
    ///
    /// Every other adapter holding a channel is fully torn down first.
    pub fn request_connect(&mut self, adapter_id: AdapterId) -> bool {
        let Some(address) = self.adapters.get(adapter_id).map(|a| a.address.clone()) else {
            warn!("Cannot connect unknown adapter {adapter_id}");
            return false;
        };

        let others: Vec<AdapterId> = self
            .adapters
            .iter()
            .filter(|a| a.id != adapter_id)
            .filter(|a| a.status.is_active() || self.registry.contains(a.id))
            .map(|a| a.id)
            .collect();
        for other in others {
            info!("Disconnecting adapter {other} before connecting {adapter_id}");
            self.request_disconnect(other);
        }

        // Reconnecting the same adapter starts from a clean slate too
        if self.registry.disconnect(adapter_id) {
            self.devices.purge_adapter(adapter_id);
        }

        let channel_id = self.registry.connect(adapter_id, &address).id();
        let now = self.clock.now_ms();
        if let Some(adapter) = self.adapters.get_mut(adapter_id) {
            info!(
                "Adapter {adapter_id}: {} -> Connecting on channel {channel_id}",
                adapter.status
            );
            adapter.status = AdapterStatus::Connecting;
            adapter.unavailable_count = 0;
            adapter.last_activity_ms = Some(now);
        }
        self.active_adapter = Some(adapter_id);
        true
    }

    pub fn request_disconnect(&mut self, adapter_id: AdapterId) -> bool {
        if self.adapters.get(adapter_id).is_none() {
            warn!("Cannot disconnect unknown adapter {adapter_id}");
            return false;
        }
        self.teardown(adapter_id, AdapterStatus::Disconnected);
        true
    }

    /// Close the channel, drop the active marker, purge devices, set `status`.
    fn teardown(&mut self, adapter_id: AdapterId, status: AdapterStatus) {
        self.registry.disconnect(adapter_id);
        if self.active_adapter == Some(adapter_id) {
            self.active_adapter = None;
        }
        self.devices.purge_adapter(adapter_id);

        if let Some(adapter) = self.adapters.get_mut(adapter_id) {
            if adapter.status != status {
                info!("Adapter {adapter_id}: {} -> {status}", adapter.status);
            }
            adapter.status = status;
        }
    }

    fn touch(&mut self, adapter_id: AdapterId) {
        let now = self.clock.now_ms();
        if let Some(adapter) = self.adapters.get_mut(adapter_id) {
            adapter.last_activity_ms = Some(now);
        }
    }

    // ============================================
    // INBOUND EVENTS
    // ============================================

    /// Apply one inbound event. Events from a channel the registry no longer
    /// holds are late arrivals and are ignored.
    pub fn handle_event(&mut self, envelope: ChannelEnvelope) {
        let ChannelEnvelope {
            adapter_id,
            channel_id,
            event,
        } = envelope;

        if !self.registry.is_current(adapter_id, channel_id) {
            debug!(
                "Ignoring '{}' from stale channel {channel_id} of adapter {adapter_id}",
                event.name()
            );
            return;
        }
        self.touch(adapter_id);

        match event {
            InboundEvent::Connect => {
                if let Some(adapter) = self.adapters.get_mut(adapter_id) {
                    info!("Adapter {adapter_id}: {} -> Connected", adapter.status);
                    adapter.status = AdapterStatus::Connected;
                }
            }
            InboundEvent::Disconnect => self.teardown(adapter_id, AdapterStatus::Disconnected),
            InboundEvent::Close => self.teardown(adapter_id, AdapterStatus::Unavailable),
            InboundEvent::Error { message } => {
                warn!("Adapter {adapter_id} channel error: {message}");
                self.teardown(adapter_id, AdapterStatus::Failed);
            }
            InboundEvent::ConnectError { message } => self.on_connect_error(adapter_id, &message),
            InboundEvent::DeviceConnected(device_id) => {
                self.devices
                    .apply_signal(adapter_id, &device_id, DeviceSignal::Connected)
            }
            InboundEvent::DeviceDisconnected(device_id) => {
                self.devices
                    .apply_signal(adapter_id, &device_id, DeviceSignal::Disconnected)
            }
            InboundEvent::DeviceConnectFailed(device_id) => {
                self.devices
                    .apply_signal(adapter_id, &device_id, DeviceSignal::ConnectFailed)
            }
            InboundEvent::DeviceDisconnectFailed(device_id) => {
                self.devices
                    .apply_signal(adapter_id, &device_id, DeviceSignal::DisconnectFailed)
            }
            InboundEvent::DevicesDetailed(details) => self.on_inventory(adapter_id, details),
            InboundEvent::MessageData(data) => {
                self.router.route(&data);
            }
        }
    }

    fn on_connect_error(&mut self, adapter_id: AdapterId, message: &str) {
        let threshold = self.unavailable_threshold;
        let exceeded = match self.adapters.get_mut(adapter_id) {
            Some(adapter) => {
                adapter.unavailable_count = adapter.unavailable_count.saturating_add(1);
                warn!(
                    "Adapter {adapter_id} connect error {}/{threshold}: {message}",
                    adapter.unavailable_count
                );
                if adapter.unavailable_count > threshold {
                    true
                } else {
                    adapter.status = AdapterStatus::Connecting;
                    false
                }
            }
            None => return,
        };

        if exceeded {
            self.teardown(adapter_id, AdapterStatus::Failed);
        }
    }

    fn on_inventory(&mut self, adapter_id: AdapterId, details: Vec<DeviceDetail>) {
        if self.active_adapter != Some(adapter_id) {
            warn!("Ignoring device inventory from inactive adapter {adapter_id}");
            return;
        }

        let entries = details
            .into_iter()
            .map(|detail| {
                let details = detail.common1.as_deref().and_then(|encoded| {
                    self.router
                        .decode_detail(encoded)
                        .inspect_err(|e| {
                            warn!("Device {} identity block not decoded: {e}", detail.device_id)
                        })
                        .ok()
                });
                InventoryEntry {
                    device_id: detail.device_id,
                    connected: detail.connected,
                    details,
                }
            })
            .collect();

        self.devices.apply_inventory(adapter_id, entries);
    }

    // ============================================
    // DEVICES
    // ============================================

    pub fn devices(&self) -> &[Device] {
        self.devices.as_slice()
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    /// Ask the active adapter for its device inventory.
    pub fn request_devices(&mut self) -> bool {
        let Some(adapter_id) = self.active_adapter else {
            warn!("No active adapter to request devices from");
            return false;
        };
        self.touch(adapter_id);
        self.registry
            .send(adapter_id, OutboundEvent::GetDevicesDetailed)
    }

    pub fn request_connect_device(&mut self, device_id: &str) -> bool {
        let Some(adapter_id) = self.route_for(device_id) else {
            return false;
        };
        self.devices.begin_connect(device_id);
        self.touch(adapter_id);
        self.registry.send(
            adapter_id,
            OutboundEvent::ConnectDevice {
                device_id: device_id.to_string(),
            },
        )
    }

    pub fn request_disconnect_device(&mut self, device_id: &str) -> bool {
        let Some(adapter_id) = self.route_for(device_id) else {
            return false;
        };
        self.devices.begin_disconnect(device_id);
        self.touch(adapter_id);
        self.registry.send(
            adapter_id,
            OutboundEvent::DisconnectDevice {
                device_id: device_id.to_string(),
            },
        )
    }

    /// Owning adapter of `device_id`, provided it still has a channel.
    fn route_for(&self, device_id: &str) -> Option<AdapterId> {
        let Some(adapter_id) = self.devices.owner(device_id) else {
            warn!("Ignoring request for unknown device {device_id}");
            return None;
        };
        if !self.registry.contains(adapter_id) {
            warn!("Device {device_id} adapter {adapter_id} has no channel");
            return None;
        }
        Some(adapter_id)
    }

    pub fn select_device(&mut self, device_id: &str) -> bool {
        self.devices.select(device_id)
    }

    pub fn clear_selection(&mut self) {
        self.devices.clear_selection();
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.devices.selected()
    }

    // ============================================
    // DATA REQUESTS
    // ============================================

    pub fn request_message(&mut self, kind: MessageKind, device_id: &str, share_id: u32) -> bool {
        self.send_for_device(
            device_id,
            OutboundEvent::Request {
                kind,
                device_id: device_id.to_string(),
                share_id,
            },
        )
    }

    pub fn set_scheduled(
        &mut self,
        kind: MessageKind,
        device_id: &str,
        share_id: u32,
        interval_ms: u32,
    ) -> bool {
        self.send_for_device(
            device_id,
            OutboundEvent::SetScheduled {
                kind,
                device_id: device_id.to_string(),
                share_id,
                interval_ms,
            },
        )
    }

    pub fn clear_scheduled(&mut self, kind: MessageKind, device_id: &str, share_id: u32) -> bool {
        self.send_for_device(
            device_id,
            OutboundEvent::ClearScheduled {
                kind,
                device_id: device_id.to_string(),
                share_id,
            },
        )
    }

    /// Encode `value` and publish it to a device.
    ///
    /// Returns `Ok(false)` when the device cannot be reached, an error when
    /// the value does not fit the schema.
    pub fn publish(
        &mut self,
        kind: MessageKind,
        device_id: &str,
        share_id: u32,
        value: &Value,
    ) -> Result<bool, SessionError> {
        if self.devices.get(device_id).is_none() {
            warn!("Cannot publish to unknown device {device_id}");
            return Ok(false);
        }
        let payload = self.router.encode_publish(kind, share_id, value)?;
        Ok(self.send_for_device(
            device_id,
            OutboundEvent::Publish {
                kind,
                device_id: device_id.to_string(),
                share_id,
                payload,
            },
        ))
    }

    fn send_for_device(&mut self, device_id: &str, event: OutboundEvent) -> bool {
        let Some(adapter_id) = self.route_for(device_id) else {
            return false;
        };
        self.touch(adapter_id);
        self.registry.send(adapter_id, event)
    }

    // ============================================
    // MESSAGES
    // ============================================

    pub fn install_schema(&mut self, kind: MessageKind, result: Result<SchemaCatalog, DecodeError>) {
        self.router.install(kind, result);
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn messages(&self) -> &MessageLog {
        self.router.log()
    }

    pub fn snapshot(&self) -> HmiSnapshot {
        let log = self.router.log();
        HmiSnapshot {
            adapters: self.adapters.as_slice().to_vec(),
            devices: self.devices.as_slice().to_vec(),
            active_adapter: self.active_adapter,
            selected_device: self.devices.selected_id().cloned(),
            message_count: log.len(),
            throughput: log.throughput(),
            latest_messages: log.latest_per_share().into_iter().cloned().collect(),
            common_schema: self.router.schema_state(MessageKind::Common),
            share_schema: self.router.schema_state(MessageKind::Share),
        }
    }
}
