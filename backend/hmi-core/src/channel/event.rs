//! Named events carried over a channel.
//!
//! On the wire every event is one text frame holding a JSON array: the event
//! name followed by its positional arguments, e.g. `["connect_device", "D1"]`.
//! Lifecycle events (`connect`, `disconnect`, `close`, `error`,
//! `connect_error`) are produced by the transport itself and never parsed from
//! a frame.

use crate::decoder::MessageKind;
use crate::error::channel::ChannelError;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CLOSE: &str = "close";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_DISCONNECTED: &str = "disconnected";
pub const EVENT_CONNECTED_FAILED: &str = "connected_failed";
pub const EVENT_DISCONNECTED_FAILED: &str = "disconnected_failed";
pub const EVENT_DEVICES_DETAILED: &str = "devices_detailed";
pub const EVENT_MESSAGE_DATA: &str = "message_data";
pub const EVENT_GET_DEVICES_DETAILED: &str = "get_devices_detailed";
pub const EVENT_CONNECT_DEVICE: &str = "connect_device";
pub const EVENT_DISCONNECT_DEVICE: &str = "disconnect_device";

/// One device as listed by `devices_detailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    pub device_id: String,
    /// Base64 encoded Common share 1 (device identity block).
    #[serde(default)]
    pub common1: Option<String>,
    #[serde(default)]
    pub connected: bool,
}

/// Payload of `message_data`. The share id travels beside the binary data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub action_type: i32,
    pub share_id: u32,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connect,
    Disconnect,
    Close,
    Error { message: String },
    ConnectError { message: String },
    DeviceConnected(String),
    DeviceDisconnected(String),
    DeviceConnectFailed(String),
    DeviceDisconnectFailed(String),
    DevicesDetailed(Vec<DeviceDetail>),
    MessageData(MessageData),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Connect => EVENT_CONNECT,
            InboundEvent::Disconnect => EVENT_DISCONNECT,
            InboundEvent::Close => EVENT_CLOSE,
            InboundEvent::Error { .. } => EVENT_ERROR,
            InboundEvent::ConnectError { .. } => EVENT_CONNECT_ERROR,
            InboundEvent::DeviceConnected(_) => EVENT_CONNECTED,
            InboundEvent::DeviceDisconnected(_) => EVENT_DISCONNECTED,
            InboundEvent::DeviceConnectFailed(_) => EVENT_CONNECTED_FAILED,
            InboundEvent::DeviceDisconnectFailed(_) => EVENT_DISCONNECTED_FAILED,
            InboundEvent::DevicesDetailed(_) => EVENT_DEVICES_DETAILED,
            InboundEvent::MessageData(_) => EVENT_MESSAGE_DATA,
        }
    }

    /// Parse a data-bearing event from a text frame.
    pub fn from_frame(text: &str) -> Result<Self, ChannelError> {
        let mut parts: Vec<Value> = serde_json::from_str(text)?;
        if parts.is_empty() {
            return Err(ChannelError::frame("empty event frame"));
        }

        let name = match parts.remove(0) {
            Value::String(name) => name,
            other => {
                return Err(ChannelError::frame(format!(
                    "event name must be a string, got {other}"
                )));
            }
        };
        let argument = parts.into_iter().next().unwrap_or(Value::Null);

        match name.as_str() {
            EVENT_CONNECTED => Ok(InboundEvent::DeviceConnected(device_id(argument)?)),
            EVENT_DISCONNECTED => Ok(InboundEvent::DeviceDisconnected(device_id(argument)?)),
            EVENT_CONNECTED_FAILED => Ok(InboundEvent::DeviceConnectFailed(device_id(argument)?)),
            EVENT_DISCONNECTED_FAILED => {
                Ok(InboundEvent::DeviceDisconnectFailed(device_id(argument)?))
            }
            EVENT_DEVICES_DETAILED => Ok(InboundEvent::DevicesDetailed(serde_json::from_value(
                argument,
            )?)),
            EVENT_MESSAGE_DATA => Ok(InboundEvent::MessageData(serde_json::from_value(argument)?)),
            _ => Err(ChannelError::unknown_event(name)),
        }
    }
}

fn device_id(argument: Value) -> Result<String, ChannelError> {
    match argument {
        Value::String(id) if !id.is_empty() => Ok(id),
        other => Err(ChannelError::frame(format!(
            "expected a device id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    GetDevicesDetailed,
    ConnectDevice {
        device_id: String,
    },
    DisconnectDevice {
        device_id: String,
    },
    Request {
        kind: MessageKind,
        device_id: String,
        share_id: u32,
    },
    SetScheduled {
        kind: MessageKind,
        device_id: String,
        share_id: u32,
        interval_ms: u32,
    },
    ClearScheduled {
        kind: MessageKind,
        device_id: String,
        share_id: u32,
    },
    Publish {
        kind: MessageKind,
        device_id: String,
        share_id: u32,
        payload: String,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::GetDevicesDetailed => EVENT_GET_DEVICES_DETAILED,
            OutboundEvent::ConnectDevice { .. } => EVENT_CONNECT_DEVICE,
            OutboundEvent::DisconnectDevice { .. } => EVENT_DISCONNECT_DEVICE,
            OutboundEvent::Request { kind, .. } => match kind {
                MessageKind::Common => "request_common",
                MessageKind::Share => "request_share",
            },
            OutboundEvent::SetScheduled { kind, .. } => match kind {
                MessageKind::Common => "set_scheduled_common",
                MessageKind::Share => "set_scheduled_share",
            },
            OutboundEvent::ClearScheduled { kind, .. } => match kind {
                MessageKind::Common => "clear_scheduled_common",
                MessageKind::Share => "clear_scheduled_share",
            },
            OutboundEvent::Publish { kind, .. } => match kind {
                MessageKind::Common => "publish_common",
                MessageKind::Share => "publish_share",
            },
        }
    }

    /// Positional arguments following the event name.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            // The adapter ignores the argument but expects one to be present
            OutboundEvent::GetDevicesDetailed => vec![Value::Null],
            OutboundEvent::ConnectDevice { device_id }
            | OutboundEvent::DisconnectDevice { device_id } => vec![json!(device_id)],
            OutboundEvent::Request {
                device_id,
                share_id,
                ..
            }
            | OutboundEvent::ClearScheduled {
                device_id,
                share_id,
                ..
            } => vec![json!(device_id), json!(share_id)],
            OutboundEvent::SetScheduled {
                device_id,
                share_id,
                interval_ms,
                ..
            } => vec![json!(device_id), json!(share_id), json!(interval_ms)],
            OutboundEvent::Publish {
                device_id,
                share_id,
                payload,
                ..
            } => vec![json!(device_id), json!(share_id), json!(payload)],
        }
    }

    /// Serialize to the text frame sent on the wire.
    pub fn to_frame(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        parts.push(Value::String(self.name().to_string()));
        parts.extend(self.arguments());
        Value::Array(parts).to_string()
    }
}
