//! Demultiplexes `message_data` by action type, decodes the payloads and
//! records them in the message log.
//!
//! Nothing in here fails outward: a message that cannot be decoded is logged
//! and dropped, and the log is left untouched.

pub mod message_log;
pub mod schema;

pub use message_log::{DecodedMessage, MessageKind, MessageLog};
pub use schema::{SchemaCatalog, SchemaPaths, SchemaSlot, SchemaState};

use crate::channel::MessageData;
use crate::clock::Clock;
use crate::error::decode::DecodeError;
use crate::proto::Action;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use log::{debug, error, info, warn};
use serde_json::Value;

/// Share id of the device identity block carried in `devices_detailed`.
pub const DEVICE_DETAIL_SHARE: u32 = 1;

pub struct MessageRouter {
    common: SchemaSlot,
    share: SchemaSlot,
    log: MessageLog,
    clock: Arc<dyn Clock>,
}

impl MessageRouter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            common: SchemaSlot::Loading,
            share: SchemaSlot::Loading,
            log: MessageLog::new(),
            clock,
        }
    }

    /// Record the outcome of loading the `kind` schema.
    pub fn install(&mut self, kind: MessageKind, result: Result<SchemaCatalog, DecodeError>) {
        let slot = match result {
            Ok(catalog) => {
                info!("{kind} schema ready");
                SchemaSlot::Ready(catalog)
            }
            Err(e) => {
                error!("{kind} schema unavailable: {e}");
                SchemaSlot::Unavailable(e.to_string())
            }
        };
        *self.slot_mut(kind) = slot;
    }

    fn slot(&self, kind: MessageKind) -> &SchemaSlot {
        match kind {
            MessageKind::Common => &self.common,
            MessageKind::Share => &self.share,
        }
    }

    fn slot_mut(&mut self, kind: MessageKind) -> &mut SchemaSlot {
        match kind {
            MessageKind::Common => &mut self.common,
            MessageKind::Share => &mut self.share,
        }
    }

    pub fn schema_state(&self, kind: MessageKind) -> SchemaState {
        self.slot(kind).state()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Decode an inbound `message_data` and append it to the log.
    ///
    /// Returns the logged message, or `None` when it was dropped.
    pub fn route(&mut self, data: &MessageData) -> Option<&DecodedMessage> {
        let decoded = Self::classify(data.action_type)
            .and_then(|kind| self.decode_message(kind, data.share_id, &data.data));

        match decoded {
            Ok(message) => {
                debug!(
                    "Logged {} share {} at {}",
                    message.kind, message.share_id, message.created_at_ms
                );
                self.log.push(message);
                self.log.as_slice().last()
            }
            Err(e) => {
                warn!(
                    "Dropping message_data (action {}, share {}): {e}",
                    data.action_type, data.share_id
                );
                None
            }
        }
    }

    /// Map a transaction action type onto the schema that decodes it.
    pub fn classify(action_type: i32) -> Result<MessageKind, DecodeError> {
        match Action::try_from(action_type) {
            Ok(Action::CommonResponse | Action::CommonPublish) => Ok(MessageKind::Common),
            Ok(Action::ShareResponse | Action::SharePublish) => Ok(MessageKind::Share),
            _ => Err(DecodeError::unsupported_action(action_type)),
        }
    }

    /// Decode one base64 payload into a timestamped message without logging it.
    pub fn decode_message(
        &self,
        kind: MessageKind,
        share_id: u32,
        encoded: &str,
    ) -> Result<DecodedMessage, DecodeError> {
        let catalog = self.slot(kind).catalog(kind)?;
        let bytes = decode_base64(encoded)?;
        let payload = catalog.decode(share_id, &bytes)?;
        Ok(DecodedMessage {
            kind,
            share_id,
            payload,
            created_at_ms: self.clock.now_ms(),
        })
    }

    /// Decode the Common identity block of a `devices_detailed` entry.
    pub fn decode_detail(&self, encoded: &str) -> Result<Value, DecodeError> {
        let catalog = self.slot(MessageKind::Common).catalog(MessageKind::Common)?;
        let bytes = decode_base64(encoded)?;
        catalog.decode(DEVICE_DETAIL_SHARE, &bytes)
    }

    /// Encode `value` for an outbound publish.
    ///
    /// Common payloads go out URL-safe encoded, Share payloads standard.
    pub fn encode_publish(
        &self,
        kind: MessageKind,
        share_id: u32,
        value: &Value,
    ) -> Result<String, DecodeError> {
        let catalog = self.slot(kind).catalog(kind)?;
        let bytes = catalog.encode(share_id, value)?;
        let encoded = match kind {
            MessageKind::Common => URL_SAFE.encode(bytes),
            MessageKind::Share => STANDARD.encode(bytes),
        };
        Ok(encoded)
    }
}

/// Standard alphabet first, URL-safe as a fallback.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let encoded = encoded.trim();
    match STANDARD.decode(encoded) {
        Ok(bytes) => Ok(bytes),
        Err(standard) => URL_SAFE.decode(encoded).map_err(|_| DecodeError::from(standard)),
    }
}
