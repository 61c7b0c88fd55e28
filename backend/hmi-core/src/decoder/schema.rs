//! Runtime schema resources.
//!
//! Each schema is a `.proto` file compiled at load time into a descriptor
//! pool, so new shares only need an edited resource, not a rebuild. Messages
//! are looked up by share id: `Common{id}` or `Share{id}`.

use crate::decoder::MessageKind;
use crate::error::decode::DecodeError;

use std::path::{Path, PathBuf};

use log::info;
use prost::Message as ProstMessage;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, SerializeOptions};
use serde::Serialize;
use serde_json::Value;

/// A compiled schema for one [`MessageKind`].
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    kind: MessageKind,
    pool: DescriptorPool,
}

impl SchemaCatalog {
    /// Compile the `.proto` file at `path`. Imports resolve relative to its directory.
    pub fn load(kind: MessageKind, path: &Path) -> Result<Self, DecodeError> {
        let include = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file = path
            .file_name()
            .ok_or_else(|| DecodeError::schema_load(path, "not a file path"))?;

        let descriptors = protox::compile([file], [&include])
            .map_err(|e| DecodeError::schema_load(path, e.to_string()))?;
        let pool = DescriptorPool::from_file_descriptor_set(descriptors)
            .map_err(|e| DecodeError::schema_load(path, e.to_string()))?;

        info!(
            "Loaded {kind} schema from {} ({} messages)",
            path.display(),
            pool.all_messages().count()
        );
        Ok(Self { kind, pool })
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Descriptor of the message carrying `share_id`.
    pub fn message(&self, share_id: u32) -> Result<MessageDescriptor, DecodeError> {
        let name = format!("{}{share_id}", self.kind.message_prefix());
        self.pool
            .all_messages()
            .find(|descriptor| descriptor.name() == name)
            .ok_or_else(|| DecodeError::unknown_share(self.kind, share_id))
    }

    /// Decode `bytes` for `share_id` into JSON, with every unset field present
    /// at its declared default.
    pub fn decode(&self, share_id: u32, bytes: &[u8]) -> Result<Value, DecodeError> {
        let descriptor = self.message(share_id)?;
        let message = DynamicMessage::decode(descriptor, bytes)?;
        let options = SerializeOptions::new().skip_default_fields(false);
        message
            .serialize_with_options(serde_json::value::Serializer, &options)
            .map_err(|e| DecodeError::protobuf_decode(e.to_string()))
    }

    /// Encode a JSON value for `share_id` to wire bytes.
    pub fn encode(&self, share_id: u32, value: &Value) -> Result<Vec<u8>, DecodeError> {
        let descriptor = self.message(share_id)?;
        let message = DynamicMessage::deserialize(descriptor, value.clone())
            .map_err(|e| DecodeError::protobuf_encode(e.to_string()))?;
        Ok(message.encode_to_vec())
    }
}

/// Load state of one schema.
#[derive(Debug, Clone, Default)]
pub enum SchemaSlot {
    #[default]
    Loading,
    Ready(SchemaCatalog),
    Unavailable(String),
}

impl SchemaSlot {
    pub fn state(&self) -> SchemaState {
        match self {
            SchemaSlot::Loading => SchemaState::Loading,
            SchemaSlot::Ready(_) => SchemaState::Ready,
            SchemaSlot::Unavailable(_) => SchemaState::Unavailable,
        }
    }

    /// The loaded catalog, or why there is none.
    pub fn catalog(&self, kind: MessageKind) -> Result<&SchemaCatalog, DecodeError> {
        match self {
            SchemaSlot::Ready(catalog) => Ok(catalog),
            SchemaSlot::Loading => Err(DecodeError::schema_unavailable(kind, "still loading")),
            SchemaSlot::Unavailable(_) => Err(DecodeError::schema_unavailable(kind, "unavailable")),
        }
    }
}

/// Observable summary of a [`SchemaSlot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SchemaState {
    #[default]
    Loading,
    Ready,
    Unavailable,
}

/// Where the two schema resources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPaths {
    pub common: PathBuf,
    pub share: PathBuf,
}

impl SchemaPaths {
    pub fn path(&self, kind: MessageKind) -> &Path {
        match kind {
            MessageKind::Common => &self.common,
            MessageKind::Share => &self.share,
        }
    }
}

impl Default for SchemaPaths {
    fn default() -> Self {
        Self {
            common: PathBuf::from(crate::COMMON_SCHEMA_PATH),
            share: PathBuf::from(crate::SHARE_SCHEMA_PATH),
        }
    }
}
