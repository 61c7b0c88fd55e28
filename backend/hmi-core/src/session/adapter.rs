//! Adapter records and the collection that owns them.

use crate::error::channel::ChannelError;
use crate::error::session::SessionError;

use common::ValidationError;

use std::fmt::{Display, Formatter, Result as FormatResult};

use log::{debug, info};
use serde::Serialize;
use url::Url;

pub type AdapterId = u32;

/// Lifecycle of one adapter connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterStatus {
    Disconnected,
    Connecting,
    Connected,
    Unavailable,
    Failed,
}

impl AdapterStatus {
    /// Numeric code shown to operators (`-2` Failed through `2` Connected).
    pub fn code(self) -> i8 {
        match self {
            AdapterStatus::Disconnected => 0,
            AdapterStatus::Connecting => 1,
            AdapterStatus::Connected => 2,
            AdapterStatus::Unavailable => -1,
            AdapterStatus::Failed => -2,
        }
    }

    /// Connecting or Connected. At most one adapter is ever in this set.
    pub fn is_active(self) -> bool {
        matches!(self, AdapterStatus::Connecting | AdapterStatus::Connected)
    }
}

impl Display for AdapterStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{self:?}({})", self.code())
    }
}

/// Network location of an adapter's socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterAddress {
    host: String,
    port: u16,
}

impl AdapterAddress {
    #[track_caller]
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ValidationError> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(ValidationError::field("host", "cannot be empty"));
        }
        if port == 0 {
            return Err(ValidationError::field("port", "must not be zero"));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// WebSocket URL for this address under `namespace` (e.g. `/api`).
    ///
    /// A host written with an `http(s)://` or `ws(s)://` prefix keeps its
    /// security level; anything else is plain `ws`.
    pub fn to_url(&self, namespace: &str) -> Result<Url, ChannelError> {
        let (scheme, host) = split_scheme(&self.host);
        let host = host.trim_end_matches('/');
        Ok(Url::parse(&format!("{scheme}://{host}:{}{namespace}", self.port))?)
    }
}

impl Display for AdapterAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn split_scheme(host: &str) -> (&'static str, &str) {
    for (prefix, scheme) in [
        ("wss://", "wss"),
        ("https://", "wss"),
        ("ws://", "ws"),
        ("http://", "ws"),
    ] {
        if let Some(rest) = host.strip_prefix(prefix) {
            return (scheme, rest);
        }
    }
    ("ws", host)
}

/// Validated input for creating an adapter. `id` of `None` means "assign one".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSpec {
    pub id: Option<AdapterId>,
    pub name: String,
    pub address: AdapterAddress,
}

impl AdapterSpec {
    #[track_caller]
    pub fn new(
        id: Option<AdapterId>,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::field("name", "cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            address: AdapterAddress::new(host, port)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adapter {
    pub id: AdapterId,
    pub name: String,
    pub address: AdapterAddress,
    pub status: AdapterStatus,
    /// Consecutive `connect_error` events since the last explicit connect.
    pub unavailable_count: u32,
    pub last_activity_ms: Option<u64>,
}

/// Ordered adapter collection. Identities are unique.
#[derive(Debug, Default)]
pub struct AdapterStore {
    adapters: Vec<Adapter>,
}

impl AdapterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an adapter, assigning `last id + 1` (or 0 when empty) if the spec has none.
    pub fn add(&mut self, spec: AdapterSpec) -> Result<AdapterId, SessionError> {
        let id = spec.id.unwrap_or_else(|| self.next_id());
        if self.get(id).is_some() {
            return Err(SessionError::duplicate_adapter(id));
        }

        info!("Adding adapter {id} '{}' at {}", spec.name, spec.address);
        self.adapters.push(Adapter {
            id,
            name: spec.name,
            address: spec.address,
            status: AdapterStatus::Disconnected,
            unavailable_count: 0,
            last_activity_ms: None,
        });
        Ok(id)
    }

    fn next_id(&self) -> AdapterId {
        self.adapters
            .last()
            .map(|last| last.id.saturating_add(1))
            .unwrap_or(0)
    }

    /// Replace name and address of an existing adapter. Status is left alone.
    pub fn update(&mut self, adapter_id: AdapterId, name: String, address: AdapterAddress) -> bool {
        match self.get_mut(adapter_id) {
            Some(adapter) => {
                adapter.name = name;
                adapter.address = address;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, adapter_id: AdapterId) -> bool {
        match self.adapters.iter().position(|a| a.id == adapter_id) {
            Some(index) => {
                let removed = self.adapters.remove(index);
                debug!("Removed adapter {} '{}'", removed.id, removed.name);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, adapter_id: AdapterId) -> Option<&Adapter> {
        self.adapters.iter().find(|a| a.id == adapter_id)
    }

    pub fn get_mut(&mut self, adapter_id: AdapterId) -> Option<&mut Adapter> {
        self.adapters.iter_mut().find(|a| a.id == adapter_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Adapter> {
        self.adapters.iter()
    }

    pub fn as_slice(&self) -> &[Adapter] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
