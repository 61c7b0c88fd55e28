//! Duplex, event-framed channel to one adapter.
//!
//! A [`Channel`] is the caller's half: it queues outbound events and can be
//! closed. The other half, [`ChannelEndpoint`], is handed to a [`Transport`]
//! which drives the physical connection and reports everything that happens
//! through an [`EventSink`] as [`ChannelEnvelope`]s.
//!
//! # Send semantics
//!
//! - Events sent before the transport is established are queued in order and
//!   flushed once it is.
//! - Events sent after [`Channel::close`] are dropped (logged at debug).
//! - Dropping a `Channel` without closing it detaches it: the transport stops
//!   writing, and since nothing routes its envelopes any more, whatever it
//!   still reports is ignored.

pub mod event;
pub mod websocket;

pub use event::{DeviceDetail, InboundEvent, MessageData, OutboundEvent};
pub use websocket::{ChannelSettings, WebSocketTransport};

use crate::session::adapter::{AdapterAddress, AdapterId};

use std::fmt::{Display, Formatter, Result as FormatResult};

use log::{debug, info, trace};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Identity of one channel instance. A reconnect always gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}", self.0)
    }
}

/// An inbound event tagged with the channel it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEnvelope {
    pub adapter_id: AdapterId,
    pub channel_id: ChannelId,
    pub event: InboundEvent,
}

/// Where a transport reports inbound events for one channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    adapter_id: AdapterId,
    channel_id: ChannelId,
    events: mpsc::UnboundedSender<ChannelEnvelope>,
}

impl EventSink {
    /// Deliver `event`. Returns false once the session is gone.
    pub fn emit(&self, event: InboundEvent) -> bool {
        trace!(
            "Channel {} (adapter {}) -> '{}'",
            self.channel_id,
            self.adapter_id,
            event.name()
        );
        self.events
            .send(ChannelEnvelope {
                adapter_id: self.adapter_id,
                channel_id: self.channel_id,
                event,
            })
            .is_ok()
    }

    pub fn adapter_id(&self) -> AdapterId {
        self.adapter_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }
}

/// The transport's half of a channel.
#[derive(Debug)]
pub struct ChannelEndpoint {
    pub sink: EventSink,
    pub outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    /// Resolves `Ok` on [`Channel::close`], `Err` when the channel was dropped.
    pub shutdown: oneshot::Receiver<()>,
}

/// The caller's half of a channel.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    adapter_id: AdapterId,
    address: AdapterAddress,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Channel {
    /// Create a connected caller/transport pair for `adapter_id`.
    pub fn pair(
        adapter_id: AdapterId,
        address: AdapterAddress,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
    ) -> (Channel, ChannelEndpoint) {
        let id = ChannelId::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let channel = Channel {
            id,
            adapter_id,
            address,
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
        };
        let endpoint = ChannelEndpoint {
            sink: EventSink {
                adapter_id,
                channel_id: id,
                events,
            },
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        (channel, endpoint)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn adapter_id(&self) -> AdapterId {
        self.adapter_id
    }

    pub fn address(&self) -> &AdapterAddress {
        &self.address
    }

    /// False once closed here or once the transport has stopped reading.
    pub fn is_open(&self) -> bool {
        self.shutdown.is_some() && !self.outbound.is_closed()
    }

    /// Queue `event` for transmission. Never fails; see the module docs.
    pub fn send(&self, event: OutboundEvent) {
        if !self.is_open() {
            debug!(
                "Dropping '{}' for adapter {}: channel {} is closed",
                event.name(),
                self.adapter_id,
                self.id
            );
            return;
        }

        let name = event.name();
        if self.outbound.send(event).is_err() {
            debug!("Dropping '{name}': channel {} transport has stopped", self.id);
        }
    }

    /// Shut the channel down. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            info!("Closing channel {} to adapter {}", self.id, self.adapter_id);
            // The transport may already be gone; nothing left to stop then
            let _ = shutdown.send(());
        }
    }
}

/// Capability to open a duplex message channel to an adapter address.
///
/// `open` only initiates the connection; progress is reported later through
/// the envelopes sent on `events`.
pub trait Transport: Send + Sync {
    fn open(
        &self,
        adapter_id: AdapterId,
        address: &AdapterAddress,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
    ) -> Channel;
}
