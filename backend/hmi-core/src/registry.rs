//! Adapter identity to Channel mapping.
//!
//! The registry never touches the network itself: opening is delegated to the
//! [`Transport`], everything else is bookkeeping over the channel handles.

use crate::channel::{Channel, ChannelEnvelope, ChannelId, OutboundEvent, Transport};
use crate::session::adapter::{AdapterAddress, AdapterId};

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;

pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<ChannelEnvelope>,
    channels: HashMap<AdapterId, Channel>,
}

impl ConnectionRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
    ) -> Self {
        Self {
            transport,
            events,
            channels: HashMap::new(),
        }
    }

    /// Open a channel for `adapter_id` and register it.
    ///
    /// An existing entry is replaced without being closed; callers disconnect
    /// first. The displaced handle is dropped, which detaches its transport.
    pub fn connect(&mut self, adapter_id: AdapterId, address: &AdapterAddress) -> &Channel {
        let channel = self
            .transport
            .open(adapter_id, address, self.events.clone());

        match self.channels.entry(adapter_id) {
            Entry::Occupied(mut entry) => {
                warn!(
                    "Adapter {adapter_id} channel {} replaced by {} without disconnect",
                    entry.get().id(),
                    channel.id()
                );
                entry.insert(channel);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(channel),
        }
    }

    /// Close and remove the channel of `adapter_id`. Returns false if there was none.
    pub fn disconnect(&mut self, adapter_id: AdapterId) -> bool {
        match self.channels.remove(&adapter_id) {
            Some(mut channel) => {
                channel.close();
                true
            }
            None => {
                debug!("Adapter {adapter_id} has no channel to disconnect");
                false
            }
        }
    }

    pub fn get(&self, adapter_id: AdapterId) -> Option<&Channel> {
        self.channels.get(&adapter_id)
    }

    pub fn contains(&self, adapter_id: AdapterId) -> bool {
        self.channels.contains_key(&adapter_id)
    }

    /// Whether events from `channel_id` still have a path back to `adapter_id`.
    pub fn is_current(&self, adapter_id: AdapterId, channel_id: ChannelId) -> bool {
        self.get(adapter_id)
            .is_some_and(|channel| channel.id() == channel_id)
    }

    /// Send through the channel of `adapter_id`. Returns false if there is none.
    pub fn send(&self, adapter_id: AdapterId, event: OutboundEvent) -> bool {
        match self.get(adapter_id) {
            Some(channel) => {
                channel.send(event);
                true
            }
            None => {
                warn!(
                    "Dropping '{}': adapter {adapter_id} has no channel",
                    event.name()
                );
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        for channel in self.channels.values_mut() {
            channel.close();
        }
    }
}
