use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::Serialize;
use serde_json::Value;

/// Category of a device payload, selecting both schema and event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MessageKind {
    Common,
    Share,
}

impl MessageKind {
    /// Prefix of the message names in the schema (`Common1`, `Share7`, ...).
    pub fn message_prefix(self) -> &'static str {
        match self {
            MessageKind::Common => "Common",
            MessageKind::Share => "Share",
        }
    }

}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(self.message_prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub kind: MessageKind,
    pub share_id: u32,
    pub payload: Value,
    pub created_at_ms: u64,
}

/// Append-only log of decoded messages.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<DecodedMessage>,
    /// Index of the newest message per (kind, share id).
    newest: BTreeMap<(MessageKind, u32), usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message`. A timestamp older than the newest entry is raised to
    /// it so the log stays ordered even if the wall clock steps back.
    pub fn push(&mut self, mut message: DecodedMessage) {
        if let Some(newest) = self.messages.last() {
            message.created_at_ms = message.created_at_ms.max(newest.created_at_ms);
        }
        self.newest
            .insert((message.kind, message.share_id), self.messages.len());
        self.messages.push(message);
    }

    /// Messages per second derived from the two newest entries.
    ///
    /// `None` with fewer than two messages or when both share a timestamp.
    pub fn throughput(&self) -> Option<f64> {
        let [.., previous, newest] = self.messages.as_slice() else {
            return None;
        };
        let gap_ms = newest.created_at_ms - previous.created_at_ms;
        if gap_ms == 0 {
            return None;
        }
        Some(1000.0 / gap_ms as f64)
    }

    /// Newest message for `share_id` of `kind`.
    pub fn latest(&self, kind: MessageKind, share_id: u32) -> Option<&DecodedMessage> {
        self.newest
            .get(&(kind, share_id))
            .and_then(|&index| self.messages.get(index))
    }

    /// Newest message per (kind, share), ordered by kind then share id.
    pub fn latest_per_share(&self) -> Vec<&DecodedMessage> {
        self.newest
            .values()
            .filter_map(|&index| self.messages.get(index))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecodedMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[DecodedMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
