//! Test helpers for WebSocket integration tests.
//!
//! [`FakeAdapter`] is a single-connection WebSocket server standing in for an
//! adapter: it records every frame the HMI sends and pushes frames back on
//! demand.

use hmi_core::channel::{ChannelEnvelope, InboundEvent};
use hmi_core::decoder::{MessageKind, SchemaPaths};

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// What the HMI sent to the fake adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Text(String),
    Close,
}

enum ServerAction {
    Send(String),
    Close,
    Drop,
}

pub struct FakeAdapter {
    pub port: u16,
    received: mpsc::UnboundedReceiver<Received>,
    actions: mpsc::UnboundedSender<ServerAction>,
}

impl FakeAdapter {
    /// Bind on an ephemeral localhost port and serve the first connection.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake adapter");
        let port = listener.local_addr().expect("No local address").port();

        let (received_tx, received) = mpsc::unbounded_channel();
        let (actions, actions_rx) = mpsc::unbounded_channel();
        tokio::spawn(serve_one(listener, received_tx, actions_rx));

        Self {
            port,
            received,
            actions,
        }
    }

    /// Push a text frame to the HMI.
    pub fn send(&self, frame: &str) {
        let _ = self.actions.send(ServerAction::Send(frame.to_string()));
    }

    /// Start a closing handshake.
    pub fn close(&self) {
        let _ = self.actions.send(ServerAction::Close);
    }

    /// Drop the TCP connection without a closing handshake.
    pub fn drop_connection(&self) {
        let _ = self.actions.send(ServerAction::Drop);
    }

    pub async fn next(&mut self) -> Received {
        timeout(WAIT, self.received.recv())
            .await
            .expect("Timed out waiting for the HMI")
            .expect("Fake adapter stopped")
    }

    pub async fn next_text(&mut self) -> String {
        match self.next().await {
            Received::Text(text) => text,
            other => panic!("Expected a text frame, got {other:?}"),
        }
    }
}

async fn serve_one(
    listener: TcpListener,
    received: mpsc::UnboundedSender<Received>,
    mut actions: mpsc::UnboundedReceiver<ServerAction>,
) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();

    loop {
        select! {
            action = actions.recv() => match action {
                Some(ServerAction::Send(frame)) => {
                    if write.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // Keep reading so the handshake completes
                Some(ServerAction::Close) => {
                    let _ = write.send(Message::Close(None)).await;
                }
                Some(ServerAction::Drop) | None => break,
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(Received::Text(text.to_string()));
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = received.send(Received::Close);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

/// Wait for the next channel event, skipping nothing.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<ChannelEnvelope>) -> InboundEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("Timed out waiting for a channel event")
        .expect("Event stream ended")
        .event
}

/// A localhost port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    listener.local_addr().expect("No local address").port()
}

pub fn schema_paths() -> SchemaPaths {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../schemas");
    SchemaPaths {
        common: root.join("common.proto"),
        share: root.join("share.proto"),
    }
}

pub fn schema_path(kind: MessageKind) -> PathBuf {
    schema_paths().path(kind).to_path_buf()
}
