//! WebSocket transport: one tokio task per channel.
//!
//! The task first establishes the connection, retrying with exponential
//! backoff, then pumps outbound events to the socket and inbound frames to the
//! channel's [`EventSink`] until either side ends.

use crate::channel::event::InboundEvent;
use crate::channel::{Channel, ChannelEndpoint, ChannelEnvelope, EventSink, Transport};
use crate::session::adapter::{AdapterAddress, AdapterId};

use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use tokio::net::TcpStream;
use tokio::select;
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep as TokioSleep;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_NAMESPACE: &str = "/api";
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_RETRY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_RETRY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Path appended to `host:port`, e.g. `/api`.
    pub namespace: String,
    /// Failed attempts tolerated before the channel gives up with `close`.
    pub reconnection_attempts: u32,
    pub initial_retry: Duration,
    pub max_retry: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            initial_retry: DEFAULT_INITIAL_RETRY,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    settings: ChannelSettings,
}

impl WebSocketTransport {
    pub fn new(settings: ChannelSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        adapter_id: AdapterId,
        address: &AdapterAddress,
        events: mpsc::UnboundedSender<ChannelEnvelope>,
    ) -> Channel {
        let (channel, endpoint) = Channel::pair(adapter_id, address.clone(), events);

        match address.to_url(&self.settings.namespace) {
            Ok(url) => {
                info!(
                    "Opening channel {} to adapter {adapter_id} at {url}",
                    channel.id()
                );
                TokioSpawn(run_channel(url, self.settings.clone(), endpoint));
            }
            Err(e) => {
                error!("Adapter {adapter_id} has no usable address: {e}");
                endpoint.sink.emit(InboundEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        channel
    }
}

async fn run_channel(url: Url, settings: ChannelSettings, endpoint: ChannelEndpoint) {
    let ChannelEndpoint {
        sink,
        mut outbound,
        mut shutdown,
    } = endpoint;

    let Some(socket) = establish(&url, &settings, &sink, &mut shutdown).await else {
        return;
    };

    info!("Channel {} connected to {url}", sink.channel_id());
    sink.emit(InboundEvent::Connect);

    let (mut write, mut read) = socket.split();
    let mut writing = true;

    loop {
        select! {
            closed = &mut shutdown => {
                match closed {
                    Ok(()) => {
                        if let Err(e) = write.send(Message::Close(None)).await {
                            debug!("Channel {} close frame not sent: {e}", sink.channel_id());
                        }
                        sink.emit(InboundEvent::Disconnect);
                    }
                    Err(_) => debug!("Channel {} detached", sink.channel_id()),
                }
                break;
            }

            next = outbound.recv(), if writing => {
                let Some(event) = next else {
                    writing = false;
                    continue;
                };
                let frame = event.to_frame();
                trace!("Channel {} <- {frame}", sink.channel_id());
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    error!("Channel {} write failed: {e}", sink.channel_id());
                    sink.emit(InboundEvent::Error { message: e.to_string() });
                    break;
                }
            }

            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match InboundEvent::from_frame(text.as_str()) {
                        Ok(event) => {
                            if !sink.emit(event) {
                                debug!("Channel {} has no session left, stopping", sink.channel_id());
                                break;
                            }
                        }
                        Err(e) => warn!("Channel {} dropped frame: {e}", sink.channel_id()),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("Channel {} closed by adapter: {frame:?}", sink.channel_id());
                        sink.emit(InboundEvent::Disconnect);
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!(
                            "Channel {} ignoring {} byte binary frame",
                            sink.channel_id(),
                            data.len()
                        );
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) if is_connection_lost(&e) => {
                        warn!("Channel {} lost its connection: {e}", sink.channel_id());
                        sink.emit(InboundEvent::Close);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Channel {} read failed: {e}", sink.channel_id());
                        sink.emit(InboundEvent::Error { message: e.to_string() });
                        break;
                    }
                    None => {
                        warn!("Channel {} lost its connection", sink.channel_id());
                        sink.emit(InboundEvent::Close);
                        break;
                    }
                }
            }
        }
    }
}

/// The peer vanished without a closing handshake, as opposed to a protocol fault.
fn is_connection_lost(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

/// Connect to `url`, retrying until `reconnection_attempts` failures have been
/// exceeded. Returns `None` when giving up or when shut down while trying.
async fn establish(
    url: &Url,
    settings: &ChannelSettings,
    sink: &EventSink,
    shutdown: &mut oneshot::Receiver<()>,
) -> Option<Socket> {
    let mut backoff = ExponentialBackoff {
        current_interval: settings.initial_retry,
        initial_interval: settings.initial_retry,
        max_interval: settings.max_retry,
        max_elapsed_time: None,
        ..Default::default()
    };
    let mut failures: u32 = 0;

    loop {
        let attempt = select! {
            _ = &mut *shutdown => {
                debug!("Channel {} shut down while connecting", sink.channel_id());
                return None;
            }
            attempt = connect_async(url.as_str()) => attempt,
        };

        match attempt {
            Ok((socket, _response)) => return Some(socket),
            Err(e) => {
                failures += 1;
                warn!(
                    "Channel {} connect attempt {failures} to {url} failed: {e}",
                    sink.channel_id()
                );
                sink.emit(InboundEvent::ConnectError {
                    message: e.to_string(),
                });

                if failures > settings.reconnection_attempts {
                    warn!(
                        "Channel {} giving up on {url} after {failures} attempts",
                        sink.channel_id()
                    );
                    sink.emit(InboundEvent::Close);
                    return None;
                }

                let delay = backoff.next_backoff().unwrap_or(settings.max_retry);
                trace!("Channel {} retrying after {delay:?}", sink.channel_id());
                select! {
                    _ = &mut *shutdown => {
                        debug!("Channel {} shut down while waiting to retry", sink.channel_id());
                        return None;
                    }
                    _ = TokioSleep(delay) => {}
                }
            }
        }
    }
}
