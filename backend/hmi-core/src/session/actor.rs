//! Session actor.
//!
//! One task owns the [`HmiSession`]. UI intents arrive as [`SessionCommand`]s,
//! channel traffic as [`ChannelEnvelope`]s, and the task handles them strictly
//! one at a time. After every step it publishes a fresh [`HmiSnapshot`] on a
//! watch channel, so readers never wait on the actor.

use crate::channel::{ChannelEnvelope, Transport};
use crate::clock::Clock;
use crate::decoder::{MessageKind, SchemaCatalog, SchemaPaths};
use crate::error::decode::DecodeError;
use crate::error::session::SessionError;
use crate::session::{
    AdapterId, AdapterSpec, DeviceId, HmiSession, HmiSnapshot, SessionSettings,
};

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::select;
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::spawn_blocking;

const COMMAND_BUFFER: usize = 100;

/// Intents accepted by the session actor.
#[derive(Debug)]
pub enum SessionCommand {
    AddAdapter {
        spec: AdapterSpec,
        reply: oneshot::Sender<Result<AdapterId, SessionError>>,
    },
    RemoveAdapter(AdapterId),
    ConnectAdapter(AdapterId),
    DisconnectAdapter(AdapterId),
    RequestDevices,
    ConnectDevice(DeviceId),
    DisconnectDevice(DeviceId),
    /// `None` clears the selection.
    SelectDevice(Option<DeviceId>),
    RequestMessage {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
    },
    SetScheduled {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
        interval_ms: u32,
    },
    ClearScheduled {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
    },
    Publish {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
        value: Value,
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
    InstallSchema {
        kind: MessageKind,
        result: Result<SchemaCatalog, DecodeError>,
    },
}

/// Cloneable handle to a running session actor.
///
/// The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<HmiSnapshot>,
}

impl SessionHandle {
    /// Spawn the actor. Must be called from within a tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let session = HmiSession::new(transport, event_tx, settings, clock);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        TokioSpawn(session_actor(session, command_rx, event_rx, snapshot_tx));
        info!("Session actor spawned");

        Self {
            command_tx,
            snapshot_rx,
        }
    }

    /// Compile both schema resources off the actor and install them as they finish.
    pub fn load_schemas(&self, paths: SchemaPaths) {
        for kind in [MessageKind::Common, MessageKind::Share] {
            let path = paths.path(kind).to_path_buf();
            let handle = self.clone();
            TokioSpawn(async move {
                let load_path = path.clone();
                let result = match spawn_blocking(move || SchemaCatalog::load(kind, &load_path)).await {
                    Ok(result) => result,
                    Err(e) => Err(DecodeError::schema_load(
                        path,
                        format!("schema loader task failed: {e}"),
                    )),
                };
                if let Err(e) = handle
                    .update(SessionCommand::InstallSchema { kind, result })
                    .await
                {
                    warn!("{kind} schema not installed: {e}");
                }
            });
        }
    }

    /// Send a command to the actor.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Actor`] if the actor has stopped.
    pub async fn update(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| SessionError::actor(format!("Session actor died: {e}")))
    }

    pub async fn add_adapter(&self, spec: AdapterSpec) -> Result<AdapterId, SessionError> {
        let (reply, response) = oneshot::channel();
        self.update(SessionCommand::AddAdapter { spec, reply }).await?;
        response
            .await
            .map_err(|e| SessionError::actor(format!("Session actor dropped reply: {e}")))?
    }

    pub async fn publish(
        &self,
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
        value: Value,
    ) -> Result<bool, SessionError> {
        let (reply, response) = oneshot::channel();
        self.update(SessionCommand::Publish {
            kind,
            device_id,
            share_id,
            value,
            reply,
        })
        .await?;
        response
            .await
            .map_err(|e| SessionError::actor(format!("Session actor dropped reply: {e}")))?
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> HmiSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<HmiSnapshot> {
        self.snapshot_rx.clone()
    }
}

async fn session_actor(
    mut session: HmiSession,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    mut event_rx: mpsc::UnboundedReceiver<ChannelEnvelope>,
    snapshot_tx: watch::Sender<HmiSnapshot>,
) {
    info!("Session actor started");

    loop {
        select! {
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                apply_command(&mut session, cmd);
            }
            // The session holds a sender, so this never yields None while it lives
            Some(envelope) = event_rx.recv() => {
                session.handle_event(envelope);
            }
        }
        snapshot_tx.send_replace(session.snapshot());
    }

    info!("Session actor stopped: all handles dropped");
}

fn apply_command(session: &mut HmiSession, cmd: SessionCommand) {
    debug!("Session command: {cmd:?}");
    match cmd {
        SessionCommand::AddAdapter { spec, reply } => {
            let _ = reply.send(session.add_adapter(spec));
        }
        SessionCommand::RemoveAdapter(adapter_id) => {
            session.remove_adapter(adapter_id);
        }
        SessionCommand::ConnectAdapter(adapter_id) => {
            session.request_connect(adapter_id);
        }
        SessionCommand::DisconnectAdapter(adapter_id) => {
            session.request_disconnect(adapter_id);
        }
        SessionCommand::RequestDevices => {
            session.request_devices();
        }
        SessionCommand::ConnectDevice(device_id) => {
            session.request_connect_device(&device_id);
        }
        SessionCommand::DisconnectDevice(device_id) => {
            session.request_disconnect_device(&device_id);
        }
        SessionCommand::SelectDevice(Some(device_id)) => {
            session.select_device(&device_id);
        }
        SessionCommand::SelectDevice(None) => session.clear_selection(),
        SessionCommand::RequestMessage {
            kind,
            device_id,
            share_id,
        } => {
            session.request_message(kind, &device_id, share_id);
        }
        SessionCommand::SetScheduled {
            kind,
            device_id,
            share_id,
            interval_ms,
        } => {
            session.set_scheduled(kind, &device_id, share_id, interval_ms);
        }
        SessionCommand::ClearScheduled {
            kind,
            device_id,
            share_id,
        } => {
            session.clear_scheduled(kind, &device_id, share_id);
        }
        SessionCommand::Publish {
            kind,
            device_id,
            share_id,
            value,
            reply,
        } => {
            let _ = reply.send(session.publish(kind, &device_id, share_id, &value));
        }
        SessionCommand::InstallSchema { kind, result } => session.install_schema(kind, result),
    }
}
