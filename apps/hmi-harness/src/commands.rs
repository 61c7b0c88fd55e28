//! Operator commands read from stdin.
//!
//! One line is one command: a verb followed by whitespace separated
//! arguments. `publish` takes the rest of the line as its JSON payload.

use crate::error::HarnessError;

use hmi_core::decoder::MessageKind;
use hmi_core::error::session::SessionError;
use hmi_core::session::{AdapterId, AdapterSpec, DeviceId, HmiSnapshot, SessionCommand, SessionHandle};

use common::ErrorLocation;

use std::fmt::Write;
use std::panic::Location;
use std::str::FromStr;

use log::info;
use serde_json::Value;

pub const HELP: &str = "\
adapters                                       list adapters
devices                                        list devices
add <name> <host> <port>                       add an adapter
connect <adapter>                              connect an adapter
disconnect <adapter>                           disconnect an adapter
remove <adapter>                               remove an adapter
inventory                                      request the active adapter's devices
connect-device <device>                        connect a device
disconnect-device <device>                     disconnect a device
select [device]                                select a device, or clear the selection
request <common|share> <device> <share>        request one message
schedule <common|share> <device> <share> <ms>  request a message periodically
unschedule <common|share> <device> <share>     stop a periodic request
publish <common|share> <device> <share> <json> encode and publish a message
messages                                       latest message per share and throughput
help                                           this text
quit                                           exit";

#[derive(Debug, Clone, PartialEq)]
pub enum HarnessCommand {
    Adapters,
    Devices,
    Add {
        name: String,
        host: String,
        port: u16,
    },
    Connect(AdapterId),
    Disconnect(AdapterId),
    Remove(AdapterId),
    Inventory,
    ConnectDevice(DeviceId),
    DisconnectDevice(DeviceId),
    /// `None` clears the selection.
    Select(Option<DeviceId>),
    Request {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
    },
    Schedule {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
        interval_ms: u32,
    },
    Unschedule {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
    },
    Publish {
        kind: MessageKind,
        device_id: DeviceId,
        share_id: u32,
        value: Value,
    },
    Messages,
    Help,
    Quit,
}

/// What the input loop should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Text(String),
    Quit,
}

#[track_caller]
fn command_error(message: impl Into<String>) -> HarnessError {
    HarnessError::Command {
        message: message.into(),
        location: ErrorLocation::from(Location::caller()),
    }
}

// ============================================
// PARSING
// ============================================

/// Remaining arguments of one line.
struct Args<'a> {
    verb: &'a str,
    rest: &'a str,
}

impl<'a> Args<'a> {
    #[track_caller]
    fn word(&mut self, name: &str) -> Result<&'a str, HarnessError> {
        let (word, rest) = split_word(self.rest);
        if word.is_empty() {
            return Err(command_error(format!("'{}' needs <{name}>", self.verb)));
        }
        self.rest = rest;
        Ok(word)
    }

    #[track_caller]
    fn number<T: FromStr>(&mut self, name: &str) -> Result<T, HarnessError> {
        let word = self.word(name)?;
        word.parse()
            .map_err(|_| command_error(format!("<{name}> must be a number, got '{word}'")))
    }

    #[track_caller]
    fn kind(&mut self) -> Result<MessageKind, HarnessError> {
        match self.word("common|share")? {
            "common" => Ok(MessageKind::Common),
            "share" => Ok(MessageKind::Share),
            other => Err(command_error(format!(
                "expected 'common' or 'share', got '{other}'"
            ))),
        }
    }

    fn optional_word(&mut self) -> Option<&'a str> {
        let (word, rest) = split_word(self.rest);
        self.rest = rest;
        (!word.is_empty()).then_some(word)
    }

    /// Everything left on the line, untrimmed inside.
    #[track_caller]
    fn remainder(&mut self, name: &str) -> Result<&'a str, HarnessError> {
        let rest = self.rest.trim();
        if rest.is_empty() {
            return Err(command_error(format!("'{}' needs <{name}>", self.verb)));
        }
        self.rest = "";
        Ok(rest)
    }

    #[track_caller]
    fn finish(self) -> Result<(), HarnessError> {
        let extra = self.rest.trim();
        if extra.is_empty() {
            Ok(())
        } else {
            Err(command_error(format!(
                "unexpected arguments to '{}': {extra}",
                self.verb
            )))
        }
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    }
}

/// Parse one input line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`HarnessError::Command`] for unknown verbs, missing or extra
/// arguments, bad numbers and invalid JSON payloads.
pub fn parse(line: &str) -> Result<Option<HarnessCommand>, HarnessError> {
    let (verb, rest) = split_word(line);
    if verb.is_empty() {
        return Ok(None);
    }
    let mut args = Args { verb, rest };

    let command = match verb {
        "adapters" => HarnessCommand::Adapters,
        "devices" => HarnessCommand::Devices,
        "add" => HarnessCommand::Add {
            name: args.word("name")?.to_string(),
            host: args.word("host")?.to_string(),
            port: args.number("port")?,
        },
        "connect" => HarnessCommand::Connect(args.number("adapter")?),
        "disconnect" => HarnessCommand::Disconnect(args.number("adapter")?),
        "remove" => HarnessCommand::Remove(args.number("adapter")?),
        "inventory" => HarnessCommand::Inventory,
        "connect-device" => HarnessCommand::ConnectDevice(args.word("device")?.to_string()),
        "disconnect-device" => {
            HarnessCommand::DisconnectDevice(args.word("device")?.to_string())
        }
        "select" => HarnessCommand::Select(args.optional_word().map(str::to_string)),
        "request" => HarnessCommand::Request {
            kind: args.kind()?,
            device_id: args.word("device")?.to_string(),
            share_id: args.number("share")?,
        },
        "schedule" => HarnessCommand::Schedule {
            kind: args.kind()?,
            device_id: args.word("device")?.to_string(),
            share_id: args.number("share")?,
            interval_ms: args.number("interval_ms")?,
        },
        "unschedule" => HarnessCommand::Unschedule {
            kind: args.kind()?,
            device_id: args.word("device")?.to_string(),
            share_id: args.number("share")?,
        },
        "publish" => {
            let kind = args.kind()?;
            let device_id = args.word("device")?.to_string();
            let share_id = args.number("share")?;
            let json = args.remainder("json")?;
            let value = serde_json::from_str(json)
                .map_err(|e| command_error(format!("invalid JSON payload: {e}")))?;
            HarnessCommand::Publish {
                kind,
                device_id,
                share_id,
                value,
            }
        }
        "messages" => HarnessCommand::Messages,
        "help" | "?" => HarnessCommand::Help,
        "quit" | "exit" => HarnessCommand::Quit,
        other => return Err(command_error(format!("unknown command '{other}', try 'help'"))),
    };

    args.finish()?;
    Ok(Some(command))
}

// ============================================
// EXECUTION
// ============================================

/// Run one command against the session.
///
/// Fire-and-forget intents return once the actor has accepted them; the
/// resulting state shows up in later snapshots.
///
/// # Errors
///
/// Returns [`HarnessError::Core`] if the actor is gone, an adapter is
/// rejected, or a publish payload does not encode.
pub async fn execute(
    session: &SessionHandle,
    command: HarnessCommand,
) -> Result<Reply, HarnessError> {
    let intent = match command {
        HarnessCommand::Adapters => return Ok(Reply::Text(render_adapters(&session.snapshot()))),
        HarnessCommand::Devices => return Ok(Reply::Text(render_devices(&session.snapshot()))),
        HarnessCommand::Messages => return Ok(Reply::Text(render_messages(&session.snapshot()))),
        HarnessCommand::Help => return Ok(Reply::Text(HELP.to_string())),
        HarnessCommand::Quit => return Ok(Reply::Quit),
        HarnessCommand::Add { name, host, port } => {
            let spec = AdapterSpec::new(None, name, host, port)
                .map_err(|e| HarnessError::core(SessionError::from(e)))?;
            let adapter_id = session
                .add_adapter(spec)
                .await
                .map_err(HarnessError::core)?;
            return Ok(Reply::Text(format!("added adapter {adapter_id}")));
        }
        HarnessCommand::Publish {
            kind,
            device_id,
            share_id,
            value,
        } => {
            let sent = session
                .publish(kind, device_id.clone(), share_id, value)
                .await
                .map_err(HarnessError::core)?;
            return Ok(if sent {
                Reply::Done
            } else {
                Reply::Text(format!("device {device_id} has no open channel"))
            });
        }
        HarnessCommand::Connect(adapter_id) => SessionCommand::ConnectAdapter(adapter_id),
        HarnessCommand::Disconnect(adapter_id) => SessionCommand::DisconnectAdapter(adapter_id),
        HarnessCommand::Remove(adapter_id) => SessionCommand::RemoveAdapter(adapter_id),
        HarnessCommand::Inventory => SessionCommand::RequestDevices,
        HarnessCommand::ConnectDevice(device_id) => SessionCommand::ConnectDevice(device_id),
        HarnessCommand::DisconnectDevice(device_id) => SessionCommand::DisconnectDevice(device_id),
        HarnessCommand::Select(device_id) => SessionCommand::SelectDevice(device_id),
        HarnessCommand::Request {
            kind,
            device_id,
            share_id,
        } => SessionCommand::RequestMessage {
            kind,
            device_id,
            share_id,
        },
        HarnessCommand::Schedule {
            kind,
            device_id,
            share_id,
            interval_ms,
        } => SessionCommand::SetScheduled {
            kind,
            device_id,
            share_id,
            interval_ms,
        },
        HarnessCommand::Unschedule {
            kind,
            device_id,
            share_id,
        } => SessionCommand::ClearScheduled {
            kind,
            device_id,
            share_id,
        },
    };

    info!("Operator: {intent:?}");
    session
        .update(intent)
        .await
        .map_err(HarnessError::core)?;
    Ok(Reply::Done)
}

// ============================================
// RENDERING
// ============================================

pub fn render_adapters(snapshot: &HmiSnapshot) -> String {
    if snapshot.adapters.is_empty() {
        return "no adapters".to_string();
    }
    let mut out = String::new();
    for adapter in &snapshot.adapters {
        let marker = if snapshot.active_adapter == Some(adapter.id) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            out,
            "{marker} {id:>3}  {name:<16} {address:<24} {status}",
            id = adapter.id,
            name = adapter.name,
            address = adapter.address.to_string(),
            status = adapter.status,
        );
    }
    out.trim_end().to_string()
}

pub fn render_devices(snapshot: &HmiSnapshot) -> String {
    if snapshot.devices.is_empty() {
        return "no devices".to_string();
    }
    let mut out = String::new();
    for device in &snapshot.devices {
        let marker = if snapshot.selected_device.as_ref() == Some(&device.id) {
            '>'
        } else {
            ' '
        };
        let _ = write!(
            out,
            "{marker} {id:<16} adapter {adapter:<3} {status:?}",
            id = device.id,
            adapter = device.adapter_id,
            status = device.status,
        );
        if let Some(details) = &device.details {
            let _ = write!(out, "  {details}");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn render_messages(snapshot: &HmiSnapshot) -> String {
    let mut out = format!(
        "{} messages, schemas: common {:?}, share {:?}",
        snapshot.message_count, snapshot.common_schema, snapshot.share_schema
    );
    if let Some(rate) = snapshot.throughput {
        let _ = write!(out, ", {rate:.1} msg/s");
    }
    for message in &snapshot.latest_messages {
        let _ = write!(
            out,
            "\n  {kind}{share:<4} @{at}  {payload}",
            kind = message.kind,
            share = message.share_id,
            at = message.created_at_ms,
            payload = message.payload,
        );
    }
    out
}
