//! Errors raised while loading schemas and decoding device payloads.
//!
//! The router never propagates these past itself: each one is logged and the
//! offending message is dropped. They are still typed so callers of the
//! publish path (and tests) can tell the failure modes apart.

use crate::decoder::MessageKind;

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DecodeError {
    #[error("Schema Unavailable Error: {kind} schema is {state} {location}")]
    SchemaUnavailable {
        kind: MessageKind,
        state: &'static str,
        location: ErrorLocation,
    },

    #[error("Schema Load Error: {path}: {message} {location}")]
    SchemaLoad {
        path: PathBuf,
        message: String,
        location: ErrorLocation,
    },

    #[error("Unknown Share Error: no {kind} message for share {share_id} {location}")]
    UnknownShare {
        kind: MessageKind,
        share_id: u32,
        location: ErrorLocation,
    },

    #[error("Base64 Error: {message} {location}")]
    Base64 {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Decode Error: {message} {location}")]
    ProtobufDecode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Encode Error: {message} {location}")]
    ProtobufEncode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unsupported Action Error: action type {action_type} {location}")]
    UnsupportedAction {
        action_type: i32,
        location: ErrorLocation,
    },
}

impl DecodeError {
    #[track_caller]
    pub fn schema_unavailable(kind: MessageKind, state: &'static str) -> Self {
        DecodeError::SchemaUnavailable {
            kind,
            state,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn schema_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        DecodeError::SchemaLoad {
            path: path.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn unknown_share(kind: MessageKind, share_id: u32) -> Self {
        DecodeError::UnknownShare {
            kind,
            share_id,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn unsupported_action(action_type: i32) -> Self {
        DecodeError::UnsupportedAction {
            action_type,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn protobuf_decode(message: impl Into<String>) -> Self {
        DecodeError::ProtobufDecode {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn protobuf_encode(message: impl Into<String>) -> Self {
        DecodeError::ProtobufEncode {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<base64::DecodeError> for DecodeError {
    #[track_caller]
    fn from(error: base64::DecodeError) -> Self {
        DecodeError::Base64 {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::DecodeError> for DecodeError {
    #[track_caller]
    fn from(error: prost::DecodeError) -> Self {
        DecodeError::ProtobufDecode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
