use crate::error::decode::DecodeError;
use crate::session::AdapterId;

use common::{ErrorLocation, ValidationError};

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("Duplicate Adapter Error: adapter {adapter_id} already exists {location}")]
    DuplicateAdapter {
        adapter_id: AdapterId,
        location: ErrorLocation,
    },

    #[error("Invalid Adapter Error: {source}")]
    InvalidAdapter {
        #[from]
        source: ValidationError,
    },

    #[error("Publish Error: {source}")]
    Publish {
        #[from]
        source: DecodeError,
    },

    #[error("Session Actor Error: {message} {location}")]
    Actor {
        message: String,
        location: ErrorLocation,
    },
}

impl SessionError {
    #[track_caller]
    pub fn duplicate_adapter(adapter_id: AdapterId) -> Self {
        SessionError::DuplicateAdapter {
            adapter_id,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn actor(message: impl Into<String>) -> Self {
        SessionError::Actor {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
