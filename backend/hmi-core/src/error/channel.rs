use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ChannelError {
    #[error("URL Error: {message} {location}")]
    Url {
        message: String,
        location: ErrorLocation,
    },

    #[error("Frame Error: {message} {location}")]
    Frame {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unknown Event Error: '{event}' {location}")]
    UnknownEvent {
        event: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },
}

impl ChannelError {
    #[track_caller]
    pub fn frame(message: impl Into<String>) -> Self {
        ChannelError::Frame {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn unknown_event(event: impl Into<String>) -> Self {
        ChannelError::UnknownEvent {
            event: event.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<url::ParseError> for ChannelError {
    #[track_caller]
    fn from(error: url::ParseError) -> Self {
        ChannelError::Url {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<serde_json::Error> for ChannelError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        ChannelError::Frame {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
