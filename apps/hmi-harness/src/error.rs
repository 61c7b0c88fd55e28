use hmi_core::error::CoreError;

use common::ErrorLocation;

use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the harness binary.
///
/// Core errors are flattened to their message so the enum stays serializable
/// for structured output.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum HarnessError {
    /// Startup or I/O failure in the harness itself
    #[error("Harness Error: {message} {location}")]
    Harness {
        message: String,
        location: ErrorLocation,
    },

    /// Error from hmi-core (config, session, publish encoding)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Operator typed something the harness cannot parse
    #[error("Command Error: {message} {location}")]
    Command {
        message: String,
        location: ErrorLocation,
    },
}

impl HarnessError {
    /// Flatten a core error, recording where the harness received it.
    #[track_caller]
    pub fn core(error: impl Into<CoreError>) -> Self {
        HarnessError::Core {
            message: error.into().to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
