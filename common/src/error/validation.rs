use crate::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Construction-time validation failure for a domain value.
#[derive(Debug, ThisError)]
pub enum ValidationError {
    #[error("Validation Error: {field}: {message} {location}")]
    Field {
        field: &'static str,
        message: String,
        location: ErrorLocation,
    },
}

impl ValidationError {
    #[track_caller]
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field,
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
