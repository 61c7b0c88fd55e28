//! Shared plumbing for the HMI harness crates.
//!
//! Every error type in the workspace carries an [`ErrorLocation`] so a log line
//! points straight at the code that produced it.

pub mod error;

pub use error::error_location::ErrorLocation;
pub use error::validation::ValidationError;
