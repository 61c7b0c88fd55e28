pub mod channel;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod error;
pub mod proto;
pub mod registry;
pub mod session;

#[cfg(test)]
mod tests;

/// Relative directory the runtime schema resources are resolved from.
pub const SCHEMA_DIR: &str = "schemas";
pub const COMMON_SCHEMA_FILE: &str = "common.proto";
pub const SHARE_SCHEMA_FILE: &str = "share.proto";
pub const COMMON_SCHEMA_PATH: &str = const_format::concatcp!(SCHEMA_DIR, "/", COMMON_SCHEMA_FILE);
pub const SHARE_SCHEMA_PATH: &str = const_format::concatcp!(SCHEMA_DIR, "/", SHARE_SCHEMA_FILE);
