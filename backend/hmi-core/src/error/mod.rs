pub mod channel;
pub mod config;
pub mod decode;
pub mod session;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Channel(#[from] channel::ChannelError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Decode(#[from] decode::DecodeError),

    #[error(transparent)]
    Session(#[from] session::SessionError),
}
