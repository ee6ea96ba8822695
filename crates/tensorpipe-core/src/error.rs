use thiserror::Error;

/// Errors that can surface from the shared core: nothing domain-specific, just the
/// handful of ways building blocks shared by every other crate can fail.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("channel closed")]
    ChannelClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
