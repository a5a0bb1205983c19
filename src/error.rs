//! Crate-wide error types.

use thiserror::Error;

pub type FramelensResult<T> = Result<T, FramelensError>;

#[derive(Debug, Error)]
pub enum FramelensError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("trace error: {0}")]
    Trace(String),
}
