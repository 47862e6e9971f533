//! Error types shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced while loading artifacts or driving a generation.
#[derive(Debug, Error)]
pub enum Error {
    /// The vocabulary artifact or model configuration is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An artifact could not be read from disk.
    #[error("can't read {}: {}", path.display(), source)]
    Load {
        /// Underlying IO error.
        source: std::io::Error,
        /// Path of the unreachable artifact.
        path: PathBuf,
    },
    /// The inference session failed or returned structurally invalid output.
    #[error("inference error: {0}")]
    Inference(String),
}

impl Error {
    /// Wrap an IO error together with the path that failed.
    pub fn load(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Load {
            source,
            path: path.into(),
        }
    }

    /// Build a configuration error from any message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an inference error from any displayable failure.
    pub fn inference(msg: impl std::fmt::Display) -> Self {
        Self::Inference(msg.to_string())
    }
}

impl From<candle_core::Error> for Error {
    fn from(err: candle_core::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
