//! CLI error types

use std::path::PathBuf;
use thiserror::Error;

use demix_core::SeparationError;

/// Errors that can occur outside the separation pipeline
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Backend initialization failed: {0}")]
    BackendInitFailed(String),

    #[error("Failed to read audio file: {path}")]
    AudioReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write stem file: {path}")]
    StemWriteError {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
