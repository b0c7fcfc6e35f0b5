//! Engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, loading or running a separation engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Input file not found: {path}")]
    InputMissing { path: PathBuf },

    #[error("Engine process exited with {0}")]
    ProcessFailed(String),

    #[error("Separation failed: {0}")]
    SeparationFailed(String),

    #[error("Engine has no model loaded")]
    NotLoaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
