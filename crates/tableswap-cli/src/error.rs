//! CLI error types.

use std::path::PathBuf;
use tableswap_core::SwapError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store or catalog error.
    #[error(transparent)]
    Core(#[from] tableswap_core::Error),

    /// Planning or execution error.
    #[error(transparent)]
    Swap(#[from] SwapError),

    /// A script file could not be read.
    #[error("invalid script {}: {message}", .path.display())]
    InvalidScript {
        /// Script path.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// The command cannot run in the current state.
    #[error("{0}")]
    Usage(String),
}
