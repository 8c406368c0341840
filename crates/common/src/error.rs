//! Error types shared across Chromacast crates.

use std::path::PathBuf;

/// Top-level error type for Chromacast operations.
#[derive(Debug, thiserror::Error)]
pub enum ChromacastError {
    #[error("Frame dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("Encoding failed: {message}")]
    EncodingFailure { message: String },

    #[error("Transport failed: {message}")]
    TransportFailure { message: String },

    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ChromacastError.
pub type ChromacastResult<T> = Result<T, ChromacastError>;

impl ChromacastError {
    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailure {
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: msg.into(),
        }
    }

    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error only invalidates the current pump tick.
    pub fn is_tick_local(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}
