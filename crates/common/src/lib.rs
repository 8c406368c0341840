//! Chromacast Common Utilities
//!
//! Shared infrastructure for all Chromacast crates:
//! - Error types and result aliases
//! - Recording clock for capture timestamps
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
