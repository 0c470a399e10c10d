//! Crate-level error type
//!
//! Config, mapping, container and reader each own an error enum.
//! `DecodeError` wraps them for callers that drive the whole chain.

use thiserror::Error;

use crate::config::ConfigError;
use crate::container::ContainerError;
use crate::mapping::MappingError;
use crate::reader::ReaderError;

/// Errors surfaced by the decode chain as a whole
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel map could not be built from the geometry
    #[error("Channel map error: {0}")]
    Mapping(#[from] MappingError),

    /// Event dump file could not be read or written
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Event rejected by the reader
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Worker task failed to complete
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Channel send failed (receiver dropped)
    #[error("Channel send failed: receiver dropped")]
    ChannelSend,
}

impl DecodeError {
    /// Create a worker error
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}

/// Result type alias using DecodeError
pub type DecodeResult<T> = Result<T, DecodeError>;
