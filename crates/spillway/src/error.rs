//! Error types for the spill queue.
//!
//! Only construction and teardown surface errors to the caller. Operational
//! failures on the spill path (encode, append, decode) are logged, counted
//! in the metrics, and absorbed; the output stream simply runs short.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Spill queue errors
#[derive(Debug, Error)]
pub enum SpillError {
    /// The cache directory could not be created
    #[error("failed to create cache directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cache file could not be opened or inspected
    #[error("failed to open cache file {path}")]
    OpenCache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An item could not be serialized for the spill file
    #[error("failed to encode item for spill")]
    Encode(#[source] bincode::error::EncodeError),

    /// A spilled frame could not be deserialized
    #[error("failed to decode spilled item")]
    Decode(#[source] bincode::error::DecodeError),

    /// A frame header announced a length beyond the sanity cap
    #[error("spill frame of {len} bytes exceeds the {max} byte cap")]
    FrameTooLarge { len: usize, max: usize },

    /// I/O failure on the cache files
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for spill queue operations
pub type Result<T> = std::result::Result<T, SpillError>;
