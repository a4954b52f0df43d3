//! Error types for the detection and aggregation engine

use std::io;
use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (config file, log reads, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CRC mismatch encountered while decoding a framed record.
    /// Non-fatal at the stream level; surfaced so callers can log it.
    #[error("CRC mismatch at offset {offset}")]
    Crc {
        /// Byte offset of the start of the offending frame
        offset: u64,
    },

    /// Malformed protobuf payload inside an otherwise CRC-valid frame
    #[error("malformed protobuf payload: {0}")]
    Protobuf(String),

    /// Configuration could not be loaded or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic parse failure (hyperparameter values, image references, ...)
    #[error("parse error: {0}")]
    Parse(String),

    /// Evidence aggregation could not produce a result
    #[error("aggregation error: {0}")]
    Aggregation(String),

    /// Coverage state is inconsistent with the requested transition
    #[error("coverage error: {0}")]
    Coverage(String),

    /// A probe executor failed to complete
    #[error("probe error: {0}")]
    Probe(String),

    /// Referenced workload, evidence row, or coverage row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// An illegal state-machine transition was attempted
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A probe or aggregation step exceeded its deadline
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Evidence ingestion payload failed schema validation
    #[error("schema violation: {0}")]
    Schema(String),

    /// Catch-all for conditions that don't warrant their own variant
    #[error("{0}")]
    Other(String),
}
