//! Error types for seqforest

use thiserror::Error;

/// Result type alias for seqforest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up a search or reading its inputs.
///
/// The alignment kernel and the spanning forest have no error paths of their own: everything is
/// validated before dispatch, and a broken forest is an assertion failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Scoring matrix name that does not resolve to a known matrix
    #[error("Unknown scoring matrix: {0}")]
    UnknownMatrix(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sequence record that cannot be encoded into the symbol alphabet
    #[error("Malformed sequence in record {record}: {msg}")]
    MalformedSequence {
        /// Record identifier (or ordinal when the record has no usable id)
        record: String,
        /// Error message
        msg: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Link stream error
    #[error("Link stream error: {0}")]
    Csv(#[from] csv::Error),
}
