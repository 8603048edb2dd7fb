//! Error types for emberkv core.

use emberkv_flash::FlashError;
use thiserror::Error;

/// Result type for store operations.
pub type KvsResult<T> = Result<T, KvsError>;

/// Errors that can occur in emberkv store operations.
#[derive(Debug, Error)]
pub enum KvsError {
    /// Flash partition error, surfaced verbatim.
    #[error("flash error: {0}")]
    Flash(#[from] FlashError),

    /// Key absent, deleted, or the entry region reads as erased.
    #[error("not found")]
    NotFound,

    /// Checksum mismatch, unrecognized format, or malformed entry.
    #[error("data loss: {message}")]
    DataLoss {
        /// Description of the corruption.
        message: String,
    },

    /// A different key already occupies this key's hash slot.
    #[error("already exists: key hash {key_hash:#010x} bound to a different key")]
    AlreadyExists {
        /// The contested key hash.
        key_hash: u32,
    },

    /// Malformed caller input (empty key, oversized key or value, bad
    /// verify candidate, invalid writer capacity).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected input.
        message: String,
    },

    /// Read offset beyond the stored value length.
    #[error("out of range: offset {offset} beyond value of {size} bytes")]
    OutOfRange {
        /// The requested offset.
        offset: usize,
        /// The stored value size.
        size: usize,
    },

    /// Capacity exhausted: destination buffer smaller than the available
    /// data (partial success - `copied` bytes are valid), index full, or
    /// no sector can hold a new entry.
    #[error("resource exhausted after {copied} bytes")]
    ResourceExhausted {
        /// Bytes copied or consumed before exhaustion.
        copied: usize,
    },

    /// Operation not permitted in the current store state, or the
    /// partition geometry violates the configured bounds.
    #[error("failed precondition: {message}")]
    FailedPrecondition {
        /// Description of the violated precondition.
        message: String,
    },
}

impl KvsError {
    /// Creates a data loss error.
    pub fn data_loss(message: impl Into<String>) -> Self {
        Self::DataLoss {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a failed precondition error.
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::FailedPrecondition {
            message: message.into(),
        }
    }
}
