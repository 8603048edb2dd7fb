//! Error types for flash partition operations.

use std::io;
use thiserror::Error;

/// Result type for flash partition operations.
pub type FlashResult<T> = Result<T, FlashError>;

/// Errors that can occur during flash partition operations.
#[derive(Debug, Error)]
pub enum FlashError {
    /// An I/O error occurred in a host-backed partition.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An access extends beyond the end of the partition.
    #[error("access beyond end of partition: address {address}, len {len}, size {size}")]
    OutOfBounds {
        /// The requested address.
        address: u64,
        /// The requested length.
        len: usize,
        /// The partition size in bytes.
        size: u64,
    },

    /// A write does not respect the partition write alignment.
    #[error("misaligned write: address {address}, len {len}, alignment {alignment}")]
    Misaligned {
        /// The requested write address.
        address: u64,
        /// The requested write length.
        len: usize,
        /// The partition write alignment in bytes.
        alignment: usize,
    },

    /// An erase targeted a sector index outside the partition.
    #[error("invalid sector: index {index}, sector count {count}")]
    InvalidSector {
        /// The requested sector index.
        index: usize,
        /// The number of sectors in the partition.
        count: usize,
    },
}
