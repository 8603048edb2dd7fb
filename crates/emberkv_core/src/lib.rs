//! # emberkv Core
//!
//! A log-structured key-value store built directly atop raw flash memory
//! with erase/program asymmetry.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               KeyValueStore                  │
//! │  (sectors, key index, transactions, GC)      │
//! └──────────────────────┬──────────────────────┘
//!                        │
//! ┌──────────────────────▼──────────────────────┐
//! │                Entry codec                   │
//! │  (header + key + value + padding, checksum)  │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────▼──────────┐ ┌─────────▼───────────┐
//! │    AlignedWriter    │ │  ChecksumAlgorithm  │
//! │ (alignment buffers) │ │ (CRC16/Sum32/Ignore)│
//! └──────────┬──────────┘ └─────────────────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   FlashPartition    │
//! │  (emberkv_flash)    │
//! └─────────────────────┘
//! ```
//!
//! Entries are appended to sector-sized log regions and never rewritten
//! in place; space is recovered by relocating live entries and erasing
//! whole sectors. A 16-byte little-endian header carries the format
//! magic, checksum, alignment, key/value geometry, and a monotonically
//! increasing transaction id that decides which copy of a key is
//! authoritative.
//!
//! ## Example
//!
//! ```rust
//! use emberkv_core::{KeyValueStore, StoreConfig};
//! use emberkv_flash::MemoryFlash;
//!
//! let flash = MemoryFlash::new(8, 512, 16);
//! let mut store = KeyValueStore::new(Box::new(flash), StoreConfig::default());
//! store.init().unwrap();
//!
//! store.put("boot_count", b"17").unwrap();
//! assert_eq!(store.get_value("boot_count").unwrap(), b"17");
//!
//! store.delete("boot_count").unwrap();
//! assert!(store.get_value("boot_count").is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aligned;
mod checksum;
mod config;
mod entry;
mod error;
mod format;
mod stats;
mod store;

pub use aligned::{align_up, AlignedWriter, Input, Output, PartitionReader, PartitionWriter, SliceReader};
pub use checksum::{ChecksumAlgorithm, ChecksumKind, Crc16, IgnoreChecksum, Sum32};
pub use config::StoreConfig;
pub use entry::Entry;
pub use error::{KvsError, KvsResult};
pub use format::{EntryFormat, EntryHeader, DEFAULT_MAGIC, HEADER_SIZE, MAX_KEY_LENGTH, TOMBSTONE_VALUE_SIZE};
pub use stats::StorageStats;
pub use store::{Iter, KeyValueStore};
