//! # emberkv Flash
//!
//! Flash partition abstraction for emberkv.
//!
//! This crate provides the lowest-level storage abstraction for emberkv.
//! A flash partition is a **sectored byte store with erase/program
//! asymmetry** - writes must respect the device write alignment, and bytes
//! can only be reclaimed by erasing a whole sector back to the erased
//! pattern.
//!
//! ## Design Principles
//!
//! - Partitions are dumb byte stores with geometry (sector size, sector
//!   count, write alignment)
//! - No knowledge of emberkv entry formats, checksums, or the key index
//! - emberkv owns all on-flash format interpretation
//!
//! ## Available Partitions
//!
//! - [`MemoryFlash`] - For testing and ephemeral stores
//! - [`FileFlash`] - A sectored flash image backed by a regular file
//!
//! ## Example
//!
//! ```rust
//! use emberkv_flash::{FlashPartition, MemoryFlash};
//!
//! let mut flash = MemoryFlash::new(4, 512, 16);
//! flash.write(0, &[0xAB; 16]).unwrap();
//! let mut buf = [0u8; 16];
//! flash.read(0, &mut buf).unwrap();
//! assert_eq!(buf, [0xAB; 16]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod partition;

pub use error::{FlashError, FlashResult};
pub use file::FileFlash;
pub use memory::MemoryFlash;
pub use partition::FlashPartition;
