//! In-memory flash partition for testing.

use crate::error::{FlashError, FlashResult};
use crate::partition::FlashPartition;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory flash partition.
///
/// This partition simulates sectored flash in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Shared Image
///
/// Clones share the same underlying flash image. This lets a test hand one
/// handle to a store while keeping another to inspect or corrupt the image,
/// and to re-initialize a second store over the same bytes to simulate a
/// reboot.
///
/// # Example
///
/// ```rust
/// use emberkv_flash::{FlashPartition, MemoryFlash};
///
/// let flash = MemoryFlash::new(4, 512, 16);
/// assert_eq!(flash.size_bytes(), 2048);
/// assert_eq!(flash.image()[0], 0xFF); // erased
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    image: Arc<RwLock<Vec<u8>>>,
    sector_size: usize,
    sector_count: usize,
    alignment: usize,
}

impl MemoryFlash {
    /// Creates a new partition with the given geometry, fully erased.
    ///
    /// # Panics
    ///
    /// Panics if any geometry value is zero, if `sector_size` is not a
    /// multiple of `alignment`, or if `alignment` is not a multiple of 16.
    #[must_use]
    pub fn new(sector_count: usize, sector_size: usize, alignment: usize) -> Self {
        assert!(sector_count > 0, "sector_count must be nonzero");
        assert!(alignment > 0, "alignment must be nonzero");
        assert!(
            sector_size > 0 && sector_size % alignment == 0,
            "sector_size must be a nonzero multiple of alignment"
        );

        Self {
            image: Arc::new(RwLock::new(vec![0xFF; sector_count * sector_size])),
            sector_size,
            sector_count,
            alignment,
        }
    }

    /// Creates a partition over a pre-existing flash image.
    ///
    /// Useful for testing recovery scenarios.
    ///
    /// # Panics
    ///
    /// Panics if `image.len()` does not equal `sector_count * sector_size`
    /// or the geometry is invalid.
    #[must_use]
    pub fn with_image(
        image: Vec<u8>,
        sector_count: usize,
        sector_size: usize,
        alignment: usize,
    ) -> Self {
        assert_eq!(
            image.len(),
            sector_count * sector_size,
            "image length must match geometry"
        );
        let flash = Self::new(sector_count, sector_size, alignment);
        *flash.image.write() = image;
        flash
    }

    /// Returns a copy of the full flash image.
    ///
    /// Useful for asserting that an operation left flash untouched.
    #[must_use]
    pub fn image(&self) -> Vec<u8> {
        self.image.read().clone()
    }

    /// Overwrites a single byte of the image, bypassing alignment checks.
    ///
    /// Test support for corruption scenarios; real flash cannot do this.
    pub fn patch_byte(&self, address: u64, value: u8) {
        self.image.write()[address as usize] = value;
    }

    fn check_bounds(&self, address: u64, len: usize) -> FlashResult<()> {
        let size = self.size_bytes();
        if address > size || address + len as u64 > size {
            return Err(FlashError::OutOfBounds { address, len, size });
        }
        Ok(())
    }
}

impl FlashPartition for MemoryFlash {
    fn sector_size_bytes(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn alignment_bytes(&self) -> usize {
        self.alignment
    }

    fn read(&self, address: u64, out: &mut [u8]) -> FlashResult<()> {
        self.check_bounds(address, out.len())?;
        let image = self.image.read();
        let start = address as usize;
        out.copy_from_slice(&image[start..start + out.len()]);
        Ok(())
    }

    fn write(&mut self, address: u64, data: &[u8]) -> FlashResult<()> {
        if address % self.alignment as u64 != 0 || data.len() % self.alignment != 0 {
            return Err(FlashError::Misaligned {
                address,
                len: data.len(),
                alignment: self.alignment,
            });
        }
        self.check_bounds(address, data.len())?;

        let mut image = self.image.write();
        let start = address as usize;
        image[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, sector_index: usize) -> FlashResult<()> {
        if sector_index >= self.sector_count {
            return Err(FlashError::InvalidSector {
                index: sector_index,
                count: self.sector_count,
            });
        }

        let mut image = self.image.write();
        let start = sector_index * self.sector_size;
        image[start..start + self.sector_size].fill(self.erased_byte());
        Ok(())
    }
}
