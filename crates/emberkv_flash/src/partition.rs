//! Flash partition trait definition.

use crate::error::FlashResult;

/// A low-level flash partition for emberkv.
///
/// Partitions are **sectored byte stores**. They provide reads at any
/// address, writes that must respect the device write alignment, and
/// whole-sector erases. emberkv owns all on-flash format interpretation -
/// partitions do not understand entries, checksums, or the key index.
///
/// # Invariants
///
/// - `read` returns exactly the bytes most recently written (or the erased
///   pattern for never-written regions)
/// - `write` rejects accesses whose address or length is not a multiple of
///   `alignment_bytes`
/// - `erase` restores every byte of the sector to `erased_byte`
/// - Geometry is static for the lifetime of the partition
///
/// # Implementors
///
/// - [`super::MemoryFlash`] - For testing
/// - [`super::FileFlash`] - A flash image in a regular file
pub trait FlashPartition {
    /// Returns the size of one erase sector in bytes.
    fn sector_size_bytes(&self) -> usize;

    /// Returns the number of sectors in the partition.
    fn sector_count(&self) -> usize;

    /// Returns the write alignment in bytes.
    ///
    /// Every write address and length must be a multiple of this value.
    fn alignment_bytes(&self) -> usize;

    /// Returns the byte value flash reads as after an erase.
    fn erased_byte(&self) -> u8 {
        0xFF
    }

    /// Returns the total partition size in bytes.
    fn size_bytes(&self) -> u64 {
        self.sector_size_bytes() as u64 * self.sector_count() as u64
    }

    /// Reads `out.len()` bytes starting at `address`.
    ///
    /// Reads have no alignment constraint.
    ///
    /// # Errors
    ///
    /// Returns an error if the read extends beyond the partition or an I/O
    /// error occurs.
    fn read(&self, address: u64, out: &mut [u8]) -> FlashResult<()>;

    /// Writes `data` starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address or length is not a multiple of `alignment_bytes`
    /// - The write extends beyond the partition
    /// - An I/O error occurs
    fn write(&mut self, address: u64, data: &[u8]) -> FlashResult<()>;

    /// Erases the sector at `sector_index`, restoring the erased pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the sector index is out of range or an I/O
    /// error occurs.
    fn erase(&mut self, sector_index: usize) -> FlashResult<()>;
}
