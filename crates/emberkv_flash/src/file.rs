//! File-backed flash partition.

use crate::error::{FlashError, FlashResult};
use crate::partition::FlashPartition;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A flash partition backed by a regular file.
///
/// The file holds a byte-for-byte flash image with fixed geometry. Data
/// survives process restarts, which makes this partition useful for
/// host-side tools and long-running integration tests.
///
/// # Durability
///
/// Writes go straight to the file; `erase` rewrites the sector and calls
/// `File::sync_data`. There is no additional write cache to flush.
///
/// # Example
///
/// ```no_run
/// use emberkv_flash::{FlashPartition, FileFlash};
/// use std::path::Path;
///
/// let mut flash = FileFlash::create(Path::new("flash.img"), 8, 4096, 16).unwrap();
/// flash.write(0, &[0u8; 16]).unwrap();
/// ```
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    file: RwLock<File>,
    sector_size: usize,
    sector_count: usize,
    alignment: usize,
}

impl FileFlash {
    /// Creates a new flash image file with the given geometry, fully erased.
    ///
    /// Truncates any existing file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    ///
    /// # Panics
    ///
    /// Panics if the geometry is invalid (zero values, or `sector_size`
    /// not a multiple of `alignment`).
    pub fn create(
        path: &Path,
        sector_count: usize,
        sector_size: usize,
        alignment: usize,
    ) -> FlashResult<Self> {
        assert!(sector_count > 0, "sector_count must be nonzero");
        assert!(alignment > 0, "alignment must be nonzero");
        assert!(
            sector_size > 0 && sector_size % alignment == 0,
            "sector_size must be a nonzero multiple of alignment"
        );

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let sector = vec![0xFF; sector_size];
        for _ in 0..sector_count {
            file.write_all(&sector)?;
        }
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            sector_size,
            sector_count,
            alignment,
        })
    }

    /// Opens an existing flash image file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its length does not
    /// match the geometry.
    pub fn open(
        path: &Path,
        sector_count: usize,
        sector_size: usize,
        alignment: usize,
    ) -> FlashResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let expected = sector_count as u64 * sector_size as u64;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(FlashError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("flash image is {actual} bytes, geometry requires {expected}"),
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            sector_size,
            sector_count,
            alignment,
        })
    }

    /// Returns the path to the underlying image file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_bounds(&self, address: u64, len: usize) -> FlashResult<()> {
        let size = self.size_bytes();
        if address > size || address + len as u64 > size {
            return Err(FlashError::OutOfBounds { address, len, size });
        }
        Ok(())
    }
}

impl FlashPartition for FileFlash {
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
        if out.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(address))?;
        file.read_exact(out)?;
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

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(address))?;
        file.write_all(data)?;
        Ok(())
    }

    fn erase(&mut self, sector_index: usize) -> FlashResult<()> {
        if sector_index >= self.sector_count {
            return Err(FlashError::InvalidSector {
                index: sector_index,
                count: self.sector_count,
            });
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(
            sector_index as u64 * self.sector_size as u64,
        ))?;
        file.write_all(&vec![self.erased_byte(); self.sector_size])?;
        file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_is_erased() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        let flash = FileFlash::create(&path, 2, 256, 16).unwrap();
        assert_eq!(flash.size_bytes(), 512);

        let mut buf = [0u8; 512];
        flash.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        let mut flash = FileFlash::create(&path, 2, 256, 16).unwrap();
        flash.write(16, &[0x5A; 48]).unwrap();

        let mut buf = [0u8; 48];
        flash.read(16, &mut buf).unwrap();
        assert_eq!(buf, [0x5A; 48]);
    }

    #[test]
    fn file_unaligned_write_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        let mut flash = FileFlash::create(&path, 2, 256, 16).unwrap();
        let result = flash.write(4, &[0u8; 16]);
        assert!(matches!(result, Err(FlashError::Misaligned { .. })));
    }

    #[test]
    fn file_erase_restores_pattern() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        let mut flash = FileFlash::create(&path, 2, 256, 16).unwrap();
        flash.write(0, &[0u8; 256]).unwrap();
        flash.erase(0).unwrap();

        let mut buf = [0u8; 256];
        flash.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        {
            let mut flash = FileFlash::create(&path, 2, 256, 16).unwrap();
            flash.write(32, &[0xEE; 16]).unwrap();
        }

        let flash = FileFlash::open(&path, 2, 256, 16).unwrap();
        let mut buf = [0u8; 16];
        flash.read(32, &mut buf).unwrap();
        assert_eq!(buf, [0xEE; 16]);
    }

    #[test]
    fn file_open_wrong_geometry_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        FileFlash::create(&path, 2, 256, 16).unwrap();
        let result = FileFlash::open(&path, 4, 256, 16);
        assert!(result.is_err());
    }

    #[test]
    fn file_path_accessor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");

        let flash = FileFlash::create(&path, 2, 256, 16).unwrap();
        assert_eq!(flash.path(), path);
    }
}
