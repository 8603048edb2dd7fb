//! Store configuration.

use crate::format::EntryFormat;

/// Configuration for constructing a [`crate::KeyValueStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Recognized entry formats, in match order. The first is primary and
    /// used for all new writes.
    pub formats: Vec<EntryFormat>,

    /// Maximum number of logical keys the in-memory index will hold.
    pub max_entries: usize,

    /// Maximum sector count the store will accept at init.
    pub max_sectors: usize,

    /// Whether to verify the full entry checksum on every get.
    pub verify_on_read: bool,

    /// Whether to read back and verify every entry after writing it.
    pub verify_on_write: bool,

    /// Whether heavy maintenance may drop tombstones once no other copy
    /// of the key exists anywhere in the log.
    pub remove_deleted_keys_in_heavy_maintenance: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            formats: vec![EntryFormat::default()],
            max_entries: 256,
            max_sectors: 64,
            verify_on_read: true,
            verify_on_write: true,
            remove_deleted_keys_in_heavy_maintenance: false,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the recognized entry formats (first is primary).
    #[must_use]
    pub fn formats(mut self, formats: Vec<EntryFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Sets the index capacity.
    #[must_use]
    pub fn max_entries(mut self, value: usize) -> Self {
        self.max_entries = value;
        self
    }

    /// Sets the maximum accepted sector count.
    #[must_use]
    pub fn max_sectors(mut self, value: usize) -> Self {
        self.max_sectors = value;
        self
    }

    /// Sets whether gets verify the full entry checksum.
    #[must_use]
    pub fn verify_on_read(mut self, value: bool) -> Self {
        self.verify_on_read = value;
        self
    }

    /// Sets whether writes are read back and verified.
    #[must_use]
    pub fn verify_on_write(mut self, value: bool) -> Self {
        self.verify_on_write = value;
        self
    }

    /// Sets whether heavy maintenance may drop provably-safe tombstones.
    #[must_use]
    pub fn remove_deleted_keys_in_heavy_maintenance(mut self, value: bool) -> Self {
        self.remove_deleted_keys_in_heavy_maintenance = value;
        self
    }

    /// Returns the primary format used for new writes.
    ///
    /// # Panics
    ///
    /// Panics if the format list is empty; `KeyValueStore::init` rejects
    /// such configurations before any write can happen.
    #[must_use]
    pub fn primary_format(&self) -> EntryFormat {
        self.formats[0]
    }
}
