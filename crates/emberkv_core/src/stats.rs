//! Storage statistics.

/// A snapshot of the store's space accounting.
///
/// Returned by [`crate::KeyValueStore::storage_stats`]. All values are
/// computed from the in-memory sector map; the store is single-threaded,
/// so a snapshot is always consistent with the operations around it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Bytes still writable across all sectors.
    pub writable_bytes: usize,

    /// Bytes occupied by live entries (current values and retained
    /// tombstones).
    pub in_use_bytes: usize,

    /// Bytes occupied by superseded or abandoned entries, recoverable by
    /// erasing their sectors.
    pub reclaimable_bytes: usize,

    /// Total sector erases performed by this store instance, including
    /// those triggered by garbage collection.
    pub sector_erase_count: u64,
}
