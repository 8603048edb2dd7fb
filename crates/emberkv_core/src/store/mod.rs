//! The log-structured key-value store engine.
//!
//! Sector management, key-hash indexing, put/get/delete, transaction
//! ordering, and garbage collection over a [`FlashPartition`].
//!
//! The store is designed for single-threaded or externally-serialized
//! access: every mutating operation takes `&mut self`, runs to completion
//! within the calling context, and blocks only on the underlying flash
//! calls. Concurrent instances over the same flash region are not
//! supported.

mod index;
mod sectors;

use crate::aligned::align_up;
use crate::config::StoreConfig;
use crate::entry::Entry;
use crate::error::{KvsError, KvsResult};
use crate::format::{HEADER_SIZE, MAX_KEY_LENGTH, TOMBSTONE_VALUE_SIZE};
use crate::stats::StorageStats;
use emberkv_flash::FlashPartition;
use index::{hash_key, EntryState, KeyDescriptor, KeyIndex};
use sectors::SectorMap;
use tracing::{debug, warn};

/// Store lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A log-structured key-value store over raw flash.
///
/// # Lifecycle
///
/// Construct with [`new`](Self::new), then call [`init`](Self::init) to
/// scan the partition and rebuild the in-memory index. Every other
/// operation fails with `FailedPrecondition` until `init` succeeds.
///
/// # Example
///
/// ```rust
/// use emberkv_core::{KeyValueStore, StoreConfig};
/// use emberkv_flash::MemoryFlash;
///
/// let flash = MemoryFlash::new(4, 512, 16);
/// let mut store = KeyValueStore::new(Box::new(flash), StoreConfig::default());
/// store.init().unwrap();
///
/// store.put("greeting", b"hello").unwrap();
/// assert_eq!(store.get_value("greeting").unwrap(), b"hello");
/// ```
pub struct KeyValueStore {
    partition: Box<dyn FlashPartition>,
    config: StoreConfig,
    /// Entry alignment: partition write alignment rounded up to a
    /// multiple of 16.
    alignment: usize,
    index: KeyIndex,
    sectors: SectorMap,
    last_transaction_id: u32,
    state: StoreState,
}

impl KeyValueStore {
    /// Creates an uninitialized store over `partition`.
    #[must_use]
    pub fn new(partition: Box<dyn FlashPartition>, config: StoreConfig) -> Self {
        let alignment = Entry::required_alignment(partition.alignment_bytes());
        let sectors = SectorMap::new(partition.sector_count(), partition.sector_size_bytes());
        let index = KeyIndex::new(config.max_entries);
        Self {
            partition,
            config,
            alignment,
            index,
            sectors,
            last_transaction_id: 0,
            state: StoreState::Uninitialized,
        }
    }

    /// Returns the largest combined key+value size one entry can hold in
    /// a partition with `sector_size` byte sectors.
    #[must_use]
    pub fn max_key_value_size_bytes(sector_size: usize) -> usize {
        sector_size - HEADER_SIZE
    }

    /// Returns the number of live (non-deleted) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index
            .iter()
            .filter(|d| d.state == EntryState::Valid)
            .count()
    }

    /// Returns whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the highest transaction id committed so far.
    #[must_use]
    pub fn last_transaction_id(&self) -> u32 {
        self.last_transaction_id
    }

    /// Initializes the store by scanning every sector and replaying
    /// entries in flash order.
    ///
    /// For each readable entry the newest copy per key (by transaction id)
    /// wins; superseded copies, corrupt entries, and unindexable regions
    /// are counted reclaimable. Corruption is recovered locally: a bad
    /// entry is skipped, an unreadable region abandons the remainder of
    /// its sector. The highest transaction id seen becomes the resume
    /// point.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` if the partition geometry violates the
    /// configured bounds (fewer than 2 sectors, more than
    /// `max_sectors`, sector size or write alignment incompatible with the
    /// entry alignment), or `ResourceExhausted` if the flash holds more
    /// keys than `max_entries`.
    pub fn init(&mut self) -> KvsResult<()> {
        let sector_count = self.partition.sector_count();
        let sector_size = self.partition.sector_size_bytes();

        if self.config.formats.is_empty() {
            return Err(KvsError::failed_precondition("no entry formats configured"));
        }
        if sector_count < 2 {
            return Err(KvsError::failed_precondition(format!(
                "partition has {sector_count} sectors, need at least 2"
            )));
        }
        if sector_count > self.config.max_sectors {
            return Err(KvsError::failed_precondition(format!(
                "partition has {sector_count} sectors, configured maximum is {}",
                self.config.max_sectors
            )));
        }
        if sector_size % self.alignment != 0 {
            return Err(KvsError::failed_precondition(format!(
                "sector size {sector_size} is not a multiple of the entry alignment {}",
                self.alignment
            )));
        }
        if self.alignment % self.partition.alignment_bytes() != 0 {
            return Err(KvsError::failed_precondition(format!(
                "entry alignment {} is not writable with partition alignment {}",
                self.alignment,
                self.partition.alignment_bytes()
            )));
        }

        self.state = StoreState::Initializing;
        self.index = KeyIndex::new(self.config.max_entries);
        self.sectors = SectorMap::new(sector_count, sector_size);
        self.last_transaction_id = 0;

        for sector in 0..sector_count {
            self.scan_sector(sector)?;
        }

        self.state = StoreState::Ready;
        debug!(
            entries = self.index.len(),
            sectors = sector_count,
            last_transaction_id = self.last_transaction_id,
            "store initialized"
        );
        Ok(())
    }

    /// Writes or overwrites `key` with `value`.
    ///
    /// A put of the value already stored for `key` is a no-op: no new
    /// transaction, no flash write. Triggers garbage collection when no
    /// sector has room.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty/oversized key or oversized value
    /// - `AlreadyExists` if a different key occupies this key's hash slot
    /// - `ResourceExhausted` if the index is full or no space can be
    ///   reclaimed
    /// - `DataLoss`/flash errors from the underlying accesses
    pub fn put(&mut self, key: &str, value: &[u8]) -> KvsResult<()> {
        self.check_ready()?;
        let key_bytes = key.as_bytes();
        Self::check_key(key_bytes)?;

        let sector_size = self.partition.sector_size_bytes();
        if value.len() >= usize::from(TOMBSTONE_VALUE_SIZE)
            || key_bytes.len() + value.len() > Self::max_key_value_size_bytes(sector_size)
        {
            return Err(KvsError::invalid_argument(format!(
                "value of {} bytes does not fit an entry in a {sector_size} byte sector",
                value.len()
            )));
        }

        let hash = hash_key(key_bytes);
        let Some(existing_descriptor) = self.index.find(hash).copied() else {
            if self.index.len() >= self.config.max_entries {
                return Err(KvsError::ResourceExhausted { copied: 0 });
            }
            let (address, _) = self.append_entry(key_bytes, Some(value))?;
            return self.index.insert(KeyDescriptor {
                key_hash: hash,
                transaction_id: self.last_transaction_id,
                state: EntryState::Valid,
                address,
            });
        };

        let existing = Entry::read(
            &*self.partition,
            existing_descriptor.address,
            &self.config.formats,
        )?;
        if existing.read_key(&*self.partition)? != key_bytes {
            return Err(KvsError::AlreadyExists { key_hash: hash });
        }

        if existing_descriptor.state == EntryState::Valid
            && existing.value_size() == value.len()
            && existing.read_value(&*self.partition)? == value
        {
            return Ok(());
        }

        let old_size = existing.size();
        let (address, _) = self.append_entry(key_bytes, Some(value))?;

        // An implicit garbage collection inside the append may have
        // relocated the old copy; resolve its sector from the refreshed
        // descriptor, not the pre-append address.
        let transaction_id = self.last_transaction_id;
        if let Some(descriptor) = self.index.find(hash).copied() {
            let old_sector = self.sectors.sector_of(descriptor.address);
            self.sectors.record_obsolete(old_sector, old_size);
        }
        if let Some(descriptor) = self.index.find_mut(hash) {
            descriptor.transaction_id = transaction_id;
            descriptor.state = EntryState::Valid;
            descriptor.address = address;
        }
        Ok(())
    }

    /// Reads the value for `key` into `out`, returning the bytes copied.
    ///
    /// Equivalent to [`get_with_offset`](Self::get_with_offset) at offset
    /// zero.
    ///
    /// # Errors
    ///
    /// See [`get_with_offset`](Self::get_with_offset).
    pub fn get(&self, key: &str, out: &mut [u8]) -> KvsResult<usize> {
        self.get_with_offset(key, out, 0)
    }

    /// Reads the value for `key` starting at `offset` into `out`.
    ///
    /// Returns the bytes copied.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the key is absent or deleted
    /// - `OutOfRange` if `offset` exceeds the stored value length
    /// - `ResourceExhausted { copied }` if `out` is smaller than the
    ///   remaining value; the `copied` bytes that fit are valid, so this
    ///   is partial success rather than failure
    /// - `DataLoss` if the entry fails checksum verification
    pub fn get_with_offset(&self, key: &str, out: &mut [u8], offset: usize) -> KvsResult<usize> {
        self.check_ready()?;
        let (_, entry) = self.find_live(key)?;

        if self.config.verify_on_read {
            entry.verify_checksum_in_flash(&*self.partition)?;
        }

        let value_size = entry.value_size();
        if offset > value_size {
            return Err(KvsError::OutOfRange {
                offset,
                size: value_size,
            });
        }

        let remaining = value_size - offset;
        let n = remaining.min(out.len());
        entry.read_value_at(&*self.partition, offset, &mut out[..n])?;

        if n < remaining {
            return Err(KvsError::ResourceExhausted { copied: n });
        }
        Ok(n)
    }

    /// Reads and returns the full value for `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent or deleted; `DataLoss` if the
    /// entry fails checksum verification.
    pub fn get_value(&self, key: &str) -> KvsResult<Vec<u8>> {
        self.check_ready()?;
        let (_, entry) = self.find_live(key)?;
        if self.config.verify_on_read {
            entry.verify_checksum_in_flash(&*self.partition)?;
        }
        entry.read_value(&*self.partition)
    }

    /// Returns the stored value size for `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent or deleted.
    pub fn value_size(&self, key: &str) -> KvsResult<usize> {
        self.check_ready()?;
        Ok(self.find_live(key)?.1.value_size())
    }

    /// Deletes `key` by writing a tombstone entry.
    ///
    /// The tombstone follows the same transaction-id discipline as a put
    /// and is retained across garbage collection to suppress resurrection
    /// of the key after a crash.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent or already deleted.
    pub fn delete(&mut self, key: &str) -> KvsResult<()> {
        self.check_ready()?;
        let key_bytes = key.as_bytes();
        Self::check_key(key_bytes)?;

        let hash = hash_key(key_bytes);
        let Some(descriptor) = self.index.find(hash).copied() else {
            return Err(KvsError::NotFound);
        };
        let existing = Entry::read(&*self.partition, descriptor.address, &self.config.formats)?;
        if existing.read_key(&*self.partition)? != key_bytes
            || descriptor.state == EntryState::Deleted
        {
            return Err(KvsError::NotFound);
        }

        let old_size = existing.size();
        let (address, _) = self.append_entry(key_bytes, None)?;

        // As in put: an implicit collection during the append may have
        // moved the old copy.
        let transaction_id = self.last_transaction_id;
        if let Some(descriptor) = self.index.find(hash).copied() {
            let old_sector = self.sectors.sector_of(descriptor.address);
            self.sectors.record_obsolete(old_sector, old_size);
        }
        if let Some(descriptor) = self.index.find_mut(hash) {
            descriptor.transaction_id = transaction_id;
            descriptor.state = EntryState::Deleted;
            descriptor.address = address;
        }
        Ok(())
    }

    /// Iterates over all live `(key, value)` pairs in index (hash) order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            store: self,
            position: 0,
        }
    }

    /// Returns a snapshot of the space accounting.
    #[must_use]
    pub fn storage_stats(&self) -> StorageStats {
        self.sectors.stats()
    }

    /// Garbage-collects every sector holding reclaimable bytes.
    ///
    /// Victims are chosen by most reclaimable bytes (tie-break: lowest
    /// index). Live entries are copied forward before their source sector
    /// is erased; entries in a non-primary format are converted to the
    /// primary format in the same pass. With
    /// `remove_deleted_keys_in_heavy_maintenance` set, tombstones whose
    /// key has no other copy anywhere in the log are dropped first.
    ///
    /// # Errors
    ///
    /// Returns flash or space errors from relocation; the source sector
    /// is never erased before its live entries have landed elsewhere.
    pub fn heavy_maintenance(&mut self) -> KvsResult<()> {
        self.check_ready()?;
        self.sectors.clear_current();

        if self.config.remove_deleted_keys_in_heavy_maintenance {
            self.drop_safe_tombstones()?;
        }

        while let Some(victim) = self.sectors.find_gc_victim() {
            self.collect_sector(victim)?;
        }
        Ok(())
    }

    /// Heavy maintenance plus rewriting every remaining entry whose
    /// format is not the primary format.
    ///
    /// After this returns, all entries on flash carry the primary format
    /// and no reclaimable bytes remain.
    ///
    /// # Errors
    ///
    /// See [`heavy_maintenance`](Self::heavy_maintenance).
    pub fn full_maintenance(&mut self) -> KvsResult<()> {
        self.check_ready()?;
        self.sectors.clear_current();

        let primary = self.config.primary_format();
        let descriptors: Vec<KeyDescriptor> = self.index.iter().copied().collect();
        for descriptor in descriptors {
            let entry = Entry::read(&*self.partition, descriptor.address, &self.config.formats)?;
            if entry.format().magic != primary.magic {
                self.relocate(descriptor, entry)?;
            }
        }

        self.heavy_maintenance()
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn check_ready(&self) -> KvsResult<()> {
        if self.state != StoreState::Ready {
            return Err(KvsError::failed_precondition(
                "store is not initialized; call init() first",
            ));
        }
        Ok(())
    }

    fn check_key(key: &[u8]) -> KvsResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(KvsError::invalid_argument(format!(
                "key length {} is outside 1..={MAX_KEY_LENGTH}",
                key.len()
            )));
        }
        Ok(())
    }

    /// Looks up a live entry by key, reading back the stored key bytes to
    /// rule out a hash collision.
    fn find_live(&self, key: &str) -> KvsResult<(KeyDescriptor, Entry)> {
        let key_bytes = key.as_bytes();
        Self::check_key(key_bytes)?;

        let hash = hash_key(key_bytes);
        let Some(descriptor) = self.index.find(hash).copied() else {
            return Err(KvsError::NotFound);
        };
        let entry = Entry::read(&*self.partition, descriptor.address, &self.config.formats)?;
        if descriptor.state == EntryState::Deleted
            || entry.read_key(&*self.partition)? != key_bytes
        {
            return Err(KvsError::NotFound);
        }
        Ok((descriptor, entry))
    }

    fn scan_sector(&mut self, sector: usize) -> KvsResult<()> {
        let sector_size = self.partition.sector_size_bytes();
        let base = self.sectors.base_address(sector);
        let mut offset = 0usize;

        while offset + HEADER_SIZE <= sector_size {
            let address = base + offset as u64;
            let entry = match Entry::read(&*self.partition, address, &self.config.formats) {
                Ok(entry) => entry,
                // Erased header: the rest of the sector is free.
                Err(KvsError::NotFound) => return Ok(()),
                Err(KvsError::DataLoss { message }) => {
                    warn!(
                        sector,
                        offset,
                        %message,
                        "unreadable entry; abandoning rest of sector"
                    );
                    self.sectors.poison(sector);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let size = entry.size();
            self.sectors.record_append(sector, size);

            match entry.verify_checksum_in_flash(&*self.partition) {
                Ok(()) => {
                    self.last_transaction_id = self.last_transaction_id.max(entry.transaction_id());
                    self.index_scanned_entry(sector, entry)?;
                }
                Err(KvsError::DataLoss { message }) => {
                    warn!(sector, offset, %message, "corrupt entry skipped during scan");
                    self.sectors.record_obsolete(sector, size);
                }
                Err(e) => return Err(e),
            }

            offset += size;
        }
        Ok(())
    }

    fn index_scanned_entry(&mut self, sector: usize, entry: Entry) -> KvsResult<()> {
        let key = entry.read_key(&*self.partition)?;
        let hash = hash_key(&key);
        let size = entry.size();
        let state = if entry.deleted() {
            EntryState::Deleted
        } else {
            EntryState::Valid
        };

        let Some(existing) = self.index.find(hash).copied() else {
            return self.index.insert(KeyDescriptor {
                key_hash: hash,
                transaction_id: entry.transaction_id(),
                state,
                address: entry.address(),
            });
        };

        let existing_entry =
            Entry::read(&*self.partition, existing.address, &self.config.formats)?;
        if existing_entry.read_key(&*self.partition)? != key {
            warn!(
                key_hash = hash,
                "hash collision between distinct keys; keeping first binding"
            );
            self.sectors.record_obsolete(sector, size);
            return Ok(());
        }

        if entry.transaction_id() > existing.transaction_id {
            let old_sector = self.sectors.sector_of(existing.address);
            self.sectors.record_obsolete(old_sector, existing_entry.size());
            if let Some(descriptor) = self.index.find_mut(hash) {
                descriptor.transaction_id = entry.transaction_id();
                descriptor.state = state;
                descriptor.address = entry.address();
            }
        } else {
            self.sectors.record_obsolete(sector, size);
        }
        Ok(())
    }

    /// Writes a new entry (value record or tombstone) with the next
    /// transaction id, choosing a sector and garbage-collecting if
    /// nothing has room.
    ///
    /// On a write failure the remainder of the chosen sector is abandoned
    /// as reclaimable; the caller's descriptor state is untouched, so the
    /// old value stays authoritative.
    fn append_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> KvsResult<(u64, usize)> {
        let value_len = value.map_or(0, <[u8]>::len);
        let size = align_up(HEADER_SIZE + key.len() + value_len, self.alignment);
        let sector = self.find_or_make_room(size)?;
        let address = self.sectors.append_address(sector);
        let transaction_id = self.last_transaction_id.wrapping_add(1);
        let format = self.config.primary_format();

        let mut entry = match value {
            Some(v) => Entry::valid(address, format, self.alignment, key.len(), v.len(), transaction_id),
            None => Entry::tombstone(address, format, self.alignment, key.len(), transaction_id),
        };

        match entry.write(&mut *self.partition, key, value.unwrap_or(&[])) {
            Ok(written) => {
                if self.config.verify_on_write {
                    if let Err(e) = self.verify_written(address) {
                        warn!(address, "entry failed read-back verification");
                        self.sectors.poison(sector);
                        return Err(e);
                    }
                }
                self.sectors.record_append(sector, written);
                self.last_transaction_id = transaction_id;
                Ok((address, written))
            }
            Err(e) => {
                warn!(address, "entry write failed; abandoning rest of sector");
                self.sectors.poison(sector);
                Err(e)
            }
        }
    }

    fn verify_written(&self, address: u64) -> KvsResult<()> {
        let entry = Entry::read(&*self.partition, address, &self.config.formats)?;
        entry.verify_checksum_in_flash(&*self.partition)
    }

    fn find_or_make_room(&mut self, size: usize) -> KvsResult<usize> {
        loop {
            if let Some(sector) = self.sectors.find_write_sector(size) {
                return Ok(sector);
            }
            // No sector qualifies while it stays full, so there is no
            // active write sector to protect from collection.
            self.sectors.clear_current();
            let Some(victim) = self.sectors.find_gc_victim() else {
                return Err(KvsError::ResourceExhausted { copied: 0 });
            };
            debug!(victim, "no sector has room; garbage collecting");
            self.collect_sector(victim)?;
        }
    }

    /// Relocates every live entry out of `victim`, then erases it.
    ///
    /// Copy-then-erase ordering: the erase happens only after every live
    /// entry has durably landed in another sector.
    fn collect_sector(&mut self, victim: usize) -> KvsResult<()> {
        let movers: Vec<KeyDescriptor> = self
            .index
            .iter()
            .filter(|d| self.sectors.sector_of(d.address) == victim)
            .copied()
            .collect();

        debug!(victim, live_entries = movers.len(), "garbage collecting sector");
        for descriptor in movers {
            let entry = Entry::read(&*self.partition, descriptor.address, &self.config.formats)?;
            self.relocate(descriptor, entry)?;
        }

        self.partition.erase(victim)?;
        self.sectors.mark_erased(victim);
        Ok(())
    }

    /// Copies one live entry forward into a sector with room, converting
    /// it to the primary format when it differs.
    fn relocate(&mut self, descriptor: KeyDescriptor, entry: Entry) -> KvsResult<()> {
        let primary = self.config.primary_format();
        let source = if entry.format().magic == primary.magic {
            entry
        } else {
            entry.update(primary, entry.transaction_id())
        };

        let from_sector = self.sectors.sector_of(entry.address());
        let target = self
            .sectors
            .find_relocation_sector(source.size(), from_sector)
            .ok_or(KvsError::ResourceExhausted { copied: 0 })?;
        let address = self.sectors.append_address(target);

        match source.copy(&mut *self.partition, address) {
            Ok((_, written)) => {
                self.sectors.record_append(target, written);
                self.sectors.record_obsolete(from_sector, entry.size());
                if let Some(d) = self.index.find_mut(descriptor.key_hash) {
                    d.address = address;
                }
                Ok(())
            }
            Err(e) => {
                warn!(address, "relocation write failed; abandoning rest of sector");
                self.sectors.poison(target);
                Err(e)
            }
        }
    }

    /// Drops tombstones whose key provably has no other copy anywhere in
    /// the log: with no older value on flash, a crash mid-collection can
    /// leave the tombstone present or absent, and neither state can
    /// resurrect the key.
    fn drop_safe_tombstones(&mut self) -> KvsResult<()> {
        let deleted: Vec<KeyDescriptor> = self
            .index
            .iter()
            .filter(|d| d.state == EntryState::Deleted)
            .copied()
            .collect();

        for descriptor in deleted {
            let entry = Entry::read(&*self.partition, descriptor.address, &self.config.formats)?;
            let key = entry.read_key(&*self.partition)?;
            if self.other_copy_exists(&key, descriptor.address)? {
                continue;
            }
            debug!(
                key_hash = descriptor.key_hash,
                "dropping tombstone with no remaining copies"
            );
            let sector = self.sectors.sector_of(descriptor.address);
            self.index.remove(descriptor.key_hash);
            self.sectors.record_obsolete(sector, entry.size());
        }
        Ok(())
    }

    /// Walks every sector looking for any entry other than `authoritative`
    /// that stores `key`.
    fn other_copy_exists(&self, key: &[u8], authoritative: u64) -> KvsResult<bool> {
        for sector in 0..self.partition.sector_count() {
            let base = self.sectors.base_address(sector);
            let limit = self.sectors.write_offset(sector);
            let mut offset = 0usize;

            while offset + HEADER_SIZE <= limit {
                let address = base + offset as u64;
                let entry = match Entry::read(&*self.partition, address, &self.config.formats) {
                    Ok(entry) => entry,
                    // Erased or unreadable tail: nothing further in this
                    // sector can be replayed, here or at the next init.
                    Err(KvsError::NotFound) | Err(KvsError::DataLoss { .. }) => break,
                    Err(e) => return Err(e),
                };
                if entry.address() != authoritative
                    && entry.read_key(&*self.partition)? == key
                {
                    return Ok(true);
                }
                offset += entry.size();
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("state", &self.state)
            .field("entries", &self.index.len())
            .field("last_transaction_id", &self.last_transaction_id)
            .finish_non_exhaustive()
    }
}

/// Iterator over all live `(key, value)` pairs in index order.
pub struct Iter<'a> {
    store: &'a KeyValueStore,
    position: usize,
}

impl Iterator for Iter<'_> {
    type Item = KvsResult<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let descriptor = *self.store.index.get(self.position)?;
            self.position += 1;
            if descriptor.state != EntryState::Valid {
                continue;
            }
            return Some(self.read_pair(descriptor));
        }
    }
}

impl Iter<'_> {
    fn read_pair(&self, descriptor: KeyDescriptor) -> KvsResult<(String, Vec<u8>)> {
        let partition = &*self.store.partition;
        let entry = Entry::read(partition, descriptor.address, &self.store.config.formats)?;
        let key = String::from_utf8(entry.read_key(partition)?)
            .map_err(|_| KvsError::data_loss("stored key is not valid UTF-8"))?;
        let value = entry.read_value(partition)?;
        Ok((key, value))
    }
}
