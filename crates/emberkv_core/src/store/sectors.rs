//! Per-sector space accounting.
//!
//! Each sector is an append-only log region. The map tracks, per sector,
//! the append cursor (`write_offset`) and the bytes occupied by live
//! entries (`valid_bytes`); the difference is reclaimable by erasing the
//! sector. Normal writes never consume the last empty sector, so garbage
//! collection always has a relocation target.

use crate::stats::StorageStats;

/// Accounting for one sector.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SectorDescriptor {
    /// Offset of the next free byte; `sector_size` when full or poisoned.
    pub write_offset: usize,
    /// Bytes occupied by live entries.
    pub valid_bytes: usize,
}

impl SectorDescriptor {
    pub(crate) fn reclaimable(&self) -> usize {
        self.write_offset - self.valid_bytes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.write_offset == 0
    }
}

/// Accounting for all sectors of the partition.
#[derive(Debug)]
pub(crate) struct SectorMap {
    sectors: Vec<SectorDescriptor>,
    sector_size: usize,
    current: Option<usize>,
    erase_count: u64,
}

impl SectorMap {
    pub(crate) fn new(sector_count: usize, sector_size: usize) -> Self {
        Self {
            sectors: vec![SectorDescriptor::default(); sector_count],
            sector_size,
            current: None,
            erase_count: 0,
        }
    }

    pub(crate) fn sector_of(&self, address: u64) -> usize {
        (address / self.sector_size as u64) as usize
    }

    pub(crate) fn base_address(&self, sector: usize) -> u64 {
        sector as u64 * self.sector_size as u64
    }

    /// Returns the address of the next free byte in `sector`.
    pub(crate) fn append_address(&self, sector: usize) -> u64 {
        self.base_address(sector) + self.sectors[sector].write_offset as u64
    }

    pub(crate) fn free_bytes(&self, sector: usize) -> usize {
        self.sector_size - self.sectors[sector].write_offset
    }

    pub(crate) fn write_offset(&self, sector: usize) -> usize {
        self.sectors[sector].write_offset
    }

    pub(crate) fn current(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn clear_current(&mut self) {
        self.current = None;
    }

    /// Records an appended entry of `bytes` live bytes in `sector`.
    pub(crate) fn record_append(&mut self, sector: usize, bytes: usize) {
        let s = &mut self.sectors[sector];
        debug_assert!(s.write_offset + bytes <= self.sector_size);
        s.write_offset += bytes;
        s.valid_bytes += bytes;
    }

    /// Marks `bytes` of `sector` as superseded (reclaimable).
    pub(crate) fn record_obsolete(&mut self, sector: usize, bytes: usize) {
        let s = &mut self.sectors[sector];
        debug_assert!(s.valid_bytes >= bytes);
        s.valid_bytes = s.valid_bytes.saturating_sub(bytes);
    }

    /// Abandons the unwritten remainder of `sector` as reclaimable.
    ///
    /// Used after a failed or partial entry write: the region is unusable
    /// until the sector is erased.
    pub(crate) fn poison(&mut self, sector: usize) {
        self.sectors[sector].write_offset = self.sector_size;
        if self.current == Some(sector) {
            self.current = None;
        }
    }

    /// Resets `sector` after an erase and bumps the erase counter.
    pub(crate) fn mark_erased(&mut self, sector: usize) {
        self.sectors[sector] = SectorDescriptor::default();
        self.erase_count += 1;
        if self.current == Some(sector) {
            self.current = None;
        }
    }

    fn keeps_spare(&self, candidate: usize) -> bool {
        self.sectors
            .iter()
            .enumerate()
            .any(|(i, s)| i != candidate && s.is_empty())
    }

    /// Chooses a sector for a normal append of `size` bytes.
    ///
    /// Prefers the current write sector; otherwise picks the sector with
    /// the most free space, never consuming the last empty sector. Returns
    /// `None` when nothing qualifies (the caller garbage-collects and
    /// retries).
    pub(crate) fn find_write_sector(&mut self, size: usize) -> Option<usize> {
        if let Some(current) = self.current {
            if self.free_bytes(current) >= size && self.keeps_spare(current) {
                return Some(current);
            }
        }

        let mut best: Option<usize> = None;
        for i in 0..self.sectors.len() {
            if self.free_bytes(i) < size || !self.keeps_spare(i) {
                continue;
            }
            match best {
                Some(b) if self.free_bytes(i) <= self.free_bytes(b) => {}
                _ => best = Some(i),
            }
        }

        if best.is_some() {
            self.current = best;
        }
        best
    }

    /// Chooses a relocation target for garbage collection.
    ///
    /// Relocation may use the spare sector; the erase of the victim
    /// restores it.
    pub(crate) fn find_relocation_sector(&self, size: usize, exclude: usize) -> Option<usize> {
        if let Some(current) = self.current {
            if current != exclude && self.free_bytes(current) >= size {
                return Some(current);
            }
        }

        let mut best: Option<usize> = None;
        for i in 0..self.sectors.len() {
            if i == exclude || self.free_bytes(i) < size {
                continue;
            }
            match best {
                Some(b) if self.free_bytes(i) <= self.free_bytes(b) => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Chooses the garbage collection victim: the sector with the most
    /// reclaimable bytes (tie-break: lowest index), never the current
    /// write sector.
    pub(crate) fn find_gc_victim(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, s) in self.sectors.iter().enumerate() {
            if Some(i) == self.current || s.reclaimable() == 0 {
                continue;
            }
            match best {
                Some(b) if s.reclaimable() <= self.sectors[b].reclaimable() => {}
                _ => best = Some(i),
            }
        }
        best
    }

    pub(crate) fn stats(&self) -> StorageStats {
        StorageStats {
            writable_bytes: self
                .sectors
                .iter()
                .map(|s| self.sector_size - s.write_offset)
                .sum(),
            in_use_bytes: self.sectors.iter().map(|s| s.valid_bytes).sum(),
            reclaimable_bytes: self.sectors.iter().map(|s| s.reclaimable()).sum(),
            sector_erase_count: self.erase_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_obsolete_accounting() {
        let mut map = SectorMap::new(3, 512);
        map.record_append(0, 64);
        map.record_append(0, 32);
        assert_eq!(map.write_offset(0), 96);
        assert_eq!(map.free_bytes(0), 416);
        assert_eq!(map.stats().reclaimable_bytes, 0);

        map.record_obsolete(0, 64);
        assert_eq!(map.stats().reclaimable_bytes, 64);
        assert_eq!(map.stats().in_use_bytes, 32);
    }

    #[test]
    fn append_address_tracks_cursor() {
        let mut map = SectorMap::new(3, 512);
        assert_eq!(map.append_address(1), 512);
        map.record_append(1, 48);
        assert_eq!(map.append_address(1), 560);
    }

    #[test]
    fn write_sector_keeps_one_empty() {
        let mut map = SectorMap::new(2, 512);
        let first = map.find_write_sector(64).unwrap();
        map.record_append(first, 64);

        // The other sector is the spare; a second sector cannot start.
        let second = map.find_write_sector(64).unwrap();
        assert_eq!(second, first);

        // Fill the first sector; nothing else qualifies.
        map.record_append(first, 448);
        assert!(map.find_write_sector(64).is_none());
    }

    #[test]
    fn write_sector_prefers_current() {
        let mut map = SectorMap::new(4, 512);
        let first = map.find_write_sector(64).unwrap();
        map.record_append(first, 64);

        // Another sector has more free space, but current wins while it
        // still fits.
        assert_eq!(map.find_write_sector(64), Some(first));

        map.record_append(first, 512 - 64 - 32);
        let next = map.find_write_sector(64).unwrap();
        assert_ne!(next, first);
    }

    #[test]
    fn gc_victim_most_reclaimable_lowest_index() {
        let mut map = SectorMap::new(4, 512);
        map.record_append(0, 256);
        map.record_obsolete(0, 128);
        map.record_append(1, 256);
        map.record_obsolete(1, 192);
        map.record_append(2, 256);
        map.record_obsolete(2, 192);

        // Sectors 1 and 2 tie at 192 reclaimable; lowest index wins.
        assert_eq!(map.find_gc_victim(), Some(1));
    }

    #[test]
    fn gc_victim_skips_current_write_sector() {
        let mut map = SectorMap::new(3, 512);
        let current = map.find_write_sector(64).unwrap();
        map.record_append(current, 64);
        map.record_obsolete(current, 64);

        assert!(map.find_gc_victim().is_none());
        map.clear_current();
        assert_eq!(map.find_gc_victim(), Some(current));
    }

    #[test]
    fn relocation_may_use_spare() {
        let mut map = SectorMap::new(2, 512);
        let first = map.find_write_sector(64).unwrap();
        map.record_append(first, 64);
        map.clear_current();

        let spare = 1 - first;
        assert_eq!(map.find_relocation_sector(64, first), Some(spare));
    }

    #[test]
    fn poison_reclaims_tail() {
        let mut map = SectorMap::new(2, 512);
        map.record_append(0, 64);
        map.poison(0);

        assert_eq!(map.free_bytes(0), 0);
        assert_eq!(map.stats().reclaimable_bytes, 512 - 64);
        assert_eq!(map.stats().in_use_bytes, 64);
    }

    #[test]
    fn erase_resets_and_counts() {
        let mut map = SectorMap::new(2, 512);
        map.record_append(0, 256);
        map.mark_erased(0);

        assert!(map.sectors[0].is_empty());
        assert_eq!(map.stats().sector_erase_count, 1);
        assert_eq!(map.stats().reclaimable_bytes, 0);
    }
}
