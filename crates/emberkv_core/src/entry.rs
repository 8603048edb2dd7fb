//! Entry codec: one serialized key-value record on flash.
//!
//! An [`Entry`] is a value-type handle over a record: the header plus the
//! flash address and format it was read with or will be written with. It
//! never owns flash content, only coordinates. Modification goes through
//! [`Entry::update`] + [`Entry::copy`], which land a fresh record at a new
//! address - flash-resident bytes are never rewritten in place.

use crate::aligned::{align_up, AlignedWriter, Input, PartitionReader, PartitionWriter, SliceReader};
use crate::checksum::ChecksumAlgorithm;
use crate::error::{KvsError, KvsResult};
use crate::format::{EntryFormat, EntryHeader, HEADER_SIZE, MAX_KEY_LENGTH, TOMBSTONE_VALUE_SIZE};
use emberkv_flash::FlashPartition;

/// Chunk size for streaming reads during checksum and copy passes.
const STREAM_CHUNK: usize = 128;

/// Packs the first `min(4, size_bytes)` finished state bytes into the
/// little-endian u32 stored in the header checksum field.
fn packed_checksum(algorithm: &mut dyn ChecksumAlgorithm) -> u32 {
    let state = algorithm.finish();
    let mut out = [0u8; 4];
    let n = state.len().min(4);
    out[..n].copy_from_slice(&state[..n]);
    u32::from_le_bytes(out)
}

/// In-memory handle for one on-flash key-value record.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    address: u64,
    header: EntryHeader,
    format: EntryFormat,
}

impl Entry {
    /// Returns the entry alignment for a partition write alignment: at
    /// least 16 bytes and a multiple of 16.
    #[must_use]
    pub fn required_alignment(partition_alignment: usize) -> usize {
        align_up(partition_alignment.max(16), 16)
    }

    /// Creates an entry for a live key-value record to be written at
    /// `address`.
    #[must_use]
    pub fn valid(
        address: u64,
        format: EntryFormat,
        alignment_bytes: usize,
        key_length: usize,
        value_size: usize,
        transaction_id: u32,
    ) -> Self {
        debug_assert!(value_size < usize::from(TOMBSTONE_VALUE_SIZE));
        Self::with_value_field(
            address,
            format,
            alignment_bytes,
            key_length,
            value_size as u16,
            transaction_id,
        )
    }

    /// Creates a tombstone entry to be written at `address`.
    #[must_use]
    pub fn tombstone(
        address: u64,
        format: EntryFormat,
        alignment_bytes: usize,
        key_length: usize,
        transaction_id: u32,
    ) -> Self {
        Self::with_value_field(
            address,
            format,
            alignment_bytes,
            key_length,
            TOMBSTONE_VALUE_SIZE,
            transaction_id,
        )
    }

    fn with_value_field(
        address: u64,
        format: EntryFormat,
        alignment_bytes: usize,
        key_length: usize,
        value_size: u16,
        transaction_id: u32,
    ) -> Self {
        debug_assert!(alignment_bytes >= 16 && alignment_bytes % 16 == 0);
        debug_assert!(alignment_bytes / 16 <= 256);
        debug_assert!(key_length >= 1 && key_length <= MAX_KEY_LENGTH);

        Self {
            address,
            header: EntryHeader {
                magic: format.magic,
                checksum: 0,
                alignment_units: (alignment_bytes / 16 - 1) as u8,
                key_length: key_length as u8,
                value_size,
                transaction_id,
            },
            format,
        }
    }

    /// Reads the entry header at `address`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the region reads as the erased pattern
    /// - `DataLoss` if the magic matches no recognized format or the
    ///   header is otherwise malformed
    pub fn read(
        partition: &dyn FlashPartition,
        address: u64,
        formats: &[EntryFormat],
    ) -> KvsResult<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        partition.read(address, &mut raw)?;

        if raw.iter().all(|&b| b == partition.erased_byte()) {
            return Err(KvsError::NotFound);
        }

        let header = EntryHeader::decode(&raw)?;
        let format = formats
            .iter()
            .find(|f| f.magic == header.magic)
            .copied()
            .ok_or_else(|| {
                KvsError::data_loss(format!(
                    "unrecognized entry magic {:#010x} at address {address}",
                    header.magic
                ))
            })?;

        if header.key_length == 0 || usize::from(header.key_length) > MAX_KEY_LENGTH {
            return Err(KvsError::data_loss(format!(
                "entry at address {address} has invalid key length {}",
                header.key_length
            )));
        }

        let entry = Self {
            address,
            header,
            format,
        };

        let sector_size = partition.sector_size_bytes() as u64;
        if address % sector_size + entry.size() as u64 > sector_size {
            return Err(KvsError::data_loss(format!(
                "entry at address {address} crosses its sector boundary"
            )));
        }

        Ok(entry)
    }

    /// Returns the flash address of this entry.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn transaction_id(&self) -> u32 {
        self.header.transaction_id
    }

    /// Returns the format this entry was read or built with.
    #[must_use]
    pub fn format(&self) -> EntryFormat {
        self.format
    }

    /// Returns whether this entry is a tombstone.
    #[must_use]
    pub fn deleted(&self) -> bool {
        self.header.is_tombstone()
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub fn key_length(&self) -> usize {
        usize::from(self.header.key_length)
    }

    /// Returns the logical value size in bytes (0 for tombstones).
    #[must_use]
    pub fn value_size(&self) -> usize {
        self.header.value_size_bytes()
    }

    /// Returns the total on-flash entry size including padding.
    #[must_use]
    pub fn size(&self) -> usize {
        align_up(
            HEADER_SIZE + self.key_length() + self.value_size(),
            self.header.alignment_bytes(),
        )
    }

    fn value_address(&self) -> u64 {
        self.address + (HEADER_SIZE + self.key_length()) as u64
    }

    /// Reads the key bytes from flash.
    ///
    /// # Errors
    ///
    /// Returns an error if the flash read fails.
    pub fn read_key(&self, partition: &dyn FlashPartition) -> KvsResult<Vec<u8>> {
        let mut key = vec![0u8; self.key_length()];
        partition.read(self.address + HEADER_SIZE as u64, &mut key)?;
        Ok(key)
    }

    /// Reads the full value bytes from flash.
    ///
    /// # Errors
    ///
    /// Returns an error if the flash read fails.
    pub fn read_value(&self, partition: &dyn FlashPartition) -> KvsResult<Vec<u8>> {
        let mut value = vec![0u8; self.value_size()];
        partition.read(self.value_address(), &mut value)?;
        Ok(value)
    }

    /// Reads `out.len()` value bytes starting at `offset`.
    ///
    /// The caller is responsible for bounds-checking against
    /// [`value_size`](Self::value_size).
    ///
    /// # Errors
    ///
    /// Returns an error if the flash read fails.
    pub fn read_value_at(
        &self,
        partition: &dyn FlashPartition,
        offset: usize,
        out: &mut [u8],
    ) -> KvsResult<()> {
        debug_assert!(offset + out.len() <= self.value_size());
        partition.read(self.value_address() + offset as u64, out)?;
        Ok(())
    }

    /// Computes the checksum over the logical entry byte sequence:
    /// header with a zeroed checksum field, key, value, and padding.
    ///
    /// Padding is always treated as zero here, regardless of what is
    /// physically on flash, so the same value/key bytes produce a
    /// well-defined checksum under any alignment.
    fn calculate_checksum(&self, key: &[u8], value: &[u8]) -> u32 {
        let Some(kind) = self.format.checksum else {
            return 0;
        };
        let mut algorithm = kind.algorithm();

        let mut header_bytes = self.header.encode();
        header_bytes[4..8].fill(0);
        algorithm.update(&header_bytes);
        algorithm.update(key);
        algorithm.update(value);

        const ZEROS: [u8; STREAM_CHUNK] = [0; STREAM_CHUNK];
        let mut padding = self.size() - HEADER_SIZE - key.len() - value.len();
        while padding > 0 {
            let n = padding.min(ZEROS.len());
            algorithm.update(&ZEROS[..n]);
            padding -= n;
        }

        packed_checksum(algorithm.as_mut())
    }

    /// Verifies the stored checksum against in-memory key and value bytes
    /// (padding treated as zero).
    ///
    /// # Errors
    ///
    /// Returns `DataLoss` on mismatch.
    pub fn verify_checksum(&self, key: &[u8], value: &[u8]) -> KvsResult<()> {
        let computed = self.calculate_checksum(key, value);
        if computed == self.header.checksum {
            Ok(())
        } else {
            Err(KvsError::data_loss(format!(
                "entry at address {} checksum mismatch: stored {:#010x}, computed {computed:#010x}",
                self.address, self.header.checksum
            )))
        }
    }

    /// Verifies the stored checksum against the physical entry bytes on
    /// flash, padding included.
    ///
    /// # Errors
    ///
    /// Returns `DataLoss` on mismatch, or if a checksum-free format
    /// stored a nonzero checksum field.
    pub fn verify_checksum_in_flash(&self, partition: &dyn FlashPartition) -> KvsResult<()> {
        let Some(kind) = self.format.checksum else {
            if self.header.checksum == 0 {
                return Ok(());
            }
            return Err(KvsError::data_loss(format!(
                "entry at address {} stores checksum {:#010x} under a checksum-free format",
                self.address, self.header.checksum
            )));
        };

        let mut algorithm = kind.algorithm();

        let mut header_bytes = [0u8; HEADER_SIZE];
        partition.read(self.address, &mut header_bytes)?;
        header_bytes[4..8].fill(0);
        algorithm.update(&header_bytes);

        let mut reader = PartitionReader::new(
            partition,
            self.address + HEADER_SIZE as u64,
            self.size() - HEADER_SIZE,
        );
        let mut chunk = [0u8; STREAM_CHUNK];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            algorithm.update(&chunk[..n]);
        }

        let computed = packed_checksum(algorithm.as_mut());
        if computed == self.header.checksum {
            Ok(())
        } else {
            Err(KvsError::data_loss(format!(
                "entry at address {} checksum mismatch: stored {:#010x}, computed {computed:#010x}",
                self.address, self.header.checksum
            )))
        }
    }

    /// Serializes the entry (header, key, value, padding) to flash at its
    /// address, computing the checksum over the same logical byte sequence
    /// a reader will reconstruct.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if a flash write fails; the attempted byte count
    /// inside the aligned writer is preserved for the caller's sector
    /// accounting.
    pub fn write(
        &mut self,
        partition: &mut dyn FlashPartition,
        key: &[u8],
        value: &[u8],
    ) -> KvsResult<usize> {
        debug_assert_eq!(key.len(), self.key_length());
        debug_assert_eq!(value.len(), self.value_size());

        self.header.checksum = self.calculate_checksum(key, value);

        let mut sink = PartitionWriter::new(partition, self.address);
        let mut writer = AlignedWriter::new(&mut sink, self.header.alignment_bytes());
        writer.write(&self.header.encode())?;
        writer.write(key)?;
        let mut source = SliceReader::new(value);
        writer.write_from(&mut source, value.len())?;
        writer.flush()
    }

    /// Produces a new in-memory entry for the same record under a
    /// different format and transaction id, to be landed via
    /// [`copy`](Self::copy).
    ///
    /// The returned entry still points at the original address; the
    /// flash-resident record is untouched.
    #[must_use]
    pub fn update(&self, new_format: EntryFormat, new_transaction_id: u32) -> Self {
        let mut header = self.header;
        header.magic = new_format.magic;
        header.transaction_id = new_transaction_id;
        header.checksum = 0;
        Self {
            address: self.address,
            header,
            format: new_format,
        }
    }

    /// Re-reads key and value from the original address using the current
    /// in-memory header (which may differ from flash after
    /// [`update`](Self::update)) and writes a full new entry at
    /// `new_address`, recomputing the checksum for the new layout.
    ///
    /// The value is streamed through a bounded buffer, never fully
    /// materialized. Returns the relocated entry and the bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if any flash access fails.
    pub fn copy(
        &self,
        partition: &mut dyn FlashPartition,
        new_address: u64,
    ) -> KvsResult<(Self, usize)> {
        let key = self.read_key(&*partition)?;
        let value_len = self.value_size();

        let mut moved = Self {
            address: new_address,
            header: self.header,
            format: self.format,
        };
        moved.header.checksum = 0;

        // Checksum pass over the new layout, streaming the value from the
        // old location.
        if let Some(kind) = self.format.checksum {
            let mut algorithm = kind.algorithm();
            let mut header_bytes = moved.header.encode();
            header_bytes[4..8].fill(0);
            algorithm.update(&header_bytes);
            algorithm.update(&key);

            let mut reader = PartitionReader::new(&*partition, self.value_address(), value_len);
            let mut chunk = [0u8; STREAM_CHUNK];
            loop {
                let n = reader.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                algorithm.update(&chunk[..n]);
            }

            const ZEROS: [u8; STREAM_CHUNK] = [0; STREAM_CHUNK];
            let mut padding = moved.size() - HEADER_SIZE - key.len() - value_len;
            while padding > 0 {
                let n = padding.min(ZEROS.len());
                algorithm.update(&ZEROS[..n]);
                padding -= n;
            }

            moved.header.checksum = packed_checksum(algorithm.as_mut());
        }

        // Write pass: emit the new entry in aligned windows, pulling value
        // bytes from the old location as each window is assembled.
        let alignment = moved.header.alignment_bytes();
        let window = if alignment >= 256 {
            alignment
        } else {
            (256 / alignment) * alignment
        };
        let total = moved.size();
        let head: Vec<u8> = moved
            .header
            .encode()
            .iter()
            .copied()
            .chain(key.iter().copied())
            .collect();
        let value_start = head.len();
        let value_end = value_start + value_len;

        let mut buf = vec![0u8; window];
        let mut logical = 0usize;
        while logical < total {
            let n = window.min(total - logical);
            buf[..n].fill(0);
            let end = logical + n;

            if logical < head.len() {
                let m = head.len().min(end);
                buf[..m - logical].copy_from_slice(&head[logical..m]);
            }

            let overlap_start = logical.max(value_start);
            let overlap_end = end.min(value_end);
            if overlap_start < overlap_end {
                let flash_offset = self.value_address() + (overlap_start - value_start) as u64;
                partition.read(
                    flash_offset,
                    &mut buf[overlap_start - logical..overlap_end - logical],
                )?;
            }

            partition.write(new_address + logical as u64, &buf[..n])?;
            logical = end;
        }

        Ok((moved, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::format::DEFAULT_MAGIC;
    use emberkv_flash::MemoryFlash;

    const FORMATS: [EntryFormat; 2] = [
        EntryFormat::new(DEFAULT_MAGIC, Some(ChecksumKind::Crc16)),
        EntryFormat::new(u32::from_le_bytes(*b"EKV0"), Some(ChecksumKind::Sum32)),
    ];

    fn flash() -> MemoryFlash {
        MemoryFlash::new(4, 512, 16)
    }

    fn write_sample(flash: &mut MemoryFlash, address: u64, key: &[u8], value: &[u8]) -> Entry {
        let mut entry = Entry::valid(address, FORMATS[0], 16, key.len(), value.len(), 7);
        let written = entry.write(flash, key, value).unwrap();
        assert_eq!(written, entry.size());
        entry
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut flash = flash();
        let written = write_sample(&mut flash, 0, b"kettle", b"on the boil");

        let entry = Entry::read(&flash, 0, &FORMATS).unwrap();
        assert_eq!(entry.transaction_id(), 7);
        assert_eq!(entry.key_length(), 6);
        assert_eq!(entry.value_size(), 11);
        assert_eq!(entry.size(), written.size());
        assert!(!entry.deleted());

        assert_eq!(entry.read_key(&flash).unwrap(), b"kettle");
        assert_eq!(entry.read_value(&flash).unwrap(), b"on the boil");
        entry.verify_checksum_in_flash(&flash).unwrap();
    }

    #[test]
    fn size_is_aligned() {
        let entry = Entry::valid(0, FORMATS[0], 32, 3, 5, 1);
        // 16 + 3 + 5 = 24, rounded up to 32.
        assert_eq!(entry.size(), 32);

        let entry = Entry::valid(0, FORMATS[0], 16, 3, 13, 1);
        assert_eq!(entry.size(), 32);
    }

    #[test]
    fn erased_region_is_not_found() {
        let flash = flash();
        assert!(matches!(
            Entry::read(&flash, 0, &FORMATS),
            Err(KvsError::NotFound)
        ));
    }

    #[test]
    fn unrecognized_magic_is_data_loss() {
        let mut flash = flash();
        write_sample(&mut flash, 0, b"key", b"value");

        let other = [EntryFormat::new(0x1234_5678, Some(ChecksumKind::Crc16))];
        assert!(matches!(
            Entry::read(&flash, 0, &other),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn tombstone_roundtrip() {
        let mut flash = flash();
        let mut entry = Entry::tombstone(0, FORMATS[0], 16, 4, 9);
        entry.write(&mut flash, b"gone", b"").unwrap();

        let read_back = Entry::read(&flash, 0, &FORMATS).unwrap();
        assert!(read_back.deleted());
        assert_eq!(read_back.value_size(), 0);
        assert_eq!(read_back.size(), 32); // 16 + 4 key bytes, aligned up
        read_back.verify_checksum_in_flash(&flash).unwrap();
    }

    #[test]
    fn payload_corruption_is_data_loss() {
        let mut flash = flash();
        write_sample(&mut flash, 0, b"key", b"value");
        let entry = Entry::read(&flash, 0, &FORMATS).unwrap();

        // Flip one value byte.
        flash.patch_byte(HEADER_SIZE as u64 + 3, 0x00);
        assert!(matches!(
            entry.verify_checksum_in_flash(&flash),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn padding_corruption_is_data_loss() {
        let mut flash = flash();
        let entry = write_sample(&mut flash, 0, b"key", b"v");
        // 16 + 3 + 1 = 20 payload bytes, entry is 32; flip a padding byte.
        assert_eq!(entry.size(), 32);
        flash.patch_byte(25, 0xA5);

        let read_back = Entry::read(&flash, 0, &FORMATS).unwrap();
        assert!(matches!(
            read_back.verify_checksum_in_flash(&flash),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn restoring_checksum_field_restores_verification() {
        let mut flash = flash();
        write_sample(&mut flash, 0, b"key", b"value");
        let good = flash.image();

        // Corrupt the checksum field, then restore it byte by byte.
        flash.patch_byte(4, good[4] ^ 0xFF);
        let entry = Entry::read(&flash, 0, &FORMATS).unwrap();
        assert!(entry.verify_checksum_in_flash(&flash).is_err());

        flash.patch_byte(4, good[4]);
        let entry = Entry::read(&flash, 0, &FORMATS).unwrap();
        entry.verify_checksum_in_flash(&flash).unwrap();
    }

    #[test]
    fn verify_checksum_against_memory_bytes() {
        let mut flash = flash();
        write_sample(&mut flash, 0, b"key", b"value");
        let entry = Entry::read(&flash, 0, &FORMATS).unwrap();

        entry.verify_checksum(b"key", b"value").unwrap();
        assert!(matches!(
            entry.verify_checksum(b"key", b"valuf"),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn checksum_free_format_requires_zero_field() {
        let format = [EntryFormat::new(DEFAULT_MAGIC, None)];
        let mut flash = flash();
        let mut entry = Entry::valid(0, format[0], 16, 3, 5, 1);
        entry.write(&mut flash, b"key", b"value").unwrap();

        let read_back = Entry::read(&flash, 0, &format).unwrap();
        read_back.verify_checksum_in_flash(&flash).unwrap();

        // A nonzero checksum field under a checksum-free format is
        // corruption, not a stale checksum.
        flash.patch_byte(4, 0x01);
        let read_back = Entry::read(&flash, 0, &format).unwrap();
        assert!(matches!(
            read_back.verify_checksum_in_flash(&flash),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn update_and_copy_migrates_format() {
        let mut flash = flash();
        let mut entry = Entry::valid(0, FORMATS[1], 16, 3, 5, 3);
        entry.write(&mut flash, b"key", b"value").unwrap();

        let original = Entry::read(&flash, 0, &FORMATS).unwrap();
        assert_eq!(original.format(), FORMATS[1]);

        let updated = original.update(FORMATS[0], 11);
        let (moved, written) = updated.copy(&mut flash, 512).unwrap();
        assert_eq!(written, moved.size());

        // The relocated record reads back under the primary format.
        let relocated = Entry::read(&flash, 512, &FORMATS).unwrap();
        assert_eq!(relocated.format(), FORMATS[0]);
        assert_eq!(relocated.transaction_id(), 11);
        assert_eq!(relocated.read_key(&flash).unwrap(), b"key");
        assert_eq!(relocated.read_value(&flash).unwrap(), b"value");
        relocated.verify_checksum_in_flash(&flash).unwrap();

        // The original record is untouched.
        let original = Entry::read(&flash, 0, &FORMATS).unwrap();
        assert_eq!(original.transaction_id(), 3);
        original.verify_checksum_in_flash(&flash).unwrap();
    }

    #[test]
    fn copy_preserves_large_values() {
        let mut flash = flash();
        let value: Vec<u8> = (0..400).map(|i| (i % 251) as u8).collect();
        let mut entry = Entry::valid(0, FORMATS[0], 16, 2, value.len(), 1);
        entry.write(&mut flash, b"kv", &value).unwrap();

        let original = Entry::read(&flash, 0, &FORMATS).unwrap();
        let (moved, _) = original.copy(&mut flash, 512).unwrap();

        let relocated = Entry::read(&flash, 512, &FORMATS).unwrap();
        assert_eq!(relocated.read_value(&flash).unwrap(), value);
        assert_eq!(moved.address(), 512);
        relocated.verify_checksum_in_flash(&flash).unwrap();
    }

    #[test]
    fn read_value_window() {
        let mut flash = flash();
        write_sample(&mut flash, 0, b"key", b"0123456789");
        let entry = Entry::read(&flash, 0, &FORMATS).unwrap();

        let mut out = [0u8; 4];
        entry.read_value_at(&flash, 3, &mut out).unwrap();
        assert_eq!(&out, b"3456");
    }

    #[test]
    fn entry_crossing_sector_boundary_is_data_loss() {
        let mut flash = flash();
        // Hand-craft a header whose size extends past the sector end.
        let header = EntryHeader {
            magic: DEFAULT_MAGIC,
            checksum: 0,
            alignment_units: 0,
            key_length: 4,
            value_size: 600,
            transaction_id: 1,
        };
        flash.write(480, &header.encode()).unwrap();

        assert!(matches!(
            Entry::read(&flash, 480, &FORMATS),
            Err(KvsError::DataLoss { .. })
        ));
    }
}
