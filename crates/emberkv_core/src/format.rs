//! Entry formats and the on-flash header codec.
//!
//! ## Wire Format
//!
//! The header is exactly 16 bytes, little-endian, with no implicit
//! padding - this is a wire contract, not an implementation detail:
//!
//! ```text
//! ┌───────────┬──────────────┬───────────┬─────────┬────────────┬──────────┐
//! │ magic (4) │ checksum (4) │ align (1) │ klen (1)│ vsize (2)  │ txid (4) │
//! └───────────┴──────────────┴───────────┴─────────┴────────────┴──────────┘
//! ```
//!
//! followed by the key bytes, the value bytes, and zero padding up to the
//! entry alignment. `vsize == 0xFFFF` marks a tombstone.

use crate::checksum::ChecksumKind;
use crate::error::{KvsError, KvsResult};

/// Size of the fixed entry header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Reserved `value_size` sentinel marking a deleted key.
pub const TOMBSTONE_VALUE_SIZE: u16 = 0xFFFF;

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 64;

/// Magic for the default entry format ("EKV1", little-endian).
pub const DEFAULT_MAGIC: u32 = u32::from_le_bytes(*b"EKV1");

/// One recognized on-flash entry format.
///
/// A store may recognize several formats simultaneously to support format
/// migration; the magic disambiguates which checksum discipline applies to
/// a given record. `checksum: None` disables checksumming entirely - such
/// entries must store a checksum field of exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFormat {
    /// Magic value written in the entry header.
    pub magic: u32,
    /// Checksum algorithm for entries in this format.
    pub checksum: Option<ChecksumKind>,
}

impl EntryFormat {
    /// Creates a format with the given magic and checksum discipline.
    #[must_use]
    pub const fn new(magic: u32, checksum: Option<ChecksumKind>) -> Self {
        Self { magic, checksum }
    }
}

impl Default for EntryFormat {
    fn default() -> Self {
        Self {
            magic: DEFAULT_MAGIC,
            checksum: Some(ChecksumKind::Crc16),
        }
    }
}

/// The fixed-size entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Format magic.
    pub magic: u32,
    /// Checksum over the whole entry (header with this field zeroed, key,
    /// value, padding), packed little-endian into 4 bytes.
    pub checksum: u32,
    /// Entry alignment in (units + 1) * 16 bytes.
    pub alignment_units: u8,
    /// Key length in bytes.
    pub key_length: u8,
    /// Value size in bytes, or [`TOMBSTONE_VALUE_SIZE`].
    pub value_size: u16,
    /// Monotonically increasing transaction id.
    pub transaction_id: u32,
}

impl EntryHeader {
    /// Encodes the header into its 16-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        out[8] = self.alignment_units;
        out[9] = self.key_length;
        out[10..12].copy_from_slice(&self.value_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.transaction_id.to_le_bytes());
        out
    }

    /// Decodes a header from its wire form.
    ///
    /// # Errors
    ///
    /// Returns `DataLoss` if `bytes` is shorter than [`HEADER_SIZE`].
    pub fn decode(bytes: &[u8]) -> KvsResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(KvsError::data_loss(format!(
                "entry header truncated: {} of {HEADER_SIZE} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            checksum: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            alignment_units: bytes[8],
            key_length: bytes[9],
            value_size: u16::from_le_bytes([bytes[10], bytes[11]]),
            transaction_id: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }

    /// Returns the entry alignment in bytes.
    #[must_use]
    pub fn alignment_bytes(&self) -> usize {
        (usize::from(self.alignment_units) + 1) * 16
    }

    /// Returns whether this header marks a deleted key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value_size == TOMBSTONE_VALUE_SIZE
    }

    /// Returns the logical value size in bytes (0 for tombstones).
    #[must_use]
    pub fn value_size_bytes(&self) -> usize {
        if self.is_tombstone() {
            0
        } else {
            usize::from(self.value_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_header() -> EntryHeader {
        EntryHeader {
            magic: DEFAULT_MAGIC,
            checksum: 0xDEAD_BEEF,
            alignment_units: 1,
            key_length: 5,
            value_size: 300,
            transaction_id: 42,
        }
    }

    #[test]
    fn header_is_sixteen_bytes() {
        assert_eq!(sample_header().encode().len(), HEADER_SIZE);
    }

    #[test]
    fn header_wire_layout() {
        let raw = sample_header().encode();
        assert_eq!(&raw[0..4], b"EKV1");
        assert_eq!(raw[4..8], 0xDEAD_BEEF_u32.to_le_bytes());
        assert_eq!(raw[8], 1);
        assert_eq!(raw[9], 5);
        assert_eq!(raw[10..12], 300_u16.to_le_bytes());
        assert_eq!(raw[12..16], 42_u32.to_le_bytes());
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let decoded = EntryHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn decode_truncated_is_data_loss() {
        let raw = sample_header().encode();
        assert!(matches!(
            EntryHeader::decode(&raw[..12]),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn alignment_units_scale_by_sixteen() {
        let mut header = sample_header();
        header.alignment_units = 0;
        assert_eq!(header.alignment_bytes(), 16);
        header.alignment_units = 3;
        assert_eq!(header.alignment_bytes(), 64);
        header.alignment_units = 255;
        assert_eq!(header.alignment_bytes(), 4096);
    }

    #[test]
    fn tombstone_sentinel() {
        let mut header = sample_header();
        assert!(!header.is_tombstone());
        assert_eq!(header.value_size_bytes(), 300);

        header.value_size = TOMBSTONE_VALUE_SIZE;
        assert!(header.is_tombstone());
        assert_eq!(header.value_size_bytes(), 0);
    }

    proptest! {
        #[test]
        fn header_roundtrip_arbitrary(
            magic in any::<u32>(),
            checksum in any::<u32>(),
            alignment_units in any::<u8>(),
            key_length in any::<u8>(),
            value_size in any::<u16>(),
            transaction_id in any::<u32>(),
        ) {
            let header = EntryHeader {
                magic,
                checksum,
                alignment_units,
                key_length,
                value_size,
                transaction_id,
            };
            prop_assert_eq!(EntryHeader::decode(&header.encode()).unwrap(), header);
        }
    }
}
