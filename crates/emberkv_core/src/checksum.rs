//! Pluggable entry checksum algorithms.
//!
//! Every entry read and write folds the entry bytes through a
//! [`ChecksumAlgorithm`]. The algorithm is selected per entry format via
//! [`ChecksumKind`] at store construction time, so a store can recognize
//! old entries under one algorithm while writing new entries under
//! another.

use crate::error::{KvsError, KvsResult};

/// Incremental checksum over a sequence of byte ranges.
///
/// # Contract
///
/// - `reset` restores the initial state
/// - `update` folds bytes into the running state; calls are
///   order-dependent and may be split arbitrarily
/// - `finish` finalizes and returns the state bytes; `update` must not be
///   called again until `reset`
/// - `verify` compares a candidate against the finished state
pub trait ChecksumAlgorithm {
    /// Returns the size of the finished state in bytes.
    fn size_bytes(&self) -> usize;

    /// Restores the initial state.
    fn reset(&mut self);

    /// Folds `data` into the running state.
    fn update(&mut self, data: &[u8]);

    /// Finalizes the state and returns a view of it.
    fn finish(&mut self) -> &[u8];

    /// Finalizes and compares `candidate` against the state.
    ///
    /// Candidate bytes beyond `size_bytes()` are ignored, so a wider
    /// storage field can be passed directly.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `candidate` is shorter than `size_bytes()`
    /// - `DataLoss` if the candidate does not match
    fn verify(&mut self, candidate: &[u8]) -> KvsResult<()> {
        if candidate.len() < self.size_bytes() {
            return Err(KvsError::invalid_argument(format!(
                "checksum candidate is {} bytes, algorithm needs {}",
                candidate.len(),
                self.size_bytes()
            )));
        }
        let state = self.finish();
        if candidate[..state.len()] == *state {
            Ok(())
        } else {
            Err(KvsError::data_loss("checksum mismatch"))
        }
    }
}

/// Checksum algorithm selector, chosen per entry format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// CRC-16/CCITT-FALSE.
    Crc16,
    /// Wrapping 32-bit byte sum.
    Sum32,
    /// No-op: zero-size state, always verifies.
    Ignore,
}

impl ChecksumKind {
    /// Creates a fresh algorithm instance in its initial state.
    #[must_use]
    pub fn algorithm(self) -> Box<dyn ChecksumAlgorithm> {
        match self {
            Self::Crc16 => Box::new(Crc16::new()),
            Self::Sum32 => Box::new(Sum32::new()),
            Self::Ignore => Box::new(IgnoreChecksum),
        }
    }
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
#[derive(Debug, Clone)]
pub struct Crc16 {
    crc: u16,
    state: [u8; 2],
    finished: bool,
}

const CRC16_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

impl Crc16 {
    /// Creates a new CRC-16 in its initial state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            crc: 0xFFFF,
            state: [0; 2],
            finished: false,
        }
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumAlgorithm for Crc16 {
    fn size_bytes(&self) -> usize {
        2
    }

    fn reset(&mut self) {
        self.crc = 0xFFFF;
        self.finished = false;
    }

    fn update(&mut self, data: &[u8]) {
        debug_assert!(!self.finished, "update after finish without reset");
        for &byte in data {
            let index = ((self.crc >> 8) ^ u16::from(byte)) & 0xFF;
            self.crc = (self.crc << 8) ^ CRC16_TABLE[index as usize];
        }
    }

    fn finish(&mut self) -> &[u8] {
        self.state = self.crc.to_le_bytes();
        self.finished = true;
        &self.state
    }
}

/// Wrapping 32-bit sum of all bytes.
#[derive(Debug, Clone, Default)]
pub struct Sum32 {
    sum: u32,
    state: [u8; 4],
    finished: bool,
}

impl Sum32 {
    /// Creates a new sum checksum in its initial state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChecksumAlgorithm for Sum32 {
    fn size_bytes(&self) -> usize {
        4
    }

    fn reset(&mut self) {
        self.sum = 0;
        self.finished = false;
    }

    fn update(&mut self, data: &[u8]) {
        debug_assert!(!self.finished, "update after finish without reset");
        for &byte in data {
            self.sum = self.sum.wrapping_add(u32::from(byte));
        }
    }

    fn finish(&mut self) -> &[u8] {
        self.state = self.sum.to_le_bytes();
        self.finished = true;
        &self.state
    }
}

/// No-op checksum with a zero-size state.
///
/// Used to disable integrity checking for selected entry formats; `verify`
/// always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreChecksum;

impl ChecksumAlgorithm for IgnoreChecksum {
    fn size_bytes(&self) -> usize {
        0
    }

    fn reset(&mut self) {}

    fn update(&mut self, _data: &[u8]) {}

    fn finish(&mut self) -> &[u8] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_known_value() {
        // CRC-16/CCITT-FALSE check value: "123456789" -> 0x29B1
        let mut crc = Crc16::new();
        crc.update(b"123456789");
        assert_eq!(crc.finish(), 0x29B1_u16.to_le_bytes());
    }

    #[test]
    fn crc16_empty() {
        let mut crc = Crc16::new();
        assert_eq!(crc.finish(), 0xFFFF_u16.to_le_bytes());
    }

    #[test]
    fn crc16_split_updates_match_single() {
        let mut whole = Crc16::new();
        whole.update(b"hello flash world");
        let mut split = Crc16::new();
        split.update(b"hello ");
        split.update(b"flash");
        split.update(b"");
        split.update(b" world");
        assert_eq!(whole.finish(), split.finish());
    }

    #[test]
    fn crc16_reset_restores_initial_state() {
        let mut crc = Crc16::new();
        crc.update(b"garbage");
        crc.finish();
        crc.reset();
        crc.update(b"123456789");
        assert_eq!(crc.finish(), 0x29B1_u16.to_le_bytes());
    }

    #[test]
    fn crc16_verify_success_and_mismatch() {
        let mut crc = Crc16::new();
        crc.update(b"123456789");
        assert!(crc.verify(&[0xB1, 0x29]).is_ok());

        let mut crc = Crc16::new();
        crc.update(b"123456789");
        assert!(matches!(
            crc.verify(&[0xB1, 0x2A]),
            Err(KvsError::DataLoss { .. })
        ));
    }

    #[test]
    fn crc16_verify_ignores_trailing_bytes() {
        // A 4-byte storage field with the CRC in the low bytes verifies.
        let mut crc = Crc16::new();
        crc.update(b"123456789");
        assert!(crc.verify(&[0xB1, 0x29, 0xEE, 0xEE]).is_ok());
    }

    #[test]
    fn crc16_verify_short_candidate_is_invalid_argument() {
        let mut crc = Crc16::new();
        crc.update(b"123456789");
        assert!(matches!(
            crc.verify(&[0xB1]),
            Err(KvsError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn sum32_accumulates() {
        let mut sum = Sum32::new();
        sum.update(&[1, 2, 3]);
        sum.update(&[250]);
        assert_eq!(sum.finish(), 256_u32.to_le_bytes());
    }

    #[test]
    fn sum32_verify() {
        let mut sum = Sum32::new();
        sum.update(&[10, 20]);
        assert!(sum.verify(&30_u32.to_le_bytes()).is_ok());
    }

    #[test]
    fn ignore_always_verifies() {
        let mut ignore = IgnoreChecksum;
        ignore.update(b"anything at all");
        assert!(ignore.verify(&[]).is_ok());
        assert!(ignore.verify(&[1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn kind_constructs_matching_algorithm() {
        assert_eq!(ChecksumKind::Crc16.algorithm().size_bytes(), 2);
        assert_eq!(ChecksumKind::Sum32.algorithm().size_bytes(), 4);
        assert_eq!(ChecksumKind::Ignore.algorithm().size_bytes(), 0);
    }
}
