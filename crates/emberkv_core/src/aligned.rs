//! Write-alignment buffering.
//!
//! Flash partitions reject writes whose address or length is not a
//! multiple of the device write alignment. [`AlignedWriter`] absorbs
//! variably-sized writes and only hands its sink alignment-sized chunks,
//! zero-padding the tail on flush.

use crate::error::{KvsError, KvsResult};
use emberkv_flash::FlashPartition;

/// Default buffer size target for [`AlignedWriter::new`], in bytes.
///
/// The actual capacity is the largest multiple of the alignment that fits,
/// or one alignment unit if the alignment is larger.
const DEFAULT_BUFFER_BYTES: usize = 256;

/// Rounds `value` up to the next multiple of `alignment`.
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    value.div_ceil(alignment) * alignment
}

/// A byte sink accepting alignment-sized chunks.
///
/// Returns the number of bytes accepted.
pub trait Output {
    /// Writes `data` to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the write.
    fn write(&mut self, data: &[u8]) -> KvsResult<usize>;
}

/// An incremental byte source for pull-based writes.
pub trait Input {
    /// Reads up to `out.len()` bytes, returning the count read.
    ///
    /// Returns 0 only when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails.
    fn read(&mut self, out: &mut [u8]) -> KvsResult<usize>;
}

/// [`Output`] over a flash partition, writing at a running address.
pub struct PartitionWriter<'a> {
    partition: &'a mut dyn FlashPartition,
    address: u64,
}

impl<'a> PartitionWriter<'a> {
    /// Creates a writer starting at `address`.
    pub fn new(partition: &'a mut dyn FlashPartition, address: u64) -> Self {
        Self { partition, address }
    }

    /// Returns the address the next write will land at.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }
}

impl Output for PartitionWriter<'_> {
    fn write(&mut self, data: &[u8]) -> KvsResult<usize> {
        self.partition.write(self.address, data)?;
        self.address += data.len() as u64;
        Ok(data.len())
    }
}

/// [`Input`] over a flash partition region.
pub struct PartitionReader<'a> {
    partition: &'a dyn FlashPartition,
    address: u64,
    remaining: usize,
}

impl<'a> PartitionReader<'a> {
    /// Creates a reader over `len` bytes starting at `address`.
    pub fn new(partition: &'a dyn FlashPartition, address: u64, len: usize) -> Self {
        Self {
            partition,
            address,
            remaining: len,
        }
    }
}

impl Input for PartitionReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> KvsResult<usize> {
        let n = self.remaining.min(out.len());
        if n == 0 {
            return Ok(0);
        }
        self.partition.read(self.address, &mut out[..n])?;
        self.address += n as u64;
        self.remaining -= n;
        Ok(n)
    }
}

/// [`Input`] over an in-memory byte slice.
pub struct SliceReader<'a> {
    data: &'a [u8],
}

impl<'a> SliceReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Input for SliceReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> KvsResult<usize> {
        let n = self.data.len().min(out.len());
        out[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Buffers writes to the flash write-alignment boundary.
///
/// Full alignment-multiple chunks are forwarded to the sink as the buffer
/// fills; [`flush`](Self::flush) zero-pads the tail to the next boundary.
/// Dropping the writer flushes implicitly.
///
/// # Failure semantics
///
/// The first sink failure is returned to the caller and latches: all
/// subsequent `write`/`flush` calls fail without touching the sink, and
/// the attempted-byte accounting is preserved. On flash, a failed write
/// still consumes the write opportunity for that region, so attempted
/// bytes are counted whether or not the sink accepted them.
pub struct AlignedWriter<'a> {
    output: &'a mut dyn Output,
    alignment: usize,
    buffer: Vec<u8>,
    capacity: usize,
    bytes_attempted: usize,
    poisoned: bool,
}

impl<'a> AlignedWriter<'a> {
    /// Creates a writer with a default buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is zero.
    pub fn new(output: &'a mut dyn Output, alignment: usize) -> Self {
        assert!(alignment > 0, "alignment must be nonzero");
        let capacity = if alignment >= DEFAULT_BUFFER_BYTES {
            alignment
        } else {
            (DEFAULT_BUFFER_BYTES / alignment) * alignment
        };
        Self {
            output,
            alignment,
            buffer: Vec::with_capacity(capacity),
            capacity,
            bytes_attempted: 0,
            poisoned: false,
        }
    }

    /// Creates a writer with an explicit buffer capacity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `alignment` is zero or `capacity` is
    /// zero or not a multiple of `alignment`.
    pub fn with_capacity(
        output: &'a mut dyn Output,
        alignment: usize,
        capacity: usize,
    ) -> KvsResult<Self> {
        if alignment == 0 || capacity == 0 || capacity % alignment != 0 {
            return Err(KvsError::invalid_argument(format!(
                "buffer capacity {capacity} is not a nonzero multiple of alignment {alignment}"
            )));
        }
        Ok(Self {
            output,
            alignment,
            buffer: Vec::with_capacity(capacity),
            capacity,
            bytes_attempted: 0,
            poisoned: false,
        })
    }

    /// Returns the configured alignment.
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Returns the cumulative bytes for which sink writes were attempted.
    #[must_use]
    pub fn bytes_attempted(&self) -> usize {
        self.bytes_attempted
    }

    /// Appends `data`, forwarding full aligned chunks to the sink.
    ///
    /// Returns the count of bytes for which a sink write was attempted
    /// during this call.
    ///
    /// # Errors
    ///
    /// Returns the sink error on failure, or `FailedPrecondition` if an
    /// earlier sink write already failed.
    pub fn write(&mut self, data: &[u8]) -> KvsResult<usize> {
        self.check_poisoned()?;

        let mut attempted = 0;
        let mut remaining = data;
        while !remaining.is_empty() {
            let space = self.capacity - self.buffer.len();
            let take = space.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];

            if self.buffer.len() == self.capacity {
                attempted += self.drain_buffer()?;
            }
        }
        Ok(attempted)
    }

    /// Pull-based variant: reads `len` bytes from `source` and writes them.
    ///
    /// Lets an entry be written without materializing its whole value in
    /// memory. Returns the count of bytes for which a sink write was
    /// attempted during this call.
    ///
    /// # Errors
    ///
    /// Returns `DataLoss` if the source ends before `len` bytes, or the
    /// sink error on failure.
    pub fn write_from(&mut self, source: &mut dyn Input, len: usize) -> KvsResult<usize> {
        let mut attempted = 0;
        let mut remaining = len;
        let mut chunk = [0u8; 128];
        while remaining > 0 {
            let want = remaining.min(chunk.len());
            let got = source.read(&mut chunk[..want])?;
            if got == 0 {
                return Err(KvsError::data_loss(format!(
                    "byte source ended with {remaining} bytes outstanding"
                )));
            }
            attempted += self.write(&chunk[..got])?;
            remaining -= got;
        }
        Ok(attempted)
    }

    /// Zero-pads the buffered tail to the next alignment boundary and
    /// forces the final sink write.
    ///
    /// Idempotent once nothing remains buffered. Returns the cumulative
    /// bytes attempted over the writer's life.
    ///
    /// # Errors
    ///
    /// Returns the sink error on failure, or `FailedPrecondition` if an
    /// earlier sink write already failed.
    pub fn flush(&mut self) -> KvsResult<usize> {
        self.check_poisoned()?;
        if !self.buffer.is_empty() {
            let padded = align_up(self.buffer.len(), self.alignment);
            self.buffer.resize(padded, 0);
            self.drain_buffer()?;
        }
        Ok(self.bytes_attempted)
    }

    fn check_poisoned(&self) -> KvsResult<()> {
        if self.poisoned {
            return Err(KvsError::failed_precondition(format!(
                "aligned writer failed after attempting {} bytes",
                self.bytes_attempted
            )));
        }
        Ok(())
    }

    fn drain_buffer(&mut self) -> KvsResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let len = self.buffer.len();
        self.bytes_attempted += len;

        let chunk = std::mem::take(&mut self.buffer);
        let result = self.output.write(&chunk);
        self.buffer = chunk;
        self.buffer.clear();

        match result {
            Ok(_) => Ok(len),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }
}

impl Drop for AlignedWriter<'_> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
