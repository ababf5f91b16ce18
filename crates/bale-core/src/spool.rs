//! Bounded-memory transfer buffers.
//!
//! A [`SpoolBuffer`] holds written bytes in memory up to a threshold and
//! spills to an unlinked temporary file beyond it, so peak memory stays
//! `O(threshold)` no matter how large the buffered object is. The spill file
//! is removed automatically when the buffer is dropped.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Bytes kept in memory before a spool buffer spills to disk.
pub const SPOOL_MEMORY_BYTES: usize = 16 * 1024 * 1024;

/// Chunk size for buffer-to-file and file-to-store copies.
pub const COPY_CHUNK_BYTES: usize = 256 * 1024;

enum SpoolState {
    Memory(Vec<u8>),
    Disk(File),
}

/// Write-then-drain buffer with a memory cap.
///
/// Records the first two bytes written so callers can run magic-number
/// checks without re-reading the content.
pub struct SpoolBuffer {
    state: SpoolState,
    threshold: usize,
    written: u64,
    head: [u8; 2],
    head_len: usize,
}

impl SpoolBuffer {
    /// Creates a spool buffer with the default 16 MiB memory threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(SPOOL_MEMORY_BYTES)
    }

    /// Creates a spool buffer with a custom memory threshold.
    #[must_use]
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            state: SpoolState::Memory(Vec::new()),
            threshold,
            written: 0,
            head: [0; 2],
            head_len: 0,
        }
    }

    /// Appends bytes, spilling to a temporary file once the threshold is
    /// crossed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if creating or writing the spill file fails.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        for (i, byte) in buf.iter().take(2 - self.head_len).enumerate() {
            self.head[self.head_len + i] = *byte;
        }
        self.head_len = (self.head_len + buf.len()).min(2);

        match &mut self.state {
            SpoolState::Memory(mem) => {
                if mem.len() + buf.len() > self.threshold {
                    // Unlinked on most platforms; removed on drop regardless.
                    let mut file = tempfile::tempfile()?;
                    file.write_all(mem)?;
                    file.write_all(buf)?;
                    self.state = SpoolState::Disk(file);
                } else {
                    mem.extend_from_slice(buf);
                }
            }
            SpoolState::Disk(file) => file.write_all(buf)?,
        }
        self.written += buf.len() as u64;
        Ok(())
    }

    /// Total bytes written so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.written
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Returns true if the buffer has spilled to disk.
    #[must_use]
    pub fn is_spilled(&self) -> bool {
        matches!(self.state, SpoolState::Disk(_))
    }

    /// The first two bytes written, if at least two bytes were written.
    #[must_use]
    pub fn magic(&self) -> Option<[u8; 2]> {
        (self.head_len == 2).then_some(self.head)
    }

    /// Rewinds and drains the full content into `writer` in fixed-size
    /// chunks, bounding per-write memory.
    ///
    /// Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading the spool or writing the target fails.
    pub fn copy_to<W: Write>(&mut self, writer: &mut W) -> io::Result<u64> {
        match &mut self.state {
            SpoolState::Memory(mem) => {
                for chunk in mem.chunks(COPY_CHUNK_BYTES) {
                    writer.write_all(chunk)?;
                }
                Ok(mem.len() as u64)
            }
            SpoolState::Disk(file) => {
                file.flush()?;
                file.seek(SeekFrom::Start(0))?;
                let mut buf = vec![0u8; COPY_CHUNK_BYTES];
                let mut copied = 0u64;
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    writer.write_all(&buf[..n])?;
                    copied += n as u64;
                }
                Ok(copied)
            }
        }
    }
}

impl Default for SpoolBuffer {
    fn default() -> Self {
        Self::new()
    }
}
