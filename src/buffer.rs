//! Random-access byte buffer that spills to disk.
//!
//! [`SpillBuffer`] holds data that belongs to an archive but is not (yet)
//! at its final position in the archive stream: the unsaved tail of an
//! entry, a region cached before it gets overwritten during a save, or the
//! decompressed image of a deflated entry. Small buffers live in memory;
//! once a buffer grows past its threshold its contents move to an
//! anonymous temporary file that is removed when the buffer is dropped.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::READ_BUFFER_SIZE;

/// Default number of bytes kept in memory before spilling (1 MiB).
pub const DEFAULT_SPILL_THRESHOLD: u64 = 1024 * 1024;

#[derive(Debug)]
enum Storage {
    Memory(Vec<u8>),
    Disk(File),
}

/// A growable, random-access byte store backed by memory or a temp file.
#[derive(Debug)]
pub struct SpillBuffer {
    storage: Storage,
    len: u64,
    threshold: u64,
}

impl SpillBuffer {
    /// Creates an empty buffer that spills once it exceeds `threshold` bytes.
    pub fn new(threshold: u64) -> Self {
        Self {
            storage: Storage::Memory(Vec::new()),
            len: 0,
            threshold,
        }
    }

    /// Returns the length of the buffer.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the contents live in a temporary file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::Disk(_))
    }

    fn ensure_capacity(&mut self, len: u64) -> io::Result<()> {
        if len <= self.threshold {
            return Ok(());
        }
        if let Storage::Memory(data) = &self.storage {
            log::trace!("spilling {} byte buffer to a temporary file", data.len());
            let mut file = tempfile::tempfile()?;
            file.write_all(data)?;
            self.storage = Storage::Disk(file);
        }
        Ok(())
    }

    /// Reads up to `buf.len()` bytes starting at `position`.
    ///
    /// Returns the number of bytes read, which is zero at or past the end.
    pub fn read_at(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        if position >= self.len {
            return Ok(0);
        }
        let count = (self.len - position).min(buf.len() as u64) as usize;
        match &mut self.storage {
            Storage::Memory(data) => {
                let start = position as usize;
                buf[..count].copy_from_slice(&data[start..start + count]);
            }
            Storage::Disk(file) => {
                file.seek(SeekFrom::Start(position))?;
                file.read_exact(&mut buf[..count])?;
            }
        }
        Ok(count)
    }

    /// Writes `data` at `position`, zero-filling any gap past the end.
    pub fn write_at(&mut self, position: u64, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = position + data.len() as u64;
        self.ensure_capacity(end.max(self.len))?;
        match &mut self.storage {
            Storage::Memory(buffer) => {
                let start = position as usize;
                if buffer.len() < end as usize {
                    buffer.resize(end as usize, 0);
                }
                buffer[start..end as usize].copy_from_slice(data);
            }
            Storage::Disk(file) => {
                if position > self.len {
                    file.set_len(position)?;
                }
                file.seek(SeekFrom::Start(position))?;
                file.write_all(data)?;
            }
        }
        self.len = self.len.max(end);
        Ok(())
    }

    /// Appends `data` at the end.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_at(self.len, data)
    }

    /// Truncates or zero-extends the buffer.
    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.ensure_capacity(len)?;
        match &mut self.storage {
            Storage::Memory(buffer) => buffer.resize(len as usize, 0),
            Storage::Disk(file) => file.set_len(len)?,
        }
        self.len = len;
        Ok(())
    }

    /// Empties the buffer, releasing any temporary file.
    pub fn clear(&mut self) {
        self.storage = Storage::Memory(Vec::new());
        self.len = 0;
    }

    /// Copies `len` bytes starting at `position` into `w`.
    pub fn copy_range_to<W: Write + ?Sized>(
        &mut self,
        position: u64,
        len: u64,
        w: &mut W,
    ) -> io::Result<()> {
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        let mut done = 0u64;
        while done < len {
            let want = (len - done).min(chunk.len() as u64) as usize;
            let n = self.read_at(position + done, &mut chunk[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "buffer range exceeds buffer length",
                ));
            }
            w.write_all(&chunk[..n])?;
            done += n as u64;
        }
        Ok(())
    }

    /// Copies the whole buffer into `w`.
    pub fn copy_to<W: Write + ?Sized>(&mut self, w: &mut W) -> io::Result<()> {
        self.copy_range_to(0, self.len, w)
    }
}

impl Default for SpillBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SPILL_THRESHOLD)
    }
}
