//! Streams over entry data.

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::options::FileAccess;
use crate::block::BlockId;
use crate::manager::BlockManager;
use crate::stream::ArchiveStream;
use crate::{Error, Result};

/// How [`ZipEntry::get_stream`](super::ZipEntry::get_stream) positions and
/// prepares the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Truncate the entry and start writing at the beginning.
    Create,
    /// Start at the beginning of the existing data.
    #[default]
    Open,
    /// Like `Open`; the entry always exists once it can be asked for.
    OpenOrCreate,
    /// Start at the end of the existing data.
    Append,
}

/// Read/write/seek access to the uncompressed data of one entry.
///
/// Changes reach the archive's stream when the archive is flushed or
/// closed. In streaming archives the stream only accepts sequential
/// writes and cannot seek.
pub struct EntryStream<'a, S> {
    manager: &'a mut BlockManager<S>,
    block: BlockId,
    position: u64,
    access: FileAccess,
}

impl<S> std::fmt::Debug for EntryStream<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStream")
            .field("position", &self.position)
            .field("access", &self.access)
            .finish()
    }
}

impl<'a, S: ArchiveStream> EntryStream<'a, S> {
    pub(crate) fn new(
        manager: &'a mut BlockManager<S>,
        block: BlockId,
        position: u64,
        access: FileAccess,
    ) -> Self {
        Self {
            manager,
            block,
            position,
            access,
        }
    }

    /// Returns the current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the uncompressed length of the entry.
    pub fn len(&self) -> Result<u64> {
        self.manager.entry_len(self.block)
    }

    /// Returns true if the entry holds no data.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncates or zero-extends the entry. The position is left alone.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        if !self.access.can_write() {
            return Err(Error::AccessDenied {
                operation: "set_len",
            });
        }
        self.manager.set_entry_len(self.block, len)
    }

    /// Returns the number of uncompressed bytes the CRC tracker of this
    /// entry has hashed so far.
    pub fn checksummed_bytes(&self) -> Result<u64> {
        self.manager.entry_hashed_bytes(self.block)
    }
}

impl<S: ArchiveStream> Read for EntryStream<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.access.can_read() {
            return Err(Error::AccessDenied { operation: "read" }.into());
        }
        let n = self.manager.read_entry(self.block, self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: ArchiveStream> Write for EntryStream<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.access.can_write() {
            return Err(Error::AccessDenied { operation: "write" }.into());
        }
        self.manager.write_entry(self.block, self.position, buf)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    /// Saves the archive; in streaming mode, hands buffered data to the sink.
    fn flush(&mut self) -> io::Result<()> {
        if !self.access.can_write() {
            return Ok(());
        }
        self.manager.flush()?;
        Ok(())
    }
}

impl<S: ArchiveStream> Seek for EntryStream<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        if self.manager.is_streaming() && target != self.position {
            return Err(Error::invalid_usage("entries of a streaming archive cannot seek").into());
        }
        self.position = target;
        Ok(target)
    }
}
