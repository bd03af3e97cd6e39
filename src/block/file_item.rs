//! Entry data split between the archive stream and memory.
//!
//! A [`FileItemStream`] addresses the compressed bytes of one entry. The
//! first `persisted_size` bytes live in the archive stream at
//! `persisted_offset`; anything past them (appended, or rewritten after a
//! truncation) lives in a [`SpillBuffer`] suffix until the next save folds
//! it into the persisted region.
//!
//! While a save is in progress the persisted region may also carry a cached
//! prefix: bytes read ahead from the stream because an earlier block was
//! about to overwrite them. The cache always covers a prefix of the region,
//! since blocks are written in offset order and each write ends no earlier
//! than the previous one.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::buffer::SpillBuffer;
use crate::codec::CompressedData;
use crate::manager::move_data;
use crate::stream::ArchiveStream;
use crate::{READ_BUFFER_SIZE, Result};

/// A byte range of the archive stream, with its pre-save cache.
#[derive(Debug)]
pub(crate) struct PersistedRegion {
    offset: u64,
    size: u64,
    cache: SpillBuffer,
}

impl PersistedRegion {
    pub(crate) fn new(offset: u64, size: u64, spill_threshold: u64) -> Self {
        Self {
            offset,
            size,
            cache: SpillBuffer::new(spill_threshold),
        }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub(crate) fn cached_len(&self) -> u64 {
        self.cache.len()
    }

    /// Reads from the region; `position` is relative to the region start.
    pub(crate) fn read_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        if position >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let mut n = (self.size - position).min(buf.len() as u64) as usize;
        if position < self.cache.len() {
            n = n.min((self.cache.len() - position) as usize);
            return self.cache.read_at(position, &mut buf[..n]);
        }
        stream.seek(SeekFrom::Start(self.offset + position))?;
        stream.read_exact(&mut buf[..n])?;
        Ok(n)
    }

    /// Overwrites bytes inside the region in place.
    pub(crate) fn write_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        data: &[u8],
    ) -> io::Result<()> {
        debug_assert!(position + data.len() as u64 <= self.size);
        let cached = self.cache.len();
        let split = (cached.saturating_sub(position) as usize).min(data.len());
        if split > 0 {
            self.cache.write_at(position, &data[..split])?;
        }
        if split < data.len() {
            stream.seek(SeekFrom::Start(self.offset + position + split as u64))?;
            stream.write_all(&data[split..])?;
        }
        Ok(())
    }

    /// Shrinks the region.
    pub(crate) fn truncate(&mut self, size: u64) -> io::Result<()> {
        if size < self.size {
            self.size = size;
            if self.cache.len() > size {
                self.cache.set_len(size)?;
            }
        }
        Ok(())
    }

    /// Grows the region by `len` bytes that were just written after it.
    pub(crate) fn extend(&mut self, len: u64) {
        self.size += len;
    }

    /// Caches the not yet cached bytes of the region that a write ending at
    /// archive offset `write_end` would destroy.
    pub(crate) fn cache_before_write<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        write_offset: u64,
        write_end: u64,
    ) -> io::Result<()> {
        let cached_end = self.offset + self.cache.len();
        if write_end <= cached_end || write_offset >= self.end() {
            return Ok(());
        }
        let target = write_end.min(self.end());
        log::trace!(
            "caching [{:#x}, {:#x}) before it is overwritten",
            cached_end,
            target
        );

        stream.seek(SeekFrom::Start(cached_end))?;
        let mut remaining = target - cached_end;
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            stream.read_exact(&mut chunk[..n])?;
            self.cache.append(&chunk[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Moves the region to `new_offset`: the uncached part is relocated in
    /// the stream first, then the cached prefix is written out.
    pub(crate) fn relocate<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        new_offset: u64,
    ) -> Result<()> {
        let cached = self.cache.len();
        let uncached = self.size - cached;
        if uncached > 0 && new_offset != self.offset {
            move_data(stream, self.offset + cached, new_offset + cached, uncached)?;
        }
        if cached > 0 {
            stream.seek(SeekFrom::Start(new_offset))?;
            self.cache.copy_to(stream)?;
            self.cache.clear();
        }
        self.offset = new_offset;
        Ok(())
    }
}

/// The compressed bytes of one entry.
#[derive(Debug)]
pub(crate) struct FileItemStream {
    region: PersistedRegion,
    suffix: SpillBuffer,
    dirty: bool,
}

impl FileItemStream {
    /// Creates the data of a new entry whose data will start at `offset`.
    pub(crate) fn new_empty(offset: u64, spill_threshold: u64) -> Self {
        Self::persisted(offset, 0, spill_threshold)
    }

    /// Creates the data of an existing entry.
    pub(crate) fn persisted(offset: u64, size: u64, spill_threshold: u64) -> Self {
        Self {
            region: PersistedRegion::new(offset, size, spill_threshold),
            suffix: SpillBuffer::new(spill_threshold),
            dirty: false,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.region.size() + self.suffix.len()
    }

    pub(crate) fn persisted_offset(&self) -> u64 {
        self.region.offset()
    }

    pub(crate) fn persisted_size(&self) -> u64 {
        self.region.size()
    }

    pub(crate) fn pending_len(&self) -> u64 {
        self.suffix.len()
    }

    /// Returns true if the bytes differ from what the last save wrote.
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn read_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let persisted = self.region.size();
        if position < persisted {
            self.region.read_at(stream, position, buf)
        } else {
            self.suffix.read_at(position - persisted, buf)
        }
    }

    pub(crate) fn write_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        data: &[u8],
    ) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.dirty = true;
        let persisted = self.region.size();
        let mut data = data;
        let mut position = position;
        if position < persisted {
            let n = ((persisted - position) as usize).min(data.len());
            self.region.write_at(stream, position, &data[..n])?;
            data = &data[n..];
            position += n as u64;
        }
        if !data.is_empty() {
            self.suffix.write_at(position - persisted, data)?;
        }
        Ok(())
    }

    pub(crate) fn set_len(&mut self, len: u64) -> io::Result<()> {
        if len == self.len() {
            return Ok(());
        }
        self.dirty = true;
        let persisted = self.region.size();
        if len <= persisted {
            self.suffix.clear();
            self.region.truncate(len)
        } else {
            self.suffix.set_len(len - persisted)
        }
    }

    pub(crate) fn cache_before_write<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        write_offset: u64,
        write_end: u64,
    ) -> io::Result<()> {
        self.region.cache_before_write(stream, write_offset, write_end)
    }

    /// Writes the data at `new_offset` and folds the suffix into the
    /// persisted region.
    pub(crate) fn save<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        new_offset: u64,
    ) -> Result<()> {
        self.region.relocate(stream, new_offset)?;
        if !self.suffix.is_empty() {
            stream.seek(SeekFrom::Start(new_offset + self.region.size()))?;
            self.suffix.copy_to(stream)?;
            self.region.extend(self.suffix.len());
            self.suffix.clear();
        }
        self.dirty = false;
        Ok(())
    }

    /// Appends the pending suffix to a forward-only sink at its current
    /// position and folds it into the emitted region.
    pub(crate) fn emit<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let len = self.suffix.len();
        if len > 0 {
            self.suffix.copy_to(sink)?;
            self.region.extend(len);
            self.suffix.clear();
        }
        Ok(len)
    }
}

/// [`CompressedData`] view over a file item and the stream it lives in.
pub(crate) struct FileItemData<'a, S: ?Sized> {
    pub(crate) file: &'a mut FileItemStream,
    pub(crate) stream: &'a mut S,
}

impl<S: ArchiveStream + ?Sized> CompressedData for FileItemData<'_, S> {
    fn compressed_len(&self) -> u64 {
        self.file.len()
    }

    fn read_compressed(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(self.stream, position, buf)
    }

    fn append_compressed(&mut self, data: &[u8]) -> io::Result<()> {
        let end = self.file.len();
        self.file.write_at(self.stream, end, data)
    }

    fn reset_compressed(&mut self) -> io::Result<()> {
        self.file.set_len(0)
    }

    fn data_offset(&self) -> u64 {
        self.file.persisted_offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn archive_bytes() -> Cursor<Vec<u8>> {
        Cursor::new((0u8..100).collect())
    }

    fn read_all<S: ArchiveStream>(file: &mut FileItemStream, stream: &mut S) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = file.read_at(stream, out.len() as u64, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_reads_span_disk_and_memory() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(10, 5, 1024);
        file.write_at(&mut stream, 5, b"xyz").unwrap();
        assert_eq!(file.len(), 8);
        assert_eq!(read_all(&mut file, &mut stream), [10, 11, 12, 13, 14, b'x', b'y', b'z']);
        assert!(file.is_dirty());
    }

    #[test]
    fn test_write_straddling_boundary() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(10, 5, 1024);
        file.write_at(&mut stream, 3, b"ABCD").unwrap();
        assert_eq!(&stream.get_ref()[13..15], b"AB");
        assert_eq!(file.pending_len(), 2);
        assert_eq!(read_all(&mut file, &mut stream), [10, 11, 12, b'A', b'B', b'C', b'D']);
    }

    #[test]
    fn test_set_len_below_persisted_discards_suffix() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(10, 5, 1024);
        file.write_at(&mut stream, 5, b"tail").unwrap();
        file.set_len(2).unwrap();
        assert_eq!(file.persisted_size(), 2);
        assert_eq!(file.pending_len(), 0);
        file.set_len(4).unwrap();
        assert_eq!(read_all(&mut file, &mut stream), [10, 11, 0, 0]);
    }

    #[test]
    fn test_save_moves_backward_and_folds_suffix() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(50, 4, 1024);
        file.write_at(&mut stream, 4, b"!!").unwrap();
        file.save(&mut stream, 20).unwrap();

        assert_eq!(&stream.get_ref()[20..26], &[50, 51, 52, 53, b'!', b'!']);
        assert_eq!(file.persisted_offset(), 20);
        assert_eq!(file.persisted_size(), 6);
        assert_eq!(file.pending_len(), 0);
        assert!(!file.is_dirty());
    }

    #[test]
    fn test_cached_prefix_survives_overwrite() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(30, 10, 1024);

        // An earlier block is about to write [25, 34).
        file.cache_before_write(&mut stream, 25, 34).unwrap();
        stream.get_mut()[25..34].fill(0xEE);

        // Reads are served from the cache while it exists.
        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(&mut stream, 0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [30, 31, 32, 33]);

        file.save(&mut stream, 40).unwrap();
        let expected: Vec<u8> = (30..40).collect();
        assert_eq!(&stream.get_ref()[40..50], expected.as_slice());
    }

    #[test]
    fn test_cache_ignores_writes_outside_region() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(30, 10, 1024);
        file.cache_before_write(&mut stream, 0, 30).unwrap();
        assert_eq!(file.region.cached_len(), 0);
        file.cache_before_write(&mut stream, 40, 60).unwrap();
        assert_eq!(file.region.cached_len(), 0);
        file.cache_before_write(&mut stream, 35, 100).unwrap();
        assert_eq!(file.region.cached_len(), 10);
    }

    #[test]
    fn test_emit_to_sink() {
        let mut file = FileItemStream::new_empty(0, 1024);
        let mut stream = Cursor::new(Vec::new());
        file.write_at(&mut stream, 0, b"abc").unwrap();
        let mut sink = Vec::new();
        assert_eq!(file.emit(&mut sink).unwrap(), 3);
        assert_eq!(sink, b"abc");
        assert_eq!(file.len(), 3);
        assert_eq!(file.pending_len(), 0);
    }

    #[test]
    fn test_compressed_data_view() {
        let mut stream = archive_bytes();
        let mut file = FileItemStream::persisted(0, 3, 1024);
        let mut view = FileItemData {
            file: &mut file,
            stream: &mut stream,
        };
        view.append_compressed(b"z").unwrap();
        assert_eq!(view.compressed_len(), 4);
        view.reset_compressed().unwrap();
        assert_eq!(view.compressed_len(), 0);
    }
}
