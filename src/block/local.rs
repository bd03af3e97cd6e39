//! Entry blocks: local file header, data and optional data descriptor.

use std::io::{Seek, SeekFrom, Write};

use super::file_item::{FileItemData, FileItemStream};
use super::{LocalSummary, PreSaveNotification, SaveContext};
use crate::checksum::ProgressiveCrc;
use crate::codec::CompressionStream;
use crate::format::CompressionMethod;
use crate::format::descriptor::DataDescriptor;
use crate::format::local::LocalFileHeader;
use crate::stream::ArchiveStream;
use crate::timestamp::DosDateTime;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// The uncompressed view of an entry.
///
/// Every access passes through here so the CRC tracker sees all of it: the
/// compression layer (for deflated entries) sits between the tracker and
/// the [`FileItemStream`] holding the compressed bytes.
#[derive(Debug)]
pub(crate) struct EntryData {
    file: FileItemStream,
    compression: Option<CompressionStream>,
    crc: ProgressiveCrc,
    modified: bool,
}

impl EntryData {
    /// Creates the data of a new entry starting at `data_offset`.
    pub(crate) fn create(
        method: CompressionMethod,
        level: u32,
        data_offset: u64,
        spill_threshold: u64,
    ) -> Self {
        Self {
            file: FileItemStream::new_empty(data_offset, spill_threshold),
            compression: (method == CompressionMethod::Deflated)
                .then(|| CompressionStream::new_empty(level, spill_threshold)),
            crc: ProgressiveCrc::new(),
            // The empty deflate stream still has to be produced.
            modified: true,
        }
    }

    /// Describes the data of an existing entry.
    pub(crate) fn existing(
        method: CompressionMethod,
        level: u32,
        data_offset: u64,
        compressed_size: u64,
        uncompressed_size: u64,
        crc32: u32,
        spill_threshold: u64,
    ) -> Self {
        Self {
            file: FileItemStream::persisted(data_offset, compressed_size, spill_threshold),
            compression: (method == CompressionMethod::Deflated)
                .then(|| CompressionStream::existing(level, uncompressed_size, spill_threshold)),
            crc: ProgressiveCrc::with_expected(crc32),
            modified: false,
        }
    }

    /// Returns the uncompressed length.
    pub(crate) fn len(&self) -> u64 {
        match &self.compression {
            Some(compression) => compression.len(),
            None => self.file.len(),
        }
    }

    pub(crate) fn compressed_len(&self) -> u64 {
        self.file.len()
    }

    pub(crate) fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn crc(&self) -> &ProgressiveCrc {
        &self.crc
    }

    fn read_raw<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        match &mut self.compression {
            Some(compression) => {
                let mut data = FileItemData {
                    file: &mut self.file,
                    stream,
                };
                compression.read_at(&mut data, position, buf)
            }
            None => Ok(self.file.read_at(stream, position, buf)?),
        }
    }

    /// Reads uncompressed bytes, validating the CRC once a read reaches the
    /// end of an unmodified entry.
    pub(crate) fn read_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        buf: &mut [u8],
        entry_name: &str,
    ) -> Result<usize> {
        let n = self.read_raw(stream, position, buf)?;
        let len = self.len();
        self.crc.observe_read(position, &buf[..n], len, entry_name)?;
        Ok(n)
    }

    pub(crate) fn write_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        bytes: &[u8],
    ) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        match &mut self.compression {
            Some(compression) => {
                let mut data = FileItemData {
                    file: &mut self.file,
                    stream,
                };
                compression.write_at(&mut data, position, bytes)?;
            }
            None => self.file.write_at(stream, position, bytes)?,
        }
        self.crc.observe_write(position, bytes);
        self.modified = true;
        Ok(())
    }

    pub(crate) fn set_len<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        len: u64,
    ) -> Result<()> {
        match &mut self.compression {
            Some(compression) => {
                let mut data = FileItemData {
                    file: &mut self.file,
                    stream,
                };
                compression.set_len(&mut data, len)?;
            }
            None => self.file.set_len(len)?,
        }
        self.crc.observe_set_len(len);
        self.modified = true;
        Ok(())
    }

    /// Brings the compressed bytes up to date with the uncompressed image.
    pub(crate) fn flush<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        finish: bool,
    ) -> Result<()> {
        if let Some(compression) = &mut self.compression {
            let mut data = FileItemData {
                file: &mut self.file,
                stream,
            };
            compression.flush(&mut data, finish)?;
        }
        Ok(())
    }

    /// Returns the CRC of the whole entry, hashing whatever lies past the
    /// high-water mark.
    pub(crate) fn calculate_crc<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        entry_name: &str,
    ) -> Result<u32> {
        let len = self.len();
        if let Some(crc) = self.crc.value_if_complete(len) {
            return Ok(crc);
        }

        log::debug!(
            "rescanning '{}' for CRC from offset {} of {}",
            entry_name,
            self.crc.high_water_mark(),
            len
        );
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        while self.crc.high_water_mark() < len {
            let position = self.crc.high_water_mark();
            let n = self.read_raw(stream, position, &mut chunk)?;
            if n == 0 {
                return Err(Error::corrupted(
                    self.file.persisted_offset(),
                    format!("data of '{}' ends before its recorded length", entry_name),
                ));
            }
            self.crc.extend(&chunk[..n]);
        }
        self.crc.value_if_complete(len).ok_or_else(|| {
            Error::corrupted(
                self.file.persisted_offset(),
                format!("data of '{}' is longer than its recorded length", entry_name),
            )
        })
    }
}

/// One archive entry.
#[derive(Debug)]
pub(crate) struct LocalFileBlock {
    offset: u64,
    image_end: u64,
    header: LocalFileHeader,
    descriptor: Option<DataDescriptor>,
    data: EntryData,
    header_dirty: bool,
    moved: bool,
    streaming: bool,
    finished: bool,
}

impl LocalFileBlock {
    /// Creates a new entry placed at `offset`.
    pub(crate) fn create(
        offset: u64,
        header: LocalFileHeader,
        streaming: bool,
        spill_threshold: u64,
    ) -> Self {
        let data = EntryData::create(
            header.method,
            header.deflate_option().level(),
            offset + header.size(),
            spill_threshold,
        );
        Self {
            offset,
            image_end: offset,
            header,
            descriptor: None,
            data,
            header_dirty: true,
            moved: false,
            streaming,
            finished: false,
        }
    }

    /// Describes an existing entry whose header was parsed at `offset`.
    ///
    /// For entries with a data descriptor the CRC and sizes come from the
    /// descriptor; otherwise from the header.
    pub(crate) fn load(
        offset: u64,
        header: LocalFileHeader,
        descriptor: Option<DataDescriptor>,
        spill_threshold: u64,
    ) -> Self {
        let (crc32, compressed_size, uncompressed_size) = match &descriptor {
            Some(d) => (d.crc32, d.compressed_size, d.uncompressed_size),
            None => (header.crc32, header.compressed_size, header.uncompressed_size),
        };
        let data = EntryData::existing(
            header.method,
            header.deflate_option().level(),
            offset + header.size(),
            compressed_size,
            uncompressed_size,
            crc32,
            spill_threshold,
        );
        let image_end = offset
            + header.size()
            + compressed_size
            + descriptor.as_ref().map_or(0, DataDescriptor::size);
        Self {
            offset,
            image_end,
            header,
            descriptor,
            data,
            header_dirty: false,
            moved: false,
            streaming: false,
            finished: true,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.header.name.as_str()
    }

    pub(crate) fn header(&self) -> &LocalFileHeader {
        &self.header
    }

    #[cfg(test)]
    pub(crate) fn descriptor(&self) -> Option<&DataDescriptor> {
        self.descriptor.as_ref()
    }

    pub(crate) fn data(&self) -> &EntryData {
        &self.data
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.header.size()
            + self.data.compressed_len()
            + self.descriptor.as_ref().map_or(0, DataDescriptor::size)
    }

    pub(crate) fn image_end(&self) -> u64 {
        self.image_end
    }

    /// Returns the uncompressed length of the entry.
    pub(crate) fn len(&self) -> u64 {
        self.data.len()
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// In streaming mode, an entry is dirty while it has bytes to emit, and
    /// when closing until its descriptor has been written.
    pub(crate) fn is_dirty(&self, closing: bool) -> bool {
        if self.streaming {
            return if closing {
                !self.finished
            } else {
                self.data.file.pending_len() > 0
            };
        }
        self.moved || self.header_dirty || self.data.is_modified()
    }

    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset {
            self.offset = offset;
            self.moved = true;
        }
    }

    /// Returns the header the central directory should mirror.
    ///
    /// Entries that defer CRC and sizes to a descriptor carry zeros in the
    /// header itself; the real values come from the descriptor.
    pub(crate) fn effective_header(&self) -> LocalFileHeader {
        let mut header = self.header.clone();
        if let Some(descriptor) = &self.descriptor {
            header.crc32 = descriptor.crc32;
            header.compressed_size = descriptor.compressed_size;
            header.uncompressed_size = descriptor.uncompressed_size;
        }
        header
    }

    pub(crate) fn read_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let name = self.header.name.as_str();
        self.data.read_at(stream, position, buf, name)
    }

    pub(crate) fn write_at<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        position: u64,
        bytes: &[u8],
    ) -> Result<()> {
        if self.streaming {
            if self.finished {
                return Err(Error::invalid_usage(format!(
                    "entry '{}' has already been written to the archive",
                    self.name()
                )));
            }
            if position != self.data.len() {
                return Err(Error::invalid_usage(
                    "entries of a streaming archive can only be written sequentially",
                ));
            }
        }
        self.data.write_at(stream, position, bytes)
    }

    pub(crate) fn set_len<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        len: u64,
    ) -> Result<()> {
        if self.streaming && len != self.data.len() {
            return Err(Error::invalid_usage(
                "entries of a streaming archive cannot be resized",
            ));
        }
        self.data.set_len(stream, len)
    }

    pub(crate) fn update_references<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        ctx: &mut SaveContext,
        closing: bool,
    ) -> Result<()> {
        if self.streaming {
            if closing && !self.finished {
                return Err(Error::invalid_usage(format!(
                    "entry '{}' is still being written",
                    self.name()
                )));
            }
        } else if self.data.is_modified() {
            self.data.flush(stream, true)?;
            let crc = self.data.calculate_crc(stream, self.header.name.as_str())?;
            if self.header.has_data_descriptor() {
                // Sizes are known now, so they go in the header.
                self.header.clear_data_descriptor();
                self.descriptor = None;
            }
            self.header.last_modified = DosDateTime::now();
            self.header
                .set_sizes(crc, self.data.compressed_len(), self.data.len());
            self.header_dirty = true;
        }

        ctx.locals.insert(
            self.name().to_string(),
            LocalSummary {
                header: self.effective_header(),
                offset: self.offset,
            },
        );
        Ok(())
    }

    pub(crate) fn pre_save_notification<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        offset: u64,
        end: u64,
    ) -> Result<PreSaveNotification> {
        self.data.file.cache_before_write(stream, offset, end)?;
        Ok(if end <= self.image_end {
            PreSaveNotification::Stop
        } else {
            PreSaveNotification::Continue
        })
    }

    /// Writes the entry at its offset: data first, since it may still sit
    /// where the header goes, then the header and descriptor.
    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        let data_offset = self.offset + self.header.size();
        if let Err(e) = self.data.file.save(stream, data_offset) {
            self.data.crc.invalidate();
            return Err(e);
        }

        stream.seek(SeekFrom::Start(self.offset))?;
        self.header.write_to(stream)?;
        if let Some(descriptor) = &self.descriptor {
            stream.seek(SeekFrom::Start(data_offset + self.data.compressed_len()))?;
            descriptor.write_to(stream)?;
        }

        self.image_end = self.offset + self.size();
        self.header_dirty = false;
        self.moved = false;
        self.data.modified = false;
        Ok(())
    }

    /// Writes the header to a forward-only sink; returns the bytes written.
    pub(crate) fn begin_streaming<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        self.header.write_to(sink)?;
        self.image_end = self.offset + self.header.size();
        Ok(self.header.size())
    }

    /// Emits buffered compressed bytes once at least `threshold` are pending.
    pub(crate) fn emit_streaming<S: ArchiveStream + ?Sized>(
        &mut self,
        sink: &mut S,
        threshold: usize,
    ) -> Result<u64> {
        if self.data.file.pending_len() < threshold as u64 {
            return Ok(0);
        }
        self.data.file.emit(sink)
    }

    /// Hands everything the encoder has produced so far to the sink.
    pub(crate) fn flush_streaming<S: ArchiveStream + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<u64> {
        if self.finished {
            return Ok(0);
        }
        self.data.flush(sink, false)?;
        self.data.file.emit(sink)
    }

    /// Completes the entry: finishes the encoder, emits the rest of the data
    /// and appends the data descriptor. Returns the bytes written.
    pub(crate) fn finish_streaming<S: ArchiveStream + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<u64> {
        if self.finished {
            return Ok(0);
        }
        self.data.flush(sink, true)?;
        let mut written = self.data.file.emit(sink)?;

        let len = self.data.len();
        let crc32 = self.data.crc.value_if_complete(len).ok_or_else(|| {
            Error::invalid_usage(format!(
                "entry '{}' was not written sequentially",
                self.name()
            ))
        })?;
        let descriptor = DataDescriptor::new(crc32, self.data.compressed_len(), len);
        descriptor.write_to(sink)?;
        written += descriptor.size();
        log::debug!(
            "finished streamed entry '{}': {} bytes, {} compressed",
            self.name(),
            len,
            self.data.compressed_len()
        );

        self.descriptor = Some(descriptor);
        self.image_end = self.offset + self.size();
        self.finished = true;
        self.data.modified = false;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::archive_path::ArchivePath;
    use crate::format::DeflateOption;
    use crate::format::flags;
    use std::io::{Cursor, Read};

    fn new_header(name: &str, method: CompressionMethod, streaming: bool) -> LocalFileHeader {
        LocalFileHeader::new(
            ArchivePath::new(name).unwrap(),
            method,
            DeflateOption::Normal,
            streaming,
            DosDateTime::MIN,
        )
    }

    fn read_entry(block: &mut LocalFileBlock, stream: &mut Cursor<Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 5];
        loop {
            let n = block.read_at(stream, out.len() as u64, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_new_stored_entry_save() {
        let mut stream = Cursor::new(Vec::new());
        let mut block =
            LocalFileBlock::create(0, new_header("a.txt", CompressionMethod::Stored, false), false, 1024);
        block.write_at(&mut stream, 0, b"hello").unwrap();

        let mut ctx = SaveContext::new();
        block.update_references(&mut stream, &mut ctx, false).unwrap();
        assert_eq!(block.header().crc32, crate::checksum::Crc32::compute(b"hello"));
        assert_eq!(block.header().compressed_size, 5);
        assert!(ctx.locals.contains_key("a.txt"));

        block.save(&mut stream).unwrap();
        assert!(!block.is_dirty(false));
        assert_eq!(stream.get_ref().len() as u64, block.size());

        stream.set_position(0);
        let parsed = LocalFileHeader::parse(&mut stream, 0).unwrap();
        assert_eq!(parsed.uncompressed_size, 5);
        let mut data = [0u8; 5];
        stream.read_exact(&mut data).unwrap();
        assert_eq!(&data, b"hello");
    }

    #[test]
    fn test_new_deflated_entry_roundtrip() {
        let mut stream = Cursor::new(Vec::new());
        let mut block = LocalFileBlock::create(
            0,
            new_header("d.bin", CompressionMethod::Deflated, false),
            false,
            1024,
        );
        let payload = vec![7u8; 4000];
        block.write_at(&mut stream, 0, &payload).unwrap();
        block
            .update_references(&mut stream, &mut SaveContext::new(), false)
            .unwrap();
        block.save(&mut stream).unwrap();
        assert!(block.header().compressed_size < 4000);

        let header = block.header().clone();
        let mut loaded = LocalFileBlock::load(0, header, None, 1024);
        assert_eq!(read_entry(&mut loaded, &mut stream), payload);
        assert_eq!(loaded.data().crc().hashed_bytes(), 4000);
    }

    #[test]
    fn test_empty_deflated_entry_is_valid() {
        let mut stream = Cursor::new(Vec::new());
        let mut block = LocalFileBlock::create(
            0,
            new_header("empty", CompressionMethod::Deflated, false),
            false,
            1024,
        );
        block
            .update_references(&mut stream, &mut SaveContext::new(), false)
            .unwrap();
        assert_eq!(block.header().uncompressed_size, 0);
        assert!(block.header().compressed_size > 0);
        assert_eq!(block.header().crc32, 0);
    }

    #[test]
    fn test_modified_descriptor_entry_drops_descriptor() {
        let mut stream = Cursor::new(Vec::new());
        let mut header = new_header("s", CompressionMethod::Stored, true);
        header.extra = crate::format::extra::ExtraField::new();
        let descriptor = DataDescriptor::new(0, 0, 0);
        let mut block = LocalFileBlock::load(0, header, Some(descriptor), 1024);
        assert!(block.header().has_data_descriptor());

        block.write_at(&mut stream, 0, b"x").unwrap();
        block
            .update_references(&mut stream, &mut SaveContext::new(), false)
            .unwrap();
        assert_eq!(block.header().flags & flags::DATA_DESCRIPTOR, 0);
        assert!(block.descriptor().is_none());
        assert_eq!(block.header().uncompressed_size, 1);
    }

    #[test]
    fn test_streaming_rejects_random_writes() {
        let mut stream = Cursor::new(Vec::new());
        let mut block =
            LocalFileBlock::create(0, new_header("s", CompressionMethod::Stored, true), true, 1024);
        block.write_at(&mut stream, 0, b"abc").unwrap();
        let err = block.write_at(&mut stream, 1, b"z").unwrap_err();
        assert!(err.is_invalid_usage());
        assert!(block.set_len(&mut stream, 1).unwrap_err().is_invalid_usage());
    }

    #[test]
    fn test_streaming_finish_appends_descriptor() {
        let mut sink = Cursor::new(Vec::new());
        let mut block =
            LocalFileBlock::create(0, new_header("s", CompressionMethod::Stored, true), true, 1024);
        let header_len = block.begin_streaming(&mut sink).unwrap();
        block.write_at(&mut sink, 0, b"abc").unwrap();
        assert!(block.is_dirty(true));
        let written = block.finish_streaming(&mut sink).unwrap();
        assert_eq!(written, 3 + 16);
        assert!(!block.is_dirty(true));

        let bytes = sink.get_ref();
        assert_eq!(bytes.len() as u64, header_len + written);
        let descriptor = DataDescriptor::parse_matching(
            &bytes[(header_len + 3) as usize..],
            crate::checksum::Crc32::compute(b"abc"),
            3,
            3,
        )
        .unwrap();
        assert!(descriptor.has_signature);
        assert_eq!(block.effective_header().uncompressed_size, 3);
    }

    #[test]
    fn test_crc_mismatch_detected_on_read() {
        let mut header = new_header("bad", CompressionMethod::Stored, false);
        header.extra = crate::format::extra::ExtraField::new();
        header.crc32 = 0xDEAD_BEEF;
        header.compressed_size = 3;
        header.uncompressed_size = 3;
        let mut bytes = vec![0u8; header.size() as usize];
        bytes.extend_from_slice(b"abc");
        let mut stream = Cursor::new(bytes);

        let mut block = LocalFileBlock::load(0, header, None, 1024);
        let mut buf = [0u8; 3];
        let err = block.read_at(&mut stream, 0, &mut buf).unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { .. }));
    }
}
