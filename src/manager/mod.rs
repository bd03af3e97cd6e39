//! Block manager.
//!
//! The manager owns the archive stream and every block. Blocks live in an
//! arena and are referred to by [`BlockId`]; `order` lists them by offset.
//! Once the central directory has been resolved the last four entries of
//! `order` are always the central directory, the ZIP64 end of central
//! directory record, its locator and the end of central directory record
//! (the ZIP64 pair with size zero when absent), so new entries are inserted
//! at `order.len() - 4`.
//!
//! At open only the EOCD is parsed. The rest of the trailer chain resolves
//! on first use, each record mapped out of the raw block covering the
//! stream, and entries are mapped the same way when first opened.

mod save;

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive_path::ArchivePath;
use crate::block::{
    Block, BlockId, CentralDirectoryBlock, EndOfCentralDirectoryBlock, LocalFileBlock,
    RawDataBlock, Zip64EndOfCentralDirectoryBlock, Zip64LocatorBlock,
};
use crate::format::central::CentralDirectoryFileHeader;
use crate::format::descriptor::{DataDescriptor, MAX_DATA_DESCRIPTOR_SIZE};
use crate::format::eocd::{EndOfCentralDirectory, MAX_COMMENT_LENGTH};
use crate::format::local::LocalFileHeader;
use crate::format::reader::{read_bytes, read_u32_le};
use crate::format::zip64::{
    ZIP64_EOCD_LOCATOR_SIZE, Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator,
};
use crate::format::{CompressionMethod, DeflateOption, attributes, signature};
use crate::stream::ArchiveStream;
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// Largest buffer [`move_data`] allocates.
pub(crate) const MOVE_BUFFER_SIZE: u64 = 1024 * 1024;

/// Number of trailer blocks that always close the block list.
const TRAILER_BLOCKS: usize = 4;

/// Settings the manager needs from the open options.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ManagerConfig {
    pub(crate) read_only: bool,
    pub(crate) streaming: bool,
    pub(crate) spill_threshold: u64,
    pub(crate) streaming_flush_threshold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// A save is running; nested saves return immediately.
    Saving,
    Closed,
}

/// Position bookkeeping for forward-only sinks.
#[derive(Debug, Default)]
struct StreamingState {
    /// Bytes written to the sink so far.
    position: u64,
    /// The entry whose data is still being written.
    open: Option<BlockId>,
}

/// Owns the archive stream and the ordered list of blocks.
pub(crate) struct BlockManager<S> {
    stream: S,
    blocks: Vec<Option<Block>>,
    order: Vec<BlockId>,
    eocd: BlockId,
    zip64_eocd: Option<BlockId>,
    locator: Option<BlockId>,
    central: Option<BlockId>,
    locals: HashMap<String, BlockId>,
    streaming: Option<StreamingState>,
    config: ManagerConfig,
    state: State,
    dirty: bool,
}

impl<S> std::fmt::Debug for BlockManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockManager")
            .field("blocks", &self.order.len())
            .field("loaded_entries", &self.locals.len())
            .field("streaming", &self.streaming.is_some())
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Copies `len` bytes within `stream` from `src` to `dst`.
///
/// Chunks are processed front to back when moving towards the start and
/// back to front when moving towards the end, so overlapping ranges never
/// read bytes that were already overwritten.
pub(crate) fn move_data<S: ArchiveStream + ?Sized>(
    stream: &mut S,
    src: u64,
    dst: u64,
    len: u64,
) -> Result<()> {
    if src == dst || len == 0 {
        return Ok(());
    }
    log::trace!("moving {} bytes from {:#x} to {:#x}", len, src, dst);

    let mut buf = vec![0u8; len.min(MOVE_BUFFER_SIZE) as usize];
    let chunk = buf.len() as u64;
    if dst < src {
        let mut done = 0u64;
        while done < len {
            let n = (len - done).min(chunk) as usize;
            stream.seek(SeekFrom::Start(src + done))?;
            stream.read_exact(&mut buf[..n])?;
            stream.seek(SeekFrom::Start(dst + done))?;
            stream.write_all(&buf[..n])?;
            done += n as u64;
        }
    } else {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(chunk);
            let start = remaining - n;
            stream.seek(SeekFrom::Start(src + start))?;
            stream.read_exact(&mut buf[..n as usize])?;
            stream.seek(SeekFrom::Start(dst + start))?;
            stream.write_all(&buf[..n as usize])?;
            remaining = start;
        }
    }
    Ok(())
}

fn slot(blocks: &[Option<Block>], id: BlockId) -> Result<&Block> {
    blocks
        .get(id.0)
        .and_then(Option::as_ref)
        .ok_or_else(|| Error::invalid_usage("block has been released"))
}

fn slot_mut(blocks: &mut [Option<Block>], id: BlockId) -> Result<&mut Block> {
    blocks
        .get_mut(id.0)
        .and_then(Option::as_mut)
        .ok_or_else(|| Error::invalid_usage("block has been released"))
}

fn checked_end(offset: u64, parts: &[u64]) -> Result<u64> {
    parts
        .iter()
        .try_fold(offset, |acc, &part| acc.checked_add(part))
        .ok_or_else(|| Error::corrupted(offset, "record extends past the addressable range"))
}

impl<S: ArchiveStream> BlockManager<S> {
    /// Opens the archive held in `stream`, parsing only its EOCD.
    pub(crate) fn open(mut stream: S, config: ManagerConfig) -> Result<Self> {
        let len = stream.stream_len()?;
        let (eocd_offset, record) = EndOfCentralDirectory::find(&mut stream, len)?;
        log::debug!(
            "found end of central directory at {:#x} ({} entries)",
            eocd_offset,
            record.total_entries
        );

        let mut manager = Self {
            stream,
            blocks: Vec::new(),
            order: Vec::new(),
            eocd: BlockId(0),
            zip64_eocd: None,
            locator: None,
            central: None,
            locals: HashMap::new(),
            streaming: None,
            config,
            state: State::Open,
            dirty: false,
        };
        if len > 0 {
            let raw = manager.alloc(Block::Raw(RawDataBlock::new(
                0,
                len,
                config.spill_threshold,
            )));
            manager.order.push(raw);
        }
        let size = record.size();
        manager.eocd = manager.map_onto_raw(
            Block::EndOfCentralDirectory(EndOfCentralDirectoryBlock::loaded(eocd_offset, record)),
            eocd_offset,
            size,
        )?;
        Ok(manager)
    }

    /// Starts an empty archive in `stream`.
    ///
    /// A seekable stream is truncated first; a streaming sink is assumed to
    /// be positioned where the archive starts.
    pub(crate) fn create(mut stream: S, config: ManagerConfig) -> Result<Self> {
        if !config.streaming {
            stream.set_len(0)?;
            stream.seek(SeekFrom::Start(0))?;
        }
        let mut manager = Self {
            stream,
            blocks: Vec::new(),
            order: Vec::new(),
            eocd: BlockId(0),
            zip64_eocd: None,
            locator: None,
            central: None,
            locals: HashMap::new(),
            streaming: config.streaming.then(StreamingState::default),
            config,
            state: State::Open,
            dirty: true,
        };
        let central = manager.alloc(Block::CentralDirectory(CentralDirectoryBlock::create(0)));
        let zip64_eocd = manager.alloc(Block::Zip64EndOfCentralDirectory(
            Zip64EndOfCentralDirectoryBlock::absent(0),
        ));
        let locator = manager.alloc(Block::Zip64Locator(Zip64LocatorBlock::absent(0)));
        let eocd = manager.alloc(Block::EndOfCentralDirectory(
            EndOfCentralDirectoryBlock::create(0),
        ));
        manager.order = vec![central, zip64_eocd, locator, eocd];
        manager.central = Some(central);
        manager.zip64_eocd = Some(zip64_eocd);
        manager.locator = Some(locator);
        manager.eocd = eocd;
        Ok(manager)
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn check_writable(&self, operation: &'static str) -> Result<()> {
        self.check_open()?;
        if self.config.read_only {
            return Err(Error::AccessDenied { operation });
        }
        Ok(())
    }

    fn check_random_access(&self, operation: &str) -> Result<()> {
        if self.is_streaming() {
            return Err(Error::invalid_usage(format!(
                "{} is not available in streaming mode",
                operation
            )));
        }
        Ok(())
    }

    fn alloc(&mut self, block: Block) -> BlockId {
        self.blocks.push(Some(block));
        BlockId(self.blocks.len() - 1)
    }

    fn block(&self, id: BlockId) -> Result<&Block> {
        slot(&self.blocks, id)
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        slot_mut(&mut self.blocks, id)
    }

    /// Replaces the part of a raw block covering `[offset, offset + size)`
    /// with `block`, keeping the rest of the raw range as prefix and suffix
    /// raw blocks.
    fn map_onto_raw(&mut self, block: Block, offset: u64, size: u64) -> Result<BlockId> {
        let kind = block.kind();
        let index = {
            let blocks = &self.blocks;
            self.order.partition_point(|&id| {
                slot(blocks, id).map_or(true, |b| b.image_end() <= offset)
            })
        };
        let overlap = || {
            Error::corrupted(
                offset,
                format!("{} overlaps another record", kind),
            )
        };

        let raw_id = *self.order.get(index).ok_or_else(overlap)?;
        let (start, end) = match self.block(raw_id)?.as_raw() {
            Some(raw) if raw.contains(offset, size) => (raw.image_offset(), raw.image_end()),
            _ => return Err(overlap()),
        };

        let threshold = self.config.spill_threshold;
        let mut replacement = Vec::with_capacity(3);
        if offset > start {
            replacement.push(self.alloc(Block::Raw(RawDataBlock::new(
                start,
                offset - start,
                threshold,
            ))));
        }
        let id = self.alloc(block);
        replacement.push(id);
        if offset + size < end {
            replacement.push(self.alloc(Block::Raw(RawDataBlock::new(
                offset + size,
                end - offset - size,
                threshold,
            ))));
        }
        self.blocks[raw_id.0] = None;
        self.order.splice(index..=index, replacement);
        log::trace!(
            "mapped {} onto [{:#x}, {:#x})",
            kind,
            offset,
            offset + size
        );
        Ok(id)
    }

    /// Inserts an empty block in front of the first block at or after its
    /// offset.
    fn insert_placeholder(&mut self, block: Block) -> Result<BlockId> {
        let offset = block.offset();
        let mut index = self.order.len();
        for (i, &id) in self.order.iter().enumerate() {
            if self.block(id)?.offset() >= offset {
                index = i;
                break;
            }
        }
        let id = self.alloc(block);
        self.order.insert(index, id);
        Ok(id)
    }

    fn eocd_block(&self) -> Result<&EndOfCentralDirectoryBlock> {
        self.block(self.eocd)?
            .as_eocd()
            .ok_or_else(|| Error::invalid_usage("end of central directory block is missing"))
    }

    fn eocd_block_mut(&mut self) -> Result<&mut EndOfCentralDirectoryBlock> {
        let id = self.eocd;
        self.block_mut(id)?
            .as_eocd_mut()
            .ok_or_else(|| Error::invalid_usage("end of central directory block is missing"))
    }

    fn read_record_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.stream.seek(SeekFrom::Start(offset))?;
        read_bytes(&mut self.stream, len).map_err(|e| Error::from(e).truncated_at(offset))
    }

    /// Resolves the ZIP64 locator: parsed when the EOCD escapes a field and
    /// the locator signature sits right before it, empty otherwise.
    fn ensure_zip64_locator(&mut self) -> Result<BlockId> {
        if let Some(id) = self.locator {
            return Ok(id);
        }
        let eocd = self.eocd_block()?;
        let eocd_offset = eocd.offset();
        let hinted = eocd.record().hints_zip64();
        let locator_size = ZIP64_EOCD_LOCATOR_SIZE as u64;

        let present = hinted && eocd_offset >= locator_size && {
            let offset = eocd_offset - locator_size;
            self.stream.seek(SeekFrom::Start(offset))?;
            read_u32_le(&mut self.stream)? == signature::ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR
        };

        let id = if present {
            let offset = eocd_offset - locator_size;
            self.stream.seek(SeekFrom::Start(offset))?;
            let record = Zip64EndOfCentralDirectoryLocator::parse(&mut self.stream, offset)
                .map_err(|e| e.truncated_at(offset))?;
            if record.zip64_eocd_disk != 0 || record.total_disks > 1 {
                return Err(Error::UnsupportedFeature {
                    feature: "multi-disk archives",
                });
            }
            log::debug!(
                "found zip64 end of central directory locator at {:#x}",
                offset
            );
            self.map_onto_raw(
                Block::Zip64Locator(Zip64LocatorBlock::loaded(offset, record)),
                offset,
                locator_size,
            )?
        } else {
            self.insert_placeholder(Block::Zip64Locator(Zip64LocatorBlock::absent(eocd_offset)))?
        };
        self.locator = Some(id);
        Ok(id)
    }

    /// Resolves the ZIP64 end of central directory record the locator
    /// points at, or an empty placeholder.
    fn ensure_zip64_eocd(&mut self) -> Result<BlockId> {
        if let Some(id) = self.zip64_eocd {
            return Ok(id);
        }
        let locator_id = self.ensure_zip64_locator()?;
        let (locator_offset, record) = match self.block(locator_id)? {
            Block::Zip64Locator(locator) => (locator.offset(), locator.record().copied()),
            _ => return Err(Error::invalid_usage("zip64 locator block is missing")),
        };

        let id = match record {
            Some(locator) => {
                let offset = locator.zip64_eocd_offset;
                if offset >= locator_offset {
                    return Err(Error::corrupted(
                        locator_offset,
                        "zip64 locator points past itself",
                    ));
                }
                self.stream.seek(SeekFrom::Start(offset))?;
                let record = Zip64EndOfCentralDirectory::parse(&mut self.stream, offset)
                    .map_err(|e| e.truncated_at(offset))?;
                if offset + record.size() != locator_offset {
                    return Err(Error::corrupted(
                        offset,
                        "zip64 end of central directory record does not end at its locator",
                    ));
                }
                if record.disk_number != 0
                    || record.central_directory_disk != 0
                    || record.entries_on_disk != record.total_entries
                {
                    return Err(Error::UnsupportedFeature {
                        feature: "multi-disk archives",
                    });
                }
                let size = record.size();
                self.map_onto_raw(
                    Block::Zip64EndOfCentralDirectory(Zip64EndOfCentralDirectoryBlock::loaded(
                        offset, record,
                    )),
                    offset,
                    size,
                )?
            }
            None => self.insert_placeholder(Block::Zip64EndOfCentralDirectory(
                Zip64EndOfCentralDirectoryBlock::absent(locator_offset),
            ))?,
        };
        self.zip64_eocd = Some(id);
        Ok(id)
    }

    /// Resolves the central directory, loading the ZIP64 records it
    /// depends on first.
    pub(crate) fn ensure_central(&mut self) -> Result<BlockId> {
        if let Some(id) = self.central {
            return Ok(id);
        }
        let zip64_id = self.ensure_zip64_eocd()?;

        let (offset, size, entries, next_offset) = match self.block(zip64_id)? {
            Block::Zip64EndOfCentralDirectory(b) => match b.record() {
                Some(record) => (
                    record.central_directory_offset,
                    record.central_directory_size,
                    record.total_entries,
                    b.offset(),
                ),
                None => {
                    let eocd = self.eocd_block()?;
                    let record = eocd.record();
                    if record.disk_number != 0
                        || record.central_directory_disk != 0
                        || record.entries_on_disk != record.total_entries
                    {
                        return Err(Error::UnsupportedFeature {
                            feature: "multi-disk archives",
                        });
                    }
                    (
                        record.central_directory_offset as u64,
                        record.central_directory_size as u64,
                        record.total_entries as u64,
                        eocd.offset(),
                    )
                }
            },
            _ => return Err(Error::invalid_usage("zip64 record block is missing")),
        };

        let id = if entries == 0 {
            self.insert_placeholder(Block::CentralDirectory(CentralDirectoryBlock::create(
                next_offset,
            )))?
        } else {
            if checked_end(offset, &[size])? != next_offset {
                return Err(Error::corrupted(
                    offset,
                    format!(
                        "central directory [{:#x}, +{}) does not end where the trailer starts ({:#x})",
                        offset, size, next_offset
                    ),
                ));
            }
            let data = self.read_record_at(offset, size as usize)?;
            let block = CentralDirectoryBlock::parse(&data, offset, entries)?;
            log::debug!(
                "loaded central directory at {:#x}: {} entries, {} bytes",
                offset,
                entries,
                size
            );
            self.map_onto_raw(Block::CentralDirectory(block), offset, size)?
        };
        if let Some(Block::CentralDirectory(block)) = self.blocks[id.0].as_mut() {
            if entries == 0 {
                // A freshly created empty directory in an existing archive
                // only needs writing if something else changes.
                block.mark_saved();
            }
        }
        self.central = Some(id);
        Ok(id)
    }

    /// Returns the central directory, resolving it if needed.
    pub(crate) fn central_directory(&mut self) -> Result<&CentralDirectoryBlock> {
        self.check_open()?;
        let id = self.ensure_central()?;
        self.block(id)?
            .as_central()
            .ok_or_else(|| Error::invalid_usage("central directory block is missing"))
    }

    fn central_directory_mut(&mut self) -> Result<&mut CentralDirectoryBlock> {
        let id = self.ensure_central()?;
        self.block_mut(id)?
            .as_central_mut()
            .ok_or_else(|| Error::invalid_usage("central directory block is missing"))
    }

    pub(crate) fn file_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.central_directory()?.contains(name))
    }

    /// Adds a new, empty entry in front of the central directory.
    pub(crate) fn add_file(
        &mut self,
        name: ArchivePath,
        method: CompressionMethod,
        deflate_option: DeflateOption,
    ) -> Result<BlockId> {
        self.check_writable("add_file")?;
        if self.central_directory()?.contains(name.as_str()) {
            return Err(Error::EntryExists {
                path: name.as_str().to_string(),
            });
        }
        if self.is_streaming() {
            self.finish_open_entry()?;
        }

        let streaming = self.is_streaming();
        let streaming_position = self.streaming.as_ref().map(|state| state.position);
        let offset = match streaming_position {
            Some(position) => position,
            None => self.central_directory()?.offset(),
        };
        let is_directory = name.is_directory();
        let header = LocalFileHeader::new(
            name,
            method,
            deflate_option,
            streaming,
            DosDateTime::now(),
        );
        let mut block =
            LocalFileBlock::create(offset, header, streaming, self.config.spill_threshold);
        if let Some(state) = &mut self.streaming {
            state.position += block.begin_streaming(&mut self.stream)?;
        }

        let mut central_header = CentralDirectoryFileHeader::from_local(block.header(), offset);
        if is_directory {
            central_header.external_attributes = attributes::DIRECTORY;
        }
        let entry_name = block.name().to_string();
        self.central_directory_mut()?.insert(central_header)?;

        let id = self.alloc(Block::Local(Box::new(block)));
        let index = self.order.len() - TRAILER_BLOCKS;
        self.order.insert(index, id);
        self.locals.insert(entry_name.clone(), id);
        if let Some(state) = &mut self.streaming {
            state.open = Some(id);
        }
        self.dirty = true;
        log::debug!("added entry '{}' at {:#x}", entry_name, offset);
        Ok(id)
    }

    /// Returns the block of an entry, loading it on first access.
    pub(crate) fn get_file(&mut self, name: &str) -> Result<BlockId> {
        self.check_open()?;
        if let Some(&id) = self.locals.get(name) {
            return Ok(id);
        }
        if !self.central_directory()?.contains(name) {
            return Err(Error::EntryNotFound {
                path: name.to_string(),
            });
        }
        self.check_random_access("reopening an entry")?;
        self.load_local_block(name)
    }

    /// Removes an entry from the directory and the block list.
    pub(crate) fn delete_file(&mut self, name: &str) -> Result<()> {
        self.check_writable("delete_file")?;
        self.check_random_access("deleting an entry")?;
        let id = self.get_file(name)?;
        self.order.retain(|&other| other != id);
        self.blocks[id.0] = None;
        self.locals.remove(name);
        self.central_directory_mut()?.remove(name);
        self.dirty = true;
        log::debug!("deleted entry '{}'", name);
        Ok(())
    }

    /// Parses the local header of `name` and maps its entry out of raw data.
    fn load_local_block(&mut self, name: &str) -> Result<BlockId> {
        let central = self
            .central_directory()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound {
                path: name.to_string(),
            })?;
        let offset = central.local_header_offset;

        self.stream.seek(SeekFrom::Start(offset))?;
        let header = LocalFileHeader::parse(&mut self.stream, offset)
            .map_err(|e| e.truncated_at(offset))?;
        if header.name != central.name {
            return Err(Error::corrupted(
                offset,
                format!(
                    "local header names '{}' but the central directory expects '{}'",
                    header.name, central.name
                ),
            ));
        }
        if header.method != central.method {
            return Err(Error::corrupted(
                offset,
                "local header and central directory disagree on the compression method",
            ));
        }

        let data_offset = checked_end(offset, &[header.size()])?;
        let descriptor = if header.has_data_descriptor() {
            let data_end = checked_end(data_offset, &[central.compressed_size])?;
            let stream_len = self.stream.stream_len()?;
            let available = stream_len.saturating_sub(data_end);
            let probe_len = available.min(MAX_DATA_DESCRIPTOR_SIZE as u64) as usize;
            let probe = self.read_record_at(data_end, probe_len)?;
            let descriptor = DataDescriptor::parse_matching(
                &probe,
                central.crc32,
                central.compressed_size,
                central.uncompressed_size,
            )
            .ok_or_else(|| {
                Error::corrupted(
                    data_end,
                    format!("data descriptor of '{}' not found", name),
                )
            })?;
            Some(descriptor)
        } else {
            if header.compressed_size != central.compressed_size
                || header.uncompressed_size != central.uncompressed_size
                || header.crc32 != central.crc32
            {
                return Err(Error::corrupted(
                    offset,
                    format!(
                        "local header of '{}' disagrees with the central directory",
                        name
                    ),
                ));
            }
            None
        };

        let size = header.size()
            + central.compressed_size
            + descriptor.as_ref().map_or(0, DataDescriptor::size);
        checked_end(offset, &[size])?;
        let block = LocalFileBlock::load(offset, header, descriptor, self.config.spill_threshold);
        let id = self.map_onto_raw(Block::Local(Box::new(block)), offset, size)?;
        self.locals.insert(name.to_string(), id);
        log::trace!("loaded entry '{}' at {:#x}", name, offset);
        Ok(id)
    }

    fn local(&self, id: BlockId) -> Result<&LocalFileBlock> {
        self.block(id)?
            .as_local()
            .ok_or_else(|| Error::invalid_usage("block is not an entry"))
    }

    /// Splits the borrow of `self` into an entry block and the stream.
    fn local_and_stream(&mut self, id: BlockId) -> Result<(&mut LocalFileBlock, &mut S)> {
        let block = slot_mut(&mut self.blocks, id)?
            .as_local_mut()
            .ok_or_else(|| Error::invalid_usage("block is not an entry"))?;
        Ok((block, &mut self.stream))
    }

    /// Returns the uncompressed length of an entry.
    pub(crate) fn entry_len(&self, id: BlockId) -> Result<u64> {
        Ok(self.local(id)?.len())
    }

    /// Returns how many bytes the entry's CRC tracker has hashed.
    pub(crate) fn entry_hashed_bytes(&self, id: BlockId) -> Result<u64> {
        Ok(self.local(id)?.data().crc().hashed_bytes())
    }

    pub(crate) fn read_entry(&mut self, id: BlockId, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let (block, stream) = self.local_and_stream(id)?;
        block.read_at(stream, position, buf)
    }

    pub(crate) fn write_entry(&mut self, id: BlockId, position: u64, data: &[u8]) -> Result<()> {
        self.check_writable("write")?;
        if let Some(state) = &self.streaming {
            if state.open != Some(id) {
                return Err(Error::invalid_usage(
                    "entries of a streaming archive must be written one after another",
                ));
            }
        }
        let threshold = self.config.streaming_flush_threshold;
        let (block, stream) = self.local_and_stream(id)?;
        block.write_at(stream, position, data)?;
        let emitted = if block.is_streaming() {
            block.emit_streaming(stream, threshold)?
        } else {
            0
        };
        if let Some(state) = &mut self.streaming {
            state.position += emitted;
        }
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn set_entry_len(&mut self, id: BlockId, len: u64) -> Result<()> {
        self.check_writable("set_len")?;
        let (block, stream) = self.local_and_stream(id)?;
        block.set_len(stream, len)?;
        self.dirty = true;
        Ok(())
    }

    /// Finishes the entry currently open on a streaming sink.
    fn finish_open_entry(&mut self) -> Result<()> {
        let Some(id) = self.streaming.as_mut().and_then(|state| state.open.take()) else {
            return Ok(());
        };
        let (block, stream) = self.local_and_stream(id)?;
        let written = block.finish_streaming(stream)?;
        if let Some(state) = &mut self.streaming {
            state.position += written;
        }
        Ok(())
    }

    pub(crate) fn comment(&self) -> Result<&[u8]> {
        self.check_open()?;
        Ok(self.eocd_block()?.comment())
    }

    pub(crate) fn set_comment(&mut self, comment: Vec<u8>) -> Result<()> {
        self.check_writable("set_comment")?;
        if comment.len() > MAX_COMMENT_LENGTH {
            return Err(Error::invalid_usage("archive comment exceeds 65535 bytes"));
        }
        self.eocd_block_mut()?.set_comment(comment);
        self.dirty = true;
        Ok(())
    }

    /// Saves pending changes.
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.save(false)
    }

    /// Saves pending changes and refuses further use. Closing twice is a
    /// no-op.
    pub(crate) fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let result = self.save(true);
        self.state = State::Closed;
        result
    }

    pub(crate) fn into_inner(self) -> S {
        self.stream
    }

    /// Returns the `(offset, size)` of every block in list order.
    #[cfg(test)]
    pub(crate) fn layout(&self) -> Vec<(u64, u64)> {
        self.order
            .iter()
            .filter_map(|&id| self.block(id).ok())
            .map(|b| (b.offset(), b.size()))
            .collect()
    }
}
