//! The regions an archive is made of.
//!
//! The block manager sees an archive as an ordered list of disjoint byte
//! ranges. Each range is one [`Block`]: a parsed trailer record, the central
//! directory, one entry (local header, data and optional data descriptor) or
//! a raw range that nothing has needed to parse yet.
//!
//! Every block answers the same questions during a save:
//!
//! 1. [`Block::move_to`]: where the block starts in the new layout.
//! 2. [`Block::update_references`]: recompute fields that depend on other
//!    blocks, recording what later blocks need in the [`SaveContext`].
//! 3. [`Block::pre_save_notification`]: an earlier block is about to write a
//!    range; cache whatever part of the block's old image the write destroys.
//! 4. [`Block::save`]: write the block at its new offset.

pub(crate) mod central;
pub(crate) mod eocd;
pub(crate) mod file_item;
pub(crate) mod local;
pub(crate) mod raw;
pub(crate) mod zip64;

use std::collections::HashMap;

use crate::format::local::LocalFileHeader;
use crate::format::{ZIP64_MARKER_U16, exceeds_u32};
use crate::stream::ArchiveStream;
use crate::Result;

pub(crate) use central::CentralDirectoryBlock;
pub(crate) use eocd::EndOfCentralDirectoryBlock;
pub(crate) use local::LocalFileBlock;
pub(crate) use raw::RawDataBlock;
pub(crate) use zip64::{Zip64EndOfCentralDirectoryBlock, Zip64LocatorBlock};

/// Handle of a block in the manager's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BlockId(pub(crate) usize);

/// Answer of a block to an upcoming write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreSaveNotification {
    /// Later blocks may still overlap the write.
    Continue,
    /// No later block can overlap the write.
    Stop,
}

/// Where an entry ended up after the first save pass.
#[derive(Debug, Clone)]
pub(crate) struct LocalSummary {
    /// The header as the central directory should describe it.
    pub(crate) header: LocalFileHeader,
    pub(crate) offset: u64,
}

/// Placement of the central directory after the first save pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CentralSummary {
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) entries: u64,
}

impl CentralSummary {
    /// Returns true if the EOCD cannot describe this directory on its own.
    pub(crate) fn needs_zip64(&self) -> bool {
        self.entries >= ZIP64_MARKER_U16 as u64
            || exceeds_u32(self.offset)
            || exceeds_u32(self.size)
    }
}

/// Facts gathered while walking the block list in order.
///
/// Entries precede the central directory, which precedes the ZIP64 records
/// and the EOCD, so each block finds what it depends on already recorded.
#[derive(Debug, Default)]
pub(crate) struct SaveContext {
    pub(crate) locals: HashMap<String, LocalSummary>,
    pub(crate) central: Option<CentralSummary>,
    pub(crate) zip64_eocd_offset: Option<u64>,
}

impl SaveContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// One region of the archive.
#[derive(Debug)]
pub(crate) enum Block {
    Raw(RawDataBlock),
    Local(Box<LocalFileBlock>),
    CentralDirectory(CentralDirectoryBlock),
    Zip64EndOfCentralDirectory(Zip64EndOfCentralDirectoryBlock),
    Zip64Locator(Zip64LocatorBlock),
    EndOfCentralDirectory(EndOfCentralDirectoryBlock),
}

impl Block {
    /// Returns the offset the block occupies (or will occupy after the
    /// current save).
    pub(crate) fn offset(&self) -> u64 {
        match self {
            Block::Raw(b) => b.offset(),
            Block::Local(b) => b.offset(),
            Block::CentralDirectory(b) => b.offset(),
            Block::Zip64EndOfCentralDirectory(b) => b.offset(),
            Block::Zip64Locator(b) => b.offset(),
            Block::EndOfCentralDirectory(b) => b.offset(),
        }
    }

    /// Returns the size the block will have when saved.
    pub(crate) fn size(&self) -> u64 {
        match self {
            Block::Raw(b) => b.size(),
            Block::Local(b) => b.size(),
            Block::CentralDirectory(b) => b.size(),
            Block::Zip64EndOfCentralDirectory(b) => b.size(),
            Block::Zip64Locator(b) => b.size(),
            Block::EndOfCentralDirectory(b) => b.size(),
        }
    }

    /// Returns the end of the block's current on-disk image.
    ///
    /// Blocks that have never been written report their insertion offset.
    pub(crate) fn image_end(&self) -> u64 {
        match self {
            Block::Raw(b) => b.image_end(),
            Block::Local(b) => b.image_end(),
            Block::CentralDirectory(b) => b.image_end(),
            Block::Zip64EndOfCentralDirectory(b) => b.image_end(),
            Block::Zip64Locator(b) => b.image_end(),
            Block::EndOfCentralDirectory(b) => b.image_end(),
        }
    }

    pub(crate) fn is_dirty(&self, closing: bool) -> bool {
        match self {
            Block::Raw(b) => b.is_dirty(),
            Block::Local(b) => b.is_dirty(closing),
            Block::CentralDirectory(b) => b.is_dirty(),
            Block::Zip64EndOfCentralDirectory(b) => b.is_dirty(),
            Block::Zip64Locator(b) => b.is_dirty(),
            Block::EndOfCentralDirectory(b) => b.is_dirty(),
        }
    }

    /// Places the block at `offset`; a block that moves becomes dirty.
    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset() {
            log::trace!("moving block from {:#x} to {:#x}", self.offset(), offset);
        }
        match self {
            Block::Raw(b) => b.move_to(offset),
            Block::Local(b) => b.move_to(offset),
            Block::CentralDirectory(b) => b.move_to(offset),
            Block::Zip64EndOfCentralDirectory(b) => b.move_to(offset),
            Block::Zip64Locator(b) => b.move_to(offset),
            Block::EndOfCentralDirectory(b) => b.move_to(offset),
        }
    }

    pub(crate) fn update_references<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        ctx: &mut SaveContext,
        closing: bool,
    ) -> Result<()> {
        match self {
            Block::Raw(_) => Ok(()),
            Block::Local(b) => b.update_references(stream, ctx, closing),
            Block::CentralDirectory(b) => {
                b.update_references(ctx);
                Ok(())
            }
            Block::Zip64EndOfCentralDirectory(b) => {
                b.update_references(ctx);
                Ok(())
            }
            Block::Zip64Locator(b) => {
                b.update_references(ctx);
                Ok(())
            }
            Block::EndOfCentralDirectory(b) => {
                b.update_references(ctx);
                Ok(())
            }
        }
    }

    /// Warns the block that `[offset, end)` is about to be written.
    ///
    /// Blocks held entirely in memory have nothing to protect.
    pub(crate) fn pre_save_notification<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        offset: u64,
        end: u64,
    ) -> Result<PreSaveNotification> {
        match self {
            Block::Raw(b) => b.pre_save_notification(stream, offset, end),
            Block::Local(b) => b.pre_save_notification(stream, offset, end),
            Block::CentralDirectory(_)
            | Block::Zip64EndOfCentralDirectory(_)
            | Block::Zip64Locator(_)
            | Block::EndOfCentralDirectory(_) => Ok(PreSaveNotification::Stop),
        }
    }

    /// Writes the block at its offset and clears its dirty state.
    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        match self {
            Block::Raw(b) => b.save(stream),
            Block::Local(b) => b.save(stream),
            Block::CentralDirectory(b) => b.save(stream),
            Block::Zip64EndOfCentralDirectory(b) => b.save(stream),
            Block::Zip64Locator(b) => b.save(stream),
            Block::EndOfCentralDirectory(b) => b.save(stream),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Block::Raw(_) => "raw data",
            Block::Local(_) => "local file",
            Block::CentralDirectory(_) => "central directory",
            Block::Zip64EndOfCentralDirectory(_) => "zip64 end of central directory",
            Block::Zip64Locator(_) => "zip64 end of central directory locator",
            Block::EndOfCentralDirectory(_) => "end of central directory",
        }
    }

    pub(crate) fn as_raw(&self) -> Option<&RawDataBlock> {
        match self {
            Block::Raw(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn as_local_mut(&mut self) -> Option<&mut LocalFileBlock> {
        match self {
            Block::Local(b) => Some(&mut **b),
            _ => None,
        }
    }

    pub(crate) fn as_local(&self) -> Option<&LocalFileBlock> {
        match self {
            Block::Local(b) => Some(&**b),
            _ => None,
        }
    }

    pub(crate) fn as_central_mut(&mut self) -> Option<&mut CentralDirectoryBlock> {
        match self {
            Block::CentralDirectory(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn as_central(&self) -> Option<&CentralDirectoryBlock> {
        match self {
            Block::CentralDirectory(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn as_eocd_mut(&mut self) -> Option<&mut EndOfCentralDirectoryBlock> {
        match self {
            Block::EndOfCentralDirectory(b) => Some(b),
            _ => None,
        }
    }

    pub(crate) fn as_eocd(&self) -> Option<&EndOfCentralDirectoryBlock> {
        match self {
            Block::EndOfCentralDirectory(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_summary_zip64_thresholds() {
        let small = CentralSummary {
            offset: 0xFFFF_FFFE,
            size: 0xFFFF_FFFE,
            entries: 0xFFFE,
        };
        assert!(!small.needs_zip64());
        assert!(CentralSummary { entries: 0xFFFF, ..small }.needs_zip64());
        assert!(CentralSummary { offset: 0xFFFF_FFFF, ..small }.needs_zip64());
        assert!(CentralSummary { size: 0xFFFF_FFFF, ..small }.needs_zip64());
    }

    #[test]
    fn test_trailer_blocks_stop_notifications() {
        let mut stream = std::io::Cursor::new(vec![0u8; 64]);
        let mut block = Block::EndOfCentralDirectory(EndOfCentralDirectoryBlock::create(0));
        assert_eq!(
            block.pre_save_notification(&mut stream, 0, 64).unwrap(),
            PreSaveNotification::Stop
        );
    }
}
