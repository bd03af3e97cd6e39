//! Unparsed byte ranges.

use super::PreSaveNotification;
use super::file_item::PersistedRegion;
use crate::stream::ArchiveStream;
use crate::Result;

/// A range of the archive that no typed block has claimed yet.
///
/// At open the whole stream is one raw block; parsing a record carves it
/// into an optional prefix and suffix around the record. Whatever is left
/// (gaps, junk between entries) is carried along by saves unchanged.
#[derive(Debug)]
pub(crate) struct RawDataBlock {
    offset: u64,
    region: PersistedRegion,
    dirty: bool,
}

impl RawDataBlock {
    pub(crate) fn new(offset: u64, size: u64, spill_threshold: u64) -> Self {
        Self {
            offset,
            region: PersistedRegion::new(offset, size, spill_threshold),
            dirty: false,
        }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.region.size()
    }

    pub(crate) fn image_offset(&self) -> u64 {
        self.region.offset()
    }

    pub(crate) fn image_end(&self) -> u64 {
        self.region.end()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true if `[offset, offset + size)` lies inside the block's image.
    pub(crate) fn contains(&self, offset: u64, size: u64) -> bool {
        offset >= self.region.offset() && offset + size <= self.region.end()
    }

    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset {
            self.offset = offset;
            self.dirty = true;
        }
    }

    pub(crate) fn pre_save_notification<S: ArchiveStream + ?Sized>(
        &mut self,
        stream: &mut S,
        offset: u64,
        end: u64,
    ) -> Result<PreSaveNotification> {
        self.region.cache_before_write(stream, offset, end)?;
        Ok(if end <= self.region.end() {
            PreSaveNotification::Stop
        } else {
            PreSaveNotification::Continue
        })
    }

    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        self.region.relocate(stream, self.offset)?;
        self.dirty = false;
        Ok(())
    }
}
