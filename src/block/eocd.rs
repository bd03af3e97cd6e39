//! The end of central directory block.

use std::io::{Seek, SeekFrom, Write};

use super::SaveContext;
use crate::format::eocd::EndOfCentralDirectory;
use crate::format::{ZIP64_MARKER_U16, ZIP64_MARKER_U32, exceeds_u32};
use crate::stream::ArchiveStream;
use crate::Result;

#[derive(Debug)]
pub(crate) struct EndOfCentralDirectoryBlock {
    offset: u64,
    image_end: u64,
    record: EndOfCentralDirectory,
    dirty: bool,
}

impl EndOfCentralDirectoryBlock {
    pub(crate) fn create(offset: u64) -> Self {
        Self {
            offset,
            image_end: offset,
            record: EndOfCentralDirectory::default(),
            dirty: true,
        }
    }

    pub(crate) fn loaded(offset: u64, record: EndOfCentralDirectory) -> Self {
        Self {
            offset,
            image_end: offset + record.size(),
            record,
            dirty: false,
        }
    }

    pub(crate) fn record(&self) -> &EndOfCentralDirectory {
        &self.record
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.record.size()
    }

    pub(crate) fn image_end(&self) -> u64 {
        self.image_end
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn comment(&self) -> &[u8] {
        &self.record.comment
    }

    pub(crate) fn set_comment(&mut self, comment: Vec<u8>) {
        if comment != self.record.comment {
            self.record.comment = comment;
            self.dirty = true;
        }
    }

    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset {
            self.offset = offset;
            self.dirty = true;
        }
    }

    /// Fills the 16- and 32-bit fields, escaping values the ZIP64 record
    /// carries instead.
    pub(crate) fn update_references(&mut self, ctx: &SaveContext) {
        let Some(central) = ctx.central else {
            return;
        };
        let entries = if central.entries >= ZIP64_MARKER_U16 as u64 {
            ZIP64_MARKER_U16
        } else {
            central.entries as u16
        };
        let narrow = |value: u64| {
            if exceeds_u32(value) {
                ZIP64_MARKER_U32
            } else {
                value as u32
            }
        };

        let updated = EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: entries,
            total_entries: entries,
            central_directory_size: narrow(central.size),
            central_directory_offset: narrow(central.offset),
            comment: std::mem::take(&mut self.record.comment),
        };
        if updated.total_entries != self.record.total_entries
            || updated.entries_on_disk != self.record.entries_on_disk
            || updated.central_directory_size != self.record.central_directory_size
            || updated.central_directory_offset != self.record.central_directory_offset
            || updated.disk_number != self.record.disk_number
            || updated.central_directory_disk != self.record.central_directory_disk
        {
            self.dirty = true;
        }
        self.record = updated;
    }

    pub(crate) fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.record.write_to(w)
    }

    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        stream.seek(SeekFrom::Start(self.offset))?;
        self.write_to(stream)?;
        self.mark_saved();
        Ok(())
    }

    pub(crate) fn mark_saved(&mut self) {
        self.image_end = self.offset + self.size();
        self.dirty = false;
    }
}
