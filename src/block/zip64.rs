//! ZIP64 end of central directory record and locator blocks.
//!
//! Both blocks always exist in the block list. When the archive does not
//! need them they are empty: size zero, nothing written.

use std::io::{Seek, SeekFrom, Write};

use super::SaveContext;
use crate::format::zip64::{Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator};
use crate::stream::ArchiveStream;
use crate::Result;

#[derive(Debug)]
pub(crate) struct Zip64EndOfCentralDirectoryBlock {
    offset: u64,
    image_end: u64,
    record: Option<Zip64EndOfCentralDirectory>,
    dirty: bool,
}

impl Zip64EndOfCentralDirectoryBlock {
    pub(crate) fn absent(offset: u64) -> Self {
        Self {
            offset,
            image_end: offset,
            record: None,
            dirty: false,
        }
    }

    pub(crate) fn loaded(offset: u64, record: Zip64EndOfCentralDirectory) -> Self {
        Self {
            offset,
            image_end: offset + record.size(),
            record: Some(record),
            dirty: false,
        }
    }

    pub(crate) fn record(&self) -> Option<&Zip64EndOfCentralDirectory> {
        self.record.as_ref()
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.record.as_ref().map_or(0, Zip64EndOfCentralDirectory::size)
    }

    pub(crate) fn image_end(&self) -> u64 {
        self.image_end
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset {
            self.offset = offset;
            self.dirty = self.record.is_some();
        }
    }

    /// Populates the record when the directory needs ZIP64, empties it
    /// otherwise.
    pub(crate) fn update_references(&mut self, ctx: &mut SaveContext) {
        let updated = match ctx.central {
            Some(central) if central.needs_zip64() => {
                let mut record = self.record.clone().unwrap_or_default();
                record.disk_number = 0;
                record.central_directory_disk = 0;
                record.entries_on_disk = central.entries;
                record.total_entries = central.entries;
                record.central_directory_size = central.size;
                record.central_directory_offset = central.offset;
                Some(record)
            }
            _ => None,
        };
        if updated != self.record {
            self.record = updated;
            self.dirty = true;
        }
        ctx.zip64_eocd_offset = self.record.is_some().then_some(self.offset);
    }

    pub(crate) fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        match &self.record {
            Some(record) => record.write_to(w),
            None => Ok(()),
        }
    }

    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        if self.record.is_some() {
            stream.seek(SeekFrom::Start(self.offset))?;
            self.write_to(stream)?;
        }
        self.mark_saved();
        Ok(())
    }

    pub(crate) fn mark_saved(&mut self) {
        self.image_end = self.offset + self.size();
        self.dirty = false;
    }
}

#[derive(Debug)]
pub(crate) struct Zip64LocatorBlock {
    offset: u64,
    image_end: u64,
    record: Option<Zip64EndOfCentralDirectoryLocator>,
    dirty: bool,
}

impl Zip64LocatorBlock {
    pub(crate) fn absent(offset: u64) -> Self {
        Self {
            offset,
            image_end: offset,
            record: None,
            dirty: false,
        }
    }

    pub(crate) fn loaded(offset: u64, record: Zip64EndOfCentralDirectoryLocator) -> Self {
        Self {
            offset,
            image_end: offset + record.size(),
            record: Some(record),
            dirty: false,
        }
    }

    pub(crate) fn record(&self) -> Option<&Zip64EndOfCentralDirectoryLocator> {
        self.record.as_ref()
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.record
            .as_ref()
            .map_or(0, Zip64EndOfCentralDirectoryLocator::size)
    }

    pub(crate) fn image_end(&self) -> u64 {
        self.image_end
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset {
            self.offset = offset;
            self.dirty = self.record.is_some();
        }
    }

    /// Points at the ZIP64 record if there is one.
    pub(crate) fn update_references(&mut self, ctx: &SaveContext) {
        let updated = ctx
            .zip64_eocd_offset
            .map(|zip64_eocd_offset| Zip64EndOfCentralDirectoryLocator {
                zip64_eocd_disk: 0,
                zip64_eocd_offset,
                total_disks: 1,
            });
        if updated != self.record {
            self.record = updated;
            self.dirty = true;
        }
    }

    pub(crate) fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        match &self.record {
            Some(record) => record.write_to(w),
            None => Ok(()),
        }
    }

    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        if self.record.is_some() {
            stream.seek(SeekFrom::Start(self.offset))?;
            self.write_to(stream)?;
        }
        self.mark_saved();
        Ok(())
    }

    pub(crate) fn mark_saved(&mut self) {
        self.image_end = self.offset + self.size();
        self.dirty = false;
    }
}
