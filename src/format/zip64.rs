//! ZIP64 end of central directory record and locator codecs.

use std::io::{Read, Write};

use super::reader::{read_bytes, u16_at, u32_at, u64_at, write_u16_le, write_u32_le, write_u64_le};
use super::{signature, version};
use crate::{Error, Result};

/// Size of the fixed part of the ZIP64 end of central directory record.
pub const ZIP64_EOCD_FIXED_SIZE: usize = 56;

/// Size of the ZIP64 end of central directory locator.
pub const ZIP64_EOCD_LOCATOR_SIZE: usize = 20;

/// Bytes counted by the "size of record" field of a record without
/// extensible data (the fixed size minus signature and the field itself).
const ZIP64_EOCD_RECORD_SIZE: u64 = (ZIP64_EOCD_FIXED_SIZE - 12) as u64;

/// A parsed ZIP64 end of central directory record.
///
/// ```text
/// offset  size  field
///      0     4  signature 0x06064b50
///      4     8  size of the remaining record
///     12     2  version made by
///     14     2  version needed to extract
///     16     4  number of this disk
///     20     4  disk where the central directory starts
///     24     8  central directory entries on this disk
///     32     8  total central directory entries
///     40     8  central directory size
///     48     8  central directory offset
///     56     n  extensible data (preserved)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk where the central directory starts.
    pub central_directory_disk: u32,
    /// Central directory entries on this disk.
    pub entries_on_disk: u64,
    /// Total central directory entries.
    pub total_entries: u64,
    /// Central directory size in bytes.
    pub central_directory_size: u64,
    /// Offset of the central directory.
    pub central_directory_offset: u64,
    /// Extensible data sector.
    pub extensible_data: Vec<u8>,
}

impl Default for Zip64EndOfCentralDirectory {
    fn default() -> Self {
        Self {
            version_made_by: version::MADE_BY,
            version_needed: version::ZIP64,
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: 0,
            total_entries: 0,
            central_directory_size: 0,
            central_directory_offset: 0,
            extensible_data: Vec::new(),
        }
    }
}

impl Zip64EndOfCentralDirectory {
    /// Parses the record located at `offset`.
    pub fn parse<R: Read + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        let fixed = read_bytes(r, ZIP64_EOCD_FIXED_SIZE)?;
        let field16 = |pos| u16_at(&fixed, pos).unwrap_or_default();
        let field32 = |pos| u32_at(&fixed, pos).unwrap_or_default();
        let field64 = |pos| u64_at(&fixed, pos).unwrap_or_default();

        if field32(0) != signature::ZIP64_END_OF_CENTRAL_DIRECTORY {
            return Err(Error::corrupted(
                offset,
                "invalid ZIP64 end of central directory signature",
            ));
        }

        let record_size = field64(4);
        let Some(extensible_len) = record_size.checked_sub(ZIP64_EOCD_RECORD_SIZE) else {
            return Err(Error::corrupted(
                offset,
                "ZIP64 end of central directory record is too short",
            ));
        };
        let extensible_len = usize::try_from(extensible_len).map_err(|_| {
            Error::corrupted(offset, "ZIP64 extensible data sector is too large")
        })?;

        let version_needed = field16(14);
        if version_needed > version::ZIP64 {
            return Err(Error::UnsupportedVersion {
                version: version_needed,
            });
        }

        Ok(Self {
            version_made_by: field16(12),
            version_needed,
            disk_number: field32(16),
            central_directory_disk: field32(20),
            entries_on_disk: field64(24),
            total_entries: field64(32),
            central_directory_size: field64(40),
            central_directory_offset: field64(48),
            extensible_data: read_bytes(r, extensible_len)?,
        })
    }

    /// Returns the on-disk size.
    pub fn size(&self) -> u64 {
        (ZIP64_EOCD_FIXED_SIZE + self.extensible_data.len()) as u64
    }

    /// Serializes the record.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        write_u32_le(&mut buf, signature::ZIP64_END_OF_CENTRAL_DIRECTORY)?;
        write_u64_le(
            &mut buf,
            ZIP64_EOCD_RECORD_SIZE + self.extensible_data.len() as u64,
        )?;
        write_u16_le(&mut buf, self.version_made_by)?;
        write_u16_le(&mut buf, self.version_needed)?;
        write_u32_le(&mut buf, self.disk_number)?;
        write_u32_le(&mut buf, self.central_directory_disk)?;
        write_u64_le(&mut buf, self.entries_on_disk)?;
        write_u64_le(&mut buf, self.total_entries)?;
        write_u64_le(&mut buf, self.central_directory_size)?;
        write_u64_le(&mut buf, self.central_directory_offset)?;
        buf.extend_from_slice(&self.extensible_data);
        w.write_all(&buf)?;
        Ok(())
    }
}

/// A parsed ZIP64 end of central directory locator.
///
/// ```text
/// offset  size  field
///      0     4  signature 0x07064b50
///      4     4  disk with the ZIP64 end of central directory record
///      8     8  offset of the ZIP64 end of central directory record
///     16     4  total number of disks
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectoryLocator {
    /// Disk holding the ZIP64 end of central directory record.
    pub zip64_eocd_disk: u32,
    /// Offset of the ZIP64 end of central directory record.
    pub zip64_eocd_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Default for Zip64EndOfCentralDirectoryLocator {
    fn default() -> Self {
        Self {
            zip64_eocd_disk: 0,
            zip64_eocd_offset: 0,
            total_disks: 1,
        }
    }
}

impl Zip64EndOfCentralDirectoryLocator {
    /// Parses the locator located at `offset`.
    pub fn parse<R: Read + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        let fixed = read_bytes(r, ZIP64_EOCD_LOCATOR_SIZE)?;
        if u32_at(&fixed, 0) != Some(signature::ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR) {
            return Err(Error::corrupted(
                offset,
                "invalid ZIP64 end of central directory locator signature",
            ));
        }
        Ok(Self {
            zip64_eocd_disk: u32_at(&fixed, 4).unwrap_or_default(),
            zip64_eocd_offset: u64_at(&fixed, 8).unwrap_or_default(),
            total_disks: u32_at(&fixed, 16).unwrap_or_default(),
        })
    }

    /// Returns the on-disk size.
    pub fn size(&self) -> u64 {
        ZIP64_EOCD_LOCATOR_SIZE as u64
    }

    /// Serializes the locator.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(ZIP64_EOCD_LOCATOR_SIZE);
        write_u32_le(&mut buf, signature::ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR)?;
        write_u32_le(&mut buf, self.zip64_eocd_disk)?;
        write_u64_le(&mut buf, self.zip64_eocd_offset)?;
        write_u32_le(&mut buf, self.total_disks)?;
        w.write_all(&buf)?;
        Ok(())
    }
}
