//! Local file header codec.
//!
//! ```text
//! offset  size  field
//!      0     4  signature 0x04034b50
//!      4     2  version needed to extract
//!      6     2  general purpose flags
//!      8     2  compression method
//!     10     2  last mod time
//!     12     2  last mod date
//!     14     4  crc-32
//!     18     4  compressed size
//!     22     4  uncompressed size
//!     26     2  file name length
//!     28     2  extra field length
//!     30     n  file name, then extra field
//! ```

use std::io::{Read, Write};

use super::extra::{ExtraField, Zip64ExtraField, Zip64Usage};
use super::reader::{read_bytes, u16_at, u32_at, write_u16_le, write_u32_le};
use super::{
    CompressionMethod, DeflateOption, ZIP64_MARKER_U32, check_flags, check_version_needed,
    exceeds_u32, flags, narrow_u32, signature, version,
};
use crate::timestamp::DosDateTime;
use crate::{ArchivePath, Error, Result};

/// Size of the fixed part of a local file header.
pub const LOCAL_FILE_HEADER_FIXED_SIZE: usize = 30;

/// A parsed local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time.
    pub last_modified: DosDateTime,
    /// CRC-32 of the uncompressed data (zero when deferred to a descriptor).
    pub crc32: u32,
    /// Compressed size (zero when deferred to a descriptor).
    pub compressed_size: u64,
    /// Uncompressed size (zero when deferred to a descriptor).
    pub uncompressed_size: u64,
    /// Entry name.
    pub name: ArchivePath,
    /// Extra field.
    pub extra: ExtraField,
}

impl LocalFileHeader {
    /// Creates the header of a new, empty entry.
    ///
    /// Headers of entries written to a forward-only sink defer CRC and sizes
    /// to a data descriptor; all other fresh headers reserve padding for a
    /// later ZIP64 promotion.
    pub fn new(
        name: ArchivePath,
        method: CompressionMethod,
        deflate_option: DeflateOption,
        streaming: bool,
        last_modified: DosDateTime,
    ) -> Self {
        let mut general_purpose = deflate_option.to_flags();
        if name.needs_utf8_flag() {
            general_purpose |= flags::UTF8;
        }
        if streaming {
            general_purpose |= flags::DATA_DESCRIPTOR;
        }

        Self {
            version_needed: method.version_needed(),
            flags: general_purpose,
            method,
            last_modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name,
            extra: if streaming {
                ExtraField::new()
            } else {
                ExtraField::with_initial_padding()
            },
        }
    }

    /// Parses a local file header located at `offset`.
    pub fn parse<R: Read + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        let fixed = read_bytes(r, LOCAL_FILE_HEADER_FIXED_SIZE)?;
        let field16 = |pos| u16_at(&fixed, pos).unwrap_or_default();
        let field32 = |pos| u32_at(&fixed, pos).unwrap_or_default();

        if field32(0) != signature::LOCAL_FILE_HEADER {
            return Err(Error::corrupted(offset, "invalid local file header signature"));
        }

        let version_needed = field16(4);
        check_version_needed(version_needed)?;
        let general_purpose = field16(6);
        check_flags(general_purpose)?;
        let method = CompressionMethod::from_u16(field16(8))?;
        let last_modified = DosDateTime::from_parts(field16(12), field16(10));
        let crc32 = field32(14);
        let compressed_size32 = field32(18);
        let uncompressed_size32 = field32(22);
        let name_len = field16(26) as usize;
        let extra_len = field16(28) as usize;

        let name_bytes = read_bytes(r, name_len)?;
        let name = ArchivePath::from_header_bytes(&name_bytes, general_purpose & flags::UTF8 != 0)
            .map_err(|e| Error::corrupted(offset, format!("invalid entry name: {}", e)))?;

        // A local ZIP64 element always carries both sizes.
        let usage = if compressed_size32 == ZIP64_MARKER_U32 || uncompressed_size32 == ZIP64_MARKER_U32
        {
            Zip64Usage::UNCOMPRESSED_SIZE | Zip64Usage::COMPRESSED_SIZE
        } else {
            Zip64Usage::NONE
        };
        let extra = ExtraField::parse(&read_bytes(r, extra_len)?, usage, offset)?;

        let (compressed_size, uncompressed_size) = match extra.zip64() {
            Some(zip64) => (
                zip64.compressed_size.unwrap_or(compressed_size32 as u64),
                zip64.uncompressed_size.unwrap_or(uncompressed_size32 as u64),
            ),
            None => (compressed_size32 as u64, uncompressed_size32 as u64),
        };

        Ok(Self {
            version_needed,
            flags: general_purpose,
            method,
            last_modified,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }

    /// Returns the on-disk size of the header.
    pub fn size(&self) -> u64 {
        (LOCAL_FILE_HEADER_FIXED_SIZE + self.name.as_bytes().len() + self.extra.size()) as u64
    }

    /// Returns the deflate option encoded in the flags.
    pub fn deflate_option(&self) -> DeflateOption {
        DeflateOption::from_flags(self.flags, self.method)
    }

    /// Returns true if CRC and sizes follow the data in a data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & flags::DATA_DESCRIPTOR != 0
    }

    /// Returns true if the header carries a ZIP64 element.
    pub fn is_zip64(&self) -> bool {
        self.extra.zip64().is_some()
    }

    /// Stops deferring CRC and sizes to a data descriptor.
    pub fn clear_data_descriptor(&mut self) {
        self.flags &= !flags::DATA_DESCRIPTOR;
    }

    /// Records final CRC and sizes, promoting to or demoting from ZIP64.
    ///
    /// The extra field keeps its size whenever the padding allows it.
    pub fn set_sizes(&mut self, crc32: u32, compressed_size: u64, uncompressed_size: u64) {
        self.crc32 = crc32;
        self.compressed_size = compressed_size;
        self.uncompressed_size = uncompressed_size;

        let needs_zip64 = exceeds_u32(compressed_size) || exceeds_u32(uncompressed_size);
        self.extra.set_zip64_keeping_size(needs_zip64.then(|| Zip64ExtraField {
            uncompressed_size: Some(uncompressed_size),
            compressed_size: Some(compressed_size),
            ..Default::default()
        }));

        self.version_needed = if needs_zip64 {
            version::ZIP64
        } else if self.version_needed == version::VOLUME_LABEL {
            version::VOLUME_LABEL
        } else {
            self.method.version_needed()
        };
    }

    /// Serializes the header.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let extra_len = u16::try_from(self.extra.size())
            .map_err(|_| Error::invalid_usage("extra field exceeds 65535 bytes"))?;
        let name = self.name.as_bytes();

        let (compressed32, uncompressed32) = if self.is_zip64() {
            (ZIP64_MARKER_U32, ZIP64_MARKER_U32)
        } else {
            (
                narrow_u32(self.compressed_size),
                narrow_u32(self.uncompressed_size),
            )
        };

        let mut buf = Vec::with_capacity(self.size() as usize);
        write_u32_le(&mut buf, signature::LOCAL_FILE_HEADER)?;
        write_u16_le(&mut buf, self.version_needed)?;
        write_u16_le(&mut buf, self.flags)?;
        write_u16_le(&mut buf, self.method.as_u16())?;
        write_u16_le(&mut buf, self.last_modified.time_word())?;
        write_u16_le(&mut buf, self.last_modified.date_word())?;
        write_u32_le(&mut buf, self.crc32)?;
        write_u32_le(&mut buf, compressed32)?;
        write_u32_le(&mut buf, uncompressed32)?;
        write_u16_le(&mut buf, name.len() as u16)?;
        write_u16_le(&mut buf, extra_len)?;
        buf.extend_from_slice(name);
        self.extra.write_to(&mut buf)?;

        w.write_all(&buf)?;
        Ok(())
    }
}
