//! Central directory file header codec.
//!
//! ```text
//! offset  size  field
//!      0     4  signature 0x02014b50
//!      4     2  version made by
//!      6     2  version needed to extract
//!      8     2  general purpose flags
//!     10     2  compression method
//!     12     2  last mod time
//!     14     2  last mod date
//!     16     4  crc-32
//!     20     4  compressed size
//!     24     4  uncompressed size
//!     28     2  file name length
//!     30     2  extra field length
//!     32     2  file comment length
//!     34     2  disk number start
//!     36     2  internal file attributes
//!     38     4  external file attributes
//!     42     4  relative offset of local header
//!     46     n  file name, extra field, file comment
//! ```

use std::io::{Read, Write};

use super::extra::{ExtraField, Zip64ExtraField, Zip64Usage};
use super::local::LocalFileHeader;
use super::reader::{read_bytes, u16_at, u32_at, write_u16_le, write_u32_le};
use super::{
    CompressionMethod, DeflateOption, ZIP64_MARKER_U16, ZIP64_MARKER_U32, attributes, check_flags,
    check_version_needed, exceeds_u32, flags, narrow_u32, signature, version,
};
use crate::timestamp::DosDateTime;
use crate::{ArchivePath, Error, Result};

/// Size of the fixed part of a central directory file header.
pub const CENTRAL_DIRECTORY_HEADER_FIXED_SIZE: usize = 46;

/// A parsed central directory file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryFileHeader {
    /// Version made by (upper byte: attribute compatibility).
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose flags.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time.
    pub last_modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Internal file attributes.
    pub internal_attributes: u16,
    /// External file attributes.
    pub external_attributes: u32,
    /// Offset of the local header from the start of the archive.
    pub local_header_offset: u64,
    /// Entry name.
    pub name: ArchivePath,
    /// Extra field.
    pub extra: ExtraField,
    /// Entry comment (preserved, never interpreted).
    pub comment: Vec<u8>,
}

impl CentralDirectoryFileHeader {
    /// Creates a central header mirroring `local`.
    pub fn from_local(local: &LocalFileHeader, local_header_offset: u64) -> Self {
        let mut header = Self {
            version_made_by: version::MADE_BY,
            version_needed: local.version_needed,
            flags: local.flags,
            method: local.method,
            last_modified: local.last_modified,
            crc32: local.crc32,
            compressed_size: local.compressed_size,
            uncompressed_size: local.uncompressed_size,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset,
            name: local.name.clone(),
            extra: ExtraField::new(),
            comment: Vec::new(),
        };
        header.update_from_local(local, local_header_offset);
        header
    }

    /// Parses a central directory file header located at `offset`.
    ///
    /// The caller has already checked the signature.
    pub fn parse<R: Read + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        let fixed = read_bytes(r, CENTRAL_DIRECTORY_HEADER_FIXED_SIZE)?;
        let field16 = |pos| u16_at(&fixed, pos).unwrap_or_default();
        let field32 = |pos| u32_at(&fixed, pos).unwrap_or_default();

        if field32(0) != signature::CENTRAL_DIRECTORY_HEADER {
            return Err(Error::corrupted(
                offset,
                "invalid central directory header signature",
            ));
        }

        let version_made_by = field16(4);
        let version_needed = field16(6);
        check_version_needed(version_needed)?;
        let general_purpose = field16(8);
        check_flags(general_purpose)?;
        let method = CompressionMethod::from_u16(field16(10))?;
        let last_modified = DosDateTime::from_parts(field16(14), field16(12));
        let crc32 = field32(16);
        let compressed_size32 = field32(20);
        let uncompressed_size32 = field32(24);
        let name_len = field16(28) as usize;
        let extra_len = field16(30) as usize;
        let comment_len = field16(32) as usize;
        let disk_number16 = field16(34);
        let internal_attributes = field16(36);
        let external_attributes = field32(38);
        let offset32 = field32(42);

        let name_bytes = read_bytes(r, name_len)?;
        let name = ArchivePath::from_header_bytes(&name_bytes, general_purpose & flags::UTF8 != 0)
            .map_err(|e| Error::corrupted(offset, format!("invalid entry name: {}", e)))?;

        let mut usage = Zip64Usage::NONE;
        if uncompressed_size32 == ZIP64_MARKER_U32 {
            usage |= Zip64Usage::UNCOMPRESSED_SIZE;
        }
        if compressed_size32 == ZIP64_MARKER_U32 {
            usage |= Zip64Usage::COMPRESSED_SIZE;
        }
        if offset32 == ZIP64_MARKER_U32 {
            usage |= Zip64Usage::LOCAL_HEADER_OFFSET;
        }
        if disk_number16 == ZIP64_MARKER_U16 {
            usage |= Zip64Usage::DISK_NUMBER;
        }
        let extra = ExtraField::parse(&read_bytes(r, extra_len)?, usage, offset)?;
        let comment = read_bytes(r, comment_len)?;

        let zip64 = extra.zip64().cloned().unwrap_or_default();
        let disk_number = zip64.disk_number.unwrap_or(disk_number16 as u32);
        if disk_number != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "multi-disk archives",
            });
        }

        Ok(Self {
            version_made_by,
            version_needed,
            flags: general_purpose,
            method,
            last_modified,
            crc32,
            compressed_size: zip64.compressed_size.unwrap_or(compressed_size32 as u64),
            uncompressed_size: zip64
                .uncompressed_size
                .unwrap_or(uncompressed_size32 as u64),
            internal_attributes,
            external_attributes,
            local_header_offset: zip64.local_header_offset.unwrap_or(offset32 as u64),
            name,
            extra,
            comment,
        })
    }

    /// Returns the on-disk size of the header.
    pub fn size(&self) -> u64 {
        (CENTRAL_DIRECTORY_HEADER_FIXED_SIZE
            + self.name.as_bytes().len()
            + self.extra.size()
            + self.comment.len()) as u64
    }

    /// Returns the deflate option encoded in the flags.
    pub fn deflate_option(&self) -> DeflateOption {
        DeflateOption::from_flags(self.flags, self.method)
    }

    /// Returns true if the entry was written with a trailing data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & flags::DATA_DESCRIPTOR != 0
    }

    /// Returns true if the header carries a ZIP64 element.
    pub fn is_zip64(&self) -> bool {
        self.extra.zip64().is_some()
    }

    /// Returns true if the attributes were written by an MS-DOS compatible host.
    fn has_dos_attributes(&self) -> bool {
        self.version_made_by >> 8 == 0
    }

    /// Returns true if the MS-DOS attributes mark this entry as a folder.
    pub fn is_folder(&self) -> bool {
        self.has_dos_attributes() && self.external_attributes & attributes::DIRECTORY != 0
    }

    /// Returns true if the MS-DOS attributes mark this entry as a volume label.
    pub fn is_volume_label(&self) -> bool {
        self.has_dos_attributes() && self.external_attributes & attributes::VOLUME_LABEL != 0
    }

    /// Copies the data-related fields from `local` and records the local
    /// header position, adding only the ZIP64 fields that are needed.
    pub fn update_from_local(&mut self, local: &LocalFileHeader, local_header_offset: u64) {
        self.flags = local.flags;
        self.method = local.method;
        self.last_modified = local.last_modified;
        self.crc32 = local.crc32;
        self.compressed_size = local.compressed_size;
        self.uncompressed_size = local.uncompressed_size;
        self.local_header_offset = local_header_offset;
        self.name = local.name.clone();

        let zip64 = Zip64ExtraField {
            uncompressed_size: exceeds_u32(self.uncompressed_size)
                .then_some(self.uncompressed_size),
            compressed_size: exceeds_u32(self.compressed_size).then_some(self.compressed_size),
            local_header_offset: exceeds_u32(local_header_offset).then_some(local_header_offset),
            disk_number: None,
        };
        let needs_zip64 = !zip64.usage().is_empty();
        self.extra.set_zip64(needs_zip64.then_some(zip64));

        self.version_needed = if needs_zip64 {
            version::ZIP64
        } else {
            local.version_needed
        };
    }

    /// Serializes the header.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let extra_len = u16::try_from(self.extra.size())
            .map_err(|_| Error::invalid_usage("extra field exceeds 65535 bytes"))?;
        let comment_len = u16::try_from(self.comment.len())
            .map_err(|_| Error::invalid_usage("entry comment exceeds 65535 bytes"))?;
        let name = self.name.as_bytes();
        let zip64_usage = self.extra.zip64().map(Zip64ExtraField::usage).unwrap_or_default();
        let escaped = |flag: Zip64Usage, value: u64| {
            if zip64_usage.contains(flag) {
                ZIP64_MARKER_U32
            } else {
                narrow_u32(value)
            }
        };

        let mut buf = Vec::with_capacity(self.size() as usize);
        write_u32_le(&mut buf, signature::CENTRAL_DIRECTORY_HEADER)?;
        write_u16_le(&mut buf, self.version_made_by)?;
        write_u16_le(&mut buf, self.version_needed)?;
        write_u16_le(&mut buf, self.flags)?;
        write_u16_le(&mut buf, self.method.as_u16())?;
        write_u16_le(&mut buf, self.last_modified.time_word())?;
        write_u16_le(&mut buf, self.last_modified.date_word())?;
        write_u32_le(&mut buf, self.crc32)?;
        write_u32_le(
            &mut buf,
            escaped(Zip64Usage::COMPRESSED_SIZE, self.compressed_size),
        )?;
        write_u32_le(
            &mut buf,
            escaped(Zip64Usage::UNCOMPRESSED_SIZE, self.uncompressed_size),
        )?;
        write_u16_le(&mut buf, name.len() as u16)?;
        write_u16_le(&mut buf, extra_len)?;
        write_u16_le(&mut buf, comment_len)?;
        write_u16_le(
            &mut buf,
            if zip64_usage.contains(Zip64Usage::DISK_NUMBER) {
                ZIP64_MARKER_U16
            } else {
                0
            },
        )?;
        write_u16_le(&mut buf, self.internal_attributes)?;
        write_u32_le(&mut buf, self.external_attributes)?;
        write_u32_le(
            &mut buf,
            escaped(Zip64Usage::LOCAL_HEADER_OFFSET, self.local_header_offset),
        )?;
        buf.extend_from_slice(name);
        self.extra.write_to(&mut buf)?;
        buf.extend_from_slice(&self.comment);

        w.write_all(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn local(name: &str) -> LocalFileHeader {
        LocalFileHeader::new(
            ArchivePath::new(name).unwrap(),
            CompressionMethod::Deflated,
            DeflateOption::Fast,
            false,
            DosDateTime::MIN,
        )
    }

    fn roundtrip(header: &CentralDirectoryFileHeader) -> CentralDirectoryFileHeader {
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, header.size());
        CentralDirectoryFileHeader::parse(&mut Cursor::new(buf), 0).unwrap()
    }

    #[test]
    fn test_mirror_of_local() {
        let mut lfh = local("word/document.xml");
        lfh.set_sizes(0xDEADBEEF, 100, 400);
        let cdfh = CentralDirectoryFileHeader::from_local(&lfh, 1234);

        assert_eq!(cdfh.version_made_by, 45);
        assert_eq!(cdfh.version_needed, 20);
        assert_eq!(cdfh.crc32, 0xDEADBEEF);
        assert_eq!(cdfh.deflate_option(), DeflateOption::Fast);
        assert!(!cdfh.is_zip64());
        assert_eq!(cdfh.size(), 46 + 17);
        assert_eq!(roundtrip(&cdfh), cdfh);
    }

    #[test]
    fn test_zip64_threshold() {
        let mut lfh = local("big");
        lfh.set_sizes(0, 10, 0xFFFF_FFFE);
        let cdfh = CentralDirectoryFileHeader::from_local(&lfh, 0);
        assert!(!cdfh.is_zip64());
        assert_eq!(cdfh.version_needed, 20);

        lfh.set_sizes(0, 10, 0xFFFF_FFFF);
        let cdfh = CentralDirectoryFileHeader::from_local(&lfh, 0);
        assert!(cdfh.is_zip64());
        assert_eq!(cdfh.version_needed, 45);
        let usage = cdfh.extra.zip64().unwrap().usage();
        assert_eq!(usage, Zip64Usage::UNCOMPRESSED_SIZE);

        let parsed = roundtrip(&cdfh);
        assert_eq!(parsed.uncompressed_size, 0xFFFF_FFFF);
        assert_eq!(parsed.compressed_size, 10);
    }

    #[test]
    fn test_large_offset_only() {
        let mut lfh = local("late");
        lfh.set_sizes(0, 1, 1);
        let cdfh = CentralDirectoryFileHeader::from_local(&lfh, 0x1_0000_0000);
        assert_eq!(
            cdfh.extra.zip64().unwrap().usage(),
            Zip64Usage::LOCAL_HEADER_OFFSET
        );
        assert_eq!(cdfh.version_needed, 45);
        assert_eq!(roundtrip(&cdfh).local_header_offset, 0x1_0000_0000);
    }

    #[test]
    fn test_dos_attributes() {
        let mut cdfh = CentralDirectoryFileHeader::from_local(&local("dir/"), 0);
        cdfh.external_attributes = attributes::DIRECTORY;
        assert!(cdfh.is_folder());
        assert!(!cdfh.is_volume_label());

        cdfh.external_attributes = attributes::VOLUME_LABEL;
        assert!(cdfh.is_volume_label());

        // Unix host: attributes are not MS-DOS compatible.
        cdfh.version_made_by = (3 << 8) | 20;
        assert!(!cdfh.is_volume_label());
    }

    #[test]
    fn test_comment_preserved() {
        let mut cdfh = CentralDirectoryFileHeader::from_local(&local("a"), 0);
        cdfh.comment = b"hello".to_vec();
        assert_eq!(roundtrip(&cdfh).comment, b"hello");
    }

    #[test]
    fn test_multi_disk_rejected() {
        let cdfh = CentralDirectoryFileHeader::from_local(&local("a"), 0);
        let mut buf = Vec::new();
        cdfh.write_to(&mut buf).unwrap();
        buf[34] = 1;
        let err = CentralDirectoryFileHeader::parse(&mut Cursor::new(buf), 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let cdfh = CentralDirectoryFileHeader::from_local(&local("a"), 0);
        let mut buf = Vec::new();
        cdfh.write_to(&mut buf).unwrap();
        buf[10] = 12; // bzip2
        let err = CentralDirectoryFileHeader::parse(&mut Cursor::new(buf), 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { method: 12 }));
    }
}
