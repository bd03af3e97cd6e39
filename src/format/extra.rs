//! Extra field sub-records.
//!
//! The extra field of local and central headers is a sequence of
//! `(id: u16, size: u16, data)` sub-records. Two of them are interpreted:
//!
//! - the ZIP64 extended information element (id `0x0001`), whose contents
//!   depend on which header fields carry the escape marker, and
//! - a padding element (id `0xA220`, internal signature `0xA028`) that
//!   reserves spare bytes in local headers.
//!
//! Every other sub-record is preserved byte-for-byte.
//!
//! # Padding
//!
//! Whether a local header needs a ZIP64 element is only known once the
//! final size of the entry is known. Fresh local headers therefore reserve a
//! padding element exactly as large as a local ZIP64 element, so promoting
//! an entry to ZIP64 (or demoting it back) changes nothing but the header
//! contents: no byte of file data after the header has to move.

use std::io::{self, Write};
use std::ops::{BitOr, BitOrAssign};

use super::reader::{u16_at, u32_at, u64_at, write_u16_le, write_u32_le, write_u64_le};
use crate::{Error, Result};

/// Sub-record id of the ZIP64 extended information element.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Sub-record id of the padding element.
pub const PADDING_EXTRA_ID: u16 = 0xA220;

/// Signature stored in the first two data bytes of the padding element.
pub const PADDING_SIGNATURE: u16 = 0xA028;

/// Size of a sub-record header (id + size).
const SUB_RECORD_HEADER_SIZE: usize = 4;

/// Smallest possible padding element (header + signature, no padding bytes).
const PADDING_MIN_SIZE: usize = SUB_RECORD_HEADER_SIZE + 2;

/// Total size of the padding element reserved in fresh local headers.
///
/// Equals the size of a local ZIP64 element carrying both sizes.
pub const INITIAL_PADDING_SIZE: usize = SUB_RECORD_HEADER_SIZE + 16;

/// Which fields a ZIP64 element carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Zip64Usage(u8);

impl Zip64Usage {
    /// No field.
    pub const NONE: Self = Self(0);
    /// Uncompressed size (8 bytes).
    pub const UNCOMPRESSED_SIZE: Self = Self(1);
    /// Compressed size (8 bytes).
    pub const COMPRESSED_SIZE: Self = Self(2);
    /// Offset of the local header (8 bytes).
    pub const LOCAL_HEADER_OFFSET: Self = Self(4);
    /// Disk number start (4 bytes).
    pub const DISK_NUMBER: Self = Self(8);

    /// Returns true if all flags of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Zip64Usage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Zip64Usage {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The ZIP64 extended information element.
///
/// Fields appear on disk in declaration order; absent fields take no space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64ExtraField {
    /// Uncompressed size.
    pub uncompressed_size: Option<u64>,
    /// Compressed size.
    pub compressed_size: Option<u64>,
    /// Offset of the local header.
    pub local_header_offset: Option<u64>,
    /// Disk number start.
    pub disk_number: Option<u32>,
}

impl Zip64ExtraField {
    fn parse(data: &[u8], usage: Zip64Usage, offset: u64) -> Result<Self> {
        let mut pos = 0usize;
        let mut field = Self::default();
        let truncated = || Error::corrupted(offset, "ZIP64 extra field is too short");

        if usage.contains(Zip64Usage::UNCOMPRESSED_SIZE) {
            field.uncompressed_size = Some(u64_at(data, pos).ok_or_else(truncated)?);
            pos += 8;
        }
        if usage.contains(Zip64Usage::COMPRESSED_SIZE) {
            field.compressed_size = Some(u64_at(data, pos).ok_or_else(truncated)?);
            pos += 8;
        }
        if usage.contains(Zip64Usage::LOCAL_HEADER_OFFSET) {
            field.local_header_offset = Some(u64_at(data, pos).ok_or_else(truncated)?);
            pos += 8;
        }
        if usage.contains(Zip64Usage::DISK_NUMBER) {
            field.disk_number = Some(u32_at(data, pos).ok_or_else(truncated)?);
        }
        Ok(field)
    }

    /// Returns the set of fields present.
    pub fn usage(&self) -> Zip64Usage {
        let mut usage = Zip64Usage::NONE;
        if self.uncompressed_size.is_some() {
            usage |= Zip64Usage::UNCOMPRESSED_SIZE;
        }
        if self.compressed_size.is_some() {
            usage |= Zip64Usage::COMPRESSED_SIZE;
        }
        if self.local_header_offset.is_some() {
            usage |= Zip64Usage::LOCAL_HEADER_OFFSET;
        }
        if self.disk_number.is_some() {
            usage |= Zip64Usage::DISK_NUMBER;
        }
        usage
    }

    fn data_size(&self) -> usize {
        [
            self.uncompressed_size.is_some(),
            self.compressed_size.is_some(),
            self.local_header_offset.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
            * 8
            + if self.disk_number.is_some() { 4 } else { 0 }
    }

    /// Returns the on-disk size including the sub-record header.
    pub fn size(&self) -> usize {
        SUB_RECORD_HEADER_SIZE + self.data_size()
    }

    fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        write_u16_le(w, ZIP64_EXTRA_ID)?;
        write_u16_le(w, self.data_size() as u16)?;
        for value in [
            self.uncompressed_size,
            self.compressed_size,
            self.local_header_offset,
        ]
        .into_iter()
        .flatten()
        {
            write_u64_le(w, value)?;
        }
        if let Some(disk) = self.disk_number {
            write_u32_le(w, disk)?;
        }
        Ok(())
    }
}

/// The padding element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingExtraField {
    padding_len: u16,
}

impl PaddingExtraField {
    /// Creates a padding element with the given total on-disk size.
    ///
    /// Returns `None` if `size` is too small to hold the element header.
    pub fn with_size(size: usize) -> Option<Self> {
        let padding_len = size.checked_sub(PADDING_MIN_SIZE)?;
        Some(Self {
            padding_len: u16::try_from(padding_len).ok()?,
        })
    }

    /// Returns the number of spare bytes after the signature.
    pub fn padding_len(&self) -> u16 {
        self.padding_len
    }

    /// Returns the on-disk size including the sub-record header.
    pub fn size(&self) -> usize {
        PADDING_MIN_SIZE + self.padding_len as usize
    }

    fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        write_u16_le(w, PADDING_EXTRA_ID)?;
        write_u16_le(w, 2 + self.padding_len)?;
        write_u16_le(w, PADDING_SIGNATURE)?;
        w.write_all(&vec![0u8; self.padding_len as usize])
    }
}

/// A sub-record this crate does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownExtraField {
    /// Sub-record id.
    pub id: u16,
    /// Raw data.
    pub data: Vec<u8>,
}

impl UnknownExtraField {
    fn size(&self) -> usize {
        SUB_RECORD_HEADER_SIZE + self.data.len()
    }
}

/// A parsed extra field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraField {
    zip64: Option<Zip64ExtraField>,
    padding: Option<PaddingExtraField>,
    unknown: Vec<UnknownExtraField>,
}

impl ExtraField {
    /// Creates an empty extra field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the extra field of a fresh local header (padding only).
    pub fn with_initial_padding() -> Self {
        Self {
            padding: PaddingExtraField::with_size(INITIAL_PADDING_SIZE),
            ..Self::default()
        }
    }

    /// Parses an extra field.
    ///
    /// `usage` lists the ZIP64 fields the owning header escaped; a ZIP64
    /// element must be present and carry them if it is not empty. `offset`
    /// locates the owning header for error messages.
    pub fn parse(data: &[u8], usage: Zip64Usage, offset: u64) -> Result<Self> {
        let mut extra = Self::default();
        let mut pos = 0usize;

        while pos < data.len() {
            let (Some(id), Some(size)) = (u16_at(data, pos), u16_at(data, pos + 2)) else {
                return Err(Error::corrupted(offset, "truncated extra field sub-record"));
            };
            let start = pos + SUB_RECORD_HEADER_SIZE;
            let end = start + size as usize;
            let Some(body) = data.get(start..end) else {
                return Err(Error::corrupted(
                    offset,
                    format!("extra field sub-record 0x{:04X} overruns the extra field", id),
                ));
            };

            match id {
                ZIP64_EXTRA_ID if !usage.is_empty() => {
                    if extra.zip64.is_some() {
                        return Err(Error::corrupted(offset, "duplicate ZIP64 extra field"));
                    }
                    extra.zip64 = Some(Zip64ExtraField::parse(body, usage, offset)?);
                }
                PADDING_EXTRA_ID
                    if extra.padding.is_none() && u16_at(body, 0) == Some(PADDING_SIGNATURE) =>
                {
                    extra.padding = Some(PaddingExtraField {
                        padding_len: size - 2,
                    });
                }
                _ => extra.unknown.push(UnknownExtraField {
                    id,
                    data: body.to_vec(),
                }),
            }
            pos = end;
        }

        if !usage.is_empty() && extra.zip64.is_none() {
            return Err(Error::corrupted(
                offset,
                "header escapes a field but has no ZIP64 extra field",
            ));
        }
        Ok(extra)
    }

    /// Returns the ZIP64 element, if present.
    pub fn zip64(&self) -> Option<&Zip64ExtraField> {
        self.zip64.as_ref()
    }

    /// Returns the padding element, if present.
    pub fn padding(&self) -> Option<&PaddingExtraField> {
        self.padding.as_ref()
    }

    /// Returns the preserved sub-records.
    pub fn unknown(&self) -> &[UnknownExtraField] {
        &self.unknown
    }

    /// Returns the on-disk size.
    pub fn size(&self) -> usize {
        self.zip64.as_ref().map_or(0, Zip64ExtraField::size)
            + self.unknown.iter().map(UnknownExtraField::size).sum::<usize>()
            + self.padding.as_ref().map_or(0, PaddingExtraField::size)
    }

    /// Replaces the ZIP64 element.
    pub fn set_zip64(&mut self, zip64: Option<Zip64ExtraField>) {
        if zip64.is_some() {
            self.unknown.retain(|field| field.id != ZIP64_EXTRA_ID);
        }
        self.zip64 = zip64.filter(|field| !field.usage().is_empty());
    }

    /// Replaces the ZIP64 element, absorbing the size change in the padding.
    ///
    /// Growth shrinks the padding when it has enough spare bytes; the
    /// element is dropped only when its total size equals the growth.
    /// Shrinkage grows the padding (creating it if there is room for one),
    /// so the extra field keeps its size.
    pub fn set_zip64_keeping_size(&mut self, zip64: Option<Zip64ExtraField>) {
        let old_size = self.size();
        self.set_zip64(zip64);
        let new_size = self.size();

        if new_size > old_size {
            let delta = new_size - old_size;
            match self.padding {
                Some(padding) if delta == padding.size() => self.padding = None,
                Some(ref mut padding) if delta <= padding.padding_len as usize => {
                    padding.padding_len -= delta as u16;
                }
                _ => {}
            }
        } else if new_size < old_size {
            let delta = old_size - new_size;
            match &mut self.padding {
                Some(padding) => {
                    if let Some(grown) = PaddingExtraField::with_size(padding.size() + delta) {
                        *padding = grown;
                    }
                }
                None => self.padding = PaddingExtraField::with_size(delta),
            }
        }
    }

    /// Serializes the extra field: ZIP64 element, preserved sub-records, padding.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        if let Some(zip64) = &self.zip64 {
            zip64.write_to(w)?;
        }
        for field in &self.unknown {
            write_u16_le(w, field.id)?;
            write_u16_le(w, field.data.len() as u16)?;
            w.write_all(&field.data)?;
        }
        if let Some(padding) = &self.padding {
            padding.write_to(w)?;
        }
        Ok(())
    }

    /// Serializes the extra field into a new vector.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size());
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_zip64(uncompressed: u64, compressed: u64) -> Zip64ExtraField {
        Zip64ExtraField {
            uncompressed_size: Some(uncompressed),
            compressed_size: Some(compressed),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_extra_field() {
        let extra = ExtraField::parse(&[], Zip64Usage::NONE, 0).unwrap();
        assert_eq!(extra.size(), 0);
        assert!(extra.to_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_to_bytes_matches_write_to() {
        let mut extra = ExtraField::with_initial_padding();
        extra.set_zip64_keeping_size(Some(local_zip64(0x1_0000_0000, 7)));
        let mut written = Vec::new();
        extra.write_to(&mut written).unwrap();

        let bytes = extra.to_bytes().unwrap();
        assert_eq!(bytes, written);
        assert_eq!(bytes.len(), extra.size());
        assert_eq!(&bytes[..2], &[0x01, 0x00]);
    }

    #[test]
    fn test_initial_padding_matches_local_zip64_size() {
        let extra = ExtraField::with_initial_padding();
        assert_eq!(extra.size(), INITIAL_PADDING_SIZE);
        assert_eq!(local_zip64(1, 1).size(), INITIAL_PADDING_SIZE);

        let bytes = extra.to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..6], &[0x20, 0xA2, 16, 0, 0x28, 0xA0]);
    }

    #[test]
    fn test_zip64_promotion_drops_exact_padding() {
        let mut extra = ExtraField::with_initial_padding();
        extra.set_zip64_keeping_size(Some(local_zip64(1 << 32, 1 << 32)));
        assert_eq!(extra.size(), INITIAL_PADDING_SIZE);
        assert!(extra.padding().is_none());

        extra.set_zip64_keeping_size(None);
        assert_eq!(extra.size(), INITIAL_PADDING_SIZE);
        assert_eq!(extra.padding().unwrap().size(), INITIAL_PADDING_SIZE);
    }

    #[test]
    fn test_partial_growth_shrinks_padding() {
        let mut extra = ExtraField::with_initial_padding();
        extra.set_zip64_keeping_size(Some(Zip64ExtraField {
            uncompressed_size: Some(1 << 33),
            ..Default::default()
        }));
        assert_eq!(extra.size(), INITIAL_PADDING_SIZE);
        assert_eq!(extra.padding().unwrap().padding_len(), 2);
    }

    #[test]
    fn test_growth_without_padding_grows_field() {
        let mut extra = ExtraField::new();
        extra.set_zip64_keeping_size(Some(local_zip64(1 << 32, 1 << 32)));
        assert_eq!(extra.size(), 20);
        assert!(extra.padding().is_none());
    }

    #[test]
    fn test_parse_zip64_by_usage() {
        let field = Zip64ExtraField {
            compressed_size: Some(0x1_0000_0000),
            local_header_offset: Some(0x2_0000_0000),
            ..Default::default()
        };
        let mut extra = ExtraField::new();
        extra.set_zip64(Some(field.clone()));
        let bytes = extra.to_bytes().unwrap();

        let usage = Zip64Usage::COMPRESSED_SIZE | Zip64Usage::LOCAL_HEADER_OFFSET;
        let parsed = ExtraField::parse(&bytes, usage, 0).unwrap();
        assert_eq!(parsed.zip64(), Some(&field));
        assert_eq!(parsed.zip64().unwrap().usage(), usage);
    }

    #[test]
    fn test_missing_zip64_is_corrupt() {
        let err = ExtraField::parse(&[], Zip64Usage::UNCOMPRESSED_SIZE, 7).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_short_zip64_is_corrupt() {
        let bytes = [0x01, 0x00, 0x04, 0x00, 1, 2, 3, 4];
        let usage = Zip64Usage::UNCOMPRESSED_SIZE;
        assert!(ExtraField::parse(&bytes, usage, 0).unwrap_err().is_corruption());
    }

    #[test]
    fn test_unescaped_zip64_preserved_as_unknown() {
        let bytes = [0x01, 0x00, 0x08, 0x00, 1, 0, 0, 0, 0, 0, 0, 0];
        let extra = ExtraField::parse(&bytes, Zip64Usage::NONE, 0).unwrap();
        assert!(extra.zip64().is_none());
        assert_eq!(extra.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        // Extended timestamp (0x5455) followed by a padding element.
        let mut bytes = vec![0x55, 0x54, 0x05, 0x00, 0x01, 0xAA, 0xBB, 0xCC, 0xDD];
        bytes.extend_from_slice(&[0x20, 0xA2, 0x03, 0x00, 0x28, 0xA0, 0x00]);
        let extra = ExtraField::parse(&bytes, Zip64Usage::NONE, 0).unwrap();
        assert_eq!(extra.unknown().len(), 1);
        assert_eq!(extra.unknown()[0].id, 0x5455);
        assert_eq!(extra.padding().unwrap().padding_len(), 1);
        assert_eq!(extra.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_padding_without_signature_is_unknown() {
        let bytes = [0x20, 0xA2, 0x02, 0x00, 0x00, 0x00];
        let extra = ExtraField::parse(&bytes, Zip64Usage::NONE, 0).unwrap();
        assert!(extra.padding().is_none());
        assert_eq!(extra.unknown().len(), 1);
    }

    #[test]
    fn test_overrunning_sub_record_is_corrupt() {
        let bytes = [0x55, 0x54, 0x10, 0x00, 0x01];
        assert!(ExtraField::parse(&bytes, Zip64Usage::NONE, 0).is_err());
        let bytes = [0x55, 0x54, 0x00];
        assert!(ExtraField::parse(&bytes, Zip64Usage::NONE, 0).is_err());
    }
}
