//! End of central directory record codec.
//!
//! ```text
//! offset  size  field
//!      0     4  signature 0x06054b50
//!      4     2  number of this disk
//!      6     2  disk where the central directory starts
//!      8     2  central directory entries on this disk
//!     10     2  total central directory entries
//!     12     4  central directory size
//!     16     4  central directory offset
//!     20     2  comment length
//!     22     n  comment
//! ```
//!
//! The record has no fixed position: it is found by scanning the tail of
//! the stream backwards for a signature whose comment length ends the
//! record exactly at the end of the stream.

use std::io::{Read, Seek, SeekFrom, Write};

use super::reader::{read_bytes, u16_at, u32_at, write_u16_le, write_u32_le};
use super::{ZIP64_MARKER_U16, ZIP64_MARKER_U32, signature};
use crate::{Error, Result};

/// Size of the fixed part of the record.
pub const EOCD_FIXED_SIZE: usize = 22;

/// Maximum comment length.
pub const MAX_COMMENT_LENGTH: usize = u16::MAX as usize;

/// Bytes read per step of the backward scan.
const SCAN_WINDOW: u64 = 4096;

/// A parsed end of central directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub central_directory_disk: u16,
    /// Central directory entries on this disk.
    pub entries_on_disk: u16,
    /// Total central directory entries.
    pub total_entries: u16,
    /// Central directory size in bytes.
    pub central_directory_size: u32,
    /// Offset of the central directory.
    pub central_directory_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Locates and parses the record, returning it with its offset.
    pub fn find<R: Read + Seek + ?Sized>(r: &mut R, stream_len: u64) -> Result<(u64, Self)> {
        let fixed = EOCD_FIXED_SIZE as u64;
        if stream_len < fixed {
            return Err(Error::corrupted(
                0,
                "stream is too short to hold an end of central directory record",
            ));
        }

        let lowest = stream_len.saturating_sub(fixed + MAX_COMMENT_LENGTH as u64);
        let mut window_end = stream_len;

        loop {
            let window_start = window_end.saturating_sub(SCAN_WINDOW).max(lowest);
            r.seek(SeekFrom::Start(window_start))?;
            let window = read_bytes(r, (window_end - window_start) as usize)?;
            log::trace!(
                "scanning for end of central directory in [{:#x}, {:#x})",
                window_start, window_end
            );

            // Candidates whose fixed part lies entirely inside the window.
            let candidates = window.len().saturating_sub(EOCD_FIXED_SIZE - 1);
            for i in (0..candidates).rev() {
                if u32_at(&window, i) != Some(signature::END_OF_CENTRAL_DIRECTORY) {
                    continue;
                }
                let comment_len = u16_at(&window, i + 20).unwrap_or_default() as u64;
                let position = window_start + i as u64;
                if position + fixed + comment_len == stream_len {
                    r.seek(SeekFrom::Start(position))?;
                    let record = Self::parse(r, position)?;
                    return Ok((position, record));
                }
            }

            if window_start == lowest {
                break;
            }
            // Overlap so a record straddling two windows is still seen whole.
            window_end = window_start + fixed - 1;
        }

        Err(Error::corrupted(
            stream_len,
            "end of central directory record not found",
        ))
    }

    /// Parses the record located at `offset`.
    pub fn parse<R: Read + ?Sized>(r: &mut R, offset: u64) -> Result<Self> {
        let fixed = read_bytes(r, EOCD_FIXED_SIZE)?;
        let field16 = |pos| u16_at(&fixed, pos).unwrap_or_default();
        let field32 = |pos| u32_at(&fixed, pos).unwrap_or_default();

        if field32(0) != signature::END_OF_CENTRAL_DIRECTORY {
            return Err(Error::corrupted(
                offset,
                "invalid end of central directory signature",
            ));
        }

        let comment_len = field16(20) as usize;
        Ok(Self {
            disk_number: field16(4),
            central_directory_disk: field16(6),
            entries_on_disk: field16(8),
            total_entries: field16(10),
            central_directory_size: field32(12),
            central_directory_offset: field32(16),
            comment: read_bytes(r, comment_len)?,
        })
    }

    /// Returns the on-disk size.
    pub fn size(&self) -> u64 {
        (EOCD_FIXED_SIZE + self.comment.len()) as u64
    }

    /// Returns true if any field carries the ZIP64 escape marker.
    pub fn hints_zip64(&self) -> bool {
        self.disk_number == ZIP64_MARKER_U16
            || self.central_directory_disk == ZIP64_MARKER_U16
            || self.entries_on_disk == ZIP64_MARKER_U16
            || self.total_entries == ZIP64_MARKER_U16
            || self.central_directory_size == ZIP64_MARKER_U32
            || self.central_directory_offset == ZIP64_MARKER_U32
    }

    /// Serializes the record.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let comment_len = u16::try_from(self.comment.len())
            .map_err(|_| Error::invalid_usage("archive comment exceeds 65535 bytes"))?;

        let mut buf = Vec::with_capacity(self.size() as usize);
        write_u32_le(&mut buf, signature::END_OF_CENTRAL_DIRECTORY)?;
        write_u16_le(&mut buf, self.disk_number)?;
        write_u16_le(&mut buf, self.central_directory_disk)?;
        write_u16_le(&mut buf, self.entries_on_disk)?;
        write_u16_le(&mut buf, self.total_entries)?;
        write_u32_le(&mut buf, self.central_directory_size)?;
        write_u32_le(&mut buf, self.central_directory_offset)?;
        write_u16_le(&mut buf, comment_len)?;
        buf.extend_from_slice(&self.comment);
        w.write_all(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(record: &EndOfCentralDirectory) -> Vec<u8> {
        let mut buf = Vec::new();
        record.write_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_empty_archive() {
        let bytes = encode(&EndOfCentralDirectory::default());
        assert_eq!(bytes.len(), 22);
        let (offset, record) = EndOfCentralDirectory::find(&mut Cursor::new(&bytes), 22).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(record, EndOfCentralDirectory::default());
    }

    #[test]
    fn test_find_after_data_with_comment() {
        let record = EndOfCentralDirectory {
            comment: b"a comment".to_vec(),
            ..Default::default()
        };
        let mut bytes = vec![0xAAu8; 10_000];
        bytes.extend(encode(&record));
        let len = bytes.len() as u64;
        let (offset, found) = EndOfCentralDirectory::find(&mut Cursor::new(bytes), len).unwrap();
        assert_eq!(offset, 10_000);
        assert_eq!(found.comment, b"a comment");
    }

    #[test]
    fn test_signature_inside_comment_is_skipped() {
        // The comment contains something that looks like a record but whose
        // comment length does not reach the end of the stream.
        let mut comment = encode(&EndOfCentralDirectory::default());
        comment.extend_from_slice(b"tail");
        let record = EndOfCentralDirectory {
            comment: comment.clone(),
            ..Default::default()
        };
        let bytes = encode(&record);
        let len = bytes.len() as u64;
        let (offset, found) = EndOfCentralDirectory::find(&mut Cursor::new(bytes), len).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(found.comment, comment);
    }

    #[test]
    fn test_record_straddling_scan_windows() {
        let record = EndOfCentralDirectory {
            comment: vec![b'x'; 4090],
            ..Default::default()
        };
        let mut bytes = vec![0u8; 5000];
        bytes.extend(encode(&record));
        let len = bytes.len() as u64;
        let (offset, _) = EndOfCentralDirectory::find(&mut Cursor::new(bytes), len).unwrap();
        assert_eq!(offset, 5000);
    }

    #[test]
    fn test_missing_record_is_corrupt() {
        let bytes = vec![0u8; 100];
        let err = EndOfCentralDirectory::find(&mut Cursor::new(bytes), 100).unwrap_err();
        assert!(err.is_corruption());

        let err = EndOfCentralDirectory::find(&mut Cursor::new(vec![0u8; 3]), 3).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_hints_zip64() {
        let mut record = EndOfCentralDirectory::default();
        assert!(!record.hints_zip64());
        record.total_entries = 0xFFFF;
        assert!(record.hints_zip64());
        record.total_entries = 0;
        record.central_directory_offset = 0xFFFF_FFFF;
        assert!(record.hints_zip64());
    }
}
