//! Archive entries.

use super::options::FileAccess;
use super::stream::{EntryStream, StreamMode};
use crate::archive_path::ArchivePath;
use crate::block::BlockId;
use crate::format::central::CentralDirectoryFileHeader;
use crate::format::{CompressionMethod, DeflateOption};
use crate::manager::BlockManager;
use crate::stream::ArchiveStream;
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// Metadata of an entry as recorded in the central directory.
///
/// Sizes and CRC reflect the last save; entries modified since then report
/// their old values until the archive is flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Entry name.
    pub name: ArchivePath,
    /// Compression method.
    pub method: CompressionMethod,
    /// Deflate option recorded in the general purpose flags.
    pub deflate_option: DeflateOption,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Size of the stored (compressed) data.
    pub compressed_size: u64,
    /// Size of the uncompressed data.
    pub uncompressed_size: u64,
    /// Last modification time.
    pub last_modified: DosDateTime,
    /// True if the MS-DOS attributes mark the entry as a folder.
    pub is_folder: bool,
    /// True if the MS-DOS attributes mark the entry as a volume label.
    pub is_volume_label: bool,
    /// "Version made by" field.
    pub version_made_by: u16,
    /// "Version needed to extract" field.
    pub version_needed: u16,
    /// True if the central directory header carries a ZIP64 element.
    pub is_zip64: bool,
}

impl EntryInfo {
    pub(crate) fn from_central(header: &CentralDirectoryFileHeader) -> Self {
        Self {
            name: header.name.clone(),
            method: header.method,
            deflate_option: header.deflate_option(),
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            last_modified: header.last_modified,
            is_folder: header.is_folder(),
            is_volume_label: header.is_volume_label(),
            version_made_by: header.version_made_by,
            version_needed: header.version_needed,
            is_zip64: header.is_zip64(),
        }
    }
}

/// An entry of an open archive.
///
/// The entry borrows the archive mutably, so at most one entry (and one
/// stream over it) is in use at a time.
pub struct ZipEntry<'a, S> {
    manager: &'a mut BlockManager<S>,
    block: BlockId,
    info: EntryInfo,
    access: FileAccess,
}

impl<S> std::fmt::Debug for ZipEntry<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipEntry")
            .field("info", &self.info)
            .field("access", &self.access)
            .finish()
    }
}

impl<'a, S: ArchiveStream> ZipEntry<'a, S> {
    pub(crate) fn new(
        manager: &'a mut BlockManager<S>,
        block: BlockId,
        info: EntryInfo,
        access: FileAccess,
    ) -> Self {
        Self {
            manager,
            block,
            info,
            access,
        }
    }

    /// Returns the entry name.
    pub fn name(&self) -> &str {
        self.info.name.as_str()
    }

    /// Returns the recorded metadata.
    pub fn info(&self) -> &EntryInfo {
        &self.info
    }

    /// Returns the compression method.
    pub fn compression_method(&self) -> CompressionMethod {
        self.info.method
    }

    /// Returns the deflate level recorded in the general purpose flags.
    pub fn deflate_option(&self) -> DeflateOption {
        self.info.deflate_option
    }

    /// Returns the CRC-32 recorded in the central directory.
    pub fn crc32(&self) -> u32 {
        self.info.crc32
    }

    /// Returns the compressed size recorded in the central directory.
    pub fn compressed_size(&self) -> u64 {
        self.info.compressed_size
    }

    /// Returns the uncompressed size recorded in the central directory.
    pub fn uncompressed_size(&self) -> u64 {
        self.info.uncompressed_size
    }

    /// Returns the modification time.
    pub fn last_modified(&self) -> DosDateTime {
        self.info.last_modified
    }

    /// Returns true if the entry is a directory.
    pub fn is_folder(&self) -> bool {
        self.info.is_folder
    }

    /// Returns true if the entry is a volume label.
    pub fn is_volume_label(&self) -> bool {
        self.info.is_volume_label
    }

    /// Returns the current uncompressed length, including unsaved changes.
    pub fn len(&self) -> Result<u64> {
        self.manager.entry_len(self.block)
    }

    /// Returns true if the entry currently holds no data.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Opens a stream over the entry's uncompressed data.
    ///
    /// `access` must be allowed by the archive's own access. `Create`
    /// truncates the entry and `Append` positions the stream at its end;
    /// both need write access.
    pub fn get_stream(&mut self, mode: StreamMode, access: FileAccess) -> Result<EntryStream<'_, S>> {
        self.manager.check_open()?;
        if !access.is_subset_of(self.access) {
            return Err(Error::AccessDenied {
                operation: "get_stream",
            });
        }
        if matches!(mode, StreamMode::Create | StreamMode::Append) && !access.can_write() {
            return Err(Error::invalid_usage(format!(
                "stream mode {:?} needs write access",
                mode
            )));
        }

        let mut position = 0;
        match mode {
            StreamMode::Create => {
                if self.manager.entry_len(self.block)? > 0 {
                    self.manager.set_entry_len(self.block, 0)?;
                }
            }
            StreamMode::Append => position = self.manager.entry_len(self.block)?,
            StreamMode::Open | StreamMode::OpenOrCreate => {}
        }
        Ok(EntryStream::new(self.manager, self.block, position, access))
    }
}
