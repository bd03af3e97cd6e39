//! The public archive API.
//!
//! An [`Archive`] wraps a stream holding a ZIP container and lets callers
//! list, read, add, modify and delete entries. Nothing is rewritten until
//! [`Archive::flush`] or [`Archive::close`]; at that point only the parts
//! of the container that changed (or had to move) are written back.
//!
//! # Example
//!
//! ```rust
//! use std::io::{Cursor, Read, Write};
//! use zipblock::{Archive, CompressionMethod, DeflateOption, FileAccess, OpenOptions, StreamMode};
//!
//! # fn main() -> zipblock::Result<()> {
//! let mut archive = Archive::open(Cursor::new(Vec::new()), &OpenOptions::create())?;
//! {
//!     let mut entry = archive.add_file("hello.txt", CompressionMethod::Deflated, DeflateOption::Normal)?;
//!     let mut stream = entry.get_stream(StreamMode::Create, FileAccess::ReadWrite)?;
//!     stream.write_all(b"Hello, world!")?;
//! }
//! let bytes = archive.into_inner()?.into_inner();
//!
//! let mut archive = Archive::open(Cursor::new(bytes), &OpenOptions::read_only())?;
//! let mut entry = archive.get_file("hello.txt")?;
//! let mut text = String::new();
//! entry
//!     .get_stream(StreamMode::Open, FileAccess::Read)?
//!     .read_to_string(&mut text)?;
//! assert_eq!(text, "Hello, world!");
//! # Ok(())
//! # }
//! ```

mod entry;
mod options;
mod stream;

pub use entry::{EntryInfo, ZipEntry};
pub use options::{
    DEFAULT_STREAMING_FLUSH_THRESHOLD, FileAccess, FileMode, FileShare, OpenOptions,
};
pub use stream::{EntryStream, StreamMode};

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::archive_path::ArchivePath;
use crate::format::{CompressionMethod, DeflateOption};
use crate::manager::{BlockManager, ManagerConfig};
use crate::stream::{ArchiveStream, WriteOnly};
use crate::{Error, Result};

/// A ZIP archive open for reading, editing or streaming output.
///
/// Dropping an archive that has not been closed saves it; errors from that
/// save are logged and otherwise lost, so call [`Archive::close`] to see
/// them.
pub struct Archive<S: ArchiveStream> {
    manager: Option<BlockManager<S>>,
    access: FileAccess,
}

impl<S: ArchiveStream> std::fmt::Debug for Archive<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("manager", &self.manager)
            .field("access", &self.access)
            .finish()
    }
}

impl Archive<File> {
    /// Opens or creates an archive file.
    ///
    /// The file is opened according to the mode and access in `options`;
    /// the share mode is validated but not enforced.
    pub fn open_path(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let writable = options.access.can_write();

        let mut file_options = std::fs::OpenOptions::new();
        file_options.read(!options.streaming).write(writable);
        match options.mode {
            FileMode::Create => {
                file_options.create(true).truncate(true);
            }
            FileMode::CreateNew => {
                file_options.create_new(true);
            }
            FileMode::Open => {}
            FileMode::OpenOrCreate => {
                file_options.create(writable);
            }
        }

        let file = file_options.open(path)?;
        log::debug!("opened '{}' ({:?})", path.display(), options.mode);
        Self::open(file, options)
    }
}

impl<W: Write> Archive<WriteOnly<W>> {
    /// Starts a streaming archive that writes to a forward-only sink.
    ///
    /// Entries must be added and written one after the other; each entry is
    /// finished when the next one is added or the archive is closed.
    pub fn create_streaming(sink: W) -> Result<Self> {
        Self::open(WriteOnly::new(sink), &OpenOptions::streaming_create())
    }
}

impl<S: ArchiveStream> Archive<S> {
    /// Opens an archive held in `stream`.
    ///
    /// For existing archives the trailer and the central directory are
    /// parsed before this returns, so structural damage is reported here.
    pub fn open(mut stream: S, options: &OpenOptions) -> Result<Self> {
        options.validate()?;
        if !options.streaming && (!stream.is_seekable() || !stream.is_readable()) {
            return Err(Error::invalid_usage(
                "random-access archives need a readable, seekable stream",
            ));
        }

        let config = ManagerConfig {
            read_only: !options.access.can_write(),
            streaming: options.streaming,
            spill_threshold: options.spill_threshold,
            streaming_flush_threshold: options.streaming_flush_threshold,
        };

        let manager = if options.streaming {
            BlockManager::create(stream, config)?
        } else {
            let len = stream.stream_len()?;
            match options.mode {
                FileMode::Create => BlockManager::create(stream, config)?,
                FileMode::CreateNew if len == 0 => BlockManager::create(stream, config)?,
                FileMode::CreateNew => {
                    return Err(Error::invalid_usage(
                        "CreateNew needs an empty stream",
                    ));
                }
                FileMode::OpenOrCreate if len == 0 && config.read_only => {
                    return Err(Error::invalid_usage(
                        "cannot create an archive without write access",
                    ));
                }
                FileMode::OpenOrCreate if len == 0 => BlockManager::create(stream, config)?,
                FileMode::Open | FileMode::OpenOrCreate => {
                    let mut manager = BlockManager::open(stream, config)?;
                    manager.ensure_central()?;
                    manager
                }
            }
        };

        Ok(Self {
            manager: Some(manager),
            access: options.access,
        })
    }

    fn manager(&self) -> Result<&BlockManager<S>> {
        match &self.manager {
            Some(manager) if !manager.is_closed() => Ok(manager),
            _ => Err(Error::Disposed),
        }
    }

    fn manager_mut(&mut self) -> Result<&mut BlockManager<S>> {
        match &mut self.manager {
            Some(manager) if !manager.is_closed() => Ok(manager),
            _ => Err(Error::Disposed),
        }
    }

    /// Returns the access the archive was opened with.
    pub fn access(&self) -> FileAccess {
        self.access
    }

    /// Returns true if the archive writes to a forward-only sink.
    pub fn is_streaming(&self) -> bool {
        self.manager.as_ref().is_some_and(|m| m.is_streaming())
    }

    /// Returns true once the archive has been closed.
    pub fn is_closed(&self) -> bool {
        self.manager.as_ref().is_none_or(|m| m.is_closed())
    }

    /// Adds an empty entry.
    ///
    /// Fails with [`Error::EntryExists`] if the name is taken. In streaming
    /// mode the previously added entry is finished first.
    pub fn add_file(
        &mut self,
        name: &str,
        method: CompressionMethod,
        deflate_option: DeflateOption,
    ) -> Result<ZipEntry<'_, S>> {
        let path = ArchivePath::new(name)?;
        let access = self.access;
        let manager = self.manager_mut()?;
        let id = manager.add_file(path.clone(), method, deflate_option)?;
        let info = Self::info_of(manager, path.as_str())?;
        Ok(ZipEntry::new(manager, id, info, access))
    }

    /// Returns an existing entry.
    pub fn get_file(&mut self, name: &str) -> Result<ZipEntry<'_, S>> {
        let path = ArchivePath::new(name)?;
        let access = self.access;
        let manager = self.manager_mut()?;
        let id = manager.get_file(path.as_str())?;
        let info = Self::info_of(manager, path.as_str())?;
        Ok(ZipEntry::new(manager, id, info, access))
    }

    fn info_of(manager: &mut BlockManager<S>, name: &str) -> Result<EntryInfo> {
        manager
            .central_directory()?
            .get(name)
            .map(EntryInfo::from_central)
            .ok_or_else(|| Error::EntryNotFound {
                path: name.to_string(),
            })
    }

    /// Removes an entry. Its bytes are reclaimed on the next save.
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let path = ArchivePath::new(name)?;
        self.manager_mut()?.delete_file(path.as_str())
    }

    /// Returns true if an entry with this name exists.
    pub fn file_exists(&mut self, name: &str) -> Result<bool> {
        let path = ArchivePath::new(name)?;
        self.manager_mut()?.file_exists(path.as_str())
    }

    /// Lists the entries in central directory order.
    pub fn list_files(&mut self) -> Result<Vec<EntryInfo>> {
        Ok(self
            .manager_mut()?
            .central_directory()?
            .headers()
            .iter()
            .map(EntryInfo::from_central)
            .collect())
    }

    /// Returns the archive comment.
    pub fn comment(&self) -> Result<&[u8]> {
        self.manager()?.comment()
    }

    /// Replaces the archive comment (at most 65535 bytes).
    pub fn set_comment(&mut self, comment: impl Into<Vec<u8>>) -> Result<()> {
        self.manager_mut()?.set_comment(comment.into())
    }

    /// Writes pending changes to the stream. The archive stays open.
    pub fn flush(&mut self) -> Result<()> {
        self.manager_mut()?.flush()
    }

    /// Saves pending changes and closes the archive. Closing twice is a
    /// no-op; any other use afterwards fails with [`Error::Disposed`].
    pub fn close(&mut self) -> Result<()> {
        match &mut self.manager {
            Some(manager) => manager.close(),
            None => Ok(()),
        }
    }

    /// Closes the archive and returns the stream it was opened on.
    pub fn into_inner(mut self) -> Result<S> {
        let mut manager = self.manager.take().ok_or(Error::Disposed)?;
        manager.close()?;
        Ok(manager.into_inner())
    }
}

impl<S: ArchiveStream> Drop for Archive<S> {
    fn drop(&mut self) {
        if let Some(manager) = &mut self.manager {
            if !manager.is_closed() {
                if let Err(e) = manager.close() {
                    log::warn!("failed to save archive while dropping it: {}", e);
                }
            }
        }
    }
}
