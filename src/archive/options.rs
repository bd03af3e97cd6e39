//! Open options for archives.

use crate::buffer::DEFAULT_SPILL_THRESHOLD;
use crate::{Error, Result};

/// Default number of compressed bytes buffered per entry before they are
/// handed to a streaming sink.
pub const DEFAULT_STREAMING_FLUSH_THRESHOLD: usize = 64 * 1024;

/// How the archive's stream or file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Start a new, empty archive, discarding any existing content.
    Create,
    /// Start a new archive; the target must not exist (or be empty).
    CreateNew,
    /// Open an existing archive.
    #[default]
    Open,
    /// Open an existing archive, or start a new one if there is none.
    OpenOrCreate,
}

/// What the caller intends to do with the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileAccess {
    /// Read entries only.
    Read,
    /// Write entries only (streaming archives).
    Write,
    /// Read and modify entries.
    #[default]
    ReadWrite,
}

impl FileAccess {
    /// Returns true if this access allows reading.
    pub fn can_read(self) -> bool {
        matches!(self, FileAccess::Read | FileAccess::ReadWrite)
    }

    /// Returns true if this access allows writing.
    pub fn can_write(self) -> bool {
        matches!(self, FileAccess::Write | FileAccess::ReadWrite)
    }

    /// Returns true if every right of `self` is also granted by `other`.
    pub fn is_subset_of(self, other: FileAccess) -> bool {
        (!self.can_read() || other.can_read()) && (!self.can_write() || other.can_write())
    }
}

/// What other openers of the same file may do.
///
/// The value is validated against the mode and access but is otherwise
/// advisory: no lock is taken on the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileShare {
    /// No sharing.
    #[default]
    None,
    /// Others may read.
    Read,
    /// Others may write.
    Write,
    /// Others may read and write.
    ReadWrite,
}

/// Options for opening or creating an archive.
///
/// # Example
///
/// ```rust
/// use zipblock::{FileAccess, FileMode, FileShare, OpenOptions};
///
/// let options = OpenOptions::new()
///     .mode(FileMode::Open)
///     .access(FileAccess::Read)
///     .share(FileShare::Read);
/// assert!(options.validate().is_ok());
///
/// // Streaming archives are write-only.
/// let invalid = OpenOptions::new().mode(FileMode::Create).streaming(true);
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub(crate) mode: FileMode,
    pub(crate) access: FileAccess,
    pub(crate) share: FileShare,
    pub(crate) streaming: bool,
    pub(crate) spill_threshold: u64,
    pub(crate) streaming_flush_threshold: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            mode: FileMode::Open,
            access: FileAccess::ReadWrite,
            share: FileShare::None,
            streaming: false,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            streaming_flush_threshold: DEFAULT_STREAMING_FLUSH_THRESHOLD,
        }
    }
}

impl OpenOptions {
    /// Creates options for opening an existing archive for modification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for reading an existing archive.
    pub fn read_only() -> Self {
        Self::new()
            .mode(FileMode::Open)
            .access(FileAccess::Read)
            .share(FileShare::Read)
    }

    /// Options for creating a new archive (replacing any existing one).
    pub fn create() -> Self {
        Self::new()
            .mode(FileMode::Create)
            .access(FileAccess::ReadWrite)
    }

    /// Options for writing a new archive to a forward-only sink.
    pub fn streaming_create() -> Self {
        Self::new()
            .mode(FileMode::Create)
            .access(FileAccess::Write)
            .streaming(true)
    }

    /// Sets the open mode.
    pub fn mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the access.
    pub fn access(mut self, access: FileAccess) -> Self {
        self.access = access;
        self
    }

    /// Sets the share mode.
    pub fn share(mut self, share: FileShare) -> Self {
        self.share = share;
        self
    }

    /// Selects streaming mode: entries are written once, in order, to a
    /// sink that is never read or seeked.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets how many bytes a buffer keeps in memory before spilling to a
    /// temporary file.
    pub fn spill_threshold(mut self, bytes: u64) -> Self {
        self.spill_threshold = bytes;
        self
    }

    /// Sets how many compressed bytes an entry buffers before they are
    /// handed to a streaming sink.
    pub fn streaming_flush_threshold(mut self, bytes: usize) -> Self {
        self.streaming_flush_threshold = bytes;
        self
    }

    /// Returns the open mode.
    pub fn get_mode(&self) -> FileMode {
        self.mode
    }

    /// Returns the access.
    pub fn get_access(&self) -> FileAccess {
        self.access
    }

    /// Returns the share mode.
    pub fn get_share(&self) -> FileShare {
        self.share
    }

    /// Returns true if streaming mode is selected.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Checks the combination of mode, access, share and streaming against
    /// the supported table.
    ///
    /// | streaming | mode | access | share |
    /// |-----------|------|--------|-------|
    /// | no | `Create`, `CreateNew`, `OpenOrCreate` | `ReadWrite` | `None`, `Read` |
    /// | no | `Open` | `ReadWrite` | `None`, `Read` |
    /// | no | `Open`, `OpenOrCreate` | `Read` | `Read`, `ReadWrite` |
    /// | yes | `Create`, `CreateNew` | `Write` | `None`, `Read` |
    pub fn validate(&self) -> Result<()> {
        use FileAccess as A;
        use FileMode as M;
        use FileShare as Sh;

        let supported = match (self.streaming, self.mode, self.access, self.share) {
            (
                false,
                M::Create | M::CreateNew | M::OpenOrCreate | M::Open,
                A::ReadWrite,
                Sh::None | Sh::Read,
            ) => true,
            (false, M::Open | M::OpenOrCreate, A::Read, Sh::Read | Sh::ReadWrite) => true,
            (true, M::Create | M::CreateNew, A::Write, Sh::None | Sh::Read) => true,
            _ => false,
        };
        if supported {
            Ok(())
        } else {
            Err(Error::InvalidOpenParameters {
                mode: self.mode,
                access: self.access,
                share: self.share,
                streaming: self.streaming,
            })
        }
    }
}
