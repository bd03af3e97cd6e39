//! Error types for ZIP container operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when working with ZIP archives, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Categories
//!
//! | Category | Variants | Archive still usable? |
//! |----------|----------|-----------------------|
//! | I/O | [`Io`][Error::Io] | depends on the stream |
//! | Corruption | [`CorruptedData`][Error::CorruptedData], [`CrcMismatch`][Error::CrcMismatch] | no |
//! | Unsupported | [`UnsupportedFeature`][Error::UnsupportedFeature], [`UnsupportedMethod`][Error::UnsupportedMethod], [`UnsupportedVersion`][Error::UnsupportedVersion] | no |
//! | Invalid usage | [`InvalidArchivePath`][Error::InvalidArchivePath], [`EntryExists`][Error::EntryExists], [`EntryNotFound`][Error::EntryNotFound], [`InvalidOpenParameters`][Error::InvalidOpenParameters], [`AccessDenied`][Error::AccessDenied], [`InvalidUsage`][Error::InvalidUsage] | yes |
//! | Lifecycle | [`Disposed`][Error::Disposed] | no (already closed) |
//!
//! ## Using the `?` Operator
//!
//! ```rust,no_run
//! use zipblock::{Archive, OpenOptions, Result};
//!
//! fn count_entries(path: &str) -> Result<usize> {
//!     let mut archive = Archive::open_path(path, &OpenOptions::read_only())?;
//!     Ok(archive.list_files()?.len())
//! }
//! ```
//!
//! ## Matching on Categories
//!
//! ```rust
//! use zipblock::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     if error.is_corruption() {
//!         "the archive is damaged"
//!     } else if error.is_unsupported() {
//!         "the archive uses a feature this library refuses to handle"
//!     } else if error.is_invalid_usage() {
//!         "the request was invalid; the archive is still usable"
//!     } else {
//!         "other error"
//!     }
//! }
//! ```

use std::io;

use crate::archive::{FileAccess, FileMode, FileShare};

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch")?;
        if let Some(name) = self.entry_name {
            write!(f, " for entry '{}'", name)?;
        }
        write!(f, ": expected {:#x}, got {:#x}", self.expected, self.actual)
    }
}

/// The main error type for ZIP container operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the underlying stream.
    ///
    /// # Example
    ///
    /// ```rust
    /// use zipblock::Error;
    /// use std::io::ErrorKind;
    ///
    /// fn handle_io_error(error: &Error) {
    ///     if let Error::Io(e) = error {
    ///         match e.kind() {
    ///             ErrorKind::NotFound => println!("File not found"),
    ///             ErrorKind::PermissionDenied => println!("Access denied"),
    ///             _ => println!("I/O error: {}", e),
    ///         }
    ///     }
    /// }
    /// ```
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A structural invariant of the archive was violated.
    ///
    /// This covers signature mismatches, records that run past the end of
    /// the stream, overlapping entries and size/offset disagreements between
    /// the central directory and the end-of-central-directory records.
    /// The archive must be considered unusable.
    #[error("Corrupted data at offset {offset:#x}: {reason}")]
    CorruptedData {
        /// The byte offset where the problem was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The CRC-32 of an entry does not match the value recorded in its headers.
    #[error("{}", CrcMismatchDisplay { entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry name (if known).
        entry_name: Option<String>,
        /// The CRC recorded in the archive.
        expected: u32,
        /// The CRC computed from the data.
        actual: u32,
    },

    /// The archive uses a feature this library rejects by policy.
    ///
    /// Encryption, digital signatures and multi-disk archives are refused
    /// even when the caller never touches the affected entry.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// An entry uses a compression method other than store (0) or deflate (8).
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The raw method id from the header.
        method: u16,
    },

    /// A header declares a "version needed to extract" outside 1.0/1.1/2.0/4.5.
    #[error("Unsupported version needed to extract: {version}")]
    UnsupportedVersion {
        /// The raw version value from the header.
        version: u16,
    },

    /// An entry name is invalid.
    ///
    /// Names must be non-empty after trimming whitespace, must not contain
    /// NUL bytes and must encode to at most 65535 bytes.
    #[error("Invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// An entry with this name already exists.
    #[error("Entry already exists: {path}")]
    EntryExists {
        /// The conflicting name.
        path: String,
    },

    /// No entry with this name exists.
    #[error("Entry not found: {path}")]
    EntryNotFound {
        /// The name that was looked up.
        path: String,
    },

    /// The combination of open parameters is not supported.
    #[error(
        "Unsupported open parameters: mode {mode:?}, access {access:?}, share {share:?}, streaming {streaming}"
    )]
    InvalidOpenParameters {
        /// Requested open mode.
        mode: FileMode,
        /// Requested access.
        access: FileAccess,
        /// Requested share mode.
        share: FileShare,
        /// Whether streaming mode was requested.
        streaming: bool,
    },

    /// The operation is not permitted by the access the archive was opened with.
    #[error("Operation not permitted by archive access mode: {operation}")]
    AccessDenied {
        /// The operation that was refused.
        operation: &'static str,
    },

    /// The operation is not valid in the current state.
    #[error("Invalid operation: {0}")]
    InvalidUsage(String),

    /// The archive has already been closed.
    #[error("archive has been closed")]
    Disposed,
}

impl Error {
    /// Returns `true` if this is a data corruption error.
    ///
    /// Corruption errors indicate the archive is damaged and unusable.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptedData { .. } | Error::CrcMismatch { .. }
        )
    }

    /// Returns `true` if this error is related to unsupported features or methods.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFeature { .. }
                | Error::UnsupportedMethod { .. }
                | Error::UnsupportedVersion { .. }
        )
    }

    /// Returns `true` if the error was caused by an invalid request.
    ///
    /// The archive remains usable after these errors.
    pub fn is_invalid_usage(&self) -> bool {
        matches!(
            self,
            Error::InvalidArchivePath(_)
                | Error::EntryExists { .. }
                | Error::EntryNotFound { .. }
                | Error::InvalidOpenParameters { .. }
                | Error::AccessDenied { .. }
                | Error::InvalidUsage(_)
        )
    }

    /// Returns `true` if the archive was already closed.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Error::Disposed)
    }

    /// Returns the entry name associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::CrcMismatch { entry_name, .. } => entry_name.as_deref(),
            Error::EntryExists { path } | Error::EntryNotFound { path } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Creates a CorruptedData error.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptedData {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an InvalidUsage error.
    pub fn invalid_usage(reason: impl Into<String>) -> Self {
        Error::InvalidUsage(reason.into())
    }

    /// Turns an unexpected end of stream while parsing a record at `offset`
    /// into a corruption error; other errors pass through.
    pub(crate) fn truncated_at(self, offset: u64) -> Self {
        match self {
            Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Error::corrupted(offset, "record extends past the end of the archive")
            }
            other => other,
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for ZIP container operations.
///
/// This is defined as `std::result::Result<T, Error>` for convenience.
pub type Result<T> = std::result::Result<T, Error>;
