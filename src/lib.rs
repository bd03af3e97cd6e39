//! # zipblock
//!
//! A mutable, random-access ZIP container engine.
//!
//! zipblock opens an existing ZIP archive (or starts a new one) inside any
//! seekable stream and lets you read, add, rewrite, resize and delete
//! entries in place. The archive is modelled as an ordered list of blocks
//! that tile the stream: raw unparsed regions, local file entries, the
//! central directory and the end-of-archive records. Saving moves and
//! rewrites only the blocks that changed, so editing one part of a large
//! document package leaves the rest of the bytes alone.
//!
//! Entries are stored or deflated. ZIP64 records are read and written when
//! sizes, offsets or entry counts outgrow the classic fields. A streaming
//! mode writes a new archive to a forward-only sink without ever seeking.
//!
//! ## Quick Start
//!
//! ### Editing an Archive
//!
//! ```rust,no_run
//! use std::io::Write;
//! use zipblock::{Archive, CompressionMethod, DeflateOption, FileAccess, OpenOptions, Result, StreamMode};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open_path("document.docx", &OpenOptions::new())?;
//!
//!     for info in archive.list_files()? {
//!         println!("{}: {} bytes", info.name, info.uncompressed_size);
//!     }
//!
//!     archive.delete_file("docProps/thumbnail.jpeg")?;
//!     {
//!         let mut entry = archive.add_file(
//!             "customXml/item1.xml",
//!             CompressionMethod::Deflated,
//!             DeflateOption::Normal,
//!         )?;
//!         let mut stream = entry.get_stream(StreamMode::Create, FileAccess::ReadWrite)?;
//!         stream.write_all(b"<root/>")?;
//!     }
//!
//!     archive.close()
//! }
//! ```
//!
//! ### Streaming Output
//!
//! ```rust
//! use std::io::Write;
//! use zipblock::{Archive, CompressionMethod, DeflateOption, FileAccess, Result, StreamMode};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::create_streaming(Vec::new())?;
//!     for (name, text) in [("a.txt", "first"), ("b.txt", "second")] {
//!         let mut entry = archive.add_file(name, CompressionMethod::Deflated, DeflateOption::Fast)?;
//!         entry
//!             .get_stream(StreamMode::Create, FileAccess::Write)?
//!             .write_all(text.as_bytes())?;
//!     }
//!     let bytes = archive.into_inner()?.into_inner();
//!     assert_eq!(&bytes[..4], b"PK\x03\x04");
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`format`] | Record layouts and their codecs |
//! | [`checksum`] | Progressive CRC-32 tracking |
//! | [`stream`] | The [`ArchiveStream`] trait and [`WriteOnly`] adapter |
//! | [`error`] | [`Error`] and [`Result`] |
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade: block
//! mapping, moves and saves at `debug`/`trace`, and failures during an
//! implicit save on drop at `warn`. Install any `log` backend to see them.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read and copy loops (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive_path;
pub mod checksum;
pub mod error;
pub mod format;
pub mod stream;
pub mod timestamp;

mod archive;
mod block;
mod buffer;
mod codec;
mod manager;

pub use archive::{
    Archive, DEFAULT_STREAMING_FLUSH_THRESHOLD, EntryInfo, EntryStream, FileAccess, FileMode,
    FileShare, OpenOptions, StreamMode, ZipEntry,
};
pub use archive_path::ArchivePath;
pub use buffer::DEFAULT_SPILL_THRESHOLD;
pub use error::{Error, Result};
pub use format::{CompressionMethod, DeflateOption};
pub use stream::{ArchiveStream, WriteOnly};
pub use timestamp::DosDateTime;
