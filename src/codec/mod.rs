//! Compression layer for deflated entries.
//!
//! Entries are stored either verbatim or deflated (RFC 1951). A stored
//! entry's data is addressed directly; a deflated entry goes through a
//! [`CompressionStream`], which presents the uncompressed image of the entry
//! on top of the compressed bytes held by the entry's [`CompressedData`].

pub mod deflate;

use std::io;

pub use deflate::CompressionStream;

/// Random access to the compressed bytes of one entry.
///
/// The compression layer only ever appends to or resets the compressed
/// data; it never rewrites it in the middle.
pub trait CompressedData {
    /// Returns the length of the compressed data.
    fn compressed_len(&self) -> u64;

    /// Reads compressed bytes starting at `position`.
    ///
    /// Returns the number of bytes read, zero at the end.
    fn read_compressed(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Appends compressed bytes.
    fn append_compressed(&mut self, data: &[u8]) -> io::Result<()>;

    /// Discards all compressed bytes.
    fn reset_compressed(&mut self) -> io::Result<()>;

    /// Returns the archive offset of the compressed data, for error reports.
    fn data_offset(&self) -> u64;
}
