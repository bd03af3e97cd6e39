//! The stream an archive lives in.
//!
//! An [`Archive`](crate::Archive) edits its container in place, so besides
//! `Read + Write + Seek` it needs to be able to cut the stream short after a
//! save shrinks the archive. [`ArchiveStream`] adds that operation and
//! describes what the stream can do.
//!
//! Forward-only sinks (sockets, pipes, HTTP bodies) are wrapped in
//! [`WriteOnly`], which is only accepted by archives opened in streaming
//! mode.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A byte stream that can hold a ZIP archive.
pub trait ArchiveStream: Read + Write + Seek {
    /// Truncates or extends the stream to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Returns the current length of the stream.
    fn stream_len(&mut self) -> io::Result<u64> {
        let position = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if position != len {
            self.seek(SeekFrom::Start(position))?;
        }
        Ok(len)
    }

    /// Returns false for sinks that can only be appended to.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Returns false for sinks that cannot be read back.
    fn is_readable(&self) -> bool {
        true
    }
}

impl ArchiveStream for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl ArchiveStream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

impl ArchiveStream for Cursor<&mut Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

impl<T: ArchiveStream + ?Sized> ArchiveStream for &mut T {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn stream_len(&mut self) -> io::Result<u64> {
        (**self).stream_len()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn is_readable(&self) -> bool {
        (**self).is_readable()
    }
}

impl<T: ArchiveStream + ?Sized> ArchiveStream for Box<T> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn stream_len(&mut self) -> io::Result<u64> {
        (**self).stream_len()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn is_readable(&self) -> bool {
        (**self).is_readable()
    }
}

fn unsupported(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} is not supported by a write-only sink", operation),
    )
}

/// Adapts a forward-only [`Write`] sink to [`ArchiveStream`].
///
/// Reads, seeks and truncation fail; the only position query that
/// succeeds is `SeekFrom::Current(0)`, answered from a byte counter.
#[derive(Debug)]
pub struct WriteOnly<W> {
    inner: W,
    position: u64,
}

impl<W: Write> WriteOnly<W> {
    /// Wraps a sink.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Returns the number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns a reference to the sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for WriteOnly<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Read for WriteOnly<W> {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported("reading"))
    }
}

impl<W: Write> Seek for WriteOnly<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(unsupported("seeking")),
        }
    }
}

impl<W: Write> ArchiveStream for WriteOnly<W> {
    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(unsupported("truncation"))
    }

    fn stream_len(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn is_readable(&self) -> bool {
        false
    }
}
