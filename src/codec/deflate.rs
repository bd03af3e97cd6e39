//! Deflate compression layer.
//!
//! A [`CompressionStream`] gives random access to the uncompressed image of
//! a deflated entry. Deflate itself only supports sequential access, so the
//! stream switches between modes depending on how the entry is used:
//!
//! | Mode | Entered when | Cost |
//! |------|--------------|------|
//! | idle | nothing has been touched yet, or after a flush | none |
//! | sequential read | reading from offset 0 | streaming inflate |
//! | write-through | writing from offset 0 into an empty entry | streaming deflate |
//! | emulation | any other access pattern | whole entry inflated into a [`SpillBuffer`] |
//!
//! Emulation is sticky: once an entry has been inflated it stays inflated
//! until the entry is dropped, and is deflated again on every flush that
//! follows a modification.

use std::io::Write;

use flate2::write::DeflateEncoder as FlateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use super::CompressedData;
use crate::buffer::SpillBuffer;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Incremental inflater reading its input from [`CompressedData`].
struct InflateCursor {
    inflater: Decompress,
    input: Vec<u8>,
    input_start: usize,
    input_end: usize,
    compressed_position: u64,
    output_position: u64,
    finished: bool,
}

impl std::fmt::Debug for InflateCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InflateCursor")
            .field("compressed_position", &self.compressed_position)
            .field("output_position", &self.output_position)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl InflateCursor {
    fn new() -> Self {
        Self {
            inflater: Decompress::new(false),
            input: vec![0u8; READ_BUFFER_SIZE],
            input_start: 0,
            input_end: 0,
            compressed_position: 0,
            output_position: 0,
            finished: false,
        }
    }

    /// Inflates into `buf`, returning the number of bytes produced.
    ///
    /// Returns zero once the deflate stream has ended.
    fn read<D: CompressedData + ?Sized>(&mut self, data: &mut D, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.finished {
                return Ok(0);
            }

            if self.input_start == self.input_end && self.compressed_position < data.compressed_len()
            {
                let n = data.read_compressed(self.compressed_position, &mut self.input)?;
                if n == 0 {
                    return Err(Error::corrupted(
                        data.data_offset(),
                        "compressed data ends early",
                    ));
                }
                self.compressed_position += n as u64;
                self.input_start = 0;
                self.input_end = n;
            }

            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(
                    &self.input[self.input_start..self.input_end],
                    buf,
                    FlushDecompress::None,
                )
                .map_err(|e| {
                    Error::corrupted(data.data_offset(), format!("invalid deflate data: {}", e))
                })?;
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            self.input_start += consumed;
            self.output_position += produced as u64;

            if status == Status::StreamEnd {
                self.finished = true;
            }
            if produced > 0 {
                return Ok(produced);
            }
            if self.finished {
                return Ok(0);
            }
            let input_exhausted = self.input_start == self.input_end
                && self.compressed_position >= data.compressed_len();
            if consumed == 0 && (input_exhausted || self.input_start < self.input_end) {
                return Err(Error::corrupted(
                    data.data_offset(),
                    "deflate stream ends before the end of the entry",
                ));
            }
        }
    }
}

enum Mode {
    Idle,
    Reading(InflateCursor),
    WriteThrough(FlateEncoder<Vec<u8>>),
    Emulation { image: SpillBuffer, dirty: bool },
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => f.write_str("Idle"),
            Mode::Reading(cursor) => f.debug_tuple("Reading").field(cursor).finish(),
            Mode::WriteThrough(_) => f.write_str("WriteThrough"),
            Mode::Emulation { image, dirty } => f
                .debug_struct("Emulation")
                .field("len", &image.len())
                .field("dirty", dirty)
                .finish(),
        }
    }
}

/// Random-access uncompressed view of a deflated entry.
#[derive(Debug)]
pub struct CompressionStream {
    level: u32,
    uncompressed_len: u64,
    spill_threshold: u64,
    mode: Mode,
}

impl CompressionStream {
    /// Creates the stream of a new, empty entry.
    pub fn new_empty(level: u32, spill_threshold: u64) -> Self {
        Self {
            level,
            uncompressed_len: 0,
            spill_threshold,
            mode: Mode::WriteThrough(FlateEncoder::new(Vec::new(), Compression::new(level))),
        }
    }

    /// Creates the stream of an existing entry of `uncompressed_len` bytes.
    pub fn existing(level: u32, uncompressed_len: u64, spill_threshold: u64) -> Self {
        Self {
            level,
            uncompressed_len,
            spill_threshold,
            mode: Mode::Idle,
        }
    }

    /// Returns the uncompressed length.
    pub fn len(&self) -> u64 {
        self.uncompressed_len
    }

    /// Returns true if the uncompressed image is empty.
    pub fn is_empty(&self) -> bool {
        self.uncompressed_len == 0
    }

    /// Returns true if the compressed data lags behind the uncompressed image.
    pub fn is_dirty(&self) -> bool {
        matches!(
            self.mode,
            Mode::WriteThrough(_) | Mode::Emulation { dirty: true, .. }
        )
    }

    /// Returns true if the whole entry is held inflated.
    pub fn is_emulating(&self) -> bool {
        matches!(self.mode, Mode::Emulation { .. })
    }

    fn new_encoder(&self) -> FlateEncoder<Vec<u8>> {
        FlateEncoder::new(Vec::new(), Compression::new(self.level))
    }

    /// Reads uncompressed bytes starting at `position`.
    pub fn read_at<D: CompressedData + ?Sized>(
        &mut self,
        data: &mut D,
        position: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        if position >= self.uncompressed_len || buf.is_empty() {
            return Ok(0);
        }
        let want = (self.uncompressed_len - position).min(buf.len() as u64) as usize;
        let buf = &mut buf[..want];

        if matches!(self.mode, Mode::Idle) && position == 0 {
            self.mode = Mode::Reading(InflateCursor::new());
        }
        if let Mode::Reading(cursor) = &mut self.mode {
            if cursor.output_position == position {
                let n = cursor.read(data, buf)?;
                if n == 0 {
                    return Err(Error::corrupted(
                        data.data_offset(),
                        "deflate stream is shorter than the recorded size",
                    ));
                }
                return Ok(n);
            }
        }

        self.enter_emulation(data)?;
        match &mut self.mode {
            Mode::Emulation { image, .. } => Ok(image.read_at(position, buf)?),
            _ => Ok(0),
        }
    }

    /// Writes uncompressed bytes at `position`.
    pub fn write_at<D: CompressedData + ?Sized>(
        &mut self,
        data: &mut D,
        position: u64,
        bytes: &[u8],
    ) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        if !matches!(self.mode, Mode::WriteThrough(_) | Mode::Emulation { .. })
            && self.uncompressed_len == 0
            && position == 0
        {
            // The compressed form of an empty entry is disposable.
            data.reset_compressed()?;
            self.mode = Mode::WriteThrough(self.new_encoder());
        }

        if let Mode::WriteThrough(encoder) = &mut self.mode {
            if position == self.uncompressed_len {
                encoder.write_all(bytes)?;
                self.uncompressed_len += bytes.len() as u64;
                return Self::drain(encoder, data);
            }
        }

        self.enter_emulation(data)?;
        if let Mode::Emulation { image, dirty } = &mut self.mode {
            image.write_at(position, bytes)?;
            *dirty = true;
            self.uncompressed_len = image.len();
        }
        Ok(())
    }

    /// Truncates or zero-extends the uncompressed image.
    pub fn set_len<D: CompressedData + ?Sized>(&mut self, data: &mut D, len: u64) -> Result<()> {
        if len == 0 {
            data.reset_compressed()?;
            self.uncompressed_len = 0;
            self.mode = Mode::WriteThrough(self.new_encoder());
            return Ok(());
        }
        if len == self.uncompressed_len {
            return Ok(());
        }

        self.enter_emulation(data)?;
        if let Mode::Emulation { image, dirty } = &mut self.mode {
            image.set_len(len)?;
            *dirty = true;
            self.uncompressed_len = len;
        }
        Ok(())
    }

    /// Brings the compressed data up to date.
    ///
    /// With `finish` set, a write-through encoder is finished and the
    /// compressed data becomes a complete deflate stream. Without it, only
    /// the bytes the encoder has already produced are handed over, which is
    /// what a forward-only sink wants between entries' flushes.
    pub fn flush<D: CompressedData + ?Sized>(&mut self, data: &mut D, finish: bool) -> Result<()> {
        match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::WriteThrough(mut encoder) => {
                if finish {
                    let tail = encoder.finish()?;
                    data.append_compressed(&tail)?;
                } else {
                    Self::drain(&mut encoder, data)?;
                    self.mode = Mode::WriteThrough(encoder);
                }
            }
            Mode::Emulation { mut image, dirty } => {
                if dirty {
                    self.deflate_image(&mut image, data)?;
                }
                self.mode = Mode::Emulation {
                    image,
                    dirty: false,
                };
            }
            Mode::Reading(_) | Mode::Idle => {}
        }
        Ok(())
    }

    fn drain<D: CompressedData + ?Sized>(
        encoder: &mut FlateEncoder<Vec<u8>>,
        data: &mut D,
    ) -> Result<()> {
        let produced = encoder.get_mut();
        if !produced.is_empty() {
            data.append_compressed(produced)?;
            produced.clear();
        }
        Ok(())
    }

    fn deflate_image<D: CompressedData + ?Sized>(
        &self,
        image: &mut SpillBuffer,
        data: &mut D,
    ) -> Result<()> {
        log::trace!("deflating {} byte entry image", image.len());
        data.reset_compressed()?;
        let mut encoder = self.new_encoder();
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        let mut position = 0u64;
        loop {
            let n = image.read_at(position, &mut chunk)?;
            if n == 0 {
                break;
            }
            encoder.write_all(&chunk[..n])?;
            position += n as u64;
            Self::drain(&mut encoder, data)?;
        }
        let tail = encoder.finish()?;
        data.append_compressed(&tail)?;
        Ok(())
    }

    /// Switches to emulation, inflating the whole entry once.
    fn enter_emulation<D: CompressedData + ?Sized>(&mut self, data: &mut D) -> Result<()> {
        match std::mem::replace(&mut self.mode, Mode::Idle) {
            emulation @ Mode::Emulation { .. } => {
                self.mode = emulation;
                return Ok(());
            }
            Mode::WriteThrough(encoder) => {
                let tail = encoder.finish()?;
                data.append_compressed(&tail)?;
            }
            Mode::Reading(_) | Mode::Idle => {}
        }

        log::trace!(
            "inflating {} byte entry for random access",
            self.uncompressed_len
        );
        let mut image = SpillBuffer::new(self.spill_threshold);
        let mut cursor = InflateCursor::new();
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];
        if data.compressed_len() > 0 {
            loop {
                let n = cursor.read(data, &mut chunk)?;
                if n == 0 {
                    break;
                }
                image.append(&chunk[..n])?;
            }
        }

        if image.len() != self.uncompressed_len {
            return Err(Error::corrupted(
                data.data_offset(),
                format!(
                    "deflate stream holds {} bytes but the entry records {}",
                    image.len(),
                    self.uncompressed_len
                ),
            ));
        }
        self.mode = Mode::Emulation {
            image,
            dirty: false,
        };
        Ok(())
    }
}
