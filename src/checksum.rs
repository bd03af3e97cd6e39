//! Checksum computation utilities.
//!
//! ZIP records carry a CRC-32 (IEEE 802.3 polynomial) of each entry's
//! uncompressed data. The lookup tables live inside `crc32fast`, which builds
//! them at compile time, so every archive in the process shares one immutable
//! copy without any runtime initialization.
//!
//! [`ProgressiveCrc`] layers a *high-water mark* on top of [`Crc32`]: it
//! accumulates the checksum while an entry is accessed sequentially and only
//! forces a rescan when explicitly asked to.
//!
//! # Example
//!
//! ```rust
//! use zipblock::checksum::{Crc32, Checksum};
//!
//! let mut crc32 = Crc32::new();
//! crc32.update(b"Hello, ");
//! crc32.update(b"World!");
//! assert_eq!(crc32.finalize(), 0xEC4AC3D0);
//!
//! assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
//! ```

use std::io::{self, Read};

use crate::{Error, READ_BUFFER_SIZE, Result};

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finishes the checksum computation and returns the value.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Computes the checksum by reading from a reader.
    fn compute_reader<R: Read>(reader: &mut R) -> io::Result<Self::Output> {
        let mut hasher = Self::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// CRC-32 checksum calculator.
///
/// Uses the IEEE 802.3 polynomial, the checksum format used by ZIP.
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn reset(&mut self) {
        self.hasher.reset();
    }
}

/// Incremental CRC-32 bookkeeping for one archive entry.
///
/// The tracker remembers the *high-water mark*: the length of the prefix of
/// the entry (in uncompressed coordinates) whose CRC has been accumulated.
/// Accesses that start exactly at the mark extend it; any other access
/// pattern leaves it alone. Writes below the mark, and truncation below it,
/// invalidate the accumulated value.
///
/// When the entry came from an existing archive, the CRC recorded in its
/// headers is kept as the *expected* value and checked the moment the mark
/// reaches the end of the entry during a read. The tracker never issues a
/// read on its own; the owning entry drives the explicit rescan.
#[derive(Debug, Clone)]
pub struct ProgressiveCrc {
    crc: Crc32,
    high_water_mark: u64,
    expected: Option<u32>,
    hashed_bytes: u64,
}

impl ProgressiveCrc {
    /// Creates a tracker for a new (empty) entry.
    pub fn new() -> Self {
        Self {
            crc: Crc32::new(),
            high_water_mark: 0,
            expected: None,
            hashed_bytes: 0,
        }
    }

    /// Creates a tracker for an existing entry whose headers record `expected`.
    pub fn with_expected(expected: u32) -> Self {
        Self {
            expected: Some(expected),
            ..Self::new()
        }
    }

    /// Returns the high-water mark.
    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    /// Returns the expected CRC, if it is still authoritative.
    pub fn expected(&self) -> Option<u32> {
        self.expected
    }

    /// Returns the total number of bytes fed to the hasher so far.
    ///
    /// This counts rescans, so it exposes how much checksum work an access
    /// pattern caused.
    pub fn hashed_bytes(&self) -> u64 {
        self.hashed_bytes
    }

    /// Returns the CRC if the mark covers the whole entry of length `len`.
    pub fn value_if_complete(&self, len: u64) -> Option<u32> {
        (self.high_water_mark == len).then(|| self.crc.finalize())
    }

    /// Records that `data` was read at `position` of an entry of length `len`.
    ///
    /// Returns a [`Error::CrcMismatch`] when this read brings the mark to the
    /// end of the entry and the result disagrees with the expected value.
    pub fn observe_read(
        &mut self,
        position: u64,
        data: &[u8],
        len: u64,
        entry_name: &str,
    ) -> Result<()> {
        if position == self.high_water_mark && !data.is_empty() {
            self.extend(data);
        }
        self.validate(len, entry_name)
    }

    /// Records that `data` was written at `position`.
    pub fn observe_write(&mut self, position: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        // Anything written makes the recorded CRC stale.
        self.expected = None;
        if position == self.high_water_mark {
            self.extend(data);
        } else if position < self.high_water_mark {
            self.invalidate();
        }
    }

    /// Records that the entry was resized to `len`.
    pub fn observe_set_len(&mut self, len: u64) {
        self.expected = None;
        if len < self.high_water_mark {
            self.invalidate();
        }
    }

    /// Feeds bytes that continue exactly at the mark (used by rescans).
    pub fn extend(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.high_water_mark += data.len() as u64;
        self.hashed_bytes += data.len() as u64;
    }

    /// Drops the accumulated state; the next pass starts from offset zero.
    pub fn invalidate(&mut self) {
        self.crc.reset();
        self.high_water_mark = 0;
    }

    /// Checks the expected CRC once the mark has reached `len`.
    pub fn validate(&mut self, len: u64, entry_name: &str) -> Result<()> {
        if self.high_water_mark != len {
            return Ok(());
        }
        if let Some(expected) = self.expected.take() {
            let actual = self.crc.finalize();
            if actual != expected {
                // Keep the expectation so every later read keeps failing.
                self.expected = Some(expected);
                return Err(Error::CrcMismatch {
                    entry_name: Some(entry_name.to_string()),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Default for ProgressiveCrc {
    fn default() -> Self {
        Self::new()
    }
}
