//! Validated entry names.
//!
//! ZIP stores entry names as raw byte strings with a 16-bit length prefix.
//! [`ArchivePath`] is the only way names enter the engine, so every name that
//! reaches a header is guaranteed to fit the format.

use crate::{Error, Result};
use std::fmt;

/// Maximum encoded length of an entry name (the header length field is 16 bits).
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

/// A validated, normalized ZIP entry name.
///
/// `ArchivePath` normalizes names to use forward slashes and validates that:
/// - The name is not empty and not only whitespace
/// - No NUL bytes are present
/// - The UTF-8 encoding is at most 65535 bytes
///
/// Comparison is ordinal and case-sensitive: `"A.txt"` and `"a.txt"` are two
/// different entries.
///
/// # Examples
///
/// ```
/// use zipblock::ArchivePath;
///
/// let path = ArchivePath::new("word\\document.xml").unwrap();
/// assert_eq!(path.as_str(), "word/document.xml");
///
/// assert!(ArchivePath::new("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Creates a new `ArchivePath` from a string, validating and normalizing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] if the name:
    /// - Is empty or consists only of whitespace
    /// - Contains NUL bytes
    /// - Is longer than 65535 bytes once encoded
    pub fn new(s: &str) -> Result<Self> {
        let normalized = Self::normalize(s);
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Creates a name from raw header bytes.
    ///
    /// Names flagged as UTF-8 (general purpose bit 11) are decoded strictly;
    /// other names are decoded as UTF-8 when valid and otherwise byte-by-byte
    /// so that no information is lost for ASCII-range names.
    pub(crate) fn from_header_bytes(bytes: &[u8], utf8_flag: bool) -> Result<Self> {
        let name = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) if !utf8_flag => bytes.iter().map(|&b| b as char).collect(),
            Err(_) => {
                return Err(Error::InvalidArchivePath(
                    "name flagged as UTF-8 is not valid UTF-8".into(),
                ));
            }
        };
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn normalize(s: &str) -> String {
        s.replace('\\', "/")
    }

    /// Validates a normalized name.
    fn validate(s: &str) -> Result<()> {
        if s.trim().is_empty() {
            return Err(Error::InvalidArchivePath("empty name".into()));
        }

        if s.contains('\0') {
            return Err(Error::InvalidArchivePath("contains NUL byte".into()));
        }

        if s.len() > MAX_NAME_LENGTH {
            return Err(Error::InvalidArchivePath(format!(
                "name exceeds maximum length of {} bytes",
                MAX_NAME_LENGTH
            )));
        }

        Ok(())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the encoded bytes written to headers.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns true if the name needs the UTF-8 language encoding flag.
    pub fn needs_utf8_flag(&self) -> bool {
        !self.0.is_ascii()
    }

    /// Returns true if the name denotes a folder (ends with `/`).
    pub fn is_directory(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns the file name (last non-empty segment) of this name.
    pub fn file_name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0)
    }
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}
