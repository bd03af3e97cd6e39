//! ZIP record layouts, constants, and low-level parsing utilities.
//!
//! Every record codec in this module is pure: it parses from a reader or a
//! byte slice and serializes to a writer, and knows its own on-disk size.
//! None of them touch the archive stream directly; that is the job of the
//! blocks in [`crate::block`].

pub mod central;
pub mod descriptor;
pub mod eocd;
pub mod extra;
pub mod local;
pub mod reader;
pub mod zip64;

use crate::{Error, Result};

/// Record signatures (little-endian `u32`, first four bytes of each record).
pub mod signature {
    /// Local file header, `PK\x03\x04`.
    pub const LOCAL_FILE_HEADER: u32 = 0x04034b50;
    /// Data descriptor, `PK\x07\x08` (optional in front of the descriptor).
    pub const DATA_DESCRIPTOR: u32 = 0x08074b50;
    /// Central directory file header, `PK\x01\x02`.
    pub const CENTRAL_DIRECTORY_HEADER: u32 = 0x02014b50;
    /// Digital signature record, `PK\x05\x05`. Recognized only to be rejected.
    pub const DIGITAL_SIGNATURE: u32 = 0x05054b50;
    /// ZIP64 end of central directory record, `PK\x06\x06`.
    pub const ZIP64_END_OF_CENTRAL_DIRECTORY: u32 = 0x06064b50;
    /// ZIP64 end of central directory locator, `PK\x06\x07`.
    pub const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR: u32 = 0x07064b50;
    /// End of central directory record, `PK\x05\x06`.
    pub const END_OF_CENTRAL_DIRECTORY: u32 = 0x06054b50;
}

/// "Version needed to extract" values understood by this crate.
pub mod version {
    /// Stored data.
    pub const STORED: u16 = 10;
    /// Volume label.
    pub const VOLUME_LABEL: u16 = 11;
    /// Deflated data.
    pub const DEFLATED: u16 = 20;
    /// ZIP64 structures present.
    pub const ZIP64: u16 = 45;

    /// "Version made by" written to new central directory headers
    /// (upper byte 0 = MS-DOS attribute compatibility, lower byte 4.5).
    pub const MADE_BY: u16 = ZIP64;
}

/// General purpose bit flags.
pub mod flags {
    /// Entry is encrypted.
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Deflate option bits (1 and 2).
    pub const DEFLATE_OPTION_MASK: u16 = 0b110;
    /// CRC and sizes follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Name and comment are UTF-8.
    pub const UTF8: u16 = 1 << 11;
}

/// MS-DOS external attribute bits.
pub mod attributes {
    /// Volume label.
    pub const VOLUME_LABEL: u32 = 0x08;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
}

/// Escape value of 16-bit fields whose real value lives in a ZIP64 record.
pub const ZIP64_MARKER_U16: u16 = 0xFFFF;

/// Escape value of 32-bit fields whose real value lives in a ZIP64 record.
pub const ZIP64_MARKER_U32: u32 = 0xFFFF_FFFF;

/// Returns true if a 64-bit size or offset does not fit its 32-bit field.
#[inline]
pub fn exceeds_u32(value: u64) -> bool {
    value >= ZIP64_MARKER_U32 as u64
}

/// Narrows a 64-bit value to its 32-bit field, writing the escape marker
/// when it does not fit.
#[inline]
pub fn narrow_u32(value: u64) -> u32 {
    if exceeds_u32(value) {
        ZIP64_MARKER_U32
    } else {
        value as u32
    }
}

/// Rejects "version needed to extract" values this crate cannot honor.
pub fn check_version_needed(version_needed: u16) -> Result<()> {
    match version_needed {
        version::STORED | version::VOLUME_LABEL | version::DEFLATED | version::ZIP64 => Ok(()),
        other => Err(Error::UnsupportedVersion { version: other }),
    }
}

/// Rejects general purpose flags that require unsupported features.
pub fn check_flags(general_purpose_flags: u16) -> Result<()> {
    if general_purpose_flags & flags::ENCRYPTED != 0 {
        return Err(Error::UnsupportedFeature {
            feature: "encryption",
        });
    }
    Ok(())
}

/// Compression method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Deflate (RFC 1951).
    Deflated,
}

impl CompressionMethod {
    /// Parses the method field of a header.
    pub fn from_u16(method: u16) -> Result<Self> {
        match method {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflated),
            other => Err(Error::UnsupportedMethod { method: other }),
        }
    }

    /// Returns the value stored in headers.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
        }
    }

    /// Returns the minimum "version needed to extract" for this method.
    pub fn version_needed(self) -> u16 {
        match self {
            Self::Stored => version::STORED,
            Self::Deflated => version::DEFLATED,
        }
    }
}

/// Deflate tuning recorded in general purpose bits 1 and 2.
///
/// `None` is used for stored entries, whose option bits are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeflateOption {
    /// Bits `00`, compression level 6.
    #[default]
    Normal,
    /// Bits `01`, compression level 9.
    Maximum,
    /// Bits `10`, compression level 3.
    Fast,
    /// Bits `11`, compression level 1.
    SuperFast,
    /// No deflate option (stored entries).
    None,
}

impl DeflateOption {
    /// Decodes the option bits of a header for an entry compressed with `method`.
    pub fn from_flags(general_purpose_flags: u16, method: CompressionMethod) -> Self {
        if method == CompressionMethod::Stored {
            return Self::None;
        }
        match (general_purpose_flags & flags::DEFLATE_OPTION_MASK) >> 1 {
            0b00 => Self::Normal,
            0b01 => Self::Maximum,
            0b10 => Self::Fast,
            _ => Self::SuperFast,
        }
    }

    /// Returns the bits this option occupies in the general purpose flags.
    pub fn to_flags(self) -> u16 {
        match self {
            Self::Normal | Self::None => 0,
            Self::Maximum => 0b01 << 1,
            Self::Fast => 0b10 << 1,
            Self::SuperFast => 0b11 << 1,
        }
    }

    /// Returns the deflate compression level used when writing.
    pub fn level(self) -> u32 {
        match self {
            Self::Normal | Self::None => 6,
            Self::Maximum => 9,
            Self::Fast => 3,
            Self::SuperFast => 1,
        }
    }
}
