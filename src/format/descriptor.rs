//! Data descriptor codec.
//!
//! A data descriptor follows the data of entries whose local header has
//! general purpose bit 3 set. It comes in four shapes: with or without a
//! leading signature, and with 32-bit or 64-bit sizes. Nothing in the
//! record itself says which shape was used, so [`DataDescriptor::parse_matching`]
//! tries every shape against the values recorded in the central directory.

use std::io::Write;

use super::reader::{u32_at, u64_at, write_u32_le, write_u64_le};
use super::{exceeds_u32, signature};
use crate::Result;

/// Largest descriptor shape (signature + CRC + two 64-bit sizes).
pub const MAX_DATA_DESCRIPTOR_SIZE: usize = 24;

/// A data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Whether the record starts with the optional signature.
    pub has_signature: bool,
    /// Whether the sizes are 64-bit.
    pub zip64: bool,
}

impl DataDescriptor {
    /// Creates the descriptor written after a streamed entry.
    ///
    /// The signature is always written; sizes switch to 64-bit when either
    /// one does not fit 32 bits.
    pub fn new(crc32: u32, compressed_size: u64, uncompressed_size: u64) -> Self {
        Self {
            crc32,
            compressed_size,
            uncompressed_size,
            has_signature: true,
            zip64: exceeds_u32(compressed_size) || exceeds_u32(uncompressed_size),
        }
    }

    /// Returns the on-disk size.
    pub fn size(&self) -> u64 {
        let sizes = if self.zip64 { 16 } else { 8 };
        let signature = if self.has_signature { 4 } else { 0 };
        signature + 4 + sizes
    }

    /// Finds the descriptor shape at the start of `data` that agrees with the
    /// expected CRC and sizes.
    ///
    /// Shapes are tried shortest first: 32-bit without signature, 32-bit
    /// with signature, 64-bit without signature, 64-bit with signature.
    pub fn parse_matching(
        data: &[u8],
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Option<Self> {
        [(false, false), (true, false), (false, true), (true, true)]
            .into_iter()
            .find_map(|(has_signature, zip64)| {
                let candidate = Self::parse_shape(data, has_signature, zip64)?;
                (candidate.crc32 == crc32
                    && candidate.compressed_size == compressed_size
                    && candidate.uncompressed_size == uncompressed_size)
                    .then_some(candidate)
            })
    }

    fn parse_shape(data: &[u8], has_signature: bool, zip64: bool) -> Option<Self> {
        let mut pos = 0;
        if has_signature {
            if u32_at(data, 0)? != signature::DATA_DESCRIPTOR {
                return None;
            }
            pos = 4;
        }
        let crc32 = u32_at(data, pos)?;
        pos += 4;
        let (compressed_size, uncompressed_size) = if zip64 {
            (u64_at(data, pos)?, u64_at(data, pos + 8)?)
        } else {
            (u32_at(data, pos)? as u64, u32_at(data, pos + 4)? as u64)
        };
        Some(Self {
            crc32,
            compressed_size,
            uncompressed_size,
            has_signature,
            zip64,
        })
    }

    /// Serializes the descriptor.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(MAX_DATA_DESCRIPTOR_SIZE);
        if self.has_signature {
            write_u32_le(&mut buf, signature::DATA_DESCRIPTOR)?;
        }
        write_u32_le(&mut buf, self.crc32)?;
        if self.zip64 {
            write_u64_le(&mut buf, self.compressed_size)?;
            write_u64_le(&mut buf, self.uncompressed_size)?;
        } else {
            write_u32_le(&mut buf, self.compressed_size as u32)?;
            write_u32_le(&mut buf, self.uncompressed_size as u32)?;
        }
        w.write_all(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(descriptor: &DataDescriptor) -> Vec<u8> {
        let mut buf = Vec::new();
        descriptor.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, descriptor.size());
        buf
    }

    #[test]
    fn test_sizes_of_all_shapes() {
        let mut d = DataDescriptor::new(1, 2, 3);
        assert_eq!(d.size(), 16);
        d.has_signature = false;
        assert_eq!(d.size(), 12);
        d.zip64 = true;
        assert_eq!(d.size(), 20);
        d.has_signature = true;
        assert_eq!(d.size(), 24);
    }

    #[test]
    fn test_new_promotes_to_zip64() {
        assert!(!DataDescriptor::new(0, 0xFFFF_FFFE, 0).zip64);
        assert!(DataDescriptor::new(0, 0, 0xFFFF_FFFF).zip64);
    }

    #[test]
    fn test_matches_every_shape() {
        for has_signature in [false, true] {
            for zip64 in [false, true] {
                let d = DataDescriptor {
                    crc32: 0x1234_5678,
                    compressed_size: 10,
                    uncompressed_size: 20,
                    has_signature,
                    zip64,
                };
                let mut bytes = encode(&d);
                // Trailing bytes belong to the next record.
                bytes.extend_from_slice(b"PK\x03\x04garbage!");
                let found = DataDescriptor::parse_matching(&bytes, 0x1234_5678, 10, 20).unwrap();
                assert_eq!(found, d);
            }
        }
    }

    #[test]
    fn test_no_match() {
        let bytes = encode(&DataDescriptor::new(1, 2, 3));
        assert!(DataDescriptor::parse_matching(&bytes, 1, 2, 4).is_none());
        assert!(DataDescriptor::parse_matching(&bytes[..6], 1, 2, 3).is_none());
    }

    #[test]
    fn test_shortest_shape_wins_on_ambiguity() {
        // A signature-less descriptor whose CRC equals the signature constant
        // also reads as a signed descriptor; the shorter reading is kept.
        let d = DataDescriptor {
            crc32: signature::DATA_DESCRIPTOR,
            compressed_size: 5,
            uncompressed_size: 5,
            has_signature: false,
            zip64: false,
        };
        let bytes = encode(&d);
        let found = DataDescriptor::parse_matching(&bytes, signature::DATA_DESCRIPTOR, 5, 5);
        assert_eq!(found, Some(d));
    }
}
