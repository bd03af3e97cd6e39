//! Low-level little-endian helpers shared by the record codecs.

use std::io::{self, Read, Write};

/// Reads an unsigned 16-bit little-endian integer.
pub fn read_u16_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an unsigned 64-bit little-endian integer.
pub fn read_u64_le<R: Read + ?Sized>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exact number of bytes into a new vector.
pub fn read_bytes<R: Read + ?Sized>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes an unsigned 16-bit little-endian integer.
pub fn write_u16_le<W: Write + ?Sized>(w: &mut W, value: u16) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 32-bit little-endian integer.
pub fn write_u32_le<W: Write + ?Sized>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 64-bit little-endian integer.
pub fn write_u64_le<W: Write + ?Sized>(w: &mut W, value: u64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Reads a little-endian `u32` from a slice at `pos`, if enough bytes remain.
pub fn u32_at(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Reads a little-endian `u64` from a slice at `pos`, if enough bytes remain.
pub fn u64_at(data: &[u8], pos: usize) -> Option<u64> {
    let bytes = data.get(pos..pos.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_le_bytes(buf))
}

/// Reads a little-endian `u16` from a slice at `pos`, if enough bytes remain.
pub fn u16_at(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_u16_le() {
        let data = [0x34u8, 0x12];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_u16_le(&mut cursor).unwrap(), 0x1234);
    }

    #[test]
    fn test_read_u32_le() {
        let data = [0x50u8, 0x4b, 0x03, 0x04];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0x04034b50);
    }

    #[test]
    fn test_read_u64_le() {
        let data = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_u64_le(&mut cursor).unwrap(), 0x0807060504030201);
    }

    #[test]
    fn test_read_eof() {
        let data = [0x01u8];
        let mut cursor = Cursor::new(&data);
        assert!(read_u32_le(&mut cursor).is_err());
    }

    #[test]
    fn test_read_bytes() {
        let data = [1u8, 2, 3, 4, 5];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_bytes(&mut cursor, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_helpers() {
        let mut buf = Vec::new();
        write_u16_le(&mut buf, 0xA220).unwrap();
        write_u32_le(&mut buf, 0x06054b50).unwrap();
        write_u64_le(&mut buf, 1).unwrap();
        assert_eq!(&buf[..2], &[0x20, 0xA2]);
        assert_eq!(&buf[2..6], b"PK\x05\x06");
        assert_eq!(buf.len(), 14);
    }

    #[test]
    fn test_slice_accessors() {
        let data = [0x50u8, 0x4b, 0x07, 0x08, 0xFF];
        assert_eq!(u32_at(&data, 0), Some(0x08074b50));
        assert_eq!(u32_at(&data, 2), None);
        assert_eq!(u16_at(&data, 3), Some(0xFF08));
        assert_eq!(u64_at(&data, 0), None);
        assert_eq!(u32_at(&data, usize::MAX), None);
    }
}
