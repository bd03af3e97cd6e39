//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zipblock::{
    Archive, ArchiveStream, CompressionMethod, DeflateOption, FileAccess, OpenOptions, StreamMode,
};

/// Creates an in-memory archive holding `entries`, all deflated.
pub fn create_archive(entries: &[(&str, &[u8])]) -> zipblock::Result<Vec<u8>> {
    create_archive_with_method(CompressionMethod::Deflated, entries)
}

/// Creates an in-memory archive holding `entries`, all using `method`.
pub fn create_archive_with_method(
    method: CompressionMethod,
    entries: &[(&str, &[u8])],
) -> zipblock::Result<Vec<u8>> {
    let mut archive = Archive::open(Cursor::new(Vec::new()), &OpenOptions::create())?;
    for (name, data) in entries {
        write_entry(&mut archive, name, method, data)?;
    }
    Ok(archive.into_inner()?.into_inner())
}

/// Adds an entry and writes `data` to it.
pub fn write_entry<S: ArchiveStream>(
    archive: &mut Archive<S>,
    name: &str,
    method: CompressionMethod,
    data: &[u8],
) -> zipblock::Result<()> {
    let mut entry = archive.add_file(name, method, DeflateOption::Normal)?;
    let mut stream = entry.get_stream(StreamMode::Create, FileAccess::ReadWrite)?;
    stream.write_all(data)?;
    Ok(())
}

/// Replaces the content of an existing entry.
pub fn rewrite_entry<S: ArchiveStream>(
    archive: &mut Archive<S>,
    name: &str,
    data: &[u8],
) -> zipblock::Result<()> {
    let mut entry = archive.get_file(name)?;
    let mut stream = entry.get_stream(StreamMode::Create, FileAccess::ReadWrite)?;
    stream.write_all(data)?;
    Ok(())
}

/// Reads the whole content of an entry.
pub fn read_entry<S: ArchiveStream>(
    archive: &mut Archive<S>,
    name: &str,
) -> zipblock::Result<Vec<u8>> {
    let mut entry = archive.get_file(name)?;
    let mut stream = entry.get_stream(StreamMode::Open, FileAccess::Read)?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data)?;
    Ok(data)
}

/// Reads every entry of an archive, in central directory order.
pub fn read_all(archive_bytes: &[u8]) -> zipblock::Result<Vec<(String, Vec<u8>)>> {
    let mut archive = Archive::open(
        Cursor::new(archive_bytes.to_vec()),
        &OpenOptions::read_only(),
    )?;
    let names: Vec<String> = archive
        .list_files()?
        .into_iter()
        .map(|info| info.name.as_str().to_string())
        .collect();
    let mut contents = Vec::with_capacity(names.len());
    for name in names {
        let data = read_entry(&mut archive, &name)?;
        contents.push((name, data));
    }
    Ok(contents)
}

/// Opens the archive read-only and checks that it holds exactly `expected`,
/// in order.
pub fn verify_archive_contents(archive_bytes: &[u8], expected: &[(&str, &[u8])]) {
    let contents = read_all(archive_bytes).expect("Failed to read archive");
    assert_eq!(
        contents.len(),
        expected.len(),
        "Entry count mismatch: expected {}, got {}",
        expected.len(),
        contents.len()
    );
    for ((name, data), (expected_name, expected_data)) in contents.iter().zip(expected) {
        assert_eq!(name, expected_name);
        assert_eq!(
            data.as_slice(),
            *expected_data,
            "Content mismatch for '{}'",
            name
        );
    }
}

/// Extracts the error from a result that must have failed.
pub fn expect_err<T, E>(result: Result<T, E>) -> E {
    match result {
        Ok(_) => panic!("Expected error but got Ok"),
        Err(e) => e,
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Incompressible payload, deterministically seeded.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Lowercase text that deflate can shrink, deterministically seeded.
pub fn random_text(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(b'a'..=b'w')).collect()
}

/// How a hand-built entry records its sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizes {
    /// CRC and sizes in the local header.
    InHeader,
    /// Bit 3 set; a data descriptor with a signature follows the data.
    DescriptorWithSignature,
    /// Bit 3 set; a data descriptor without a signature follows the data.
    DescriptorWithoutSignature,
}

/// One entry of a hand-built archive.
#[derive(Debug, Clone)]
pub struct HandEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub deflate: bool,
    pub sizes: Sizes,
    pub flags: u16,
    pub version_needed: u16,
    pub method_override: Option<u16>,
}

impl HandEntry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            deflate: false,
            sizes: Sizes::InHeader,
            flags: 0,
            version_needed: 10,
            method_override: None,
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            deflate: true,
            version_needed: 20,
            ..Self::stored(name, data)
        }
    }

    pub fn sizes(mut self, sizes: Sizes) -> Self {
        self.sizes = sizes;
        self
    }
}

/// Trailer shape of a hand-built archive.
#[derive(Debug, Clone, Default)]
pub struct HandArchive {
    pub prefix: Vec<u8>,
    pub entries: Vec<HandEntry>,
    pub comment: Vec<u8>,
    /// Emit ZIP64 end of central directory records and sentinel EOCD fields.
    pub zip64: bool,
}

/// Builds a ZIP archive byte by byte, independently of the crate's own
/// writers. Data is deflated with flate2 and checksummed with crc32fast.
pub fn build_zip(archive: &HandArchive) -> Vec<u8> {
    let mut out = archive.prefix.clone();
    let mut central = Vec::new();

    for entry in &archive.entries {
        let stored = if entry.deflate {
            let mut encoder =
                flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&entry.data).unwrap();
            encoder.finish().unwrap()
        } else {
            entry.data.clone()
        };
        let crc = crc32fast::hash(&entry.data);
        let method = entry
            .method_override
            .unwrap_or(if entry.deflate { 8 } else { 0 });
        let mut flags = entry.flags;
        if entry.sizes != Sizes::InHeader {
            flags |= 1 << 3;
        }
        if !entry.name.is_ascii() {
            flags |= 1 << 11;
        }
        let offset = out.len() as u32;

        put_u32(&mut out, 0x04034b50);
        put_u16(&mut out, entry.version_needed);
        put_u16(&mut out, flags);
        put_u16(&mut out, method);
        put_u16(&mut out, 0x6000); // 12:00:00
        put_u16(&mut out, 0x5A21); // 2025-01-01
        if entry.sizes == Sizes::InHeader {
            put_u32(&mut out, crc);
            put_u32(&mut out, stored.len() as u32);
            put_u32(&mut out, entry.data.len() as u32);
        } else {
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
        }
        put_u16(&mut out, entry.name.len() as u16);
        put_u16(&mut out, 0);
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&stored);
        if entry.sizes == Sizes::DescriptorWithSignature {
            put_u32(&mut out, 0x08074b50);
        }
        if entry.sizes != Sizes::InHeader {
            put_u32(&mut out, crc);
            put_u32(&mut out, stored.len() as u32);
            put_u32(&mut out, entry.data.len() as u32);
        }

        put_u32(&mut central, 0x02014b50);
        put_u16(&mut central, 20);
        put_u16(&mut central, entry.version_needed);
        put_u16(&mut central, flags);
        put_u16(&mut central, method);
        put_u16(&mut central, 0x6000);
        put_u16(&mut central, 0x5A21);
        put_u32(&mut central, crc);
        put_u32(&mut central, stored.len() as u32);
        put_u32(&mut central, entry.data.len() as u32);
        put_u16(&mut central, entry.name.len() as u16);
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u16(&mut central, 0);
        put_u32(
            &mut central,
            if entry.name.ends_with('/') { 0x10 } else { 0 },
        );
        put_u32(&mut central, offset);
        central.extend_from_slice(entry.name.as_bytes());
    }

    let central_offset = out.len() as u64;
    let central_size = central.len() as u64;
    let count = archive.entries.len() as u64;
    out.extend_from_slice(&central);

    if archive.zip64 {
        let zip64_offset = out.len() as u64;
        put_u32(&mut out, 0x06064b50);
        put_u64(&mut out, 44);
        put_u16(&mut out, 45);
        put_u16(&mut out, 45);
        put_u32(&mut out, 0);
        put_u32(&mut out, 0);
        put_u64(&mut out, count);
        put_u64(&mut out, count);
        put_u64(&mut out, central_size);
        put_u64(&mut out, central_offset);

        put_u32(&mut out, 0x07064b50);
        put_u32(&mut out, 0);
        put_u64(&mut out, zip64_offset);
        put_u32(&mut out, 1);
    }

    put_u32(&mut out, 0x06054b50);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    if archive.zip64 {
        put_u16(&mut out, 0xFFFF);
        put_u16(&mut out, 0xFFFF);
        put_u32(&mut out, 0xFFFF_FFFF);
        put_u32(&mut out, 0xFFFF_FFFF);
    } else {
        put_u16(&mut out, count as u16);
        put_u16(&mut out, count as u16);
        put_u32(&mut out, central_size as u32);
        put_u32(&mut out, central_offset as u32);
    }
    put_u16(&mut out, archive.comment.len() as u16);
    out.extend_from_slice(&archive.comment);
    out
}

/// Finds the first occurrence of `needle` in `haystack`.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Returns the offset of the end of central directory record.
pub fn eocd_offset(archive_bytes: &[u8]) -> usize {
    archive_bytes
        .windows(4)
        .rposition(|window| window == b"PK\x05\x06")
        .expect("no end of central directory record")
}

/// Reads a little-endian `u16` at `offset`.
pub fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Reads a little-endian `u32` at `offset`.
pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}
