//! Interoperability tests.
//!
//! Archives built byte by byte (with flate2 and crc32fast, not with this
//! crate) must be readable and editable, and archives written by this crate
//! must be decodable without it.

mod common;

use std::io::{Cursor, Read};

use zipblock::{Archive, CompressionMethod, DeflateOption, OpenOptions};

use common::{
    HandArchive, HandEntry, Sizes, build_zip, create_archive, read_entry, u16_at, u32_at,
    verify_archive_contents,
};

#[test]
fn test_read_hand_built_archive() {
    let text = "interop ".repeat(500);
    let archive = HandArchive {
        entries: vec![
            HandEntry::stored("stored.txt", b"plain bytes"),
            HandEntry::deflated("deflated.txt", text.as_bytes()),
            HandEntry::stored("dir/", b""),
        ],
        ..Default::default()
    };
    let bytes = build_zip(&archive);
    verify_archive_contents(
        &bytes,
        &[
            ("stored.txt", b"plain bytes"),
            ("deflated.txt", text.as_bytes()),
            ("dir/", b""),
        ],
    );

    let mut archive = Archive::open(Cursor::new(bytes), &OpenOptions::read_only()).unwrap();
    let infos = archive.list_files().unwrap();
    assert_eq!(infos[0].method, CompressionMethod::Stored);
    assert_eq!(infos[1].method, CompressionMethod::Deflated);
    assert_eq!(infos[1].deflate_option, DeflateOption::Normal);
    assert!(infos[2].is_folder);
    assert_eq!(infos[0].last_modified.year(), 2025);
    assert_eq!(infos[0].last_modified.hour(), 12);
}

#[test]
fn test_read_data_descriptors() {
    for sizes in [Sizes::DescriptorWithSignature, Sizes::DescriptorWithoutSignature] {
        let archive = HandArchive {
            entries: vec![
                HandEntry::deflated("a.txt", b"described by a trailing record").sizes(sizes),
                HandEntry::stored("b.txt", b"stored with a descriptor").sizes(sizes),
                HandEntry::stored("c.txt", b"plain"),
            ],
            ..Default::default()
        };
        let bytes = build_zip(&archive);
        verify_archive_contents(
            &bytes,
            &[
                ("a.txt", b"described by a trailing record"),
                ("b.txt", b"stored with a descriptor"),
                ("c.txt", b"plain"),
            ],
        );
    }
}

#[test]
fn test_edit_archive_with_descriptors() {
    let archive = HandArchive {
        entries: vec![
            HandEntry::stored("a", b"aaaa").sizes(Sizes::DescriptorWithoutSignature),
            HandEntry::stored("b", b"bbbb").sizes(Sizes::DescriptorWithSignature),
            HandEntry::stored("c", b"cccc"),
        ],
        ..Default::default()
    };
    let mut archive = Archive::open(Cursor::new(build_zip(&archive)), &OpenOptions::new()).unwrap();
    common::rewrite_entry(&mut archive, "a", b"AAAAAAAA").unwrap();
    archive.delete_file("c").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    verify_archive_contents(&bytes, &[("a", b"AAAAAAAA"), ("b", b"bbbb")]);
    // The untouched entry keeps its descriptor.
    assert!(common::find_bytes(&bytes, b"PK\x07\x08").is_some());
}

#[test]
fn test_prefix_and_comment() {
    let prefix: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 256) as u8).collect();
    let archive = HandArchive {
        prefix: prefix.clone(),
        entries: vec![
            HandEntry::stored("one", b"1"),
            HandEntry::deflated("two", b"22222222"),
        ],
        comment: b"hand-built".to_vec(),
        ..Default::default()
    };
    let bytes = build_zip(&archive);

    let mut archive = Archive::open(Cursor::new(bytes), &OpenOptions::new()).unwrap();
    assert_eq!(archive.comment().unwrap(), b"hand-built");
    archive.delete_file("one").unwrap();
    common::write_entry(&mut archive, "three", CompressionMethod::Deflated, b"333").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    // Bytes that belong to no entry are kept where they were.
    assert_eq!(&bytes[..prefix.len()], prefix.as_slice());
    verify_archive_contents(&bytes, &[("two", b"22222222"), ("three", b"333")]);

    let archive = Archive::open(Cursor::new(bytes), &OpenOptions::read_only()).unwrap();
    assert_eq!(archive.comment().unwrap(), b"hand-built");
}

#[test]
fn test_non_ascii_names_from_other_writers() {
    let archive = HandArchive {
        entries: vec![HandEntry::stored("résumé.txt", b"utf-8 flagged")],
        ..Default::default()
    };
    let bytes = build_zip(&archive);
    let mut archive = Archive::open(Cursor::new(bytes), &OpenOptions::read_only()).unwrap();
    assert_eq!(read_entry(&mut archive, "résumé.txt").unwrap(), b"utf-8 flagged");
}

/// Walks the local headers of an archive written by this crate and decodes
/// every entry with flate2 directly.
#[test]
fn test_output_decodes_without_the_crate() {
    let text = "independent decoding ".repeat(300);
    let entries = [("x.txt", text.as_bytes()), ("y.txt", b"short" as &[u8])];
    let bytes = create_archive(&entries).unwrap();

    let mut offset = 0usize;
    for (name, expected) in entries {
        assert_eq!(u32_at(&bytes, offset), 0x04034b50);
        let flags = u16_at(&bytes, offset + 6);
        assert_eq!(flags & 0x0008, 0, "random-access output carries sizes in the header");
        assert_eq!(u16_at(&bytes, offset + 8), 8);
        let crc = u32_at(&bytes, offset + 14);
        let compressed = u32_at(&bytes, offset + 18) as usize;
        let uncompressed = u32_at(&bytes, offset + 22) as usize;
        let name_len = u16_at(&bytes, offset + 26) as usize;
        let extra_len = u16_at(&bytes, offset + 28) as usize;
        assert_eq!(&bytes[offset + 30..offset + 30 + name_len], name.as_bytes());

        let data_start = offset + 30 + name_len + extra_len;
        let mut decoder =
            flate2::read::DeflateDecoder::new(&bytes[data_start..data_start + compressed]);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data).unwrap();
        assert_eq!(data, expected);
        assert_eq!(data.len(), uncompressed);
        assert_eq!(crc, crc32fast::hash(&data));

        offset = data_start + compressed;
    }
    assert_eq!(u32_at(&bytes, offset), 0x02014b50);
}

#[test]
fn test_fresh_headers_reserve_padding() {
    let bytes = create_archive(&[("p", b"padded")]).unwrap();
    let extra_len = u16_at(&bytes, 28) as usize;
    assert_eq!(extra_len, 20);
    let extra = 30 + 1;
    assert_eq!(u16_at(&bytes, extra), 0xA220);
    assert_eq!(u16_at(&bytes, extra + 2), 16);
    assert_eq!(u16_at(&bytes, extra + 4), 0xA028);
}
