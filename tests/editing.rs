//! Integration tests for in-place editing.
//!
//! These tests verify that saving an edited archive:
//! - Moves later entries forward or backward as earlier ones change size
//! - Reclaims the space of deleted entries and truncates the stream
//! - Leaves the bytes of an unchanged archive untouched
//! - Keeps working across repeated flushes and reopenings

mod common;

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use zipblock::{
    Archive, CompressionMethod, DeflateOption, Error, FileAccess, FileMode, OpenOptions,
    StreamMode,
};

use common::{
    create_archive, create_archive_with_method, read_entry, rewrite_entry, verify_archive_contents,
    write_entry,
};

fn open(bytes: Vec<u8>) -> Archive<Cursor<Vec<u8>>> {
    Archive::open(Cursor::new(bytes), &OpenOptions::new()).unwrap()
}

fn three_entries() -> Vec<u8> {
    create_archive(&[
        ("first.txt", b"first entry content"),
        ("second.txt", b"second entry content"),
        ("third.txt", b"third entry content"),
    ])
    .unwrap()
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn test_delete_middle_entry() {
    let original = three_entries();
    let mut archive = open(original.clone());
    archive.delete_file("second.txt").unwrap();
    assert!(!archive.file_exists("second.txt").unwrap());
    let bytes = archive.into_inner().unwrap().into_inner();

    assert!(bytes.len() < original.len());
    verify_archive_contents(
        &bytes,
        &[
            ("first.txt", b"first entry content"),
            ("third.txt", b"third entry content"),
        ],
    );
}

#[test]
fn test_delete_every_entry() {
    let mut archive = open(three_entries());
    for name in ["first.txt", "second.txt", "third.txt"] {
        archive.delete_file(name).unwrap();
    }
    let bytes = archive.into_inner().unwrap().into_inner();
    assert_eq!(bytes.len(), 22);
    verify_archive_contents(&bytes, &[]);
}

#[test]
fn test_delete_missing_entry() {
    let mut archive = open(three_entries());
    let err = archive.delete_file("missing.txt").unwrap_err();
    assert!(matches!(err, Error::EntryNotFound { .. }));
    assert_eq!(err.entry_name(), Some("missing.txt"));
    assert_eq!(archive.list_files().unwrap().len(), 3);
}

#[test]
fn test_delete_then_add_same_name() {
    let mut archive = open(three_entries());
    archive.delete_file("first.txt").unwrap();
    write_entry(&mut archive, "first.txt", CompressionMethod::Stored, b"replacement").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();
    verify_archive_contents(
        &bytes,
        &[
            ("second.txt", b"second entry content"),
            ("third.txt", b"third entry content"),
            ("first.txt", b"replacement"),
        ],
    );
}

// ============================================================================
// Modify
// ============================================================================

#[test]
fn test_grow_first_entry_shifts_the_rest() {
    let big: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let mut archive = open(three_entries());
    rewrite_entry(&mut archive, "first.txt", &big).unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    verify_archive_contents(
        &bytes,
        &[
            ("first.txt", &big),
            ("second.txt", b"second entry content"),
            ("third.txt", b"third entry content"),
        ],
    );
}

#[test]
fn test_shrink_first_entry_shifts_the_rest_back() {
    let big = vec![b'z'; 40_000];
    let original = create_archive_with_method(
        CompressionMethod::Stored,
        &[("big", &big), ("small", b"tail")],
    )
    .unwrap();

    let mut archive = open(original.clone());
    rewrite_entry(&mut archive, "big", b"tiny").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    assert!(bytes.len() < original.len() - 39_000);
    verify_archive_contents(&bytes, &[("big", b"tiny"), ("small", b"tail")]);
}

#[test]
fn test_overwrite_middle_of_entry() {
    let original =
        create_archive_with_method(CompressionMethod::Stored, &[("data", b"0123456789")]).unwrap();
    let mut archive = open(original);
    {
        let mut entry = archive.get_file("data").unwrap();
        let mut stream = entry
            .get_stream(StreamMode::Open, FileAccess::ReadWrite)
            .unwrap();
        stream.seek(SeekFrom::Start(3)).unwrap();
        stream.write_all(b"abc").unwrap();
    }
    let bytes = archive.into_inner().unwrap().into_inner();
    verify_archive_contents(&bytes, &[("data", b"012abc6789")]);
}

#[test]
fn test_append_to_deflated_entry() {
    let mut archive = open(three_entries());
    {
        let mut entry = archive.get_file("second.txt").unwrap();
        let mut stream = entry
            .get_stream(StreamMode::Append, FileAccess::ReadWrite)
            .unwrap();
        stream.write_all(b", appended").unwrap();
    }
    let bytes = archive.into_inner().unwrap().into_inner();
    verify_archive_contents(
        &bytes,
        &[
            ("first.txt", b"first entry content"),
            ("second.txt", b"second entry content, appended"),
            ("third.txt", b"third entry content"),
        ],
    );
}

#[test]
fn test_truncate_entry() {
    let mut archive = open(three_entries());
    {
        let mut entry = archive.get_file("third.txt").unwrap();
        let mut stream = entry
            .get_stream(StreamMode::Open, FileAccess::ReadWrite)
            .unwrap();
        stream.set_len(5).unwrap();
    }
    let bytes = archive.into_inner().unwrap().into_inner();
    verify_archive_contents(
        &bytes,
        &[
            ("first.txt", b"first entry content"),
            ("second.txt", b"second entry content"),
            ("third.txt", b"third"),
        ],
    );
}

#[test]
fn test_read_after_write_before_save() {
    let mut archive = open(three_entries());
    let mut entry = archive.get_file("first.txt").unwrap();
    let mut stream = entry
        .get_stream(StreamMode::Create, FileAccess::ReadWrite)
        .unwrap();
    stream.write_all(b"new text").unwrap();
    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut text = String::new();
    stream.read_to_string(&mut text).unwrap();
    assert_eq!(text, "new text");
}

// ============================================================================
// Save behaviour
// ============================================================================

#[test]
fn test_unchanged_archive_is_not_rewritten() {
    let original = three_entries();
    let mut archive = open(original.clone());
    assert_eq!(read_entry(&mut archive, "second.txt").unwrap(), b"second entry content");
    let bytes = archive.into_inner().unwrap().into_inner();
    assert_eq!(bytes, original);
}

#[test]
fn test_untouched_entries_keep_their_bytes() {
    let original = three_entries();
    let mut archive = open(original.clone());
    write_entry(&mut archive, "fourth.txt", CompressionMethod::Deflated, b"added").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    // The local entries of the original archive sit unchanged in front of
    // the new one.
    let first_central = common::find_bytes(&original, b"PK\x01\x02").unwrap();
    assert_eq!(&bytes[..first_central], &original[..first_central]);
}

#[test]
fn test_repeated_flushes() {
    let mut archive = open(three_entries());
    for round in 0..5 {
        let name = format!("round{}.txt", round);
        write_entry(&mut archive, &name, CompressionMethod::Deflated, name.as_bytes()).unwrap();
        archive.flush().unwrap();
        rewrite_entry(&mut archive, "first.txt", format!("rewritten {}", round).as_bytes())
            .unwrap();
        archive.flush().unwrap();
    }
    let bytes = archive.into_inner().unwrap().into_inner();

    let contents = common::read_all(&bytes).unwrap();
    assert_eq!(contents.len(), 8);
    assert_eq!(contents[0], ("first.txt".to_string(), b"rewritten 4".to_vec()));
    assert_eq!(contents[7], ("round4.txt".to_string(), b"round4.txt".to_vec()));
}

#[test]
fn test_reopen_and_edit_again() {
    let mut bytes = three_entries();
    for i in 0..3 {
        let mut archive = open(bytes);
        write_entry(&mut archive, &format!("extra{}", i), CompressionMethod::Stored, b"x").unwrap();
        archive.delete_file(if i == 0 { "second.txt" } else { "third.txt" }).ok();
        bytes = archive.into_inner().unwrap().into_inner();
    }
    verify_archive_contents(
        &bytes,
        &[
            ("first.txt", b"first entry content"),
            ("extra0", b"x"),
            ("extra1", b"x"),
            ("extra2", b"x"),
        ],
    );
}

#[test]
fn test_comment_survives_edits() {
    let mut archive = open(three_entries());
    archive.set_comment("archive comment").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    let mut archive = open(bytes);
    archive.delete_file("first.txt").unwrap();
    let bytes = archive.into_inner().unwrap().into_inner();

    let archive = Archive::open(Cursor::new(bytes), &OpenOptions::read_only()).unwrap();
    assert_eq!(archive.comment().unwrap(), b"archive comment");
}

#[test]
fn test_add_existing_name_fails() {
    let mut archive = open(three_entries());
    let err = archive
        .add_file("first.txt", CompressionMethod::Stored, DeflateOption::Normal)
        .unwrap_err();
    assert!(matches!(err, Error::EntryExists { .. }));
    assert!(err.is_invalid_usage());
}

#[test]
fn test_invalid_names_are_rejected() {
    let mut archive = open(three_entries());
    for name in ["", "   ", "nul\0byte"] {
        let err = archive
            .add_file(name, CompressionMethod::Stored, DeflateOption::Normal)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArchivePath(_)), "{:?}", name);
    }
    let long = "x".repeat(70_000);
    assert!(
        archive
            .add_file(&long, CompressionMethod::Stored, DeflateOption::Normal)
            .is_err()
    );
}

// ============================================================================
// File modes
// ============================================================================

#[test]
fn test_file_modes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modes.zip");

    // Open on a missing file fails.
    assert!(Archive::open_path(&path, &OpenOptions::new()).is_err());

    // OpenOrCreate creates it.
    {
        let options = OpenOptions::new().mode(FileMode::OpenOrCreate);
        let mut archive = Archive::open_path(&path, &options).unwrap();
        write_entry(&mut archive, "a", CompressionMethod::Stored, b"1").unwrap();
        archive.close().unwrap();
    }

    // CreateNew refuses an existing file.
    let options = OpenOptions::new().mode(FileMode::CreateNew);
    assert!(Archive::open_path(&path, &options).is_err());

    // OpenOrCreate opens the existing one.
    {
        let options = OpenOptions::new().mode(FileMode::OpenOrCreate);
        let mut archive = Archive::open_path(&path, &options).unwrap();
        assert!(archive.file_exists("a").unwrap());
        write_entry(&mut archive, "b", CompressionMethod::Stored, b"2").unwrap();
    }
    verify_archive_contents(&std::fs::read(&path).unwrap(), &[("a", b"1"), ("b", b"2")]);

    // Create discards it.
    {
        let archive = Archive::open_path(&path, &OpenOptions::create()).unwrap();
        drop(archive);
    }
    verify_archive_contents(&std::fs::read(&path).unwrap(), &[]);
}

#[test]
fn test_file_shrinks_after_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shrink.zip");
    std::fs::write(&path, three_entries()).unwrap();
    let before = std::fs::metadata(&path).unwrap().len();

    let mut archive = Archive::open_path(&path, &OpenOptions::new()).unwrap();
    archive.delete_file("first.txt").unwrap();
    archive.close().unwrap();
    drop(archive);

    let after = std::fs::metadata(&path).unwrap().len();
    assert!(after < before);
    verify_archive_contents(
        &std::fs::read(&path).unwrap(),
        &[
            ("second.txt", b"second entry content"),
            ("third.txt", b"third entry content"),
        ],
    );
}
