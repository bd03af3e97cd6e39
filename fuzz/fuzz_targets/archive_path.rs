//! Fuzz target for ArchivePath::new with arbitrary string input.
//!
//! This target exercises name validation and normalization with malformed
//! or adversarial strings.
//!
//! Run with: cargo +nightly fuzz run archive_path
//!
//! Properties being tested:
//! - Accepted names contain no NUL bytes and no backslashes
//! - Accepted names fit the 16-bit length field
//! - Normalizing an accepted name again is a no-op

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = zipblock::ArchivePath::new(name) else {
        return;
    };
    let normalized = path.as_str();

    assert!(
        !normalized.contains('\0'),
        "NUL byte in normalized name: {:?}",
        normalized
    );
    assert!(
        !normalized.contains('\\'),
        "Backslash survived normalization: {:?}",
        normalized
    );
    assert!(path.as_bytes().len() <= u16::MAX as usize);

    let again = zipblock::ArchivePath::new(normalized).expect("normalized name must stay valid");
    assert_eq!(again.as_str(), normalized);
});
