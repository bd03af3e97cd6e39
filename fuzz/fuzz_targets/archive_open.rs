//! Fuzz target for Archive::open with arbitrary byte input.
//!
//! This target exercises the trailer, central directory and local header
//! parsers with malformed or adversarial input, then saves an edit so the
//! block layout code runs over whatever was accepted. The goal is to find
//! panics, hangs, or runaway allocations.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, Read};
use zipblock::{Archive, FileAccess, OpenOptions, StreamMode};

fuzz_target!(|data: &[u8]| {
    let Ok(mut archive) = Archive::open(Cursor::new(data.to_vec()), &OpenOptions::new()) else {
        return;
    };
    let Ok(infos) = archive.list_files() else {
        return;
    };

    // Read every entry (exercises local headers, descriptors and inflate).
    for info in &infos {
        if let Ok(mut entry) = archive.get_file(info.name.as_str()) {
            if let Ok(mut stream) = entry.get_stream(StreamMode::Open, FileAccess::Read) {
                let mut sink = Vec::new();
                let _ = stream.by_ref().take(1 << 20).read_to_end(&mut sink);
            }
        }
    }

    // Drop the first entry and save, moving everything behind it.
    if let Some(first) = infos.first() {
        let _ = archive.delete_file(first.name.as_str());
    }
    let _ = archive.close();
});
