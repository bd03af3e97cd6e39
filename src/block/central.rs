//! The central directory block.

use std::collections::HashMap;
use std::io::{Cursor, Seek, SeekFrom, Write};

use super::{CentralSummary, SaveContext};
use crate::format::central::CentralDirectoryFileHeader;
use crate::format::reader::u32_at;
use crate::format::signature;
use crate::stream::ArchiveStream;
use crate::{Error, Result};

/// All central directory file headers, in directory order, keyed by name.
#[derive(Debug)]
pub(crate) struct CentralDirectoryBlock {
    offset: u64,
    image_end: u64,
    headers: Vec<CentralDirectoryFileHeader>,
    index: HashMap<String, usize>,
    dirty: bool,
}

impl CentralDirectoryBlock {
    /// Creates an empty directory at `offset`.
    pub(crate) fn create(offset: u64) -> Self {
        Self {
            offset,
            image_end: offset,
            headers: Vec::new(),
            index: HashMap::new(),
            dirty: true,
        }
    }

    /// Parses `entries` headers from `data`, the directory's bytes read
    /// from `offset`.
    ///
    /// The headers must fill `data` exactly; a digital signature record
    /// after them is rejected.
    pub(crate) fn parse(data: &[u8], offset: u64, entries: u64) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut headers = Vec::new();
        let mut index = HashMap::new();

        for _ in 0..entries {
            let position = cursor.position();
            match u32_at(data, position as usize) {
                Some(signature::CENTRAL_DIRECTORY_HEADER) => {}
                Some(signature::DIGITAL_SIGNATURE) => {
                    return Err(Error::UnsupportedFeature {
                        feature: "digital signatures",
                    });
                }
                _ => {
                    return Err(Error::corrupted(
                        offset + position,
                        format!(
                            "central directory holds {} entries but {} were expected",
                            headers.len(),
                            entries
                        ),
                    ));
                }
            }
            let header = CentralDirectoryFileHeader::parse(&mut cursor, offset + position)
                .map_err(|e| e.truncated_at(offset + position))?;
            let name = header.name.as_str().to_string();
            if index.insert(name.clone(), headers.len()).is_some() {
                return Err(Error::corrupted(
                    offset + position,
                    format!("duplicate entry name '{}'", name),
                ));
            }
            headers.push(header);
        }

        let consumed = cursor.position() as usize;
        if consumed != data.len() {
            if u32_at(data, consumed) == Some(signature::DIGITAL_SIGNATURE) {
                return Err(Error::UnsupportedFeature {
                    feature: "digital signatures",
                });
            }
            return Err(Error::corrupted(
                offset + consumed as u64,
                format!(
                    "central directory size is {} bytes but its entries take {}",
                    data.len(),
                    consumed
                ),
            ));
        }

        Ok(Self {
            offset,
            image_end: offset + data.len() as u64,
            headers,
            index,
            dirty: false,
        })
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn size(&self) -> u64 {
        self.headers.iter().map(CentralDirectoryFileHeader::size).sum()
    }

    pub(crate) fn image_end(&self) -> u64 {
        self.image_end
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn len(&self) -> usize {
        self.headers.len()
    }

    pub(crate) fn headers(&self) -> &[CentralDirectoryFileHeader] {
        &self.headers
    }

    pub(crate) fn get(&self, name: &str) -> Option<&CentralDirectoryFileHeader> {
        self.index.get(name).map(|&i| &self.headers[i])
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Appends a header; the name must not be present yet.
    pub(crate) fn insert(&mut self, header: CentralDirectoryFileHeader) -> Result<()> {
        let name = header.name.as_str().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::EntryExists { path: name });
        }
        self.index.insert(name, self.headers.len());
        self.headers.push(header);
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<CentralDirectoryFileHeader> {
        let position = self.index.remove(name)?;
        let header = self.headers.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        self.dirty = true;
        Some(header)
    }

    /// Orders the headers by local header offset.
    pub(crate) fn sort_by_offset(&mut self) {
        self.headers.sort_by_key(|h| h.local_header_offset);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.name.as_str().to_string(), i))
            .collect();
    }

    pub(crate) fn move_to(&mut self, offset: u64) {
        if offset != self.offset {
            self.offset = offset;
            self.dirty = true;
        }
    }

    /// Mirrors every entry recorded in `ctx` and records the directory's
    /// own placement.
    pub(crate) fn update_references(&mut self, ctx: &mut SaveContext) {
        for header in &mut self.headers {
            if let Some(local) = ctx.locals.get(header.name.as_str()) {
                let before = header.clone();
                header.update_from_local(&local.header, local.offset);
                if *header != before {
                    self.dirty = true;
                }
            }
        }
        ctx.central = Some(CentralSummary {
            offset: self.offset,
            size: self.size(),
            entries: self.headers.len() as u64,
        });
    }

    /// Serializes every header.
    pub(crate) fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        for header in &self.headers {
            header.write_to(w)?;
        }
        Ok(())
    }

    pub(crate) fn save<S: ArchiveStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        stream.seek(SeekFrom::Start(self.offset))?;
        self.write_to(stream)?;
        self.mark_saved();
        Ok(())
    }

    pub(crate) fn mark_saved(&mut self) {
        self.image_end = self.offset + self.size();
        self.dirty = false;
    }
}
