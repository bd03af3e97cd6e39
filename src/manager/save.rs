//! Saving: the two-pass in-place save and the forward-only streaming save.

use std::io::Write;

use super::{BlockManager, State, slot, slot_mut};
use crate::block::{Block, PreSaveNotification, SaveContext};
use crate::stream::ArchiveStream;
use crate::{Error, Result};

impl<S: ArchiveStream> BlockManager<S> {
    /// Persists pending changes. `closing` is set by the final save.
    ///
    /// Calls made while a save is already running return immediately.
    pub(crate) fn save(&mut self, closing: bool) -> Result<()> {
        match self.state {
            State::Closed => return Err(Error::Disposed),
            State::Saving => return Ok(()),
            State::Open => {}
        }
        if self.config.read_only {
            return Ok(());
        }

        self.state = State::Saving;
        let result = if self.is_streaming() {
            self.save_streaming(closing)
        } else {
            self.save_in_place(closing)
        };
        self.state = State::Open;
        result
    }

    fn save_in_place(&mut self, closing: bool) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        // Entries that keep their offset can stay raw. From the first block
        // that may move on, entries are typed so the directory follows them.
        let central = self.ensure_central()?;
        let shift_start = self.first_shifting_offset()?;
        let directory = slot(&self.blocks, central)?.as_central();
        let unloaded: Vec<String> = match (shift_start, directory) {
            (Some(start), Some(directory)) => directory
                .headers()
                .iter()
                .filter(|h| h.local_header_offset >= start)
                .map(|h| h.name.as_str().to_string())
                .filter(|name| !self.locals.contains_key(name))
                .collect(),
            _ => Vec::new(),
        };
        if !unloaded.is_empty() {
            log::trace!(
                "mapping {} entries at or after {:#x}",
                unloaded.len(),
                shift_start.unwrap_or(0)
            );
        }
        for name in &unloaded {
            self.load_local_block(name)?;
        }

        // Pass 1: lay blocks out back to back and settle what depends on
        // positions and sizes.
        let mut ctx = SaveContext::new();
        let mut end = 0u64;
        for &id in &self.order {
            let block = slot_mut(&mut self.blocks, id)?;
            block.move_to(end);
            block.update_references(&mut self.stream, &mut ctx, closing)?;
            end += block.size();
        }

        // Pass 2: write dirty blocks in order, letting later blocks save
        // whatever part of their old image each write covers.
        let mut written = 0usize;
        for index in 0..self.order.len() {
            let id = self.order[index];
            let (start, stop) = {
                let block = slot(&self.blocks, id)?;
                if !block.is_dirty(closing) {
                    continue;
                }
                (block.offset(), block.offset() + block.size())
            };
            if stop > start {
                // Old images follow list order; those ending before the write
                // cannot overlap it.
                let later_blocks = &self.order[index + 1..];
                let skip = later_blocks.partition_point(|&later| {
                    slot(&self.blocks, later).is_ok_and(|b| b.image_end() <= start)
                });
                for &later in &later_blocks[skip..] {
                    let block = slot_mut(&mut self.blocks, later)?;
                    if block.pre_save_notification(&mut self.stream, start, stop)?
                        == PreSaveNotification::Stop
                    {
                        break;
                    }
                }
            }
            slot_mut(&mut self.blocks, id)?.save(&mut self.stream)?;
            written += 1;
        }

        let previous_len = self.stream.stream_len()?;
        if end < previous_len {
            log::debug!("truncating archive from {} to {} bytes", previous_len, end);
            self.stream.set_len(end)?;
        }
        self.stream.flush()?;
        self.dirty = false;
        log::debug!(
            "saved archive: {} blocks, {} written, {} bytes",
            self.order.len(),
            written,
            end
        );
        Ok(())
    }

    /// Returns the current offset of the first block the next save may
    /// move, or `None` if the layout stays as it is.
    ///
    /// Dirty blocks can still change size while their references update,
    /// so whatever follows one counts as moving.
    fn first_shifting_offset(&self) -> Result<Option<u64>> {
        let mut end = 0u64;
        let mut after_dirty = false;
        for &id in &self.order {
            let block = slot(&self.blocks, id)?;
            if after_dirty || block.offset() != end {
                return Ok(Some(block.offset()));
            }
            after_dirty = block.is_dirty(false);
            end += block.size();
        }
        Ok(None)
    }

    /// Streaming save. A flush hands buffered data of the open entry to the
    /// sink; the final save finishes that entry and appends the central
    /// directory and the trailer records, in order, without seeking.
    fn save_streaming(&mut self, closing: bool) -> Result<()> {
        if !closing {
            let open = self.streaming.as_ref().and_then(|state| state.open);
            if let Some(id) = open {
                let (block, stream) = self.local_and_stream(id)?;
                let emitted = block.flush_streaming(stream)?;
                if let Some(state) = &mut self.streaming {
                    state.position += emitted;
                }
            }
            self.stream.flush()?;
            return Ok(());
        }

        self.finish_open_entry()?;
        let mut position = self.streaming.as_ref().map_or(0, |state| state.position);

        let mut ctx = SaveContext::new();
        for &id in &self.order {
            if let Some(local) = slot_mut(&mut self.blocks, id)?.as_local_mut() {
                local.update_references(&mut self.stream, &mut ctx, true)?;
            }
        }

        let trailer = self.order.len() - super::TRAILER_BLOCKS;
        for index in trailer..self.order.len() {
            let id = self.order[index];
            let block = slot_mut(&mut self.blocks, id)?;
            block.move_to(position);
            block.update_references(&mut self.stream, &mut ctx, true)?;
            match &mut *block {
                Block::CentralDirectory(b) => {
                    b.sort_by_offset();
                    b.write_to(&mut self.stream)?;
                    b.mark_saved();
                }
                Block::Zip64EndOfCentralDirectory(b) => {
                    b.write_to(&mut self.stream)?;
                    b.mark_saved();
                }
                Block::Zip64Locator(b) => {
                    b.write_to(&mut self.stream)?;
                    b.mark_saved();
                }
                Block::EndOfCentralDirectory(b) => {
                    b.write_to(&mut self.stream)?;
                    b.mark_saved();
                }
                Block::Raw(_) | Block::Local(_) => {
                    return Err(Error::invalid_usage("unexpected block in archive trailer"));
                }
            }
            position += block.size();
        }

        if let Some(state) = &mut self.streaming {
            state.position = position;
        }
        self.stream.flush()?;
        self.dirty = false;
        log::debug!("finished streaming archive: {} bytes", position);
        Ok(())
    }
}
