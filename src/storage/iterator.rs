//! Record iterators
//!
//! Pull-based cursors over the live records of either backend.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::codec::{self, FIXED_SIZE};
use crate::error::{CabinetError, Result};
use crate::record::Record;

/// Stateful, single-pass cursor over records
///
/// Restart by asking the store for a new iterator. The store must not be
/// mutated while an iterator is alive (the borrow checker enforces this).
pub trait RecordIterator: Iterator<Item = Result<Record>> {
    /// True while `next_record` has something to return
    fn has_more(&self) -> bool;

    /// Return the next record, or `OutOfRange` once exhausted
    fn next_record(&mut self) -> Result<Record>;
}

// =============================================================================
// Memory Iterator
// =============================================================================

/// Iterator over an owned, ordered copy of records
pub struct MemoryRecordIterator {
    records: Vec<Record>,
    position: usize,
}

impl MemoryRecordIterator {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            position: 0,
        }
    }
}

impl RecordIterator for MemoryRecordIterator {
    fn has_more(&self) -> bool {
        self.position < self.records.len()
    }

    fn next_record(&mut self) -> Result<Record> {
        let record = self
            .records
            .get(self.position)
            .cloned()
            .ok_or(CabinetError::OutOfRange)?;
        self.position += 1;
        Ok(record)
    }
}

impl Iterator for MemoryRecordIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.has_more().then(|| self.next_record())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.records.len() - self.position;
        (remaining, Some(remaining))
    }
}

// =============================================================================
// File Iterator
// =============================================================================

/// Iterator over block offsets of a data file, decoding one block per pull
pub struct FileRecordIterator<'a> {
    file: &'a mut File,
    offsets: Vec<u64>,
    position: usize,
}

impl<'a> FileRecordIterator<'a> {
    pub(super) fn new(file: &'a mut File, offsets: Vec<u64>) -> Self {
        Self {
            file,
            offsets,
            position: 0,
        }
    }
}

impl<'a> RecordIterator for FileRecordIterator<'a> {
    fn has_more(&self) -> bool {
        self.position < self.offsets.len()
    }

    /// A block that fails to decode is returned as an error, and the cursor
    /// still moves past it so the caller may skip and continue.
    fn next_record(&mut self) -> Result<Record> {
        let offset = *self
            .offsets
            .get(self.position)
            .ok_or(CabinetError::OutOfRange)?;
        self.position += 1;

        let block = read_block(self.file, offset)?;
        codec::decode(&block)
    }
}

impl<'a> Iterator for FileRecordIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.has_more().then(|| self.next_record())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.offsets.len() - self.position;
        (remaining, Some(remaining))
    }
}

/// Read one raw block at `offset`
pub(crate) fn read_block(file: &mut File, offset: u64) -> Result<[u8; FIXED_SIZE]> {
    let mut block = [0u8; FIXED_SIZE];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut block)?;
    Ok(block)
}
