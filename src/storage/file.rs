//! File store
//!
//! Append-only data file of fixed-size blocks with an in-memory position index.
//!
//! ## Responsibilities
//! - Rebuild the position index by scanning the file on open
//! - Append new and replacement records at the end of the last whole block,
//!   syncing after every write
//! - Delete logically by setting the tombstone bit of a block in place
//! - Purge tombstoned blocks by rewriting the file through a temp file
//!
//! ## Position Index
//! `offsets[i]` is the byte offset of the i-th live block in insertion order.
//! Tombstoned blocks stay on disk until `purge` but never appear in `offsets`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::codec::{self, FIXED_SIZE};
use crate::config::CorruptionPolicy;
use crate::error::{CabinetError, Result};
use crate::query::{matches_any, FieldCondition, RecordField, Selection};
use crate::record::{Record, RecordInput};
use crate::snapshot::Snapshot;
use crate::validation::RecordValidator;

use super::iterator::{read_block, FileRecordIterator};
use super::{check_id, last_occurrences, next_id, PurgeStat, RecordIterator, RecordStore, StoreStat};

/// Binary-file record store
pub struct FileStore {
    /// Path of the data file
    path: PathBuf,

    /// Open handle (read + write)
    file: File,

    validator: Box<dyn RecordValidator>,

    /// Offsets of live blocks, in insertion order
    offsets: Vec<u64>,

    /// id → offset of the live block holding it
    ids: HashMap<i32, u64>,

    /// Blocks on disk, live or not
    block_count: usize,

    /// Highest id ever written to this file
    last_id: i32,

    corruption_policy: CorruptionPolicy,
}

impl FileStore {
    /// Open or create a data file and index its live blocks
    ///
    /// On open:
    /// 1. Truncate a trailing partial block (interrupted append)
    /// 2. Scan every block, skipping tombstones
    /// 3. Resolve duplicate live ids (later block wins)
    pub fn open(
        path: &Path,
        validator: Box<dyn RecordValidator>,
        corruption_policy: CorruptionPolicy,
    ) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut store = Self {
            path: path.to_path_buf(),
            file,
            validator,
            offsets: Vec::new(),
            ids: HashMap::new(),
            block_count: 0,
            last_id: 0,
            corruption_policy,
        };
        store.load()?;

        info!(
            path = %store.path.display(),
            live = store.offsets.len(),
            removed = store.block_count - store.offsets.len(),
            "opened data file"
        );
        Ok(store)
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the data file in bytes
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Offsets of the live blocks (position index)
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn load(&mut self) -> Result<()> {
        let len = self.file.metadata()?.len();
        let block_size = FIXED_SIZE as u64;

        if len % block_size != 0 {
            let whole = len - len % block_size;
            warn!(
                path = %self.path.display(),
                discarded = len - whole,
                "truncating partial block at end of data file"
            );
            self.file.set_len(whole)?;
            self.file.sync_all()?;
        }

        self.block_count = (len / block_size) as usize;

        for i in 0..self.block_count {
            let offset = i as u64 * block_size;
            let block = read_block(&mut self.file, offset)?;

            let record = match codec::decode(&block) {
                Ok(record) => record,
                Err(CabinetError::CorruptRecord(reason))
                    if self.corruption_policy == CorruptionPolicy::Skip =>
                {
                    warn!(offset, %reason, "skipping corrupt block");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.last_id = self.last_id.max(record.id);
            if codec::is_deleted(&block) {
                continue;
            }

            if let Some(previous) = self.ids.insert(record.id, offset) {
                warn!(id = record.id, offset = previous, "tombstoning superseded duplicate block");
                self.tombstone(previous)?;
                self.offsets.retain(|&o| o != previous);
            }
            self.offsets.push(offset);
        }

        Ok(())
    }

    /// Encode and append one record; returns its offset
    ///
    /// The block lands right after the last whole block, so a stray tail left
    /// by an earlier failed write is overwritten. On failure the file is cut
    /// back to `offset`.
    fn append(&mut self, record: &Record) -> Result<u64> {
        let block = codec::encode(record)?;
        let offset = (self.block_count * FIXED_SIZE) as u64;

        if let Err(e) = self.write_block(offset, &block) {
            warn!(offset, error = %e, "append failed, truncating data file");
            self.file.set_len(offset)?;
            return Err(e);
        }

        self.block_count += 1;
        Ok(offset)
    }

    fn write_block(&mut self, offset: u64, block: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block)?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Set the tombstone bit of the block at `offset`
    fn tombstone(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset + codec::status_offset()))?;
        self.file.write_all(&[codec::deleted_status()])?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Append `record`, retiring any live block with the same id
    ///
    /// The index points at the new block before the old one is tombstoned, so
    /// a failed tombstone leaves the same state open() would rebuild.
    fn store(&mut self, record: &Record) -> Result<()> {
        let offset = self.append(record)?;

        self.offsets.push(offset);
        self.last_id = self.last_id.max(record.id);
        if let Some(previous) = self.ids.insert(record.id, offset) {
            self.offsets.retain(|&o| o != previous);
            self.tombstone(previous)?;
        }
        Ok(())
    }

    /// Decode every live block, honouring the corruption policy
    fn live_records(&mut self) -> Result<Vec<(u64, Record)>> {
        let mut records = Vec::with_capacity(self.offsets.len());

        for &offset in &self.offsets {
            let block = read_block(&mut self.file, offset)?;
            match codec::decode(&block) {
                Ok(record) => records.push((offset, record)),
                Err(CabinetError::CorruptRecord(reason))
                    if self.corruption_policy == CorruptionPolicy::Skip =>
                {
                    warn!(offset, %reason, "skipping corrupt block");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    fn find_where<F>(&mut self, predicate: F) -> Result<Box<dyn RecordIterator + '_>>
    where
        F: Fn(&Record) -> bool,
    {
        let offsets = self
            .live_records()?
            .into_iter()
            .filter(|(_, record)| predicate(record))
            .map(|(offset, _)| offset)
            .collect();
        Ok(Box::new(FileRecordIterator::new(&mut self.file, offsets)))
    }
}

impl RecordStore for FileStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn create(&mut self, input: &RecordInput) -> Result<i32> {
        self.validator.validate(input)?;

        let id = next_id(self.last_id)?;
        self.store(&Record::new(id, input.clone()))?;

        debug!(id, "created record");
        Ok(id)
    }

    fn insert(&mut self, id: i32, input: &RecordInput) -> Result<()> {
        check_id(id)?;
        self.validator.validate(input)?;

        self.store(&Record::new(id, input.clone()))?;

        debug!(id, "inserted record");
        Ok(())
    }

    fn edit(&mut self, _id: i32, _input: &RecordInput) -> Result<()> {
        Err(CabinetError::NotSupported(
            "the file backend does not edit records in place".to_string(),
        ))
    }

    fn delete_by_field(&mut self, field: &str, value: &str) -> Result<Vec<i32>> {
        let condition = FieldCondition::parse(field, value)?;

        let doomed: Vec<(u64, i32)> = self
            .live_records()?
            .into_iter()
            .filter(|(_, record)| condition.matches(record))
            .map(|(offset, record)| (offset, record.id))
            .collect();

        if doomed.is_empty() {
            return Err(CabinetError::NotFound(format!(
                "no record with {} = {}",
                condition.field(),
                value.trim()
            )));
        }

        let mut ids = Vec::with_capacity(doomed.len());
        for (offset, id) in doomed {
            self.tombstone(offset)?;
            self.offsets.retain(|&o| o != offset);
            self.ids.remove(&id);
            ids.push(id);
        }

        debug!(?ids, "deleted records");
        Ok(ids)
    }

    fn update_many(
        &mut self,
        _matches: &[FieldCondition],
        _sets: &[FieldCondition],
    ) -> Result<Vec<i32>> {
        Err(CabinetError::NotSupported(
            "the file backend does not update records in place".to_string(),
        ))
    }

    fn select(&mut self, fields: &[RecordField], matches: &[FieldCondition]) -> Result<Selection> {
        let mut records: Vec<Record> = self
            .live_records()?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| matches_any(matches, record))
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(Selection::new(fields, records))
    }

    fn find_by_first_name(&mut self, name: &str) -> Result<Box<dyn RecordIterator + '_>> {
        let name = name.trim().to_string();
        self.find_where(move |r| r.first_name.eq_ignore_ascii_case(&name))
    }

    fn find_by_last_name(&mut self, name: &str) -> Result<Box<dyn RecordIterator + '_>> {
        let name = name.trim().to_string();
        self.find_where(move |r| r.last_name.eq_ignore_ascii_case(&name))
    }

    fn find_by_date_of_birth(
        &mut self,
        date: NaiveDate,
    ) -> Result<Box<dyn RecordIterator + '_>> {
        self.find_where(move |r| r.date_of_birth == date)
    }

    fn iterate(&mut self) -> Result<Box<dyn RecordIterator + '_>> {
        let offsets = self.offsets.clone();
        Ok(Box::new(FileRecordIterator::new(&mut self.file, offsets)))
    }

    /// Merge a snapshot into the data file
    ///
    /// Accepted records are appended in ascending id order. Invalid records
    /// are never written, so they cannot displace anything. An accepted record
    /// with a live id is appended and the old block is tombstoned.
    fn restore(&mut self, snapshot: &Snapshot) -> Result<usize> {
        let mut accepted = 0;
        let mut replaced = 0;

        let mut records = last_occurrences(snapshot);
        records.sort_by_key(|r| r.id);

        for record in records {
            let verdict = check_id(record.id).and_then(|_| self.validator.validate(&record.input()));
            if let Err(e) = verdict {
                warn!(id = record.id, error = %e, "rejected imported record");
                continue;
            }

            if self.ids.contains_key(&record.id) {
                replaced += 1;
            }
            self.store(&record)?;
            accepted += 1;
        }

        info!(imported = accepted, replaced, total = self.offsets.len(), "restored snapshot");
        Ok(accepted)
    }

    fn get_stat(&self) -> StoreStat {
        StoreStat {
            live: self.offsets.len(),
            removed: self.block_count - self.offsets.len(),
        }
    }

    /// Rewrite the data file with live blocks only
    ///
    /// Blocks are copied into a temp file in the same directory, synced, and
    /// renamed over the original with its permissions. The directory is synced
    /// after the rename. If anything fails before the rename the
    /// temp file is deleted on drop and the original is untouched.
    fn purge(&mut self) -> Result<PurgeStat> {
        let total = self.block_count;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = NamedTempFile::new_in(&dir)?;
        let mut remap = HashMap::with_capacity(self.offsets.len());
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            for (i, &offset) in self.offsets.iter().enumerate() {
                let block = read_block(&mut self.file, offset)?;
                writer.write_all(&block)?;
                remap.insert(offset, (i * FIXED_SIZE) as u64);
            }
            writer.flush()?;
        }
        temp.as_file()
            .set_permissions(self.file.metadata()?.permissions())?;
        temp.as_file().sync_all()?;

        for offset in self.ids.values() {
            if !remap.contains_key(offset) {
                return Err(CabinetError::CorruptRecord(format!(
                    "position index out of sync: no live block at offset {}",
                    offset
                )));
            }
        }

        self.file = temp.persist(&self.path).map_err(|e| CabinetError::Io(e.error))?;
        sync_directory(&dir)?;

        for offset in self.offsets.iter_mut().chain(self.ids.values_mut()) {
            if let Some(&moved) = remap.get(&*offset) {
                *offset = moved;
            }
        }
        self.block_count = self.offsets.len();

        let stat = PurgeStat {
            purged: total - self.block_count,
            total,
        };
        info!(purged = stat.purged, total, "purged data file");
        Ok(stat)
    }

    fn corruption_policy(&self) -> CorruptionPolicy {
        self.corruption_policy
    }
}

/// Make a rename in `dir` durable
#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}
