//! Storage Module
//!
//! Two interchangeable record stores behind one trait.
//!
//! ## Responsibilities
//! - Create, insert, edit, delete and search records
//! - Consult the validator before every mutation
//! - Expose a lazy iterator that behaves the same on both backends
//! - Take snapshots and merge them back in (restore)
//! - Reclaim space from tombstoned records (file backend)
//!
//! ## Backends
//! ```text
//!                 ┌───────────────────┐
//!                 │    RecordStore    │
//!                 └─────────┬─────────┘
//!           ┌───────────────┴───────────────┐
//!           ▼                               ▼
//!   ┌───────────────┐               ┌───────────────┐
//!   │  MemoryStore  │               │   FileStore   │
//!   │ Vec + indices │               │ blocks + index│
//!   └───────────────┘               └───────────────┘
//! ```

mod file;
mod iterator;
mod memory;

use chrono::NaiveDate;
use tracing::warn;

use crate::config::CorruptionPolicy;
use crate::error::{CabinetError, Result};
use crate::query::{FieldCondition, RecordField, Selection};
use crate::record::RecordInput;
use crate::snapshot::Snapshot;

pub use file::FileStore;
pub use iterator::{FileRecordIterator, MemoryRecordIterator, RecordIterator};
pub use memory::MemoryStore;

/// Live and removed record counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStat {
    /// Records visible to reads
    pub live: usize,

    /// Records deleted but still occupying storage
    pub removed: usize,
}

/// Outcome of a purge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeStat {
    /// Records physically removed
    pub purged: usize,

    /// Records examined (live + removed before the purge)
    pub total: usize,
}

/// Common operation set of every record store
///
/// Reads take `&mut self` because the file backend moves its file cursor.
pub trait RecordStore {
    /// Short backend name for logs and the CLI
    fn kind(&self) -> &'static str;

    /// Validate and store a new record; returns its id
    fn create(&mut self, input: &RecordInput) -> Result<i32>;

    /// Store a record under an explicit id, replacing any live record with it
    fn insert(&mut self, id: i32, input: &RecordInput) -> Result<()>;

    /// Replace the fields of an existing record
    fn edit(&mut self, id: i32, input: &RecordInput) -> Result<()>;

    /// Remove every record whose `field` equals `value`; returns removed ids
    fn delete_by_field(&mut self, field: &str, value: &str) -> Result<Vec<i32>>;

    /// Apply `sets` to every record matching any of `matches`; returns changed ids
    fn update_many(&mut self, matches: &[FieldCondition], sets: &[FieldCondition])
        -> Result<Vec<i32>>;

    /// Records matching any condition (all when none), deduplicated, by id
    fn select(&mut self, fields: &[RecordField], matches: &[FieldCondition]) -> Result<Selection>;

    fn find_by_first_name(&mut self, name: &str) -> Result<Box<dyn RecordIterator + '_>>;

    fn find_by_last_name(&mut self, name: &str) -> Result<Box<dyn RecordIterator + '_>>;

    fn find_by_date_of_birth(&mut self, date: NaiveDate)
        -> Result<Box<dyn RecordIterator + '_>>;

    /// Lazy traversal of all live records in storage order
    fn iterate(&mut self) -> Result<Box<dyn RecordIterator + '_>>;

    /// Merge imported records in; returns how many passed validation
    fn restore(&mut self, snapshot: &Snapshot) -> Result<usize>;

    fn get_stat(&self) -> StoreStat;

    /// Physically drop removed records
    fn purge(&mut self) -> Result<PurgeStat>;

    /// How bulk reads treat undecodable records
    fn corruption_policy(&self) -> CorruptionPolicy {
        CorruptionPolicy::Skip
    }

    /// Deep copy of all live records at call time
    fn make_snapshot(&mut self) -> Result<Snapshot> {
        let policy = self.corruption_policy();
        let mut records = Vec::new();

        let mut iter = self.iterate()?;
        while iter.has_more() {
            match iter.next_record() {
                Ok(record) => records.push(record),
                Err(CabinetError::CorruptRecord(reason)) if policy == CorruptionPolicy::Skip => {
                    warn!(%reason, "skipping corrupt record in snapshot");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Snapshot::new(records))
    }
}

/// Ids must be positive
pub(crate) fn check_id(id: i32) -> Result<()> {
    if id <= 0 {
        return Err(CabinetError::validation("id", format!("must be positive, got {}", id)));
    }
    Ok(())
}

/// Next id after a high-water mark
pub(crate) fn next_id(last_id: i32) -> Result<i32> {
    last_id
        .checked_add(1)
        .ok_or_else(|| CabinetError::validation("id", "id space exhausted"))
}

/// Drop earlier duplicates of an id, keeping the last occurrence in place
pub(crate) fn last_occurrences(snapshot: &Snapshot) -> Vec<crate::record::Record> {
    let records = snapshot.records();
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<_> = records
        .iter()
        .rev()
        .filter(|r| seen.insert(r.id))
        .cloned()
        .collect();
    kept.reverse();
    kept
}
