//! Memory store
//!
//! List-backed record store with secondary indices.
//!
//! ## Layout
//! - `records`: live records, kept sorted by id after restore
//! - `positions`: id → index into `records`, rebuilt after every removal
//! - name indices keyed by lowercase name, date index keyed by date; each
//!   bucket holds ids
//!
//! Every mutating operation finishes with the indices matching the current
//! field values.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::{CabinetError, Result};
use crate::query::{matches_any, FieldCondition, RecordField, Selection};
use crate::record::{Record, RecordInput};
use crate::snapshot::Snapshot;
use crate::validation::RecordValidator;

use super::iterator::MemoryRecordIterator;
use super::{check_id, last_occurrences, next_id, PurgeStat, RecordIterator, RecordStore, StoreStat};

/// Secondary indices over the live records
#[derive(Debug, Default)]
struct SecondaryIndex {
    first_name: HashMap<String, Vec<i32>>,
    last_name: HashMap<String, Vec<i32>>,
    date_of_birth: HashMap<NaiveDate, Vec<i32>>,
}

impl SecondaryIndex {
    fn add(&mut self, record: &Record) {
        self.first_name
            .entry(record.first_name.to_lowercase())
            .or_default()
            .push(record.id);
        self.last_name
            .entry(record.last_name.to_lowercase())
            .or_default()
            .push(record.id);
        self.date_of_birth
            .entry(record.date_of_birth)
            .or_default()
            .push(record.id);
    }

    fn remove(&mut self, record: &Record) {
        remove_from_bucket(&mut self.first_name, &record.first_name.to_lowercase(), record.id);
        remove_from_bucket(&mut self.last_name, &record.last_name.to_lowercase(), record.id);
        remove_from_bucket(&mut self.date_of_birth, &record.date_of_birth, record.id);
    }

    fn clear(&mut self) {
        self.first_name.clear();
        self.last_name.clear();
        self.date_of_birth.clear();
    }
}

fn remove_from_bucket<K>(index: &mut HashMap<K, Vec<i32>>, key: &K, id: i32)
where
    K: std::hash::Hash + Eq + Clone,
{
    if let Some(bucket) = index.get_mut(key) {
        bucket.retain(|&existing| existing != id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

/// In-memory record store
pub struct MemoryStore {
    validator: Box<dyn RecordValidator>,
    records: Vec<Record>,
    positions: HashMap<i32, usize>,
    index: SecondaryIndex,
    /// Highest id ever stored; new ids start above it
    last_id: i32,
}

impl MemoryStore {
    pub fn new(validator: Box<dyn RecordValidator>) -> Self {
        Self {
            validator,
            records: Vec::new(),
            positions: HashMap::new(),
            index: SecondaryIndex::default(),
            last_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by id
    pub fn get(&self, id: i32) -> Option<&Record> {
        self.positions.get(&id).map(|&pos| &self.records[pos])
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn push(&mut self, record: Record) {
        self.last_id = self.last_id.max(record.id);
        self.index.add(&record);
        self.positions.insert(record.id, self.records.len());
        self.records.push(record);
    }

    /// Replace the fields at `pos`, moving the record between index buckets
    fn replace_at(&mut self, pos: usize, input: RecordInput) {
        let record = &mut self.records[pos];
        self.index.remove(record);
        record.apply(input);
        self.index.add(record);
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id, pos))
            .collect();
    }

    fn rebuild_all(&mut self) {
        self.rebuild_positions();
        self.index.clear();
        for record in &self.records {
            self.index.add(record);
        }
    }

    fn iter_ids(&self, ids: Option<&Vec<i32>>) -> MemoryRecordIterator {
        let mut records: Vec<Record> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(*id).cloned())
            .collect();
        records.sort_by_key(|r| r.id);
        MemoryRecordIterator::new(records)
    }
}

impl RecordStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn create(&mut self, input: &RecordInput) -> Result<i32> {
        self.validator.validate(input)?;

        let id = next_id(self.last_id)?;
        self.push(Record::new(id, input.clone()));

        debug!(id, "created record");
        Ok(id)
    }

    fn insert(&mut self, id: i32, input: &RecordInput) -> Result<()> {
        check_id(id)?;
        self.validator.validate(input)?;

        match self.positions.get(&id) {
            Some(&pos) => {
                self.replace_at(pos, input.clone());
                debug!(id, "replaced record");
            }
            None => {
                self.push(Record::new(id, input.clone()));
                debug!(id, "inserted record");
            }
        }
        Ok(())
    }

    fn edit(&mut self, id: i32, input: &RecordInput) -> Result<()> {
        self.validator.validate(input)?;

        let pos = *self
            .positions
            .get(&id)
            .ok_or_else(|| CabinetError::NotFound(format!("no record with id {}", id)))?;
        self.replace_at(pos, input.clone());

        debug!(id, "edited record");
        Ok(())
    }

    fn delete_by_field(&mut self, field: &str, value: &str) -> Result<Vec<i32>> {
        let condition = FieldCondition::parse(field, value)?;

        let (removed, kept): (Vec<Record>, Vec<Record>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| condition.matches(r));
        self.records = kept;

        if removed.is_empty() {
            return Err(CabinetError::NotFound(format!(
                "no record with {} = {}",
                condition.field(),
                value.trim()
            )));
        }

        for record in &removed {
            self.index.remove(record);
        }
        self.rebuild_positions();

        let ids: Vec<i32> = removed.iter().map(|r| r.id).collect();
        debug!(?ids, "deleted records");
        Ok(ids)
    }

    fn update_many(
        &mut self,
        matches: &[FieldCondition],
        sets: &[FieldCondition],
    ) -> Result<Vec<i32>> {
        if matches.is_empty() {
            return Err(CabinetError::validation("where", "at least one condition is required"));
        }
        if sets.is_empty() {
            return Err(CabinetError::validation("set", "at least one field is required"));
        }

        // Validate every change before touching anything
        let mut changes = Vec::new();
        for (pos, record) in self.records.iter().enumerate() {
            if !matches_any(matches, record) {
                continue;
            }
            let mut working = record.input();
            for set in sets {
                set.apply(&mut working)?;
                self.validator.validate(&working)?;
            }
            changes.push((pos, working));
        }

        if changes.is_empty() {
            return Err(CabinetError::NotFound("no record matches the conditions".to_string()));
        }

        let mut ids = Vec::with_capacity(changes.len());
        for (pos, working) in changes {
            ids.push(self.records[pos].id);
            self.replace_at(pos, working);
        }

        debug!(?ids, "updated records");
        Ok(ids)
    }

    fn select(&mut self, fields: &[RecordField], matches: &[FieldCondition]) -> Result<Selection> {
        let mut records: Vec<Record> = self
            .records
            .iter()
            .filter(|r| matches_any(matches, r))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(Selection::new(fields, records))
    }

    fn find_by_first_name(&mut self, name: &str) -> Result<Box<dyn RecordIterator + '_>> {
        let ids = self.index.first_name.get(&name.trim().to_lowercase());
        Ok(Box::new(self.iter_ids(ids)))
    }

    fn find_by_last_name(&mut self, name: &str) -> Result<Box<dyn RecordIterator + '_>> {
        let ids = self.index.last_name.get(&name.trim().to_lowercase());
        Ok(Box::new(self.iter_ids(ids)))
    }

    fn find_by_date_of_birth(
        &mut self,
        date: NaiveDate,
    ) -> Result<Box<dyn RecordIterator + '_>> {
        let ids = self.index.date_of_birth.get(&date);
        Ok(Box::new(self.iter_ids(ids)))
    }

    fn iterate(&mut self) -> Result<Box<dyn RecordIterator + '_>> {
        Ok(Box::new(MemoryRecordIterator::new(self.records.clone())))
    }

    /// Merge a snapshot into the store
    ///
    /// 1. Append the imported records
    /// 2. Validate each appended record, dropping the ones that fail
    /// 3. Evict pre-existing records whose id an accepted import reuses
    /// 4. Sort by id and rebuild positions and indices
    fn restore(&mut self, snapshot: &Snapshot) -> Result<usize> {
        let existing = self.records.len();
        self.records.extend(last_occurrences(snapshot));

        let mut accepted = HashSet::new();
        let mut pos = existing;
        while pos < self.records.len() {
            let record = &self.records[pos];
            let verdict = check_id(record.id).and_then(|_| self.validator.validate(&record.input()));
            match verdict {
                Ok(()) => {
                    accepted.insert(record.id);
                    pos += 1;
                }
                Err(e) => {
                    warn!(id = record.id, error = %e, "rejected imported record");
                    self.records.remove(pos);
                }
            }
        }

        let mut pos = 0;
        let before = self.records.len();
        self.records.retain(|record| {
            let keep = pos >= existing || !accepted.contains(&record.id);
            pos += 1;
            keep
        });
        let replaced = before - self.records.len();

        self.records.sort_by_key(|r| r.id);
        if let Some(max) = self.records.iter().map(|r| r.id).max() {
            self.last_id = self.last_id.max(max);
        }
        self.rebuild_all();

        info!(
            imported = accepted.len(),
            replaced,
            total = self.records.len(),
            "restored snapshot"
        );
        Ok(accepted.len())
    }

    /// Memory deletes are immediate, so nothing is ever counted as removed
    fn get_stat(&self) -> StoreStat {
        StoreStat {
            live: self.records.len(),
            removed: 0,
        }
    }

    fn purge(&mut self) -> Result<PurgeStat> {
        Ok(PurgeStat {
            purged: 0,
            total: self.records.len(),
        })
    }
}
