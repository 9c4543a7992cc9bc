//! Cabinet Module
//!
//! The context object that owns the configured store.
//!
//! ## Responsibilities
//! - Load the validation rules named by the config
//! - Construct the selected backend once at startup
//! - Export and import snapshots through files

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tracing::info;

use crate::config::{Config, RuleSource, StorageKind};
use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotFormat};
use crate::storage::{FileStore, MemoryStore, RecordStore};
use crate::validation::{RecordValidator, RuleSet};

/// Outcome of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records parsed from the file
    pub read: usize,

    /// Records that passed validation and were merged
    pub accepted: usize,
}

/// A configured record store plus its settings
///
/// Built once and passed to whatever needs the store; there is no global
/// "current service".
pub struct Cabinet {
    config: Config,
    rules: RuleSet,
    store: Box<dyn RecordStore>,
}

impl Cabinet {
    /// Open the store described by `config`
    ///
    /// 1. Resolve the rule set (built-in or JSON file)
    /// 2. Build the validator chain
    /// 3. Open the memory or file backend
    pub fn open(config: Config) -> Result<Self> {
        let rules = match &config.rules {
            RuleSource::Default => RuleSet::default_rules(),
            RuleSource::Custom => RuleSet::custom_rules(),
            RuleSource::Path(path) => RuleSet::load(path)?,
        };
        let validator: Box<dyn RecordValidator> = Box::new(rules.validator());

        let store: Box<dyn RecordStore> = match &config.storage {
            StorageKind::Memory => Box::new(MemoryStore::new(validator)),
            StorageKind::File { path } => {
                Box::new(FileStore::open(path, validator, config.corruption_policy)?)
            }
        };

        info!(backend = store.kind(), rules = ?config.rules, "cabinet opened");

        Ok(Self {
            config,
            rules,
            store,
        })
    }

    /// The store, for reads that do not move a file cursor
    pub fn store(&self) -> &dyn RecordStore {
        &*self.store
    }

    /// The store, for every other operation
    pub fn store_mut(&mut self) -> &mut dyn RecordStore {
        &mut *self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The rule set the store validates against
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Snapshot the store and write it to `path`; returns the record count
    pub fn export_to(&mut self, path: &Path, format: SnapshotFormat) -> Result<usize> {
        let snapshot = self.store.make_snapshot()?;
        let writer = BufWriter::new(File::create(path)?);
        snapshot.export(writer, format)?;

        info!(path = %path.display(), %format, records = snapshot.len(), "exported snapshot");
        Ok(snapshot.len())
    }

    /// Read a snapshot from `path` and restore it into the store
    pub fn import_from(&mut self, path: &Path, format: SnapshotFormat) -> Result<ImportSummary> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot = Snapshot::import(reader, format)?;
        let accepted = self.store.restore(&snapshot)?;

        info!(path = %path.display(), %format, read = snapshot.len(), accepted, "imported snapshot");
        Ok(ImportSummary {
            read: snapshot.len(),
            accepted,
        })
    }
}
