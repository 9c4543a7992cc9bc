//! Configuration for FileCabinet
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a FileCabinet instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Which backend holds the records
    pub storage: StorageKind,

    /// What to do when a stored block fails to decode during a bulk read
    pub corruption_policy: CorruptionPolicy,

    // -------------------------------------------------------------------------
    // Validation Configuration
    // -------------------------------------------------------------------------
    /// Where validation rules come from
    pub rules: RuleSource,
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    /// Records live in process memory only
    Memory,

    /// Records live in a fixed-width binary data file
    File { path: PathBuf },
}

/// Policy for corrupt blocks found while scanning the data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionPolicy {
    /// Log the bad block and continue with the rest
    Skip,

    /// Fail the whole scan on the first bad block
    Abort,
}

/// Source of the validation rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// Built-in default rules
    Default,

    /// Built-in stricter rules
    Custom,

    /// JSON rule file on disk
    Path(PathBuf),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::Memory,
            corruption_policy: CorruptionPolicy::Skip,
            rules: RuleSource::Default,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Keep records in memory
    pub fn memory(mut self) -> Self {
        self.config.storage = StorageKind::Memory;
        self
    }

    /// Keep records in the binary data file at `path`
    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage = StorageKind::File { path: path.into() };
        self
    }

    /// Set the corruption policy for bulk reads
    pub fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.config.corruption_policy = policy;
        self
    }

    /// Set the validation rule source
    pub fn rules(mut self, rules: RuleSource) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
