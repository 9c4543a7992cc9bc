//! # FileCabinet
//!
//! A personal records store with:
//! - Two interchangeable backends: in-memory with secondary indices, and a
//!   fixed-width binary data file with a position index
//! - Logical delete (tombstones) and crash-safe purge for the data file
//! - Lazy, backend-agnostic record iteration
//! - Snapshots with CSV/XML export and validated, id-merging restore
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Cabinet                              │
//! │               (config → validator + backend)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    RecordStore trait                         │
//! │          (validate before every mutation)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ MemoryStore │          │  FileStore  │
//!   │  (indices)  │          │ (tombstones)│
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │    Codec    │
//!                           │ (180 bytes) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod codec;
pub mod validation;
pub mod query;
pub mod storage;
pub mod snapshot;
pub mod cabinet;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CabinetError, Result};
pub use config::Config;
pub use cabinet::Cabinet;
pub use record::{Record, RecordInput, Tax};
pub use storage::{RecordIterator, RecordStore};
pub use snapshot::{Snapshot, SnapshotFormat};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FileCabinet
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
