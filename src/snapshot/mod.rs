//! Snapshot Module
//!
//! Immutable point-in-time copies of the live records, and their textual
//! export/import formats.
//!
//! ## Formats
//! - CSV: `Id,First Name,Last Name,Date of Birth,Income,Tax,Block`
//! - XML: `<records><record id=".."> ... </record></records>`
//!
//! Dates are always written as `MM/dd/yyyy`.

mod csv;
mod xml;

use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use crate::error::{CabinetError, Result};
use crate::record::Record;

pub use csv::HEADER as CSV_HEADER;

/// Textual snapshot format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Csv,
    Xml,
}

impl SnapshotFormat {
    /// Guess the format from a file extension
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl FromStr for SnapshotFormat {
    type Err = CabinetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            other => Err(CabinetError::Format(format!("unknown snapshot format '{}'", other))),
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => f.write_str("csv"),
            Self::Xml => f.write_str("xml"),
        }
    }
}

/// Ordered, owned copy of records with no link back to its store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    records: Vec<Record>,
}

impl Snapshot {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write every record in `format`
    pub fn export<W: Write>(&self, writer: W, format: SnapshotFormat) -> Result<()> {
        match format {
            SnapshotFormat::Csv => csv::write(writer, &self.records),
            SnapshotFormat::Xml => xml::write(writer, &self.records),
        }
    }

    /// Parse records previously written in `format`
    pub fn import<R: BufRead>(reader: R, format: SnapshotFormat) -> Result<Self> {
        let records = match format {
            SnapshotFormat::Csv => csv::read(reader)?,
            SnapshotFormat::Xml => xml::read(reader)?,
        };
        Ok(Self::new(records))
    }
}

impl IntoIterator for Snapshot {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
