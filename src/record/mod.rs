//! Record Module
//!
//! The personal record entity and the field values used to create or change one.

mod tax;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CabinetError, Result};

pub use tax::Tax;

/// Maximum encoded length of a first or last name, in bytes
pub const MAX_NAME_LEN: usize = 60;

/// Canonical date format for every textual writer (`MM/dd/yyyy`)
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Date formats accepted on input, tried in order
const INPUT_DATE_FORMATS: &[&str] = &[DATE_FORMAT, "%Y-%b-%d", "%Y-%m-%d"];

/// A stored personal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub income: i16,
    pub tax: Tax,
    pub block: char,
}

/// Field values of a record without its id
///
/// This is what create/insert/edit take and what the validator inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub income: i16,
    pub tax: Tax,
    pub block: char,
}

impl RecordInput {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        date_of_birth: NaiveDate,
        income: i16,
        tax: Tax,
        block: char,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth,
            income,
            tax,
            block,
        }
    }
}

impl Record {
    /// Attach an id to a set of field values
    pub fn new(id: i32, input: RecordInput) -> Self {
        Self {
            id,
            first_name: input.first_name,
            last_name: input.last_name,
            date_of_birth: input.date_of_birth,
            income: input.income,
            tax: input.tax,
            block: input.block,
        }
    }

    /// Copy out the field values (everything but the id)
    pub fn input(&self) -> RecordInput {
        RecordInput {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            date_of_birth: self.date_of_birth,
            income: self.income,
            tax: self.tax,
            block: self.block,
        }
    }

    /// Overwrite every field except the id
    pub fn apply(&mut self, input: RecordInput) {
        self.first_name = input.first_name;
        self.last_name = input.last_name;
        self.date_of_birth = input.date_of_birth;
        self.income = input.income;
        self.tax = input.tax;
        self.block = input.block;
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}, {}, {}, {}, {}, {}, {}",
            self.id,
            self.first_name,
            self.last_name,
            self.date_of_birth.format("%Y-%b-%d"),
            self.income,
            self.tax,
            self.block
        )
    }
}

/// Parse a date in any accepted input format
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    INPUT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| CabinetError::invalid_value("dateofbirth", text))
}

/// Render a date in the canonical `MM/dd/yyyy` form
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
