//! Field queries
//!
//! Typed field names and `field = value` conditions used by
//! `delete_by_field`, `update_many` and `select`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{CabinetError, Result};
use crate::record::{format_date, parse_date, Record, RecordInput, Tax};

// =============================================================================
// Field Names
// =============================================================================

/// A record field addressable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Id,
    FirstName,
    LastName,
    DateOfBirth,
    Income,
    Tax,
    Block,
}

impl RecordField {
    /// Every field in display order
    pub const ALL: [RecordField; 7] = [
        RecordField::Id,
        RecordField::FirstName,
        RecordField::LastName,
        RecordField::DateOfBirth,
        RecordField::Income,
        RecordField::Tax,
        RecordField::Block,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordField::Id => "id",
            RecordField::FirstName => "firstname",
            RecordField::LastName => "lastname",
            RecordField::DateOfBirth => "dateofbirth",
            RecordField::Income => "income",
            RecordField::Tax => "tax",
            RecordField::Block => "block",
        }
    }

    /// Render this field of a record as text
    pub fn render(self, record: &Record) -> String {
        match self {
            RecordField::Id => record.id.to_string(),
            RecordField::FirstName => record.first_name.clone(),
            RecordField::LastName => record.last_name.clone(),
            RecordField::DateOfBirth => format_date(record.date_of_birth),
            RecordField::Income => record.income.to_string(),
            RecordField::Tax => record.tax.to_string(),
            RecordField::Block => record.block.to_string(),
        }
    }
}

impl FromStr for RecordField {
    type Err = CabinetError;

    /// Case-insensitive; `first_name`, `First Name` and `firstname` are equal
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        RecordField::ALL
            .into_iter()
            .find(|field| field.as_str() == key)
            .ok_or_else(|| CabinetError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// A typed field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Id(i32),
    FirstName(String),
    LastName(String),
    DateOfBirth(NaiveDate),
    Income(i16),
    Tax(Tax),
    Block(char),
}

/// `field = value`, with the value already parsed for its field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCondition {
    value: FieldValue,
}

impl FieldCondition {
    pub fn new(value: FieldValue) -> Self {
        Self { value }
    }

    /// Parse a field name and a textual value
    ///
    /// Surrounding whitespace and single quotes around the value are ignored.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let field: RecordField = field.parse()?;
        let text = unquote(value);
        let invalid = || CabinetError::invalid_value(field.as_str(), text);

        let value = match field {
            RecordField::Id => FieldValue::Id(text.parse().map_err(|_| invalid())?),
            RecordField::FirstName => FieldValue::FirstName(text.to_string()),
            RecordField::LastName => FieldValue::LastName(text.to_string()),
            RecordField::DateOfBirth => FieldValue::DateOfBirth(parse_date(text)?),
            RecordField::Income => FieldValue::Income(text.parse().map_err(|_| invalid())?),
            RecordField::Tax => FieldValue::Tax(text.parse()?),
            RecordField::Block => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => FieldValue::Block(c.to_ascii_uppercase()),
                    _ => return Err(invalid()),
                }
            }
        };
        Ok(Self { value })
    }

    pub fn field(&self) -> RecordField {
        match self.value {
            FieldValue::Id(_) => RecordField::Id,
            FieldValue::FirstName(_) => RecordField::FirstName,
            FieldValue::LastName(_) => RecordField::LastName,
            FieldValue::DateOfBirth(_) => RecordField::DateOfBirth,
            FieldValue::Income(_) => RecordField::Income,
            FieldValue::Tax(_) => RecordField::Tax,
            FieldValue::Block(_) => RecordField::Block,
        }
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Exact match; names compare case-insensitively
    pub fn matches(&self, record: &Record) -> bool {
        match &self.value {
            FieldValue::Id(id) => record.id == *id,
            FieldValue::FirstName(name) => record.first_name.eq_ignore_ascii_case(name),
            FieldValue::LastName(name) => record.last_name.eq_ignore_ascii_case(name),
            FieldValue::DateOfBirth(date) => record.date_of_birth == *date,
            FieldValue::Income(income) => record.income == *income,
            FieldValue::Tax(tax) => record.tax == *tax,
            FieldValue::Block(block) => record.block == *block,
        }
    }

    /// Write this value into a set of record fields
    ///
    /// Ids are immutable, so an id condition is rejected.
    pub fn apply(&self, input: &mut RecordInput) -> Result<()> {
        match &self.value {
            FieldValue::Id(_) => {
                return Err(CabinetError::validation("id", "cannot be updated"));
            }
            FieldValue::FirstName(name) => input.first_name = name.clone(),
            FieldValue::LastName(name) => input.last_name = name.clone(),
            FieldValue::DateOfBirth(date) => input.date_of_birth = *date,
            FieldValue::Income(income) => input.income = *income,
            FieldValue::Tax(tax) => input.tax = *tax,
            FieldValue::Block(block) => input.block = *block,
        }
        Ok(())
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

/// True if the record matches any condition, or if there are none
pub fn matches_any(conditions: &[FieldCondition], record: &Record) -> bool {
    conditions.is_empty() || conditions.iter().any(|c| c.matches(record))
}

// =============================================================================
// Selection
// =============================================================================

/// Result of `select`: matched records plus the fields to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    fields: Vec<RecordField>,
    records: Vec<Record>,
}

impl Selection {
    /// An empty field list selects every field
    pub fn new(fields: &[RecordField], records: Vec<Record>) -> Self {
        let fields = if fields.is_empty() {
            RecordField::ALL.to_vec()
        } else {
            fields.to_vec()
        };
        Self { fields, records }
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
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

    pub fn ids(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Projected rows, one string per selected field
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.records
            .iter()
            .map(|record| self.fields.iter().map(|f| f.render(record)).collect())
            .collect()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
