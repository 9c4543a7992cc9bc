//! Validation rules
//!
//! Per-field validators and the serde-backed rule set that configures them.
//!
//! ## Rule File Format (JSON)
//! ```text
//! {
//!   "firstName":   { "min": 2, "max": 60 },
//!   "lastName":    { "min": 2, "max": 60 },
//!   "dateOfBirth": { "from": "1950-01-01", "to": null },
//!   "income":      { "min": 0, "max": 32767 },
//!   "tax":         { "min": "0", "max": "100" },
//!   "block":       { "from": "A", "to": "Z" }
//! }
//! ```
//! A `null` upper date bound means "today".

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CabinetError, Result};
use crate::record::{RecordInput, Tax, MAX_NAME_LEN};

use super::{CompositeValidator, RecordValidator};

// =============================================================================
// Rule Set
// =============================================================================

/// Length bounds for a name, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRule {
    pub min: usize,
    pub max: usize,
}

/// Inclusive date range; `to: None` is the current date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRule {
    pub from: NaiveDate,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

/// Inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRule {
    pub min: i16,
    pub max: i16,
}

/// Inclusive tax range; `min` is the backend's tax floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRule {
    pub min: Tax,
    pub max: Tax,
}

/// Inclusive range of residential block letters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub from: char,
    pub to: char,
}

/// Complete set of field rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub first_name: NameRule,
    pub last_name: NameRule,
    pub date_of_birth: DateRule,
    pub income: RangeRule,
    pub tax: TaxRule,
    pub block: BlockRule,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl RuleSet {
    /// Built-in default rules
    pub fn default_rules() -> Self {
        Self {
            first_name: NameRule { min: 2, max: 60 },
            last_name: NameRule { min: 2, max: 60 },
            date_of_birth: DateRule {
                from: ymd(1950, 1, 1),
                to: None,
            },
            income: RangeRule { min: 0, max: i16::MAX },
            tax: TaxRule {
                min: Tax::ZERO,
                max: Tax::from_whole(100),
            },
            block: BlockRule { from: 'A', to: 'Z' },
        }
    }

    /// Built-in stricter rules
    pub fn custom_rules() -> Self {
        Self {
            first_name: NameRule { min: 3, max: 30 },
            last_name: NameRule { min: 3, max: 30 },
            date_of_birth: DateRule {
                from: ymd(1900, 1, 1),
                to: None,
            },
            income: RangeRule { min: 100, max: i16::MAX },
            tax: TaxRule {
                min: Tax::from_whole(5),
                max: Tax::from_whole(60),
            },
            block: BlockRule { from: 'A', to: 'M' },
        }
    }

    /// Parse a rule set from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let rules: RuleSet = serde_json::from_str(text)?;
        rules.check()?;
        Ok(rules)
    }

    /// Load a rule set from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Render the rule set as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject rule sets whose bounds cannot be satisfied
    pub fn check(&self) -> Result<()> {
        for (name, rule) in [("firstName", self.first_name), ("lastName", self.last_name)] {
            if rule.min > rule.max || rule.max > MAX_NAME_LEN {
                return Err(CabinetError::Config(format!(
                    "{}: length range {}..={} is invalid (max {})",
                    name, rule.min, rule.max, MAX_NAME_LEN
                )));
            }
        }
        if let Some(to) = self.date_of_birth.to {
            if self.date_of_birth.from > to {
                return Err(CabinetError::Config("dateOfBirth: from is after to".to_string()));
            }
        }
        if self.income.min > self.income.max {
            return Err(CabinetError::Config("income: min is greater than max".to_string()));
        }
        if self.tax.min > self.tax.max || self.tax.min.is_negative() {
            return Err(CabinetError::Config(format!(
                "tax: range {}..={} is invalid",
                self.tax.min, self.tax.max
            )));
        }
        let uppercase = |c: char| c.is_ascii_uppercase();
        if !uppercase(self.block.from) || !uppercase(self.block.to) || self.block.from > self.block.to {
            return Err(CabinetError::Config(format!(
                "block: range {}..={} is invalid",
                self.block.from, self.block.to
            )));
        }
        Ok(())
    }

    /// Build the validator chain for this rule set
    pub fn validator(&self) -> CompositeValidator {
        CompositeValidator::new()
            .with(NameValidator::new(NameField::First, self.first_name))
            .with(NameValidator::new(NameField::Last, self.last_name))
            .with(DateOfBirthValidator::new(self.date_of_birth))
            .with(IncomeValidator::new(self.income))
            .with(TaxValidator::new(self.tax))
            .with(BlockValidator::new(self.block))
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

// =============================================================================
// Field Validators
// =============================================================================

/// Which name a [`NameValidator`] checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameField {
    First,
    Last,
}

pub struct NameValidator {
    field: NameField,
    rule: NameRule,
}

impl NameValidator {
    pub fn new(field: NameField, rule: NameRule) -> Self {
        Self { field, rule }
    }
}

impl RecordValidator for NameValidator {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        let (field, name) = match self.field {
            NameField::First => ("firstname", &input.first_name),
            NameField::Last => ("lastname", &input.last_name),
        };

        if name.trim().is_empty() {
            return Err(CabinetError::validation(field, "must not be empty"));
        }
        if !name.is_ascii() {
            return Err(CabinetError::validation(field, "must contain ASCII characters only"));
        }
        if name.bytes().any(|b| b.is_ascii_control()) {
            return Err(CabinetError::validation(field, "must not contain control characters"));
        }

        let max = self.rule.max.min(MAX_NAME_LEN);
        if name.len() < self.rule.min || name.len() > max {
            return Err(CabinetError::validation(
                field,
                format!("length must be between {} and {}", self.rule.min, max),
            ));
        }
        Ok(())
    }
}

pub struct DateOfBirthValidator {
    rule: DateRule,
}

impl DateOfBirthValidator {
    pub fn new(rule: DateRule) -> Self {
        Self { rule }
    }
}

impl RecordValidator for DateOfBirthValidator {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        let to = self
            .rule
            .to
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let dob = input.date_of_birth;

        if dob < self.rule.from || dob > to {
            return Err(CabinetError::validation(
                "dateofbirth",
                format!("must be between {} and {}", self.rule.from, to),
            ));
        }
        Ok(())
    }
}

pub struct IncomeValidator {
    rule: RangeRule,
}

impl IncomeValidator {
    pub fn new(rule: RangeRule) -> Self {
        Self { rule }
    }
}

impl RecordValidator for IncomeValidator {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        if !(self.rule.min..=self.rule.max).contains(&input.income) {
            return Err(CabinetError::validation(
                "income",
                format!("must be between {} and {}", self.rule.min, self.rule.max),
            ));
        }
        Ok(())
    }
}

pub struct TaxValidator {
    rule: TaxRule,
}

impl TaxValidator {
    pub fn new(rule: TaxRule) -> Self {
        Self { rule }
    }
}

impl RecordValidator for TaxValidator {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        if !(self.rule.min..=self.rule.max).contains(&input.tax) {
            return Err(CabinetError::validation(
                "tax",
                format!("must be between {} and {}", self.rule.min, self.rule.max),
            ));
        }
        Ok(())
    }
}

pub struct BlockValidator {
    rule: BlockRule,
}

impl BlockValidator {
    pub fn new(rule: BlockRule) -> Self {
        Self { rule }
    }
}

impl RecordValidator for BlockValidator {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        let block = input.block;
        if !block.is_ascii_uppercase() || block < self.rule.from || block > self.rule.to {
            return Err(CabinetError::validation(
                "block",
                format!("must be an uppercase letter {}..{}", self.rule.from, self.rule.to),
            ));
        }
        Ok(())
    }
}
