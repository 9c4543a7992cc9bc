//! Validation Module
//!
//! Every store consults a [`RecordValidator`] before it mutates anything.
//!
//! ## Responsibilities
//! - Check each field of a [`RecordInput`] against a configured range
//! - Chain per-field validators into one composite
//! - Load rule sets from built-in presets or JSON files

mod rules;

use crate::error::Result;
use crate::record::RecordInput;

pub use rules::{
    BlockRule, BlockValidator, DateOfBirthValidator, DateRule, IncomeValidator, NameField,
    NameRule, NameValidator, RangeRule, RuleSet, TaxRule, TaxValidator,
};

/// Capability the stores call before every mutation
///
/// `Ok(())` means the input may be stored; `Err(CabinetError::Validation)`
/// carries the failing field and reason.
pub trait RecordValidator {
    fn validate(&self, input: &RecordInput) -> Result<()>;
}

/// Runs a chain of validators, stopping at the first failure
#[derive(Default)]
pub struct CompositeValidator {
    validators: Vec<Box<dyn RecordValidator>>,
}

impl CompositeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator to the end of the chain
    pub fn with(mut self, validator: impl RecordValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl RecordValidator for CompositeValidator {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        self.validators.iter().try_for_each(|v| v.validate(input))
    }
}

impl<V: RecordValidator + ?Sized> RecordValidator for Box<V> {
    fn validate(&self, input: &RecordInput) -> Result<()> {
        (**self).validate(input)
    }
}
