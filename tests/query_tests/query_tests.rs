//! Tests for field names, conditions and selections

use chrono::NaiveDate;
use filecabinet::query::{matches_any, FieldCondition, FieldValue, RecordField, Selection};
use filecabinet::{CabinetError, Record, RecordInput, Tax};

// =============================================================================
// Helper Functions
// =============================================================================

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn john() -> Record {
    Record::new(
        1,
        RecordInput::new("John", "Doe", date(1990, 1, 5), 1200, Tax::from_hundredths(1250), 'A'),
    )
}

// =============================================================================
// Field Names
// =============================================================================

#[test]
fn test_field_names_parse_loosely() {
    for text in ["firstname", "FirstName", "first_name", "First Name", "FIRST-NAME"] {
        assert_eq!(text.parse::<RecordField>().unwrap(), RecordField::FirstName, "{}", text);
    }
    assert_eq!("DateOfBirth".parse::<RecordField>().unwrap(), RecordField::DateOfBirth);
    assert_eq!("ID".parse::<RecordField>().unwrap(), RecordField::Id);
}

#[test]
fn test_unknown_field() {
    let result = "salary".parse::<RecordField>();
    assert!(matches!(result, Err(CabinetError::UnknownField(name)) if name == "salary"));
}

#[test]
fn test_field_render() {
    let record = john();
    let rendered: Vec<String> = RecordField::ALL.iter().map(|f| f.render(&record)).collect();

    assert_eq!(rendered, vec!["1", "John", "Doe", "01/05/1990", "1200", "12.50", "A"]);
}

// =============================================================================
// Conditions
// =============================================================================

#[test]
fn test_condition_parse_strips_quotes_and_space() {
    let cond = FieldCondition::parse("lastname", "  'Doe' ").unwrap();
    assert_eq!(cond.value(), &FieldValue::LastName("Doe".to_string()));
    assert_eq!(cond.field(), RecordField::LastName);
}

#[test]
fn test_condition_typed_values() {
    assert_eq!(
        FieldCondition::parse("dateofbirth", "1990-Jan-05").unwrap().value(),
        &FieldValue::DateOfBirth(date(1990, 1, 5))
    );
    assert_eq!(
        FieldCondition::parse("tax", "12.5").unwrap().value(),
        &FieldValue::Tax(Tax::from_hundredths(1250))
    );
    assert_eq!(
        FieldCondition::parse("block", "a").unwrap().value(),
        &FieldValue::Block('A')
    );
}

#[test]
fn test_condition_invalid_values() {
    let cases = [("id", "x"), ("income", "99999"), ("block", "AB"), ("dateofbirth", "13/45/2000")];
    for (field, value) in cases {
        let result = FieldCondition::parse(field, value);
        assert!(
            matches!(result, Err(CabinetError::InvalidValue { .. })),
            "{} = {} gave {:?}",
            field,
            value,
            result
        );
    }
}

#[test]
fn test_condition_matches_names_case_insensitively() {
    let record = john();
    assert!(FieldCondition::parse("firstname", "JOHN").unwrap().matches(&record));
    assert!(!FieldCondition::parse("firstname", "Johnny").unwrap().matches(&record));
    assert!(FieldCondition::parse("income", "1200").unwrap().matches(&record));
    assert!(!FieldCondition::parse("tax", "12.49").unwrap().matches(&record));
}

#[test]
fn test_matches_any() {
    let record = john();
    let miss = FieldCondition::parse("id", "2").unwrap();
    let hit = FieldCondition::parse("block", "A").unwrap();

    assert!(matches_any(&[], &record));
    assert!(!matches_any(&[miss.clone()], &record));
    assert!(matches_any(&[miss, hit], &record));
}

#[test]
fn test_apply_writes_field() {
    let mut input = john().input();
    FieldCondition::parse("income", "42").unwrap().apply(&mut input).unwrap();
    FieldCondition::parse("lastname", "Roe").unwrap().apply(&mut input).unwrap();

    assert_eq!(input.income, 42);
    assert_eq!(input.last_name, "Roe");
}

#[test]
fn test_apply_rejects_id() {
    let mut input = john().input();
    let result = FieldCondition::parse("id", "5").unwrap().apply(&mut input);
    assert!(matches!(result, Err(CabinetError::Validation { .. })));
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn test_selection_rows_follow_field_order() {
    let selection = Selection::new(&[RecordField::Block, RecordField::Id], vec![john()]);
    assert_eq!(selection.rows(), vec![vec!["A".to_string(), "1".to_string()]]);
}

#[test]
fn test_selection_defaults_to_all_fields() {
    let selection = Selection::new(&[], vec![john()]);
    assert_eq!(selection.fields(), &RecordField::ALL[..]);
    assert_eq!(selection.len(), 1);
    assert_eq!(selection.into_records(), vec![john()]);
}
