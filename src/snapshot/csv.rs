//! CSV snapshot format
//!
//! One header row, then one row per record. Fields containing commas,
//! quotes or line breaks are quoted, with embedded quotes doubled.
//!
//! Some writers split the tax into two columns (`12,50` for `12.50`), so
//! import accepts rows of 7 or 8 columns and rejoins the tax before parsing.

use std::io::{BufRead, Write};

use crate::error::{CabinetError, Result};
use crate::record::{format_date, parse_date, Record};

/// Fixed header row
pub const HEADER: &str = "Id,First Name,Last Name,Date of Birth,Income,Tax,Block";

const COLUMNS: usize = 7;
const SPLIT_TAX_COLUMNS: usize = 8;

pub(super) fn write<W: Write>(mut writer: W, records: &[Record]) -> Result<()> {
    writeln!(writer, "{}", HEADER)?;
    for record in records {
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            record.id,
            quote(&record.first_name),
            quote(&record.last_name),
            format_date(record.date_of_birth),
            record.income,
            record.tax,
            quote(&record.block.to_string()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub(super) fn read<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if index == 0 && is_header(trimmed) {
            continue;
        }

        let fields = split(trimmed)
            .map_err(|reason| CabinetError::Format(format!("line {}: {}", line_no, reason)))?;
        let record = parse_row(&fields)
            .map_err(|e| CabinetError::Format(format!("line {}: {}", line_no, e)))?;
        records.push(record);
    }

    Ok(records)
}

fn is_header(line: &str) -> bool {
    let normalize = |s: &str| s.replace(' ', "").to_ascii_lowercase();
    normalize(line) == normalize(HEADER)
}

fn parse_row(fields: &[String]) -> Result<Record> {
    let tax_text = match fields.len() {
        COLUMNS => fields[5].trim().to_string(),
        SPLIT_TAX_COLUMNS => format!("{}.{}", fields[5].trim(), fields[6].trim()),
        n => {
            return Err(CabinetError::Format(format!(
                "expected {} or {} columns, got {}",
                COLUMNS, SPLIT_TAX_COLUMNS, n
            )))
        }
    };
    let block_text = fields[fields.len() - 1].trim();

    let id: i32 = fields[0]
        .trim()
        .parse()
        .map_err(|_| CabinetError::invalid_value("id", fields[0].trim()))?;
    let income: i16 = fields[4]
        .trim()
        .parse()
        .map_err(|_| CabinetError::invalid_value("income", fields[4].trim()))?;

    let mut chars = block_text.chars();
    let block = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return Err(CabinetError::invalid_value("block", block_text)),
    };

    Ok(Record {
        id,
        first_name: fields[1].clone(),
        last_name: fields[2].clone(),
        date_of_birth: parse_date(&fields[3])?,
        income,
        tax: tax_text.parse()?,
        block,
    })
}

/// Quote a field when it would otherwise break the row
fn quote(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one row into fields, honouring quotes
fn split(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}
