//! XML snapshot format
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <records>
//!   <record id="1">
//!     <name first="John" last="Doe" />
//!     <dateOfBirth>01/05/1990</dateOfBirth>
//!     <income>1200</income>
//!     <tax>12.50</tax>
//!     <block>A</block>
//!   </record>
//! </records>
//! ```
//!
//! The reader understands exactly this shape: declarations and comments are
//! skipped, unknown child elements of `record` are ignored, and nested
//! markup inside a value element is rejected.

use std::io::{BufRead, Read, Write};

use crate::error::{CabinetError, Result};
use crate::record::{format_date, parse_date, Record, Tax};

const ROOT: &str = "records";
const RECORD: &str = "record";

// =============================================================================
// Writer
// =============================================================================

pub(super) fn write<W: Write>(mut writer: W, records: &[Record]) -> Result<()> {
    writeln!(writer, r#"<?xml version="1.0" encoding="utf-8"?>"#)?;
    writeln!(writer, "<{}>", ROOT)?;
    for record in records {
        writeln!(writer, r#"  <{} id="{}">"#, RECORD, record.id)?;
        writeln!(
            writer,
            r#"    <name first="{}" last="{}" />"#,
            escape(&record.first_name),
            escape(&record.last_name)
        )?;
        writeln!(
            writer,
            "    <dateOfBirth>{}</dateOfBirth>",
            format_date(record.date_of_birth)
        )?;
        writeln!(writer, "    <income>{}</income>", record.income)?;
        writeln!(writer, "    <tax>{}</tax>", record.tax)?;
        writeln!(writer, "    <block>{}</block>", escape(&record.block.to_string()))?;
        writeln!(writer, "  </{}>", RECORD)?;
    }
    writeln!(writer, "</{}>", ROOT)?;
    writer.flush()?;
    Ok(())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| format_error(format!("unterminated entity in '{}'", text)))?;
        let entity = &after[..semi];

        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .map(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse().ok()))
                .flatten()
                .and_then(char::from_u32),
        };
        let decoded =
            decoded.ok_or_else(|| format_error(format!("unknown entity '&{};'", entity)))?;

        out.push(decoded);
        rest = &after[semi + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

// =============================================================================
// Reader
// =============================================================================

#[derive(Debug)]
enum Token {
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
    Text(String),
}

/// Minimal pull tokenizer over the whole document
struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        let src = self.src;
        loop {
            let rest = &src[self.pos..];
            if rest.is_empty() {
                return Ok(None);
            }

            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                let text = rest[..end].trim();
                self.pos += end;
                if text.is_empty() {
                    continue;
                }
                return Ok(Some(Token::Text(unescape(text)?)));
            }

            if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<!") {
                self.skip_past(">")?;
            } else if let Some(after) = rest.strip_prefix("</") {
                let end = after
                    .find('>')
                    .ok_or_else(|| format_error("unterminated closing tag"))?;
                let name = after[..end].trim().to_string();
                self.pos += 2 + end + 1;
                return Ok(Some(Token::Close(name)));
            } else {
                return self.open_tag().map(Some);
            }
        }
    }

    fn skip_past(&mut self, marker: &str) -> Result<()> {
        let end = self.src[self.pos..]
            .find(marker)
            .ok_or_else(|| format_error(format!("missing '{}'", marker)))?;
        self.pos += end + marker.len();
        Ok(())
    }

    /// Parse `<name attr="value" ...>` or `<name ... />` at the cursor
    fn open_tag(&mut self) -> Result<Token> {
        let src = self.src;
        let bytes = src.as_bytes();
        let len = bytes.len();
        let mut i = self.pos + 1;

        let start = i;
        while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'/' && bytes[i] != b'>' {
            i += 1;
        }
        let name = src[start..i].to_string();
        if name.is_empty() {
            return Err(format_error("empty element name"));
        }

        let mut attrs = Vec::new();
        loop {
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                None => return Err(format_error(format!("unterminated <{}> tag", name))),
                Some(b'>') => {
                    self.pos = i + 1;
                    return Ok(Token::Open {
                        name,
                        attrs,
                        self_closing: false,
                    });
                }
                Some(b'/') => {
                    if bytes.get(i + 1) != Some(&b'>') {
                        return Err(format_error(format!("malformed <{}> tag", name)));
                    }
                    self.pos = i + 2;
                    return Ok(Token::Open {
                        name,
                        attrs,
                        self_closing: true,
                    });
                }
                Some(_) => {
                    let key_start = i;
                    while i < len
                        && bytes[i] != b'='
                        && !bytes[i].is_ascii_whitespace()
                        && bytes[i] != b'>'
                        && bytes[i] != b'/'
                    {
                        i += 1;
                    }
                    let key = src[key_start..i].to_string();

                    while i < len && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    if bytes.get(i) != Some(&b'=') {
                        return Err(format_error(format!("attribute '{}' has no value", key)));
                    }
                    i += 1;
                    while i < len && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }

                    let quote = match bytes.get(i) {
                        Some(&q) if q == b'"' || q == b'\'' => q,
                        _ => {
                            return Err(format_error(format!("attribute '{}' is not quoted", key)))
                        }
                    };
                    i += 1;
                    let value_start = i;
                    while i < len && bytes[i] != quote {
                        i += 1;
                    }
                    if i >= len {
                        return Err(format_error(format!("unterminated value of '{}'", key)));
                    }
                    let value = unescape(&src[value_start..i])?;
                    i += 1;

                    attrs.push((key, value));
                }
            }
        }
    }
}

pub(super) fn read<R: BufRead>(mut reader: R) -> Result<Vec<Record>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut lexer = Lexer::new(&text);

    match lexer.next_token()? {
        Some(Token::Open {
            name, self_closing, ..
        }) if name == ROOT => {
            if self_closing {
                return Ok(Vec::new());
            }
        }
        other => return Err(unexpected(other, "<records>")),
    }

    let mut records = Vec::new();
    loop {
        match lexer.next_token()? {
            Some(Token::Open {
                name,
                attrs,
                self_closing: false,
            }) if name == RECORD => {
                records.push(read_record(&mut lexer, &attrs)?);
            }
            Some(Token::Close(name)) if name == ROOT => break,
            other => return Err(unexpected(other, "<record> or </records>")),
        }
    }

    Ok(records)
}

fn read_record(lexer: &mut Lexer<'_>, record_attrs: &[(String, String)]) -> Result<Record> {
    let id_text = attr(record_attrs, "id")?;
    let id: i32 = id_text
        .trim()
        .parse()
        .map_err(|_| CabinetError::invalid_value("id", id_text))?;

    let mut names = None;
    let mut date_of_birth = None;
    let mut income: Option<i16> = None;
    let mut tax: Option<Tax> = None;
    let mut block = None;

    loop {
        match lexer.next_token()? {
            Some(Token::Open {
                name,
                attrs,
                self_closing,
            }) => {
                let text = if self_closing {
                    String::new()
                } else {
                    read_text(lexer, &name)?
                };

                match name.as_str() {
                    "name" => names = Some((attr(&attrs, "first")?, attr(&attrs, "last")?)),
                    "dateOfBirth" => date_of_birth = Some(parse_date(&text)?),
                    "income" => {
                        income = Some(
                            text.parse()
                                .map_err(|_| CabinetError::invalid_value("income", &text))?,
                        )
                    }
                    "tax" => tax = Some(text.parse()?),
                    "block" => {
                        let mut chars = text.chars();
                        block = match (chars.next(), chars.next()) {
                            (Some(c), None) => Some(c),
                            _ => return Err(CabinetError::invalid_value("block", &text)),
                        };
                    }
                    _ => {}
                }
            }
            Some(Token::Close(name)) if name == RECORD => break,
            other => return Err(unexpected(other, "a record field or </record>")),
        }
    }

    let missing = |field: &str| format_error(format!("record {}: missing <{}>", id, field));
    let (first_name, last_name) = names.ok_or_else(|| missing("name"))?;

    Ok(Record {
        id,
        first_name,
        last_name,
        date_of_birth: date_of_birth.ok_or_else(|| missing("dateOfBirth"))?,
        income: income.ok_or_else(|| missing("income"))?,
        tax: tax.ok_or_else(|| missing("tax"))?,
        block: block.ok_or_else(|| missing("block"))?,
    })
}

/// Text content of a simple element, consuming its closing tag
fn read_text(lexer: &mut Lexer<'_>, name: &str) -> Result<String> {
    match lexer.next_token()? {
        Some(Token::Close(closing)) if closing == name => Ok(String::new()),
        Some(Token::Text(text)) => match lexer.next_token()? {
            Some(Token::Close(closing)) if closing == name => Ok(text),
            other => Err(unexpected(other, &format!("</{}>", name))),
        },
        other => Err(unexpected(other, &format!("text of <{}>", name))),
    }
}

fn attr(attrs: &[(String, String)], key: &str) -> Result<String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| format_error(format!("missing attribute '{}'", key)))
}

fn unexpected(token: Option<Token>, expected: &str) -> CabinetError {
    match token {
        Some(token) => format_error(format!("expected {}, found {:?}", expected, token)),
        None => format_error(format!("expected {}, found end of document", expected)),
    }
}

fn format_error(message: impl Into<String>) -> CabinetError {
    CabinetError::Format(message.into())
}
