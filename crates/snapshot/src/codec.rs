//! Delimited text codec for the snapshot tables.
//!
//! Format: UTF-8, one record per line, comma separated, header row first.
//! A field is wrapped in double quotes only when it contains the delimiter,
//! a quote or a line break; quotes inside a quoted field are doubled.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, SnapshotError};

pub const DELIMITER: char = ',';
const QUOTE: char = '"';

/// One decoded record and the line it started on (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Quote a field if it would otherwise break the record
pub fn encode_field(field: &str) -> Cow<'_, str> {
    let needs_quotes = field
        .chars()
        .any(|c| c == DELIMITER || c == QUOTE || c == '\n' || c == '\r');
    if !needs_quotes {
        return Cow::Borrowed(field);
    }

    let mut quoted = String::with_capacity(field.len() + 2);
    quoted.push(QUOTE);
    for c in field.chars() {
        if c == QUOTE {
            quoted.push(QUOTE);
        }
        quoted.push(c);
    }
    quoted.push(QUOTE);
    Cow::Owned(quoted)
}

/// Join fields into one line, without the trailing newline
pub fn encode_record<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| encode_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

/// Split file content into records.
///
/// Blank lines are skipped. Quoted fields may span lines.
pub fn decode_records(content: &str, file: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();

    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut saw_quote = false;
    let mut line = 1;
    let mut record_line = 1;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    current.push(QUOTE);
                }
                QUOTE => in_quotes = false,
                '\n' => {
                    line += 1;
                    current.push(c);
                }
                _ => current.push(c),
            }
            continue;
        }

        match c {
            DELIMITER => fields.push(std::mem::take(&mut current)),
            QUOTE if current.is_empty() => {
                in_quotes = true;
                saw_quote = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                finish_record(&mut records, &mut fields, &mut current, saw_quote, record_line);
                saw_quote = false;
                line += 1;
                record_line = line;
            }
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(SnapshotError::ParseError {
            file: file.to_string(),
            line: record_line,
            reason: "Unterminated quoted field".to_string(),
        });
    }
    finish_record(&mut records, &mut fields, &mut current, saw_quote, record_line);

    Ok(records)
}

fn finish_record(
    records: &mut Vec<Record>,
    fields: &mut Vec<String>,
    current: &mut String,
    saw_quote: bool,
    line: usize,
) {
    // Skip empty lines
    if fields.is_empty() && current.trim().is_empty() && !saw_quote {
        current.clear();
        return;
    }
    fields.push(std::mem::take(current));
    records.push(Record {
        line,
        fields: std::mem::take(fields),
    });
}

/// Check that the first record is the expected header and return the rest
pub fn split_header(mut records: Vec<Record>, header: &[&str], file: &str) -> Result<Vec<Record>> {
    if records.is_empty() {
        return Err(SnapshotError::HeaderMismatch {
            file: file.to_string(),
            expected: header.join(","),
            found: String::new(),
        });
    }

    let first = records.remove(0);
    let matches = first.fields.len() == header.len()
        && first
            .fields
            .iter()
            .zip(header)
            .all(|(found, expected)| found.trim() == *expected);
    if !matches {
        return Err(SnapshotError::HeaderMismatch {
            file: file.to_string(),
            expected: header.join(","),
            found: first.fields.join(","),
        });
    }
    Ok(records)
}

/// Check a record has exactly `expected` fields
pub fn expect_fields(record: &Record, expected: usize, file: &str) -> Result<()> {
    if record.fields.len() != expected {
        return Err(SnapshotError::FieldCountMismatch {
            file: file.to_string(),
            expected,
            found: record.fields.len(),
            line: record.line,
        });
    }
    Ok(())
}

/// Parse one field of a record into `T`
pub fn parse_field<T>(record: &Record, index: usize, name: &str, file: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = record.fields.get(index).map(|s| s.trim()).unwrap_or_default();
    raw.parse().map_err(|e| SnapshotError::ParseError {
        file: file.to_string(),
        line: record.line,
        reason: format!("Invalid {}: {} ({:?})", name, e, raw),
    })
}

/// Read and decode a whole table, header included
pub fn read_table(path: &Path, header: &[&str]) -> Result<Vec<Record>> {
    let file = display_name(path);
    let content = fs::read_to_string(path).map_err(|source| SnapshotError::ReadFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let records = decode_records(&content, &file)?;
    split_header(records, header, &file)
}

/// Rewrite a whole table.
///
/// The content goes to `<path>.tmp` first and is renamed over `path`, so a
/// reader never sees a half-written file.
pub fn write_table<I>(path: &Path, header: &[&str], rows: I) -> Result<usize>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut content = encode_record(header);
    content.push('\n');

    let mut written = 0;
    for row in rows {
        content.push_str(&encode_record(&row));
        content.push('\n');
        written += 1;
    }

    let write_err = |source| SnapshotError::WriteFailure {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, content.as_bytes()).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;

    debug!("Wrote {} rows to {:?}", written, path);
    Ok(written)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
