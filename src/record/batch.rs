use std::path::Path;

use serde_json::{Map, Number, Value};

use super::Record;
use crate::error::{Error, Result};

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    /// Delimited rows with a header line.
    Table { delimiter: u8 },
}

impl BatchFormat {
    /// Guess the format from a file extension. Unknown extensions are read
    /// as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => BatchFormat::Table { delimiter: b',' },
            Some("tsv") | Some("tab") => BatchFormat::Table { delimiter: b'\t' },
            _ => BatchFormat::Json,
        }
    }
}

/// Read and decode a batch file.
pub fn read_batch(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Batch(format!("cannot read {}: {e}", path.display())))?;
    parse_batch(&text, BatchFormat::from_path(path))
}

pub fn parse_batch(text: &str, format: BatchFormat) -> Result<Vec<Record>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    match format {
        BatchFormat::Json => parse_json(text),
        BatchFormat::Table { delimiter } => parse_table(text, delimiter),
    }
}

/// A single JSON object is a one-record batch; an array must hold objects.
pub fn parse_json(text: &str) -> Result<Vec<Record>> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| Error::Batch(format!("invalid JSON: {e}")))?;
    match doc {
        Value::Object(fields) => Ok(vec![Record::from_fields(fields)]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(fields) => Ok(Record::from_fields(fields)),
                other => Err(Error::Batch(format!(
                    "item {} is {}, expected an object",
                    i + 1,
                    json_kind(&other)
                ))),
            })
            .collect(),
        other => Err(Error::Batch(format!(
            "expected an object or an array of objects, found {}",
            json_kind(&other)
        ))),
    }
}

/// Each row becomes one record keyed by the header. Short rows leave the
/// missing columns null; rows with no non-blank cell are dropped.
pub fn parse_table(text: &str, delimiter: u8) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(Error::Batch("table has no header row".into()));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut fields = Map::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = row.get(i).map(parse_cell).unwrap_or(Value::Null);
            fields.insert(header.to_string(), value);
        }
        records.push(Record::from_fields(fields));
    }
    Ok(records)
}

/// Decode one table cell: blank → null, integers and finite floats →
/// numbers, everything else stays text. Integers with leading zeros stay
/// text so codes like `007` survive.
pub fn parse_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Value::Null;
    }
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if !leading_zero {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Number(Number::from(i));
        }
        if trimmed.contains('.') {
            if let Ok(f) = trimmed.parse::<f64>() {
                if let Some(n) = Number::from_f64(f) {
                    return Value::Number(n);
                }
            }
        }
    }
    Value::String(cell.to_string())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
