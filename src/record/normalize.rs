use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Field selection applied when turning a record into a request payload.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Field names that may pass. Empty means every field passes.
    /// Matched exactly (case-sensitive), like JSON keys.
    pub allowed_fields: Vec<String>,
    /// Drop any field whose name case-insensitively equals `id`.
    pub exclude_id: bool,
    /// Drop nulls, NaN floats and strings that are blank after trimming.
    pub skip_empty: bool,
}

/// Build a clean payload from a record's fields.
///
/// Output keys are a subset of the input keys, never renamed. Floats with no
/// fractional part are reduced to integers; nothing else is transformed.
pub fn normalize(fields: &Map<String, Value>, options: &NormalizeOptions) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in fields {
        if options.exclude_id && key.eq_ignore_ascii_case("id") {
            continue;
        }
        if !options.allowed_fields.is_empty() && !options.allowed_fields.iter().any(|f| f == key) {
            continue;
        }
        let value = coerce_scalar(value);
        if options.skip_empty && is_empty_value(&value) {
            continue;
        }
        out.insert(key.clone(), value);
    }
    out
}

/// Whole-valued floats (how a spreadsheet hands back `42`) become integers.
pub fn coerce_scalar(value: &Value) -> Value {
    if let Value::Number(n) = value {
        if n.is_f64() {
            if let Some(f) = n.as_f64() {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    return Value::Number(Number::from(f as i64));
                }
            }
        }
    }
    value.clone()
}

/// Null, NaN, or a string that is blank after trimming.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(f64::is_nan),
        _ => false,
    }
}

/// Human-readable title of a project, task list, task or content item.
///
/// Prefers `title.rendered` when the title is structured, then a plain string
/// title, then `project_title`, then `name`. Never fails; returns `""` when
/// nothing fits.
pub fn extract_title(fields: &Map<String, Value>) -> String {
    match fields.get("title") {
        Some(Value::Object(t)) => {
            return t
                .get("rendered")
                .or_else(|| t.get("raw"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
        }
        Some(Value::String(s)) => return s.clone(),
        _ => {}
    }
    ["project_title", "name"]
        .iter()
        .filter_map(|k| fields.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Description text; structured descriptions carry `content`, `html` or
/// `rendered`.
pub fn extract_description(fields: &Map<String, Value>) -> String {
    match fields.get("description") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(d)) => ["content", "html", "rendered", "raw"]
            .iter()
            .filter_map(|k| d.get(*k).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

/// Counters the Project Manager plugin reports under `meta.data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetaTotals {
    pub total_task_lists: u64,
    pub total_tasks: u64,
    pub total_complete_tasks: u64,
    pub total_incomplete_tasks: u64,
    pub total_files: u64,
}

impl MetaTotals {
    pub fn add(&mut self, other: &MetaTotals) {
        self.total_task_lists += other.total_task_lists;
        self.total_tasks += other.total_tasks;
        self.total_complete_tasks += other.total_complete_tasks;
        self.total_incomplete_tasks += other.total_incomplete_tasks;
        self.total_files += other.total_files;
    }
}

pub fn extract_meta_totals(fields: &Map<String, Value>) -> MetaTotals {
    let Some(data) = fields
        .get("meta")
        .and_then(Value::as_object)
        .and_then(|m| m.get("data"))
        .and_then(Value::as_object)
    else {
        return MetaTotals::default();
    };
    let count = |key: &str| -> u64 {
        match data.get(key) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    };
    MetaTotals {
        total_task_lists: count("total_task_lists"),
        total_tasks: count("total_tasks"),
        total_complete_tasks: count("total_complete_tasks"),
        total_incomplete_tasks: count("total_incomplete_tasks"),
        total_files: count("total_files"),
    }
}
