pub mod batch;
pub mod normalize;

use serde::Serialize;
use serde_json::{Map, Value};

pub use normalize::{extract_description, extract_meta_totals, extract_title, normalize, MetaTotals, NormalizeOptions};

/// What a record stands for on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Project,
    TaskList,
    Task,
    Content,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Project => "project",
            RecordKind::TaskList => "tasklist",
            RecordKind::Task => "task",
            RecordKind::Content => "content",
        }
    }

    /// Parse the `type` column of a mixed batch. Case-insensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "tasklist" | "task_list" | "task-list" | "task list" => Some(RecordKind::TaskList),
            "task" => Some(RecordKind::Task),
            "project" => Some(RecordKind::Project),
            "content" | "post" => Some(RecordKind::Content),
            _ => None,
        }
    }
}

/// One uploaded row or JSON object, decoded once at the boundary.
///
/// The raw field map is kept verbatim; identifier, `type` tag and display
/// title are derived from it up front so the importer never re-inspects the
/// raw shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
    id: Option<String>,
    tag: Option<String>,
    title: String,
}

impl Record {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let id = field_ci(&fields, "id", id_string);
        let tag = field_ci(&fields, "type", |v| {
            v.as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        let title = extract_title(&fields).trim().to_string();
        Self {
            fields,
            id,
            tag,
            title,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Remote identifier, when present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    /// Raw `type` tag of a mixed batch row.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn kind(&self) -> Option<RecordKind> {
        self.tag.as_deref().and_then(RecordKind::from_tag)
    }

    /// Trimmed display title; empty when the record carries none.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Label used in ledgers and log lines.
    pub fn label(&self) -> String {
        match (&self.title, &self.id) {
            (t, _) if !t.is_empty() => format!("'{t}'"),
            (_, Some(id)) => format!("#{id}"),
            _ => "(untitled)".to_string(),
        }
    }

    /// A scalar field rendered as a non-empty string (numbers included).
    pub fn field_str(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(id_string)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Record::from_fields(fields)
    }
}

/// First usable value of `name` in any casing; the exact key is tried first.
fn field_ci<T>(
    fields: &Map<String, Value>,
    name: &str,
    pick: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    fields.get(name).and_then(&pick).or_else(|| {
        fields
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .find_map(|(_, v)| pick(v))
    })
}

/// Render an identifier-like value as a string: integers (including whole
/// floats) and non-blank strings. Everything else is "absent".
pub fn id_string(value: &Value) -> Option<String> {
    match normalize::coerce_scalar(value) {
        Value::Number(n) => {
            if n.as_f64().is_some_and(f64::is_nan) {
                None
            } else {
                Some(n.to_string())
            }
        }
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => None,
    }
}
