use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::record::{extract_description, extract_meta_totals, extract_title, MetaTotals};

/// Characters of a project description kept in the table view.
const DESCRIPTION_PREVIEW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// `.csv` means CSV; anything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Which flattened view a listing is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Projects,
    TaskLists,
    Tasks,
    Posts,
}

impl TableKind {
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            TableKind::Projects => &[
                "ID",
                "Title",
                "Status",
                "Tasks",
                "Complete",
                "Files",
                "Created",
                "Description",
            ],
            TableKind::TaskLists => &["ID", "Title", "Status", "Description"],
            TableKind::Tasks => &["ID", "Title", "Status", "Priority", "Assignee", "Completed"],
            TableKind::Posts => &["ID", "Title", "Status", "Date", "Author"],
        }
    }

    pub fn row(&self, item: &Map<String, Value>) -> Vec<String> {
        match self {
            TableKind::Projects => project_row(item),
            TableKind::TaskLists => vec![
                cell(item.get("id")),
                extract_title(item),
                cell(item.get("status")),
                extract_description(item),
            ],
            TableKind::Tasks => task_row(item),
            TableKind::Posts => post_row(item),
        }
    }
}

fn project_row(item: &Map<String, Value>) -> Vec<String> {
    let totals = extract_meta_totals(item);
    let description = extract_description(item);
    let preview = if description.is_empty() {
        String::new()
    } else {
        let cut: String = description.chars().take(DESCRIPTION_PREVIEW).collect();
        format!("{cut}...")
    };
    let created = item
        .get("created_at")
        .filter(|v| !v.is_null())
        .or_else(|| item.get("created"));
    vec![
        cell(item.get("id")),
        extract_title(item),
        cell(item.get("status")),
        totals.total_tasks.to_string(),
        totals.total_complete_tasks.to_string(),
        totals.total_files.to_string(),
        created_cell(created),
        preview,
    ]
}

fn task_row(item: &Map<String, Value>) -> Vec<String> {
    vec![
        cell(item.get("id")),
        extract_title(item),
        cell(item.get("status")),
        cell(item.get("priority")),
        cell(item.get("assignee")),
        item.get("completed")
            .map(|v| cell(Some(v)))
            .unwrap_or_else(|| "false".to_string()),
    ]
}

fn post_row(item: &Map<String, Value>) -> Vec<String> {
    let date: String = item
        .get("date")
        .and_then(Value::as_str)
        .map(|d| d.chars().take(10).collect())
        .unwrap_or_default();
    vec![
        cell(item.get("id")),
        extract_title(item),
        cell(item.get("status")),
        date,
        cell(item.get("author")),
    ]
}

/// Project Manager dates come as `{"date": ..., "time": ...}` or a string.
fn created_cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::Object(d)) => {
            let date = d.get("date").and_then(Value::as_str).unwrap_or("");
            match d.get("time").and_then(Value::as_str) {
                Some(time) if !date.is_empty() => format!("{date} {time}"),
                _ => date.to_string(),
            }
        }
        other => cell(other),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Flatten a listing into CSV. Non-object items are skipped.
pub fn to_csv(kind: TableKind, items: &[Value]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(kind.headers())?;
    for item in items.iter().filter_map(Value::as_object) {
        writer.write_record(kind.row(item))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Other(format!("cannot finish CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Other(format!("CSV is not UTF-8: {e}")))
}

/// The raw records, pretty-printed.
pub fn to_json(items: &[Value]) -> Result<String> {
    serde_json::to_string_pretty(items).map_err(|e| Error::Other(format!("cannot encode JSON: {e}")))
}

pub fn render(kind: TableKind, format: ExportFormat, items: &[Value]) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(items),
        ExportFormat::Csv => to_csv(kind, items),
    }
}

/// Render and write to `path`, format chosen by its extension.
pub fn write_export(path: &Path, kind: TableKind, items: &[Value]) -> Result<()> {
    let text = render(kind, ExportFormat::from_path(path), items)?;
    std::fs::write(path, text)
        .map_err(|e| Error::Other(format!("cannot write {}: {e}", path.display())))?;
    log::info!("Wrote {} record(s) to {}", items.len(), path.display());
    Ok(())
}

/// Sum of the per-project counters under `meta.data`.
pub fn project_totals(projects: &[Value]) -> MetaTotals {
    let mut totals = MetaTotals::default();
    for project in projects.iter().filter_map(Value::as_object) {
        totals.add(&extract_meta_totals(project));
    }
    totals
}
