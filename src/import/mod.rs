pub mod importer;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::client::pagination::DEFAULT_PAGE_SIZE;
use crate::record::{Record, RecordKind};

pub use importer::{run_import, run_import_seeded};
pub use resolver::ResolutionMap;

/// How each record is reconciled against the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ImportMode {
    /// Always create; any identifier in the record is ignored.
    CreateOnly,
    /// Update records that carry an identifier; skip the rest.
    UpdateOnly,
    /// Update when an identifier is present, otherwise create.
    #[default]
    Smart,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::CreateOnly => "create",
            ImportMode::UpdateOnly => "update",
            ImportMode::Smart => "smart",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to a child whose parent reference cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Record the child as failed, naming the missing parent.
    #[default]
    Fail,
    /// Send the child without a parent id.
    Parentless,
}

/// When an unresolved parent name may be looked up in the remote parent
/// collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentLookup {
    Never,
    /// Only if the batch itself references parents that already exist
    /// remotely (parent rows carrying an identifier).
    #[default]
    WhenBatchHasExisting,
    Always,
}

/// Fields tying a child record to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    /// Numeric parent id on the child payload.
    pub parent_id_field: String,
    /// Human-readable parent title on the child record.
    pub parent_name_field: String,
}

impl Default for ParentLink {
    fn default() -> Self {
        Self {
            parent_id_field: "task_list_id".to_string(),
            parent_name_field: "task_list_name".to_string(),
        }
    }
}

/// Where a batch goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Every record into one collection, in one phase.
    Flat { kind: RecordKind, collection: String },
    /// A mixed batch: `tasklist` rows into `parents`, then `task` rows into
    /// `children`, linked through `link`.
    Linked {
        parents: String,
        children: String,
        link: ParentLink,
    },
}

impl ImportTarget {
    pub fn label(&self) -> String {
        match self {
            ImportTarget::Flat { kind, .. } => kind.as_str().to_string(),
            ImportTarget::Linked { .. } => "tasklist+task".to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            ImportTarget::Flat { collection, .. } => collection,
            ImportTarget::Linked { parents, .. } => parents,
        }
    }
}

/// Knobs of one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// Only the first record of each phase is processed.
    pub test_mode: bool,
    /// Payload field allow-list; empty lets every field through.
    pub allowed_fields: Vec<String>,
    /// Drop null, NaN and blank values from payloads.
    pub skip_empty: bool,
    pub orphan_policy: OrphanPolicy,
    pub parent_lookup: ParentLookup,
    /// Pause between consecutive network calls.
    pub delay: Duration,
    /// Page size of the remote task-list lookup.
    pub page_size: u32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::Smart,
            test_mode: false,
            allowed_fields: Vec::new(),
            skip_empty: true,
            orphan_policy: OrphanPolicy::Fail,
            parent_lookup: ParentLookup::WhenBatchHasExisting,
            delay: Duration::ZERO,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Result of reconciling one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created { id: Option<String>, response: Value },
    Updated { id: String, response: Value },
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            Outcome::Created { id, .. } => id.as_deref(),
            Outcome::Updated { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// A created or updated record.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub kind: RecordKind,
    pub title: String,
    pub id: Option<String>,
    pub response: Value,
}

/// A record that could not be reconciled.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    /// `None` for rows whose `type` names no known kind.
    pub kind: Option<RecordKind>,
    pub record: String,
    pub reason: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.as_ref().map_or("record", RecordKind::as_str);
        write!(f, "{kind} {}: {}", self.record, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    Success,
    PartialFailure,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "completed",
            ImportStatus::PartialFailure => "partial_failure",
            ImportStatus::Failed => "failed",
        }
    }
}

/// Everything one import run did, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultLedger {
    pub created: Vec<LedgerEntry>,
    pub updated: Vec<LedgerEntry>,
    pub failed: Vec<Failure>,
    pub skipped: usize,
    pub skip_reasons: Vec<String>,
}

impl ResultLedger {
    pub fn record(&mut self, kind: RecordKind, record: &Record, outcome: Outcome) {
        match outcome {
            Outcome::Created { id, response } => self.created.push(LedgerEntry {
                kind,
                title: record.title().to_string(),
                id,
                response,
            }),
            Outcome::Updated { id, response } => self.updated.push(LedgerEntry {
                kind,
                title: record.title().to_string(),
                id: Some(id),
                response,
            }),
            Outcome::Skipped(reason) => {
                self.skipped += 1;
                self.skip_reasons
                    .push(format!("{} {}: {reason}", kind.as_str(), record.label()));
            }
            Outcome::Failed(reason) => self.failed.push(Failure {
                kind: Some(kind),
                record: record.label(),
                reason,
            }),
        }
    }

    /// Record a row that cannot be routed to any phase.
    pub fn reject(&mut self, record: &Record, reason: impl Into<String>) {
        self.failed.push(Failure {
            kind: None,
            record: record.label(),
            reason: reason.into(),
        });
    }

    pub fn succeeded(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    pub fn status(&self) -> ImportStatus {
        if self.failed.is_empty() {
            ImportStatus::Success
        } else if self.succeeded() > 0 {
            ImportStatus::PartialFailure
        } else {
            ImportStatus::Failed
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.failed.iter().map(ToString::to_string).collect()
    }

    /// Downloadable result document:
    /// `{created, updated, tasklists, tasks, skipped, errors}`.
    pub fn to_document(&self) -> Value {
        let responses = |entries: &[&LedgerEntry]| -> Vec<Value> {
            entries.iter().map(|e| e.response.clone()).collect()
        };
        let all: Vec<&LedgerEntry> = self.created.iter().chain(&self.updated).collect();
        let of_kind = |kind: RecordKind| -> Vec<&LedgerEntry> {
            all.iter().copied().filter(|e| e.kind == kind).collect()
        };
        json!({
            "created": responses(&self.created.iter().collect::<Vec<_>>()),
            "updated": responses(&self.updated.iter().collect::<Vec<_>>()),
            "tasklists": responses(&of_kind(RecordKind::TaskList)),
            "tasks": responses(&of_kind(RecordKind::Task)),
            "skipped": self.skipped,
            "errors": self.errors(),
        })
    }

    /// One-line tally.
    pub fn summary(&self) -> String {
        format!(
            "{} created, {} updated, {} skipped, {} failed",
            self.created.len(),
            self.updated.len(),
            self.skipped,
            self.failed.len()
        )
    }
}

/// Progress callbacks for an import run. All methods default to no-ops.
pub trait ImportProgress: Send + Sync {
    fn on_phase_start(&self, _kind: RecordKind, _total: usize) {}
    fn on_record(
        &self,
        _kind: RecordKind,
        _index: usize,
        _total: usize,
        _record: &Record,
        _outcome: &Outcome,
    ) {
    }
    fn on_complete(&self, _ledger: &ResultLedger) {}
}

/// Progress reporter that ignores everything.
pub struct NoopProgress;

impl ImportProgress for NoopProgress {}
