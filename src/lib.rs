pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod record;
pub mod storage;
pub mod url;

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

pub use client::{Credentials, RemoteClient, RestClient};
pub use config::{Overrides, Settings};
pub use error::{Error, Result};
pub use import::{
    ImportMode, ImportOptions, ImportProgress, ImportStatus, ImportTarget, NoopProgress,
    OrphanPolicy, Outcome, ParentLink, ParentLookup, ResultLedger,
};
pub use record::{MetaTotals, Record, RecordKind};
pub use storage::repository::ImportRun;
pub use storage::Database;
pub use url::{resolve_project_id, Endpoints};

use client::{fetch_all_pages, unwrap_data, Pacer};
use storage::repository;

/// Pause between listing pages.
const PAGE_DELAY: Duration = Duration::from_millis(100);

/// Longest error summary kept in the import history.
const MAX_ERROR_SUMMARY: usize = 5;

/// Statuses the Project Manager plugin accepts for a project.
pub const PROJECT_STATUSES: &[&str] = &["incomplete", "active", "pending", "completed", "archived"];

/// Fields of a new project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub title: String,
    pub status: Option<String>,
    pub description: Option<String>,
}

impl NewProject {
    fn into_payload(self) -> Result<Value> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::Other("project title is required".into()));
        }
        let status = self.status.unwrap_or_else(|| "incomplete".to_string());
        check_status(&status)?;
        Ok(json!({
            "title": title,
            "status": status,
            "description": self.description.unwrap_or_default(),
        }))
    }
}

fn check_status(status: &str) -> Result<()> {
    if PROJECT_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(Error::Other(format!(
            "invalid project status '{status}' (expected one of: {})",
            PROJECT_STATUSES.join(", ")
        )))
    }
}

/// A WordPress content type from `/wp/v2/types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostType {
    pub slug: String,
    pub name: String,
    /// Route segment under `/wp/v2`; the slug when the type declares none.
    pub rest_base: String,
}

fn parse_post_types(value: Value) -> Vec<PostType> {
    let Value::Object(types) = value else {
        return Vec::new();
    };
    let text = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    types
        .into_iter()
        .map(|(key, info)| {
            let slug = text(info.get("slug")).unwrap_or(key);
            PostType {
                name: text(info.get("name")).unwrap_or_else(|| slug.clone()),
                rest_base: text(info.get("rest_base")).unwrap_or_else(|| slug.clone()),
                slug,
            }
        })
        .collect()
}

/// Which collection(s) an import goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    Projects,
    TaskLists { project_id: String },
    Tasks { project_id: String },
    /// Mixed batch of `tasklist` and `task` rows, linked by task list title.
    TaskListsWithTasks { project_id: String },
    /// Items of a content type, addressed by its REST base.
    Content { rest_base: String },
}

/// What one import run did.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: i64,
    pub target: String,
    pub mode: ImportMode,
    pub test_mode: bool,
    pub status: ImportStatus,
    pub ledger: ResultLedger,
}

/// Console over one WordPress site plus the local settings/history store.
pub struct WpConsole<C = RestClient> {
    db: Database,
    client: C,
    endpoints: Endpoints,
    settings: Settings,
}

impl WpConsole<RestClient> {
    /// Build the HTTP client from resolved settings.
    pub fn connect(db: Database, settings: Settings, credentials: Option<&Credentials>) -> Result<Self> {
        let client = RestClient::new(credentials)?.with_timeout(settings.request_timeout);
        if !client.has_credentials() {
            log::warn!("No application password given; write calls will likely be rejected");
        }
        Self::new(db, client, settings)
    }
}

impl<C: RemoteClient> WpConsole<C> {
    pub fn new(db: Database, client: C, settings: Settings) -> Result<Self> {
        let endpoints = settings.endpoints()?;
        Ok(Self {
            db,
            client,
            endpoints,
            settings,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn list(&self, url: &str) -> Result<Vec<Value>> {
        let pacer = Pacer::new(PAGE_DELAY);
        fetch_all_pages(&self.client, url, &[], self.settings.page_size, &pacer).await
    }

    async fn fetch_one(&self, url: &str, what: &str) -> Result<Value> {
        match unwrap_data(self.client.get(url, &[]).await?) {
            Value::Object(map) if !map.is_empty() => Ok(Value::Object(map)),
            _ => Err(Error::NotFound(what.to_string())),
        }
    }

    // ── Projects ─────────────────────────────────────────────────

    pub async fn list_projects(&self) -> Result<Vec<Value>> {
        self.list(&self.endpoints.projects()).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Value> {
        self.fetch_one(&self.endpoints.project(project_id), &format!("project {project_id}"))
            .await
    }

    pub async fn create_project(&self, project: NewProject) -> Result<Value> {
        let payload = project.into_payload()?;
        let created = self.client.post(&self.endpoints.projects(), &payload).await?;
        Ok(unwrap_data(created))
    }

    /// Send the given fields to an existing project. `status`, when present,
    /// must be a known project status.
    pub async fn update_project(&self, project_id: &str, fields: Map<String, Value>) -> Result<Value> {
        if let Some(status) = fields.get("status").and_then(Value::as_str) {
            check_status(status)?;
        }
        let updated = self
            .client
            .put(&self.endpoints.project(project_id), &Value::Object(fields))
            .await?;
        Ok(unwrap_data(updated))
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<Value> {
        let response = self.client.delete(&self.endpoints.project(project_id)).await?;
        log::info!("Deleted project {project_id}");
        Ok(response)
    }

    /// Create `"<title> (Copy)"` with the source's status and description.
    pub async fn clone_project(&self, project_id: &str) -> Result<Value> {
        let source = self.get_project(project_id).await?;
        let fields = source.as_object().cloned().unwrap_or_default();
        let status = fields
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("incomplete");
        let payload = json!({
            "title": format!("{} (Copy)", record::extract_title(&fields)),
            "status": status,
            "description": record::extract_description(&fields),
        });
        let created = self.client.post(&self.endpoints.projects(), &payload).await?;
        Ok(unwrap_data(created))
    }

    /// Create one project from an exported project document. Missing fields
    /// default to `"Imported Project"` and `incomplete`.
    pub async fn import_project_document(&self, document: &Value) -> Result<Value> {
        let fields = document
            .as_object()
            .ok_or_else(|| Error::Batch("project document must be a JSON object".into()))?;
        let mut title = record::extract_title(fields);
        if title.trim().is_empty() {
            title = "Imported Project".to_string();
        }
        let payload = json!({
            "title": title,
            "status": fields.get("status").and_then(Value::as_str).unwrap_or("incomplete"),
            "description": record::extract_description(fields),
        });
        let created = self.client.post(&self.endpoints.projects(), &payload).await?;
        Ok(unwrap_data(created))
    }

    pub async fn project_totals(&self) -> Result<MetaTotals> {
        Ok(export::project_totals(&self.list_projects().await?))
    }

    // ── Task lists and tasks ─────────────────────────────────────

    pub async fn list_task_lists(&self, project_id: &str) -> Result<Vec<Value>> {
        self.list(&self.endpoints.task_lists(project_id)).await
    }

    pub async fn list_tasks(&self, project_id: &str) -> Result<Vec<Value>> {
        self.list(&self.endpoints.tasks(project_id)).await
    }

    // ── Content types ────────────────────────────────────────────

    pub async fn post_types(&self) -> Result<Vec<PostType>> {
        let types = self.client.get(&self.endpoints.post_types(), &[]).await?;
        let mut types = parse_post_types(types);
        types.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(types)
    }

    /// REST base of the content type `slug`, or the slug itself when the
    /// site does not list it.
    pub async fn rest_base_for(&self, slug: &str) -> Result<String> {
        let types = self.post_types().await?;
        Ok(types
            .into_iter()
            .find(|t| t.slug == slug)
            .map(|t| t.rest_base)
            .unwrap_or_else(|| slug.to_string()))
    }

    pub async fn list_posts(&self, rest_base: &str) -> Result<Vec<Value>> {
        self.list(&self.endpoints.posts(rest_base)).await
    }

    // ── Import ───────────────────────────────────────────────────

    pub fn import_target(&self, kind: &ImportKind) -> ImportTarget {
        match kind {
            ImportKind::Projects => ImportTarget::Flat {
                kind: RecordKind::Project,
                collection: self.endpoints.projects(),
            },
            ImportKind::TaskLists { project_id } => ImportTarget::Flat {
                kind: RecordKind::TaskList,
                collection: self.endpoints.task_lists(project_id),
            },
            ImportKind::Tasks { project_id } => ImportTarget::Flat {
                kind: RecordKind::Task,
                collection: self.endpoints.tasks(project_id),
            },
            ImportKind::TaskListsWithTasks { project_id } => ImportTarget::Linked {
                parents: self.endpoints.task_lists(project_id),
                children: self.endpoints.tasks(project_id),
                link: ParentLink::default(),
            },
            ImportKind::Content { rest_base } => ImportTarget::Flat {
                kind: RecordKind::Content,
                collection: self.endpoints.posts(rest_base),
            },
        }
    }

    /// Run a bulk import and record it in the history.
    pub async fn import(
        &self,
        kind: &ImportKind,
        batch: &[Record],
        options: &ImportOptions,
        progress: &dyn ImportProgress,
    ) -> Result<ImportReport> {
        let target = self.import_target(kind);
        let label = target.label();
        let run_id = self
            .db
            .writer()
            .call({
                let label = label.clone();
                let collection = target.collection().to_string();
                let mode = options.mode.as_str();
                let test_mode = options.test_mode;
                move |conn| repository::insert_import_run(conn, &label, &collection, mode, test_mode)
            })
            .await?;

        log::info!(
            "Import run {run_id}: {} record(s), target {label}{}",
            batch.len(),
            if options.test_mode { " (test mode)" } else { "" }
        );
        let ledger = import::run_import(&self.client, &target, batch, options, progress).await;
        let status = ledger.status();

        let errors = ledger.errors();
        let error_summary = (!errors.is_empty()).then(|| {
            let mut shown: Vec<String> = errors.iter().take(MAX_ERROR_SUMMARY).cloned().collect();
            if errors.len() > MAX_ERROR_SUMMARY {
                shown.push(format!("... and {} more", errors.len() - MAX_ERROR_SUMMARY));
            }
            shown.join("; ")
        });
        let counts = repository::RunCounts {
            created: ledger.created.len() as u64,
            updated: ledger.updated.len() as u64,
            skipped: ledger.skipped as u64,
            failed: ledger.failed.len() as u64,
        };
        let document = ledger.to_document().to_string();
        self.db
            .writer()
            .call({
                let status = status.as_str();
                move |conn| {
                    repository::finish_import_run(
                        conn,
                        run_id,
                        status,
                        &counts,
                        error_summary.as_deref(),
                        Some(&document),
                    )
                }
            })
            .await?;

        Ok(ImportReport {
            run_id,
            target: label,
            mode: options.mode,
            test_mode: options.test_mode,
            status,
            ledger,
        })
    }

    // ── History ──────────────────────────────────────────────────

    pub async fn history(&self, limit: u32) -> Result<Vec<ImportRun>> {
        import_history(&self.db, limit).await
    }
}

/// Stored settings as a map, for [`Settings::resolve`].
pub async fn stored_config(db: &Database) -> Result<HashMap<String, String>> {
    let items = db.reader().call(|conn| repository::list_config(conn)).await?;
    Ok(items.into_iter().collect())
}

pub async fn get_config(db: &Database, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    Ok(db
        .reader()
        .call(move |conn| repository::get_config(conn, &key))
        .await?)
}

/// Validate and store a setting. Returns the stored value.
pub async fn set_config(db: &Database, key: &str, value: &str) -> Result<String> {
    let value = config::validate(key, value)?;
    let key = key.to_string();
    db.writer()
        .call({
            let value = value.clone();
            move |conn| repository::set_config(conn, &key, &value)
        })
        .await?;
    Ok(value)
}

pub async fn unset_config(db: &Database, key: &str) -> Result<bool> {
    let key = key.to_string();
    Ok(db
        .writer()
        .call(move |conn| repository::unset_config(conn, &key))
        .await?)
}

pub async fn import_history(db: &Database, limit: u32) -> Result<Vec<ImportRun>> {
    Ok(db
        .reader()
        .call(move |conn| repository::list_import_runs(conn, limit))
        .await?)
}

pub async fn import_run(db: &Database, run_id: i64) -> Result<ImportRun> {
    db.reader()
        .call(move |conn| repository::get_import_run(conn, run_id))
        .await?
        .ok_or_else(|| Error::NotFound(format!("import run {run_id}")))
}

/// Result document stored for a finished run.
pub async fn import_document(db: &Database, run_id: i64) -> Result<Value> {
    let stored = db
        .reader()
        .call(move |conn| repository::get_import_ledger(conn, run_id))
        .await?
        .ok_or_else(|| Error::NotFound(format!("import run {run_id}")))?;
    serde_json::from_str(&stored).map_err(|e| Error::InvalidResponse(format!("stored ledger: {e}")))
}
