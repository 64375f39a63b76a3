use serde_json::{Map, Value};

use super::{
    ImportMode, ImportOptions, ImportProgress, ImportTarget, OrphanPolicy, Outcome, ParentLink,
    ParentLookup, ResolutionMap, ResultLedger,
};
use crate::client::{extract_id, fetch_all_pages, Pacer, RemoteClient};
use crate::record::{extract_title, normalize, NormalizeOptions, Record, RecordKind};
use crate::url::{is_numeric_id, item_url};

/// Fields that steer the import and never reach the remote side.
const TYPE_FIELD: &str = "type";

enum Action {
    Create,
    Update(String),
}

struct Prepared {
    action: Action,
    payload: Map<String, Value>,
}

/// Reconcile `batch` against the remote collection(s) of `target`.
///
/// Per-record problems (validation, unresolved parents, transport errors)
/// land in the returned ledger and never abort the run.
pub async fn run_import<C: RemoteClient + ?Sized>(
    client: &C,
    target: &ImportTarget,
    batch: &[Record],
    options: &ImportOptions,
    progress: &dyn ImportProgress,
) -> ResultLedger {
    run_import_seeded(client, target, batch, options, ResolutionMap::new(), progress).await
}

/// Like [`run_import`], starting from task-list ids already known to the
/// caller. Titles created or updated in the batch take over seeded entries.
pub async fn run_import_seeded<C: RemoteClient + ?Sized>(
    client: &C,
    target: &ImportTarget,
    batch: &[Record],
    options: &ImportOptions,
    seed: ResolutionMap,
    progress: &dyn ImportProgress,
) -> ResultLedger {
    let mut importer = Importer::new(client, options, progress);
    importer.parents = seed;
    match target {
        ImportTarget::Flat { kind, collection } => {
            importer.run_flat(*kind, collection, batch).await;
        }
        ImportTarget::Linked {
            parents,
            children,
            link,
        } => {
            importer.run_linked(parents, children, link, batch).await;
        }
    }
    let ledger = importer.ledger;
    log::info!("Import finished: {}", ledger.summary());
    progress.on_complete(&ledger);
    ledger
}

struct Importer<'a, C: RemoteClient + ?Sized> {
    client: &'a C,
    options: &'a ImportOptions,
    progress: &'a dyn ImportProgress,
    normalize: NormalizeOptions,
    pacer: Pacer,
    parents: ResolutionMap,
    lookup_done: bool,
    lookup_error: Option<String>,
    ledger: ResultLedger,
}

impl<'a, C: RemoteClient + ?Sized> Importer<'a, C> {
    fn new(client: &'a C, options: &'a ImportOptions, progress: &'a dyn ImportProgress) -> Self {
        Self {
            client,
            options,
            progress,
            normalize: NormalizeOptions {
                allowed_fields: options.allowed_fields.clone(),
                exclude_id: true,
                skip_empty: options.skip_empty,
            },
            pacer: Pacer::new(options.delay),
            parents: ResolutionMap::new(),
            lookup_done: false,
            lookup_error: None,
            ledger: ResultLedger::default(),
        }
    }

    fn phase<'r>(&self, records: Vec<&'r Record>) -> Vec<&'r Record> {
        let mut records = records;
        if self.options.test_mode {
            records.truncate(1);
        }
        records
    }

    async fn run_flat(&mut self, kind: RecordKind, collection: &str, batch: &[Record]) {
        let records = self.phase(batch.iter().collect());
        let total = records.len();
        log::info!(
            "Importing {total} {} record(s) into {collection} ({} mode)",
            kind.as_str(),
            self.options.mode
        );
        self.progress.on_phase_start(kind, total);

        for (index, record) in records.into_iter().enumerate() {
            let outcome = match self.prepare(record, &[]) {
                Ok(prepared) => self.execute(prepared, collection).await,
                Err(outcome) => outcome,
            };
            self.finish(kind, index, total, record, outcome);
        }
    }

    async fn run_linked(
        &mut self,
        parents_url: &str,
        children_url: &str,
        link: &ParentLink,
        batch: &[Record],
    ) {
        let mut parents = Vec::new();
        let mut children = Vec::new();
        for record in batch {
            match record.kind() {
                Some(RecordKind::TaskList) => parents.push(record),
                Some(RecordKind::Task) => children.push(record),
                _ => {
                    let reason = match record.tag() {
                        Some(tag) => format!("unknown type '{tag}' (expected tasklist or task)"),
                        None => "missing type (expected tasklist or task)".to_string(),
                    };
                    log::warn!("Rejected {}: {reason}", record.label());
                    self.ledger.reject(record, reason);
                }
            }
        }

        // A test run sends at most one call per phase, so no listing.
        let lookup_allowed = !self.options.test_mode
            && match self.options.parent_lookup {
                ParentLookup::Never => false,
                ParentLookup::Always => true,
                ParentLookup::WhenBatchHasExisting => parents.iter().any(|p| p.has_id()),
            };
        let control = [TYPE_FIELD, link.parent_name_field.as_str()];

        let parents = self.phase(parents);
        let total = parents.len();
        log::info!("Phase 1: {total} task list(s) into {parents_url}");
        self.progress.on_phase_start(RecordKind::TaskList, total);
        for (index, record) in parents.into_iter().enumerate() {
            let outcome = match self.prepare(record, &control) {
                Ok(prepared) => self.execute(prepared, parents_url).await,
                Err(outcome) => outcome,
            };
            if let Some(id) = outcome.id() {
                self.parents.insert(record.title(), id);
            }
            self.finish(RecordKind::TaskList, index, total, record, outcome);
        }

        let children = self.phase(children);
        let total = children.len();
        log::info!("Phase 2: {total} task(s) into {children_url}");
        self.progress.on_phase_start(RecordKind::Task, total);
        for (index, record) in children.into_iter().enumerate() {
            let mut prepared = match self.prepare(record, &control) {
                Ok(prepared) => prepared,
                Err(outcome) => {
                    self.finish(RecordKind::Task, index, total, record, outcome);
                    continue;
                }
            };

            match self
                .resolve_parent(record, link, parents_url, lookup_allowed)
                .await
            {
                Ok(parent_id) => {
                    prepared
                        .payload
                        .insert(link.parent_id_field.clone(), id_value(&parent_id));
                }
                Err(reason) => match self.options.orphan_policy {
                    OrphanPolicy::Fail => {
                        self.finish(RecordKind::Task, index, total, record, Outcome::Failed(reason));
                        continue;
                    }
                    OrphanPolicy::Parentless => {
                        log::warn!("{} sent without a task list: {reason}", record.label());
                        prepared.payload.remove(&link.parent_id_field);
                    }
                },
            }

            let outcome = self.execute(prepared, children_url).await;
            self.finish(RecordKind::Task, index, total, record, outcome);
        }
    }

    /// Decide the action and build the outgoing payload. `Err` carries an
    /// outcome reached without any network call.
    fn prepare(&self, record: &Record, control: &[&str]) -> Result<Prepared, Outcome> {
        let action = match (self.options.mode, record.id()) {
            (ImportMode::UpdateOnly, None) => {
                return Err(Outcome::Skipped("no identifier to update".to_string()))
            }
            (ImportMode::CreateOnly, _) | (ImportMode::Smart, None) => Action::Create,
            (_, Some(id)) => Action::Update(id.to_string()),
        };

        let mut payload = normalize(record.fields(), &self.normalize);
        payload.retain(|key, _| !control.iter().any(|c| key.eq_ignore_ascii_case(c)));

        let title = extract_title(&payload).trim().to_string();
        if title.is_empty() {
            return Err(Outcome::Skipped("missing title".to_string()));
        }
        // Structured titles ({"rendered": ...}) go out as plain strings.
        payload.insert("title".to_string(), Value::String(title));

        Ok(Prepared { action, payload })
    }

    async fn execute(&self, prepared: Prepared, collection: &str) -> Outcome {
        let body = Value::Object(prepared.payload);
        self.pacer.wait().await;
        match prepared.action {
            Action::Create => match self.client.post(collection, &body).await {
                Ok(response) => {
                    let id = extract_id(&response);
                    if id.is_none() {
                        log::warn!("Create in {collection} returned no id");
                    }
                    Outcome::Created { id, response }
                }
                Err(e) => Outcome::Failed(e.reason()),
            },
            Action::Update(id) => match self.client.put(&item_url(collection, &id), &body).await {
                Ok(response) => Outcome::Updated {
                    id: extract_id(&response).unwrap_or(id),
                    response,
                },
                Err(e) => Outcome::Failed(e.reason()),
            },
        }
    }

    /// Parent id for a child: an explicit numeric id field wins, then the
    /// parent name through the run's map, then (once per run, if allowed) a
    /// listing of the remote parent collection.
    async fn resolve_parent(
        &mut self,
        record: &Record,
        link: &ParentLink,
        parents_url: &str,
        lookup_allowed: bool,
    ) -> Result<String, String> {
        if let Some(id) = record.field_str(&link.parent_id_field) {
            if is_numeric_id(&id) {
                return Ok(id);
            }
        }
        let Some(name) = record.field_str(&link.parent_name_field) else {
            return Err(format!(
                "no task list reference ({} or {})",
                link.parent_id_field, link.parent_name_field
            ));
        };
        if let Some(id) = self.parents.resolve(&name) {
            return Ok(id.to_string());
        }

        if lookup_allowed && !self.lookup_done {
            self.lookup_done = true;
            match fetch_all_pages(self.client, parents_url, &[], self.options.page_size, &self.pacer).await {
                Ok(items) => {
                    let added = self.parents.absorb_listing(&items);
                    log::debug!("Looked up {added} existing task list(s) in {parents_url}");
                }
                Err(e) => {
                    log::warn!("Task list lookup in {parents_url} failed: {e}");
                    self.lookup_error = Some(e.reason());
                }
            }
            if let Some(id) = self.parents.resolve(&name) {
                return Ok(id.to_string());
            }
        }

        Err(match &self.lookup_error {
            Some(cause) => format!("unresolved task list '{name}' (lookup failed: {cause})"),
            None => format!("unresolved task list '{name}'"),
        })
    }

    fn finish(
        &mut self,
        kind: RecordKind,
        index: usize,
        total: usize,
        record: &Record,
        outcome: Outcome,
    ) {
        match &outcome {
            Outcome::Created { id, .. } => log::info!(
                "Created {} {} (id {})",
                kind.as_str(),
                record.label(),
                id.as_deref().unwrap_or("?")
            ),
            Outcome::Updated { id, .. } => {
                log::info!("Updated {} {} (id {id})", kind.as_str(), record.label())
            }
            Outcome::Skipped(reason) => {
                log::info!("Skipped {} {}: {reason}", kind.as_str(), record.label())
            }
            Outcome::Failed(reason) => {
                log::warn!("Failed {} {}: {reason}", kind.as_str(), record.label())
            }
        }
        self.progress.on_record(kind, index, total, record, &outcome);
        self.ledger.record(kind, record, outcome);
    }
}

fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::fake::{Call, FakeRemote};
    use crate::import::{ImportStatus, NoopProgress};
    use serde_json::json;
    use std::time::Duration;

    const PROJECTS: &str = "https://wp.test/wp-json/pm/v2/projects";
    const LISTS: &str = "https://wp.test/wp-json/pm/v2/projects/3/task-lists";
    const TASKS: &str = "https://wp.test/wp-json/pm/v2/projects/3/tasks";

    fn records(values: Value) -> Vec<Record> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| Record::from_fields(v.as_object().cloned().unwrap()))
            .collect()
    }

    fn projects() -> ImportTarget {
        ImportTarget::Flat {
            kind: RecordKind::Project,
            collection: PROJECTS.to_string(),
        }
    }

    fn linked() -> ImportTarget {
        ImportTarget::Linked {
            parents: LISTS.to_string(),
            children: TASKS.to_string(),
            link: ParentLink::default(),
        }
    }

    fn with_mode(mode: ImportMode) -> ImportOptions {
        ImportOptions {
            mode,
            ..ImportOptions::default()
        }
    }

    #[tokio::test]
    async fn test_smart_updates_with_id_and_creates_without() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"id": 7, "title": "Existing", "status": "complete"},
            {"title": "Fresh"},
        ]));

        let ledger = run_import(&remote, &projects(), &batch, &ImportOptions::default(), &NoopProgress).await;

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            Call::Put(
                format!("{PROJECTS}/7"),
                json!({"title": "Existing", "status": "complete"})
            )
        );
        assert_eq!(calls[1], Call::Post(PROJECTS.to_string(), json!({"title": "Fresh"})));
        assert_eq!(ledger.updated.len(), 1);
        assert_eq!(ledger.updated[0].id.as_deref(), Some("7"));
        assert_eq!(ledger.created.len(), 1);
        assert_eq!(ledger.created[0].id.as_deref(), Some("100"));
        assert_eq!(ledger.status(), ImportStatus::Success);
    }

    #[tokio::test]
    async fn test_create_only_posts_every_record_in_order_without_ids() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"id": 1, "title": "A"},
            {"ID": "2", "title": "B"},
            {"title": "C"},
        ]));

        let ledger = run_import(
            &remote,
            &projects(),
            &batch,
            &with_mode(ImportMode::CreateOnly),
            &NoopProgress,
        )
        .await;

        let calls = remote.calls();
        let titles: Vec<&str> = calls
            .iter()
            .map(|c| {
                assert!(matches!(c, Call::Post(url, _) if url == PROJECTS));
                let payload = c.payload().unwrap();
                assert!(payload.get("id").is_none() && payload.get("ID").is_none());
                payload["title"].as_str().unwrap()
            })
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(ledger.created.len(), 3);
        assert!(ledger.updated.is_empty());
        assert_eq!(ledger.skipped, 0);
        assert!(ledger.failed.is_empty());
    }

    #[tokio::test]
    async fn test_update_only_skips_records_without_id() {
        let remote = FakeRemote::new();
        let batch = records(json!([{"title": "No id"}, {"id": 9, "title": "Has id"}]));

        let ledger = run_import(
            &remote,
            &projects(),
            &batch,
            &with_mode(ImportMode::UpdateOnly),
            &NoopProgress,
        )
        .await;

        assert_eq!(remote.calls().len(), 1);
        assert_eq!(remote.calls()[0].url(), format!("{PROJECTS}/9"));
        assert_eq!(ledger.skipped, 1);
        assert_eq!(ledger.updated.len(), 1);
        assert!(ledger.failed.is_empty());
    }

    #[tokio::test]
    async fn test_untitled_record_is_skipped_without_network() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"description": "no title here"},
            {"title": "   "},
            {"title": {"rendered": ""}},
        ]));

        let ledger = run_import(&remote, &projects(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert!(remote.calls().is_empty());
        assert_eq!(ledger.skipped, 3);
        assert_eq!(ledger.status(), ImportStatus::Success);
    }

    #[tokio::test]
    async fn test_structured_title_is_sent_as_string() {
        let remote = FakeRemote::new();
        let batch = records(json!([{"title": {"rendered": "Launch", "raw": "Launch"}, "budget": 10.0}]));

        run_import(&remote, &projects(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert_eq!(
            remote.calls()[0].payload(),
            Some(&json!({"title": "Launch", "budget": 10}))
        );
    }

    #[tokio::test]
    async fn test_allowed_fields_filter_payload() {
        let remote = FakeRemote::new();
        let batch = records(json!([{"title": "A", "status": "incomplete", "secret": "x"}]));
        let options = ImportOptions {
            allowed_fields: vec!["title".into(), "status".into()],
            ..ImportOptions::default()
        };

        run_import(&remote, &projects(), &batch, &options, &NoopProgress).await;

        assert_eq!(
            remote.calls()[0].payload(),
            Some(&json!({"title": "A", "status": "incomplete"}))
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded_and_run_continues() {
        let remote = FakeRemote::new().failing_on("B");
        let batch = records(json!([{"title": "A"}, {"title": "B"}, {"title": "C"}]));

        let ledger = run_import(&remote, &projects(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert_eq!(remote.calls().len(), 3);
        assert_eq!(ledger.created.len(), 2);
        assert_eq!(ledger.failed.len(), 1);
        assert_eq!(
            ledger.errors(),
            vec!["project 'B': HTTP 500: Internal Server Error".to_string()]
        );
        assert_eq!(ledger.status(), ImportStatus::PartialFailure);
    }

    #[tokio::test]
    async fn test_linked_import_resolves_parent_by_name() {
        let remote = FakeRemote::starting_at(42);
        let batch = records(json!([
            {"type": "task", "title": "Write docs", "task_list_name": " sprint 1 "},
            {"type": "tasklist", "title": "Sprint 1"},
        ]));

        let ledger = run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Post(LISTS.to_string(), json!({"title": "Sprint 1"})));
        assert_eq!(
            calls[1],
            Call::Post(TASKS.to_string(), json!({"title": "Write docs", "task_list_id": 42}))
        );
        assert_eq!(ledger.created.len(), 2);
        let doc = ledger.to_document();
        assert_eq!(doc["tasklists"].as_array().unwrap().len(), 1);
        assert_eq!(doc["tasks"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_parent_fails_without_network() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "task", "title": "Lost", "task_list_name": "Sprint 9"},
        ]));

        let ledger = run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert!(remote.calls().is_empty());
        assert_eq!(ledger.failed.len(), 1);
        assert!(ledger.failed[0].reason.contains("Sprint 9"));
        assert_eq!(ledger.status(), ImportStatus::Failed);
    }

    #[tokio::test]
    async fn test_seeded_parent_resolves_without_creating_it() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "task", "title": "Carry over", "task_list_name": "Backlog"},
        ]));
        let seed: ResolutionMap = [("Backlog", "55")].into_iter().collect();

        let ledger = run_import_seeded(
            &remote,
            &linked(),
            &batch,
            &ImportOptions::default(),
            seed,
            &NoopProgress,
        )
        .await;

        assert_eq!(
            remote.calls(),
            vec![Call::Post(
                TASKS.to_string(),
                json!({"title": "Carry over", "task_list_id": 55})
            )]
        );
        assert_eq!(ledger.status(), ImportStatus::Success);
    }

    #[tokio::test]
    async fn test_task_without_parent_reference_fails() {
        let remote = FakeRemote::new();
        let batch = records(json!([{"type": "task", "title": "Floating"}]));

        let ledger = run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert!(remote.calls().is_empty());
        assert!(ledger.failed[0].reason.starts_with("no task list reference"));
    }

    #[tokio::test]
    async fn test_parentless_policy_sends_orphans() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "task", "title": "Lost", "task_list_name": "Sprint 9"},
        ]));
        let options = ImportOptions {
            orphan_policy: OrphanPolicy::Parentless,
            ..ImportOptions::default()
        };

        let ledger = run_import(&remote, &linked(), &batch, &options, &NoopProgress).await;

        assert_eq!(
            remote.calls(),
            vec![Call::Post(TASKS.to_string(), json!({"title": "Lost"}))]
        );
        assert_eq!(ledger.created.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_parent_id_is_used_directly() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "task", "title": "Pinned", "task_list_id": "15", "task_list_name": "Ignored"},
        ]));

        run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert_eq!(
            remote.calls(),
            vec![Call::Post(
                TASKS.to_string(),
                json!({"title": "Pinned", "task_list_id": 15})
            )]
        );
    }

    #[tokio::test]
    async fn test_existing_parents_enable_remote_lookup() {
        let remote = FakeRemote::new().with_listing(
            LISTS,
            json!([{"id": 5, "title": "Existing"}, {"id": 77, "title": "Remote list"}]),
        );
        let batch = records(json!([
            {"type": "tasklist", "id": 5, "title": "Existing"},
            {"type": "task", "title": "T", "task_list_name": "remote list"},
            {"type": "task", "title": "U", "task_list_name": "REMOTE LIST"},
        ]));

        let ledger = run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        let calls = remote.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(&calls[0], Call::Put(url, _) if url == &format!("{LISTS}/5")));
        assert_eq!(calls[1], Call::Get(LISTS.to_string()));
        assert_eq!(calls[2].payload().unwrap()["task_list_id"], json!(77));
        assert_eq!(calls[3].payload().unwrap()["task_list_id"], json!(77));
        assert_eq!(ledger.updated.len(), 1);
        assert_eq!(ledger.created.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_uses_configured_page_size() {
        let remote = FakeRemote::new().with_listing(LISTS, json!([{"id": 77, "title": "Remote list"}]));
        let batch = records(json!([
            {"type": "task", "title": "T", "task_list_name": "Remote list"},
        ]));
        let options = ImportOptions {
            parent_lookup: ParentLookup::Always,
            page_size: 25,
            ..ImportOptions::default()
        };

        let ledger = run_import(&remote, &linked(), &batch, &options, &NoopProgress).await;

        let queries = remote.queries();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains(&("per_page".to_string(), "25".to_string())));
        assert_eq!(ledger.created.len(), 1);
    }

    #[tokio::test]
    async fn test_test_mode_never_looks_up_parents() {
        let remote = FakeRemote::new().with_listing(
            LISTS,
            json!([
                {"id": 5, "title": "L1"}, {"id": 6, "title": "L2"}, {"id": 7, "title": "L3"},
                {"id": 8, "title": "L4"}, {"id": 9, "title": "L5"}
            ]),
        );
        let mut rows: Vec<Value> = (1..=5)
            .map(|n| json!({"type": "tasklist", "id": n + 4, "title": format!("L{n}")}))
            .collect();
        rows.extend((1..=5).map(|n| json!({"type": "task", "title": format!("T{n}"), "task_list_name": "L2"})));
        let batch = records(Value::Array(rows));
        let options = ImportOptions {
            test_mode: true,
            ..ImportOptions::default()
        };

        let ledger = run_import(&remote, &linked(), &batch, &options, &NoopProgress).await;

        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Put(url, _) if url == &format!("{LISTS}/5")));
        assert!(remote.queries().is_empty());
        assert_eq!(ledger.updated.len(), 1);
        assert_eq!(ledger.failed.len(), 1);
        assert!(ledger.failed[0].reason.contains("L2"));
    }

    #[tokio::test]
    async fn test_lookup_never_keeps_unmatched_children_failed() {
        let remote = FakeRemote::new().with_listing(LISTS, json!([{"id": 77, "title": "Remote list"}]));
        let batch = records(json!([
            {"type": "tasklist", "id": 5, "title": "Existing"},
            {"type": "task", "title": "T", "task_list_name": "Remote list"},
        ]));
        let options = ImportOptions {
            parent_lookup: ParentLookup::Never,
            ..ImportOptions::default()
        };

        let ledger = run_import(&remote, &linked(), &batch, &options, &NoopProgress).await;

        assert_eq!(remote.calls().len(), 1);
        assert_eq!(ledger.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_control_fields_never_reach_remote() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "tasklist", "title": "L", "task_list_name": ""},
            {"Type": "task", "title": "T", "task_list_name": "L", "estimate": 3},
        ]));

        run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        for call in remote.calls() {
            let payload = call.payload().unwrap().as_object().unwrap();
            assert!(!payload.keys().any(|k| k.eq_ignore_ascii_case("type")));
            assert!(!payload.contains_key("task_list_name"));
        }
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "milestone", "title": "M1"},
            {"title": "No type"},
        ]));

        let ledger = run_import(&remote, &linked(), &batch, &ImportOptions::default(), &NoopProgress).await;

        assert!(remote.calls().is_empty());
        assert_eq!(ledger.failed.len(), 2);
        assert!(ledger.errors()[0].contains("unknown type 'milestone'"));
    }

    #[tokio::test]
    async fn test_test_mode_processes_first_record_of_each_phase() {
        let remote = FakeRemote::new();
        let batch = records(json!([
            {"type": "tasklist", "title": "L1"},
            {"type": "tasklist", "title": "L2"},
            {"type": "tasklist", "title": "L3"},
            {"type": "task", "title": "T1", "task_list_name": "L1"},
            {"type": "task", "title": "T2", "task_list_name": "L2"},
            {"type": "task", "title": "T3", "task_list_name": "L3"},
        ]));
        let options = ImportOptions {
            test_mode: true,
            ..ImportOptions::default()
        };

        let ledger = run_import(&remote, &linked(), &batch, &options, &NoopProgress).await;

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].payload().unwrap()["title"], json!("L1"));
        assert_eq!(calls[1].payload().unwrap()["title"], json!("T1"));
        assert_eq!(ledger.created.len(), 2);
    }

    #[tokio::test]
    async fn test_test_mode_flat_sends_one_record() {
        let remote = FakeRemote::new();
        let batch = records(json!([{"title": "A"}, {"title": "B"}]));
        let options = ImportOptions {
            test_mode: true,
            ..ImportOptions::default()
        };

        run_import(&remote, &projects(), &batch, &options, &NoopProgress).await;

        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_calls() {
        let remote = FakeRemote::new();
        let batch = records(json!([{"title": "A"}, {"title": "B"}, {"title": "C"}]));
        let options = ImportOptions {
            delay: Duration::from_millis(100),
            ..ImportOptions::default()
        };

        let start = tokio::time::Instant::now();
        run_import(&remote, &projects(), &batch, &options, &NoopProgress).await;

        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(remote.calls().len(), 3);
    }
}
