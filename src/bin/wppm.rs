use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};

use wppm::config::APP_PASSWORD_ENV;
use wppm::export::{self, TableKind};
use wppm::record::batch::read_batch;
use wppm::{
    Credentials, Database, ImportKind, ImportMode, ImportOptions, NewProject, OrphanPolicy,
    Outcome, Overrides, ParentLookup, Record, RecordKind, ResultLedger, Settings, WpConsole,
};

#[derive(Parser)]
#[command(name = "wppm", about = "WordPress Project Manager console and bulk importer")]
struct Cli {
    /// Database path (default: ~/.wppm/wppm.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// WordPress site root (overrides WP_SITE_URL and stored site_url)
    #[arg(long)]
    site_url: Option<String>,

    /// WordPress user name (overrides WP_USERNAME and stored username)
    #[arg(long)]
    username: Option<String>,

    /// Application password; never stored
    #[arg(long, env = APP_PASSWORD_ENV, hide_env_values = true)]
    app_password: Option<String>,

    /// REST namespace of the Project Manager plugin
    #[arg(long)]
    namespace: Option<String>,

    /// Records per page when listing
    #[arg(long)]
    page_size: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl wppm::ImportProgress for StderrProgress {
    fn on_phase_start(&self, kind: RecordKind, total: usize) {
        eprintln!("Importing {total} {} record(s)...", kind.as_str());
    }

    fn on_record(
        &self,
        _kind: RecordKind,
        index: usize,
        total: usize,
        record: &Record,
        outcome: &Outcome,
    ) {
        let status = match outcome {
            Outcome::Created { id, .. } => format!("created #{}", id.as_deref().unwrap_or("?")),
            Outcome::Updated { id, .. } => format!("updated #{id}"),
            Outcome::Skipped(reason) => format!("skipped ({reason})"),
            Outcome::Failed(reason) => format!("FAILED: {reason}"),
        };
        eprintln!("  [{}/{}] {} {status}", index + 1, total, record.label());
    }

    fn on_complete(&self, ledger: &ResultLedger) {
        eprintln!("Done: {}", ledger.summary());
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// List task lists of a project
    TaskLists {
        /// Project id or Project Manager URL
        project: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List tasks of a project
    Tasks {
        /// Project id or Project Manager URL
        project: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List content types of the site
    Types {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List items of a content type
    Posts {
        /// Content type slug (e.g. post, page, book)
        post_type: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Bulk import a JSON, CSV or TSV batch
    Import(ImportArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show recent import runs
    History {
        /// Maximum runs shown
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Print the stored result document of one run
        #[arg(long, value_name = "RUN_ID")]
        show: Option<i64>,
    },
    /// Show configuration and the last import run
    Status,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Write to a file instead (.csv for CSV, anything else JSON)
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// List all projects
    List {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show one project
    Get {
        /// Project id or Project Manager URL
        project: String,
    },
    /// Create a project
    Create {
        #[arg(long)]
        title: String,
        /// incomplete, active, pending, completed or archived
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Update fields of a project
    Update {
        /// Project id or Project Manager URL
        project: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project
    Delete {
        /// Project id or Project Manager URL
        project: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Copy a project as "<title> (Copy)"
    Clone {
        /// Project id or Project Manager URL
        project: String,
    },
    /// Create one project from an exported project JSON document
    ImportDoc {
        file: PathBuf,
    },
    /// Task and file totals across all projects
    Totals {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Remove a config value
    Unset { key: String },
    /// List every setting with its stored value
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Projects,
    Tasklists,
    Tasks,
    /// Mixed task lists and tasks, linked by task_list_name
    Linked,
    /// Items of a content type (--post-type)
    Content,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Create,
    Update,
    Smart,
}

impl From<ModeArg> for ImportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => ImportMode::CreateOnly,
            ModeArg::Update => ImportMode::UpdateOnly,
            ModeArg::Smart => ImportMode::Smart,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OrphanArg {
    Fail,
    Parentless,
}

#[derive(Clone, Copy, ValueEnum)]
enum LookupArg {
    Never,
    /// Only when the batch updates existing task lists
    Auto,
    Always,
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Batch file (.json, .csv, .tsv)
    file: PathBuf,
    /// What the batch contains
    #[arg(long, value_enum)]
    kind: KindArg,
    /// Project id or URL (task lists, tasks, linked)
    #[arg(long)]
    project: Option<String>,
    /// Content type slug (content)
    #[arg(long)]
    post_type: Option<String>,
    #[arg(long, value_enum, default_value = "smart")]
    mode: ModeArg,
    /// Process only the first record of each phase
    #[arg(long)]
    test: bool,
    /// Pause between calls in milliseconds (overrides import_delay_ms)
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Comma-separated field allow-list
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
    /// Send empty values instead of dropping them
    #[arg(long)]
    keep_empty: bool,
    /// What to do with tasks whose task list cannot be resolved
    #[arg(long, value_enum, default_value = "fail")]
    orphans: OrphanArg,
    /// When to look up unknown task list names on the site
    #[arg(long, value_enum, default_value = "auto")]
    lookup: LookupArg,
    /// Write the result document to a file
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };

    let overrides = Overrides {
        site_url: cli.site_url.clone(),
        username: cli.username.clone(),
        api_namespace: cli.namespace.clone(),
        page_size: cli.page_size,
        request_timeout_secs: cli.timeout,
        import_delay_ms: match &cli.command {
            Commands::Import(args) => args.delay_ms,
            _ => None,
        },
    };

    match cli.command {
        Commands::Config { action } => handle_config(&db, action).await?,
        Commands::History { limit, show } => handle_history(&db, limit, show).await?,
        Commands::Status => print_status(&db, &overrides, cli.app_password.is_some()).await?,
        command => {
            let stored = wppm::stored_config(&db).await?;
            let settings = Settings::from_env(&overrides, &stored)?;
            let credentials = match (&settings.username, &cli.app_password) {
                (Some(user), Some(password)) => Some(Credentials::new(user, password)),
                (None, Some(_)) => anyhow::bail!(
                    "an application password needs a username (--username or config set username)"
                ),
                _ => None,
            };
            let console = WpConsole::connect(db, settings, credentials.as_ref())?;
            run_remote(&console, command).await?;
        }
    }

    Ok(())
}

async fn run_remote(console: &WpConsole, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Projects { action } => handle_projects(console, action).await?,
        Commands::TaskLists { project, output } => {
            let id = wppm::resolve_project_id(&project)?;
            let items = console.list_task_lists(&id).await?;
            emit(TableKind::TaskLists, &items, &output)?;
        }
        Commands::Tasks { project, output } => {
            let id = wppm::resolve_project_id(&project)?;
            let items = console.list_tasks(&id).await?;
            emit(TableKind::Tasks, &items, &output)?;
        }
        Commands::Types { json } => {
            let types = console.post_types().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&types)?);
            } else if types.is_empty() {
                println!("No content types found.");
            } else {
                for t in types {
                    println!("{:<24} {:<24} /wp/v2/{}", t.slug, t.name, t.rest_base);
                }
            }
        }
        Commands::Posts { post_type, output } => {
            let rest_base = console.rest_base_for(&post_type).await?;
            let items = console.list_posts(&rest_base).await?;
            emit(TableKind::Posts, &items, &output)?;
        }
        Commands::Import(args) => handle_import(console, args).await?,
        Commands::Config { .. } | Commands::History { .. } | Commands::Status => {
            anyhow::bail!("command runs without a site connection")
        }
    }
    Ok(())
}

async fn handle_projects(console: &WpConsole, action: ProjectAction) -> anyhow::Result<()> {
    match action {
        ProjectAction::List { output } => {
            let items = console.list_projects().await?;
            emit(TableKind::Projects, &items, &output)?;
        }
        ProjectAction::Get { project } => {
            let id = wppm::resolve_project_id(&project)?;
            let item = console.get_project(&id).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        ProjectAction::Create {
            title,
            status,
            description,
        } => {
            let created = console
                .create_project(NewProject {
                    title,
                    status,
                    description,
                })
                .await?;
            print_created("Created project", &created);
        }
        ProjectAction::Update {
            project,
            title,
            status,
            description,
        } => {
            let id = wppm::resolve_project_id(&project)?;
            let mut fields = Map::new();
            if let Some(title) = title {
                fields.insert("title".into(), Value::String(title));
            }
            if let Some(status) = status {
                fields.insert("status".into(), Value::String(status));
            }
            if let Some(description) = description {
                fields.insert("description".into(), Value::String(description));
            }
            if fields.is_empty() {
                anyhow::bail!("nothing to update; pass --title, --status or --description");
            }
            console.update_project(&id, fields).await?;
            println!("Updated project {id}.");
        }
        ProjectAction::Delete { project, yes } => {
            let id = wppm::resolve_project_id(&project)?;
            if !yes {
                anyhow::bail!("refusing to delete project {id} without --yes");
            }
            console.delete_project(&id).await?;
            println!("Deleted project {id}.");
        }
        ProjectAction::Clone { project } => {
            let id = wppm::resolve_project_id(&project)?;
            let created = console.clone_project(&id).await?;
            print_created("Cloned project", &created);
        }
        ProjectAction::ImportDoc { file } => {
            let text = std::fs::read_to_string(&file)?;
            let document: Value = serde_json::from_str(&text)?;
            let created = console.import_project_document(&document).await?;
            print_created("Imported project", &created);
        }
        ProjectAction::Totals { json } => {
            let totals = console.project_totals().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
            } else {
                println!("Project totals");
                println!("  Task lists: {}", totals.total_task_lists);
                println!("  Tasks:      {}", totals.total_tasks);
                println!("  Complete:   {}", totals.total_complete_tasks);
                println!("  Incomplete: {}", totals.total_incomplete_tasks);
                println!("  Files:      {}", totals.total_files);
            }
        }
    }
    Ok(())
}

async fn handle_import(console: &WpConsole, args: ImportArgs) -> anyhow::Result<()> {
    let project = || -> anyhow::Result<String> {
        let raw = args
            .project
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--project is required for this kind"))?;
        Ok(wppm::resolve_project_id(raw)?)
    };
    let kind = match args.kind {
        KindArg::Projects => ImportKind::Projects,
        KindArg::Tasklists => ImportKind::TaskLists { project_id: project()? },
        KindArg::Tasks => ImportKind::Tasks { project_id: project()? },
        KindArg::Linked => ImportKind::TaskListsWithTasks { project_id: project()? },
        KindArg::Content => {
            let slug = args
                .post_type
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--post-type is required for content"))?;
            ImportKind::Content {
                rest_base: console.rest_base_for(slug).await?,
            }
        }
    };

    let batch = read_batch(&args.file)?;
    if batch.is_empty() {
        println!("{} holds no records.", args.file.display());
        return Ok(());
    }

    let options = ImportOptions {
        mode: args.mode.into(),
        test_mode: args.test,
        allowed_fields: args
            .fields
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect(),
        skip_empty: !args.keep_empty,
        orphan_policy: match args.orphans {
            OrphanArg::Fail => OrphanPolicy::Fail,
            OrphanArg::Parentless => OrphanPolicy::Parentless,
        },
        parent_lookup: match args.lookup {
            LookupArg::Never => ParentLookup::Never,
            LookupArg::Auto => ParentLookup::WhenBatchHasExisting,
            LookupArg::Always => ParentLookup::Always,
        },
        delay: console.settings().import_delay,
        page_size: console.settings().page_size,
    };

    let report = console.import(&kind, &batch, &options, &StderrProgress).await?;
    let document = report.ledger.to_document();
    match &args.out {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&document)?)?;
            println!("Result written to {}", path.display());
        }
        None => {
            for error in report.ledger.errors() {
                println!("  error: {error}");
            }
        }
    }
    println!(
        "Import run {} ({}): {}",
        report.run_id,
        report.status.as_str(),
        report.ledger.summary()
    );
    if report.test_mode {
        println!("Test mode: only the first record of each phase was sent.");
    }
    Ok(())
}

async fn handle_config(db: &Database, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match wppm::get_config(db, &key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            let stored = wppm::set_config(db, &key, &value).await?;
            println!("{key} = {stored}");
        }
        ConfigAction::Unset { key } => {
            if wppm::unset_config(db, &key).await? {
                println!("Removed {key}.");
            } else {
                println!("{key} is not set");
            }
        }
        ConfigAction::List => {
            let items = wppm::stored_config(db).await?;
            for key in wppm::config::KEYS {
                let value = items.get(key.name).map(String::as_str).unwrap_or("(not set)");
                println!("{:<22} {value:<32} {} [{}]", key.name, key.help, key.env);
            }
        }
    }
    Ok(())
}

async fn handle_history(db: &Database, limit: u32, show: Option<i64>) -> anyhow::Result<()> {
    if let Some(run_id) = show {
        let run = wppm::import_run(db, run_id).await?;
        eprintln!(
            "Run {} ({} {}{}) {} at {}",
            run.id,
            run.batch_kind,
            run.mode,
            if run.test_mode { ", test" } else { "" },
            run.status,
            run.completed_at.as_deref().unwrap_or(&run.started_at)
        );
        let document = wppm::import_document(db, run_id).await?;
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }
    let runs = wppm::import_history(db, limit).await?;
    if runs.is_empty() {
        println!("No import runs yet.");
        return Ok(());
    }
    println!(
        "{:>5}  {:<19}  {:<14}  {:<6}  {:<15}  {:>7} {:>7} {:>7} {:>6}",
        "RUN", "STARTED", "KIND", "MODE", "STATUS", "CREATED", "UPDATED", "SKIPPED", "FAILED"
    );
    for run in runs {
        let mode = if run.test_mode {
            format!("{}*", run.mode)
        } else {
            run.mode.clone()
        };
        println!(
            "{:>5}  {:<19}  {:<14}  {:<6}  {:<15}  {:>7} {:>7} {:>7} {:>6}",
            run.id,
            run.started_at,
            run.batch_kind,
            mode,
            run.status,
            run.created_count,
            run.updated_count,
            run.skipped_count,
            run.failed_count
        );
    }
    Ok(())
}

async fn print_status(db: &Database, overrides: &Overrides, has_password: bool) -> anyhow::Result<()> {
    let stored = wppm::stored_config(db).await?;
    let settings = Settings::from_env(overrides, &stored)?;
    let last = wppm::import_history(db, 1).await?;

    println!("Console Status");
    println!(
        "  Site:       {}",
        settings.site_url.as_deref().unwrap_or("(not set)")
    );
    println!("  Namespace:  {}", settings.api_namespace);
    println!(
        "  User:       {}",
        settings.username.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Password:   {}",
        if has_password {
            "provided".to_string()
        } else {
            format!("missing ({APP_PASSWORD_ENV})")
        }
    );
    println!("  Page size:  {}", settings.page_size);
    println!("  Timeout:    {}s", settings.request_timeout.as_secs());
    println!("  Delay:      {}ms", settings.import_delay.as_millis());
    match last.first() {
        Some(run) => println!(
            "  Last import: run {} {} ({}), {} created, {} updated, {} failed",
            run.id,
            run.started_at,
            run.status,
            run.created_count,
            run.updated_count,
            run.failed_count
        ),
        None => println!("  Last import: never"),
    }
    Ok(())
}

fn print_created(prefix: &str, created: &Value) {
    match wppm::client::extract_id(created) {
        Some(id) => println!("{prefix}: #{id}"),
        None => println!("{prefix}."),
    }
}

/// Print a listing as a table or JSON, or write it to `--out`.
fn emit(kind: TableKind, items: &[Value], output: &OutputArgs) -> anyhow::Result<()> {
    if let Some(path) = &output.out {
        export::write_export(path, kind, items)?;
        println!("Wrote {} record(s) to {}", items.len(), path.display());
        return Ok(());
    }
    if output.json {
        println!("{}", export::to_json(items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("No records found.");
        return Ok(());
    }
    print_table(kind, items);
    Ok(())
}

const MAX_CELL: usize = 40;

fn print_table(kind: TableKind, items: &[Value]) {
    let headers = kind.headers();
    let rows: Vec<Vec<String>> = items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| {
            kind.row(item)
                .into_iter()
                .map(|cell| {
                    let cell = cell.replace(['\n', '\r'], " ");
                    if cell.chars().count() > MAX_CELL {
                        let cut: String = cell.chars().take(MAX_CELL - 3).collect();
                        format!("{cut}...")
                    } else {
                        cell
                    }
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(headers.to_vec()));
    for row in &rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
    println!("\n{} record(s)", rows.len());
}
