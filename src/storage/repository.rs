use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

/// Returns whether a value was stored under `key`.
pub fn unset_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(n > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Import runs ────────────────────────────────────────────────────

/// One row of the import history.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRun {
    pub id: i64,
    pub batch_kind: String,
    pub collection: String,
    pub mode: String,
    pub test_mode: bool,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub created_count: u64,
    pub updated_count: u64,
    pub skipped_count: u64,
    pub failed_count: u64,
    pub error_summary: Option<String>,
}

/// Final tallies written when a run completes.
#[derive(Debug, Clone, Default)]
pub struct RunCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub fn insert_import_run(
    conn: &Connection,
    batch_kind: &str,
    collection: &str,
    mode: &str,
    test_mode: bool,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO import_runs (batch_kind, collection, mode, test_mode, status, started_at)
         VALUES (?1, ?2, ?3, ?4, 'running', datetime('now'))",
        params![batch_kind, collection, mode, test_mode],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_import_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    counts: &RunCounts,
    error_summary: Option<&str>,
    ledger_json: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE import_runs SET
            status = ?2, completed_at = datetime('now'),
            created_count = ?3, updated_count = ?4,
            skipped_count = ?5, failed_count = ?6,
            error_summary = ?7, ledger_json = ?8
         WHERE id = ?1",
        params![
            run_id,
            status,
            counts.created as i64,
            counts.updated as i64,
            counts.skipped as i64,
            counts.failed as i64,
            error_summary,
            ledger_json,
        ],
    )?;
    Ok(())
}

const RUN_COLUMNS: &str = "id, batch_kind, collection, mode, test_mode, status, started_at,
     completed_at, created_count, updated_count, skipped_count, failed_count, error_summary";

fn run_from_row(row: &rusqlite::Row<'_>) -> Result<ImportRun, rusqlite::Error> {
    Ok(ImportRun {
        id: row.get(0)?,
        batch_kind: row.get(1)?,
        collection: row.get(2)?,
        mode: row.get(3)?,
        test_mode: row.get(4)?,
        status: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        created_count: row.get::<_, i64>(8)? as u64,
        updated_count: row.get::<_, i64>(9)? as u64,
        skipped_count: row.get::<_, i64>(10)? as u64,
        failed_count: row.get::<_, i64>(11)? as u64,
        error_summary: row.get(12)?,
    })
}

/// Most recent runs first.
pub fn list_import_runs(conn: &Connection, limit: u32) -> Result<Vec<ImportRun>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM import_runs ORDER BY id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], run_from_row)?;
    rows.collect()
}

pub fn get_import_run(conn: &Connection, run_id: i64) -> Result<Option<ImportRun>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {RUN_COLUMNS} FROM import_runs WHERE id = ?1"),
        params![run_id],
        run_from_row,
    )
    .optional()
}

/// The stored result document of a run, if it finished.
pub fn get_import_ledger(conn: &Connection, run_id: i64) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT ledger_json FROM import_runs WHERE id = ?1",
        params![run_id],
        |row| row.get(0),
    )
    .optional()
    .map(Option::flatten)
}
