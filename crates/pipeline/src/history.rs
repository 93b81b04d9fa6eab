//! Import history queries.

use accesslog_core::types::DbId;
use accesslog_db::models::import_run::{ImportRun, ImportRunFilter};
use accesslog_db::models::import_run_row::ImportRunRow;
use accesslog_db::repositories::{ImportRunRepo, ImportRunRowRepo};
use accesslog_db::DbPool;
use serde::Serialize;

/// One page of the history listing.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub runs: Vec<ImportRun>,
    pub total: i64,
}

/// A run with its persisted duplicate and error rows.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub run: ImportRun,
    pub rows: Vec<ImportRunRow>,
}

/// List runs newest first, with the total matching `filter`.
pub async fn list_runs(pool: &DbPool, filter: &ImportRunFilter) -> Result<HistoryPage, sqlx::Error> {
    let runs = ImportRunRepo::list(pool, filter).await?;
    let total = ImportRunRepo::count(pool, filter).await?;
    Ok(HistoryPage { runs, total })
}

/// Fetch a run and its rows in file order.
pub async fn run_detail(pool: &DbPool, run_id: DbId) -> Result<Option<RunDetail>, sqlx::Error> {
    let Some(run) = ImportRunRepo::find_by_id(pool, run_id).await? else {
        return Ok(None);
    };
    let rows = ImportRunRowRepo::list_by_run(pool, run_id, None).await?;
    Ok(Some(RunDetail { run, rows }))
}
