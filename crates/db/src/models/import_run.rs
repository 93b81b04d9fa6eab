//! Import run model.

use accesslog_core::import_status::RunStatus;
use accesslog_core::outcome::ImportRunSummary;
use accesslog_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `import_runs` table joined with its status name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImportRun {
    pub id: DbId,
    pub status_id: DbId,
    pub status: String,
    pub source_file_name: String,
    pub initiator: String,
    pub total_rows: i32,
    pub imported_rows: i32,
    pub duplicate_rows: i32,
    pub error_rows: i32,
    pub success_rate: f64,
    pub failure_reason: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ImportRun {
    pub fn run_status(&self) -> Option<RunStatus> {
        RunStatus::from_str(&self.status)
    }
}

/// DTO for recording a finished run.
#[derive(Debug, Clone)]
pub struct CreateImportRun {
    pub status: RunStatus,
    pub source_file_name: String,
    pub initiator: String,
    pub total_rows: i32,
    pub imported_rows: i32,
    pub duplicate_rows: i32,
    pub error_rows: i32,
    pub success_rate: f64,
    pub failure_reason: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl From<&ImportRunSummary> for CreateImportRun {
    fn from(summary: &ImportRunSummary) -> Self {
        Self {
            status: summary.status,
            source_file_name: summary.source_file_name.clone(),
            initiator: summary.initiator.clone(),
            total_rows: count(summary.total_rows),
            imported_rows: count(summary.imported_rows),
            duplicate_rows: count(summary.duplicate_rows),
            error_rows: count(summary.error_rows),
            success_rate: summary.success_rate,
            failure_reason: summary.failure_reason.clone(),
            started_at: summary.started_at,
            finished_at: summary.finished_at,
        }
    }
}

/// History listing filter. Bounds are inclusive on `started_at`.
#[derive(Debug, Clone, Default)]
pub struct ImportRunFilter {
    pub started_from: Option<Timestamp>,
    pub started_to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
