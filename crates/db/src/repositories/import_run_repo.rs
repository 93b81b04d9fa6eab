//! Repository for the `import_runs` table.

use accesslog_core::paging::{clamp_limit, clamp_offset, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use accesslog_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::import_run::{CreateImportRun, ImportRun, ImportRunFilter};

/// Column list for import_runs queries, aliased `r` and joined with its
/// status as `s`.
const COLUMNS: &str = "r.id, r.status_id, s.name AS status, r.source_file_name, r.initiator, \
    r.total_rows, r.imported_rows, r.duplicate_rows, r.error_rows, r.success_rate, \
    r.failure_reason, r.started_at, r.finished_at, r.created_at, r.updated_at";

const FROM: &str = "import_runs r JOIN import_run_statuses s ON s.id = r.status_id";

/// Records finished runs and serves the import history.
pub struct ImportRunRepo;

impl ImportRunRepo {
    /// Record a finished run, returning the created row.
    ///
    /// The status id is looked up by name.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateImportRun,
    ) -> Result<ImportRun, sqlx::Error> {
        let query = format!(
            "WITH r AS (
                INSERT INTO import_runs
                    (status_id, source_file_name, initiator, total_rows, imported_rows,
                     duplicate_rows, error_rows, success_rate, failure_reason,
                     started_at, finished_at)
                VALUES (
                    (SELECT id FROM import_run_statuses WHERE name = $1),
                    $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
                )
                RETURNING *
             )
             SELECT {COLUMNS} FROM r JOIN import_run_statuses s ON s.id = r.status_id"
        );
        sqlx::query_as::<_, ImportRun>(&query)
            .bind(input.status.as_str())
            .bind(&input.source_file_name)
            .bind(&input.initiator)
            .bind(input.total_rows)
            .bind(input.imported_rows)
            .bind(input.duplicate_rows)
            .bind(input.error_rows)
            .bind(input.success_rate)
            .bind(&input.failure_reason)
            .bind(input.started_at)
            .bind(input.finished_at)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find a run by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImportRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE r.id = $1");
        sqlx::query_as::<_, ImportRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List runs newest first, optionally bounded by start time.
    pub async fn list(
        pool: &PgPool,
        filter: &ImportRunFilter,
    ) -> Result<Vec<ImportRun>, sqlx::Error> {
        let limit = clamp_limit(filter.limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
        let offset = clamp_offset(filter.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM {FROM}
             WHERE ($1::timestamptz IS NULL OR r.started_at >= $1)
               AND ($2::timestamptz IS NULL OR r.started_at <= $2)
             ORDER BY r.started_at DESC, r.id DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, ImportRun>(&query)
            .bind(filter.started_from)
            .bind(filter.started_to)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count runs matching the filter's date range.
    pub async fn count(pool: &PgPool, filter: &ImportRunFilter) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM import_runs
             WHERE ($1::timestamptz IS NULL OR started_at >= $1)
               AND ($2::timestamptz IS NULL OR started_at <= $2)",
        )
        .bind(filter.started_from)
        .bind(filter.started_to)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
