//! Repository for the `import_run_rows` table.

use accesslog_core::batch_sql::BatchInsert;
use accesslog_core::import_status::ROW_KIND_DUPLICATE;
use accesslog_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::import_run_row::{CreateImportRunRow, ImportRunRow};

/// Column list for import_run_rows queries.
const COLUMNS: &str = "id, run_id, row_number, kind, badge_number, event_date, event_time, \
    event_type, reason, raw_payload, created_at, updated_at";

const INSERT_COLUMNS: &[&str] = &[
    "run_id",
    "row_number",
    "kind",
    "badge_number",
    "event_date",
    "event_time",
    "event_type",
    "reason",
    "raw_payload",
];

/// Append-only storage of a run's duplicate and rejected rows.
pub struct ImportRunRowRepo;

impl ImportRunRowRepo {
    /// Insert `rows` for `run_id`, as many statements as the bind limit
    /// requires. Returns the number of rows written.
    pub async fn create_batch(
        conn: &mut PgConnection,
        run_id: DbId,
        rows: &[CreateImportRunRow],
    ) -> Result<u64, sqlx::Error> {
        let insert = BatchInsert::new("import_run_rows", INSERT_COLUMNS);
        let mut written = 0;

        for chunk in rows.chunks(insert.max_rows()) {
            let sql = insert
                .sql(chunk.len())
                .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;
            let mut query = sqlx::query(&sql);
            for row in chunk {
                query = query
                    .bind(run_id)
                    .bind(row.row_number)
                    .bind(row.kind)
                    .bind(&row.badge_number)
                    .bind(row.event_date)
                    .bind(row.event_time)
                    .bind(&row.event_type)
                    .bind(&row.reason)
                    .bind(&row.raw_payload);
            }
            written += query.execute(&mut *conn).await?.rows_affected();
        }

        Ok(written)
    }

    /// List a run's rows in file order, optionally of one kind.
    pub async fn list_by_run(
        pool: &PgPool,
        run_id: DbId,
        kind: Option<&str>,
    ) -> Result<Vec<ImportRunRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_run_rows
             WHERE run_id = $1 AND ($2::text IS NULL OR kind = $2)
             ORDER BY row_number ASC, id ASC"
        );
        sqlx::query_as::<_, ImportRunRow>(&query)
            .bind(run_id)
            .bind(kind)
            .fetch_all(pool)
            .await
    }

    /// List a run's duplicates in file order.
    pub async fn list_duplicates(
        pool: &PgPool,
        run_id: DbId,
    ) -> Result<Vec<ImportRunRow>, sqlx::Error> {
        Self::list_by_run(pool, run_id, Some(ROW_KIND_DUPLICATE)).await
    }

    /// Count a run's rows grouped by kind.
    ///
    /// Returns tuples of (kind, count).
    pub async fn count_by_kind(
        pool: &PgPool,
        run_id: DbId,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows: Vec<KindCount> = sqlx::query_as(
            "SELECT kind, COUNT(*) AS count FROM import_run_rows
             WHERE run_id = $1
             GROUP BY kind
             ORDER BY kind",
        )
        .bind(run_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.kind, r.count)).collect())
    }
}

/// Helper struct for the count_by_kind query.
#[derive(sqlx::FromRow)]
struct KindCount {
    kind: String,
    count: i64,
}
