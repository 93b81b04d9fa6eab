//! Repository for the `access_events` table.

use accesslog_core::batch_sql::BatchInsert;
use accesslog_core::dedup::DedupKey;
use accesslog_core::normalize::NormalizedAccessEvent;
use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};

use crate::models::access_event::{AccessEvent, AccessEventKey};

/// Column list for access_events queries.
const COLUMNS: &str = "id, badge_number, event_date, event_time, event_type, controller, \
    reader, last_name, first_name, status, group_name, validity_start_date, \
    badge_created_on, created_at, updated_at";

/// Dedup key columns, matching `uq_access_events_key`.
pub const KEY_COLUMNS: &[&str] = &["badge_number", "event_date", "event_time", "event_type"];

/// Columns written by [`AccessEventRepo::insert_chunk`], in bind order.
pub const INSERT_COLUMNS: &[&str] = &[
    "badge_number",
    "event_date",
    "event_time",
    "event_type",
    "controller",
    "reader",
    "last_name",
    "first_name",
    "status",
    "group_name",
    "validity_start_date",
    "badge_created_on",
];

/// Advisory lock key taken by imports that serialize against each other.
pub const IMPORT_LOCK_KEY: i64 = 0x6163_6365_7373; // "access"

/// Batch insert that skips existing keys and reports the ones it wrote.
pub fn insert_statement() -> BatchInsert {
    BatchInsert::new("access_events", INSERT_COLUMNS)
        .on_conflict_do_nothing(KEY_COLUMNS)
        .returning(KEY_COLUMNS)
}

/// Provides access to stored access events.
pub struct AccessEventRepo;

impl AccessEventRepo {
    /// Load the dedup keys of every event on or after `since`
    /// (every event when `since` is `None`).
    pub async fn load_keys_since(
        pool: &PgPool,
        since: Option<NaiveDate>,
    ) -> Result<Vec<DedupKey>, sqlx::Error> {
        let rows: Vec<AccessEventKey> = sqlx::query_as(
            "SELECT badge_number, event_date, event_time, event_type FROM access_events
             WHERE $1::date IS NULL OR event_date >= $1",
        )
        .bind(since)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(DedupKey::from).collect())
    }

    /// Insert a chunk of events inside the caller's transaction.
    ///
    /// Rows whose key already exists are skipped by the database. Returns the
    /// keys actually inserted; a key missing from the result was written by
    /// someone else first.
    pub async fn insert_chunk(
        conn: &mut PgConnection,
        events: &[NormalizedAccessEvent],
    ) -> Result<Vec<DedupKey>, sqlx::Error> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let sql = insert_statement()
            .sql(events.len())
            .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

        let mut query = sqlx::query_as::<_, AccessEventKey>(&sql);
        for event in events {
            query = query
                .bind(&event.badge_number)
                .bind(event.event_date)
                .bind(event.event_time)
                .bind(&event.event_type)
                .bind(&event.controller)
                .bind(&event.reader)
                .bind(&event.last_name)
                .bind(&event.first_name)
                .bind(&event.status)
                .bind(&event.group_name)
                .bind(event.validity_start_date)
                .bind(event.badge_created_on);
        }

        let rows = query.fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(DedupKey::from).collect())
    }

    /// Take the transaction-scoped import lock. Released on commit or rollback.
    pub async fn lock_for_import(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(IMPORT_LOCK_KEY)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Find an event by its dedup key.
    pub async fn find_by_key(
        pool: &PgPool,
        key: &DedupKey,
    ) -> Result<Option<AccessEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM access_events
             WHERE badge_number = $1 AND event_date = $2 AND event_time = $3 AND event_type = $4"
        );
        sqlx::query_as::<_, AccessEvent>(&query)
            .bind(&key.badge_number)
            .bind(key.event_date)
            .bind(key.event_time)
            .bind(&key.event_type)
            .fetch_optional(pool)
            .await
    }

    /// List events of one badge, newest first.
    pub async fn list_by_badge(
        pool: &PgPool,
        badge_number: &str,
    ) -> Result<Vec<AccessEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM access_events
             WHERE badge_number = $1
             ORDER BY event_date DESC, event_time DESC"
        );
        sqlx::query_as::<_, AccessEvent>(&query)
            .bind(badge_number)
            .fetch_all(pool)
            .await
    }

    /// Count all stored events.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM access_events")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
