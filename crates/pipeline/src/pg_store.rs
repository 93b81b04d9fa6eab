//! Postgres-backed [`EventStore`].

use std::collections::HashSet;

use accesslog_core::dedup::DedupKey;
use accesslog_core::normalize::NormalizedAccessEvent;
use accesslog_core::outcome::{DuplicateRecord, ImportRunSummary, RowError};
use accesslog_core::types::DbId;
use accesslog_db::models::import_run::CreateImportRun;
use accesslog_db::models::import_run_row::CreateImportRunRow;
use accesslog_db::repositories::{AccessEventRepo, ImportRunRepo, ImportRunRowRepo};
use accesslog_db::DbPool;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Postgres, Transaction};

use crate::store::{ChunkOutcome, EventStore, EventTransaction, StoreError};

/// Map a sqlx error onto the pipeline's storage error kinds.
pub fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}

/// Event store over a Postgres pool.
#[derive(Clone)]
pub struct PgEventStore {
    pool: DbPool,
    serialize_runs: bool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            serialize_runs: false,
        }
    }

    /// Serialize runs with a transaction-scoped advisory lock.
    pub fn serialize_runs(mut self, enabled: bool) -> Self {
        self.serialize_runs = enabled;
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn load_dedup_keys(&self, since: Option<NaiveDate>) -> Result<Vec<DedupKey>, StoreError> {
        AccessEventRepo::load_keys_since(&self.pool, since)
            .await
            .map_err(classify)
    }

    async fn begin(&self) -> Result<Box<dyn EventTransaction>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        if self.serialize_runs {
            AccessEventRepo::lock_for_import(&mut tx).await.map_err(classify)?;
            tracing::debug!("Import lock acquired");
        }
        Ok(Box::new(PgEventTransaction { tx }))
    }

    async fn record_run(
        &self,
        summary: &ImportRunSummary,
        duplicates: &[DuplicateRecord],
        errors: &[RowError],
    ) -> Result<DbId, StoreError> {
        let rows: Vec<CreateImportRunRow> = duplicates
            .iter()
            .map(CreateImportRunRow::from)
            .chain(errors.iter().map(CreateImportRunRow::from))
            .collect();

        let mut tx = self.pool.begin().await.map_err(classify)?;
        let run = ImportRunRepo::create(&mut tx, &CreateImportRun::from(summary))
            .await
            .map_err(classify)?;
        let written = ImportRunRowRepo::create_batch(&mut tx, run.id, &rows)
            .await
            .map_err(classify)?;
        tx.commit().await.map_err(classify)?;

        tracing::debug!(run_id = run.id, rows = written, "Import run rows stored");
        Ok(run.id)
    }
}

struct PgEventTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EventTransaction for PgEventTransaction {
    async fn insert_chunk(
        &mut self,
        events: &[NormalizedAccessEvent],
    ) -> Result<ChunkOutcome, StoreError> {
        let inserted = AccessEventRepo::insert_chunk(&mut self.tx, events)
            .await
            .map_err(classify)?;

        let written: HashSet<&DedupKey> = inserted.iter().collect();
        let conflicts = events
            .iter()
            .map(NormalizedAccessEvent::key)
            .filter(|key| !written.contains(key))
            .collect();

        Ok(ChunkOutcome {
            inserted: inserted.len(),
            conflicts,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(classify)
    }
}
