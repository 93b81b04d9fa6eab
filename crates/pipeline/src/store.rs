//! Storage seam between the pipeline and the event store.
//!
//! The pipeline only needs three things from storage: the keys already
//! persisted, one transaction to write accepted events into, and a place
//! to record the run summary. Postgres implements this in
//! [`crate::pg_store`]; [`crate::memory`] keeps everything in process.

use accesslog_core::dedup::DedupKey;
use accesslog_core::normalize::NormalizedAccessEvent;
use accesslog_core::outcome::{DuplicateRecord, ImportRunSummary, RowError};
use accesslog_core::types::DbId;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Storage failures seen by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result of writing one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Rows written by this chunk.
    pub inserted: usize,
    /// Keys the store already held when the chunk was written, typically
    /// because a concurrent run committed them first.
    pub conflicts: Vec<DedupKey>,
}

/// Persistent access-event store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Keys of every event on or after `since`; the whole store for `None`.
    async fn load_dedup_keys(&self, since: Option<NaiveDate>) -> Result<Vec<DedupKey>, StoreError>;

    /// Open the single transaction a run writes its events into.
    async fn begin(&self) -> Result<Box<dyn EventTransaction>, StoreError>;

    /// Persist the run summary and the given rows, returning the run id.
    async fn record_run(
        &self,
        summary: &ImportRunSummary,
        duplicates: &[DuplicateRecord],
        errors: &[RowError],
    ) -> Result<DbId, StoreError>;
}

/// An open write transaction. Dropping it without commit discards it.
#[async_trait]
pub trait EventTransaction: Send {
    async fn insert_chunk(
        &mut self,
        events: &[NormalizedAccessEvent],
    ) -> Result<ChunkOutcome, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
