//! Batch committer: writes a run's new events in one transaction.
//!
//! Events are written in fixed-size chunks. Cancellation is honoured at
//! every chunk boundary and once more before commit; any storage failure
//! or cancellation rolls the whole transaction back.

use std::collections::HashSet;

use accesslog_core::dedup::DedupKey;
use accesslog_core::normalize::NormalizedAccessEvent;
use accesslog_core::outcome::RawPayload;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::store::{EventStore, EventTransaction, StoreError};

/// An accepted, non-duplicate row headed for the store.
#[derive(Debug, Clone)]
pub struct PendingRow {
    pub line_number: usize,
    pub event: NormalizedAccessEvent,
    pub raw: RawPayload,
}

/// Why a commit did not happen.
#[derive(Debug)]
pub enum AbortReason {
    Cancelled,
    Storage(StoreError),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
pub enum CommitOutcome {
    /// The transaction committed. `conflicts` are rows the store already
    /// held by the time they were written.
    Committed {
        imported: usize,
        conflicts: Vec<PendingRow>,
    },
    /// The transaction was rolled back; every row is handed back.
    Aborted {
        reason: AbortReason,
        rows: Vec<PendingRow>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct BatchCommitter {
    chunk_size: usize,
}

impl Default for BatchCommitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl BatchCommitter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Write `rows` through `store` in one transaction.
    pub async fn commit<S: EventStore + ?Sized>(
        &self,
        store: &S,
        rows: Vec<PendingRow>,
        cancel: &CancellationToken,
    ) -> CommitOutcome {
        if cancel.is_cancelled() {
            return CommitOutcome::Aborted {
                reason: AbortReason::Cancelled,
                rows,
            };
        }
        if rows.is_empty() {
            return CommitOutcome::Committed {
                imported: 0,
                conflicts: Vec::new(),
            };
        }

        let mut tx = match store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open import transaction");
                return CommitOutcome::Aborted {
                    reason: AbortReason::Storage(e),
                    rows,
                };
            }
        };

        let mut conflicts: HashSet<DedupKey> = HashSet::new();
        for (index, chunk) in rows.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(chunk = index, "Import cancelled, rolling back");
                rollback(tx).await;
                return CommitOutcome::Aborted {
                    reason: AbortReason::Cancelled,
                    rows,
                };
            }

            let events: Vec<NormalizedAccessEvent> = chunk.iter().map(|r| r.event.clone()).collect();
            match tx.insert_chunk(&events).await {
                Ok(outcome) => {
                    tracing::debug!(
                        chunk = index,
                        inserted = outcome.inserted,
                        conflicts = outcome.conflicts.len(),
                        "Chunk written"
                    );
                    conflicts.extend(outcome.conflicts);
                }
                Err(e) => {
                    tracing::error!(error = %e, chunk = index, "Chunk insert failed, rolling back");
                    rollback(tx).await;
                    return CommitOutcome::Aborted {
                        reason: AbortReason::Storage(e),
                        rows,
                    };
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("Import cancelled before commit, rolling back");
            rollback(tx).await;
            return CommitOutcome::Aborted {
                reason: AbortReason::Cancelled,
                rows,
            };
        }

        if let Err(e) = tx.commit().await {
            tracing::error!(error = %e, "Import commit failed");
            return CommitOutcome::Aborted {
                reason: AbortReason::Storage(e),
                rows,
            };
        }

        let (conflicting, written): (Vec<PendingRow>, Vec<PendingRow>) = rows
            .into_iter()
            .partition(|row| conflicts.contains(&row.event.key()));

        CommitOutcome::Committed {
            imported: written.len(),
            conflicts: conflicting,
        }
    }
}

async fn rollback(tx: Box<dyn EventTransaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "Rollback failed");
    }
}
