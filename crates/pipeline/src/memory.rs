//! In-process [`EventStore`], used by tests and dry runs.
//!
//! Writes are staged per transaction and applied on commit, so a rolled
//! back run leaves no trace. Failures can be injected to exercise the
//! rollback paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use accesslog_core::dedup::DedupKey;
use accesslog_core::normalize::NormalizedAccessEvent;
use accesslog_core::outcome::{DuplicateRecord, ImportRunSummary, RowError};
use accesslog_core::types::DbId;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::store::{ChunkOutcome, EventStore, EventTransaction, StoreError};

/// A run as recorded by [`MemoryStore::record_run`].
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub id: DbId,
    pub summary: ImportRunSummary,
    pub duplicates: Vec<DuplicateRecord>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Default)]
struct State {
    events: BTreeMap<DedupKey, NormalizedAccessEvent>,
    runs: Vec<StoredRun>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Zero-based chunk index whose insert fails.
    fail_chunk: Option<usize>,
    fail_commit: bool,
    fail_record_run: bool,
    fail_load: bool,
    /// Events committed by a "concurrent run" right before the next chunk.
    concurrent: Vec<NormalizedAccessEvent>,
    /// Token cancelled once the chunk with this index has been written.
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Event store kept in memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-existing events directly, outside any run.
    pub fn seed(&self, events: impl IntoIterator<Item = NormalizedAccessEvent>) {
        let mut state = lock(&self.state);
        for event in events {
            state.events.entry(event.key()).or_insert(event);
        }
    }

    /// Make the insert of chunk `index` (zero-based) fail.
    pub fn fail_on_chunk(&self, index: usize) {
        lock(&self.faults).fail_chunk = Some(index);
    }

    pub fn fail_on_commit(&self) {
        lock(&self.faults).fail_commit = true;
    }

    pub fn fail_on_record_run(&self) {
        lock(&self.faults).fail_record_run = true;
    }

    pub fn fail_on_load(&self) {
        lock(&self.faults).fail_load = true;
    }

    /// Cancel `token` right after chunk `index` (zero-based) is written, as
    /// an operator interrupt arriving mid-run would.
    pub fn cancel_after_chunk(&self, index: usize, token: CancellationToken) {
        lock(&self.faults).cancel_after = Some((index, token));
    }

    /// Commit `events` on behalf of another run just before the next chunk
    /// insert, after this run loaded its keys.
    pub fn insert_concurrently(&self, events: impl IntoIterator<Item = NormalizedAccessEvent>) {
        lock(&self.faults).concurrent.extend(events);
    }

    pub fn event_count(&self) -> usize {
        lock(&self.state).events.len()
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        lock(&self.state).events.contains_key(key)
    }

    pub fn runs(&self) -> Vec<StoredRun> {
        lock(&self.state).runs.clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn load_dedup_keys(&self, since: Option<NaiveDate>) -> Result<Vec<DedupKey>, StoreError> {
        if lock(&self.faults).fail_load {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }
        Ok(lock(&self.state)
            .events
            .keys()
            .filter(|k| since.map_or(true, |s| k.event_date >= s))
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn EventTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
            staged_keys: HashSet::new(),
            chunks: 0,
        }))
    }

    async fn record_run(
        &self,
        summary: &ImportRunSummary,
        duplicates: &[DuplicateRecord],
        errors: &[RowError],
    ) -> Result<DbId, StoreError> {
        if lock(&self.faults).fail_record_run {
            return Err(StoreError::Unavailable("injected audit failure".to_string()));
        }
        let mut state = lock(&self.state);
        let id = state.runs.len() as DbId + 1;
        let mut summary = summary.clone();
        summary.id = Some(id);
        state.runs.push(StoredRun {
            id,
            summary,
            duplicates: duplicates.to_vec(),
            errors: errors.to_vec(),
        });
        Ok(id)
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    staged: Vec<NormalizedAccessEvent>,
    staged_keys: HashSet<DedupKey>,
    chunks: usize,
}

#[async_trait]
impl EventTransaction for MemoryTransaction {
    async fn insert_chunk(
        &mut self,
        events: &[NormalizedAccessEvent],
    ) -> Result<ChunkOutcome, StoreError> {
        let index = self.chunks;
        self.chunks += 1;

        let concurrent = {
            let mut faults = lock(&self.store.faults);
            if faults.fail_chunk == Some(index) {
                return Err(StoreError::Unavailable(format!(
                    "injected failure on chunk {index}"
                )));
            }
            std::mem::take(&mut faults.concurrent)
        };
        self.store.seed(concurrent);

        let mut outcome = ChunkOutcome::default();
        {
            let state = lock(&self.store.state);
            for event in events {
                let key = event.key();
                if state.events.contains_key(&key) || self.staged_keys.contains(&key) {
                    outcome.conflicts.push(key);
                } else {
                    self.staged_keys.insert(key);
                    self.staged.push(event.clone());
                    outcome.inserted += 1;
                }
            }
        }

        if let Some((after, token)) = &lock(&self.store.faults).cancel_after {
            if *after == index {
                token.cancel();
            }
        }
        Ok(outcome)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if lock(&self.store.faults).fail_commit {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        let Self { store, staged, .. } = *self;
        store.seed(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
