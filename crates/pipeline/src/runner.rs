//! Import pipeline entry point.
//!
//! One call to [`ImportPipeline::run`] reads a file, normalizes and
//! deduplicates its records, commits the new events in a single
//! transaction and records exactly one run summary, whatever the outcome.

use accesslog_core::dedup::{lookback_start, DedupCheck, DuplicateDetector};
use accesslog_core::import_status::RunStatus;
use accesslog_core::normalize::{normalize_record, NormalizeOptions};
use accesslog_core::outcome::{
    success_rate, DuplicateRecord, DuplicateSource, ImportRunSummary, RowError, SoftCorrection,
};
use accesslog_core::reader::{read, ReaderOptions, DEFAULT_DELIMITER};
use accesslog_core::types::{Timestamp, SYSTEM_INITIATOR};
use accesslog_core::validation::{validate, ValidationReport};
use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use crate::audit::AuditRecorder;
use crate::committer::{AbortReason, BatchCommitter, CommitOutcome, PendingRow};
use crate::config::PipelineConfig;
use crate::store::{EventStore, StoreError};

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// One file to import.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub bytes: Vec<u8>,
    pub delimiter: char,
    pub has_header: bool,
    pub validate_before_import: bool,
    pub initiator: String,
    pub source_file_name: String,
}

impl ImportRequest {
    /// A header-bearing, `;`-separated file imported by the system.
    pub fn new(bytes: impl Into<Vec<u8>>, source_file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            delimiter: DEFAULT_DELIMITER,
            has_header: true,
            validate_before_import: false,
            initiator: SYSTEM_INITIATOR.to_string(),
            source_file_name: source_file_name.into(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub summary: ImportRunSummary,
    pub duplicates: Vec<DuplicateRecord>,
    pub errors: Vec<RowError>,
    pub corrections: Vec<SoftCorrection>,
    pub validation: Option<ValidationReport>,
    /// Continuation lines dropped because no record preceded them.
    pub orphan_lines: Vec<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The run finished but its summary could not be written. The outcome
    /// is still returned to the caller.
    #[error("Failed to record import run: {source}")]
    Audit {
        source: StoreError,
        outcome: Box<ImportOutcome>,
    },
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct ImportPipeline<S> {
    store: S,
    config: PipelineConfig,
    run_date: Option<NaiveDate>,
}

/// Rows collected while a run progresses.
#[derive(Default)]
struct RunState {
    total: usize,
    imported: usize,
    duplicates: Vec<DuplicateRecord>,
    errors: Vec<RowError>,
    corrections: Vec<SoftCorrection>,
    validation: Option<ValidationReport>,
    orphan_lines: Vec<usize>,
}

impl RunState {
    fn abort(&mut self, rows: Vec<PendingRow>, cause: &str) {
        self.errors.extend(
            rows.into_iter()
                .map(|r| RowError::aborted(r.line_number, r.event.badge_number, cause, r.raw)),
        );
    }
}

impl<S: EventStore> ImportPipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            run_date: None,
        }
    }

    /// Pin the run date instead of taking today's UTC date.
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = Some(run_date);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Import one file.
    ///
    /// Returns `Ok` for completed, failed and cancelled runs alike; the
    /// status is in the summary. `Err` means the summary itself could not
    /// be recorded.
    pub async fn run(
        &self,
        request: ImportRequest,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, PipelineError> {
        let started_at = Utc::now();
        let run_date = self.run_date.unwrap_or_else(|| started_at.date_naive());
        tracing::info!(
            file = %request.source_file_name,
            initiator = %request.initiator,
            bytes = request.bytes.len(),
            "Import run started"
        );

        let mut state = RunState::default();
        let (status, failure_reason) = self.execute(&request, run_date, cancel, &mut state).await;

        self.finish(request, started_at, status, failure_reason, state).await
    }

    async fn execute(
        &self,
        request: &ImportRequest,
        run_date: NaiveDate,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> (RunStatus, Option<String>) {
        // Read and repair.
        let reader_options = ReaderOptions {
            delimiter: request.delimiter,
            has_header: request.has_header,
            short_row_tolerance: self.config.short_row_tolerance,
            standalone_complete_lines: self.config.standalone_complete_lines,
        };
        let parsed = match read(&request.bytes, &reader_options) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, file = %request.source_file_name, "Unreadable import file");
                return (RunStatus::Failed, Some(e.to_string()));
            }
        };
        for line in &parsed.orphan_lines {
            tracing::warn!(line, "Dropped continuation line with no preceding record");
        }
        if parsed.repaired_lines > 0 {
            tracing::info!(lines = parsed.repaired_lines, "Merged broken lines into records");
        }
        state.orphan_lines = parsed.orphan_lines.clone();

        let normalize_options = NormalizeOptions {
            run_date,
            missing_date_policy: self.config.missing_date_policy,
        };

        // Optional pre-import validation.
        if request.validate_before_import {
            let report = validate(&parsed, &normalize_options);
            let blocking = report.blocking_reason();
            tracing::info!(
                warnings = report.warnings.len(),
                rejected = report.rejected_records,
                "Pre-import validation finished"
            );
            state.validation = Some(report);
            if let Some(reason) = blocking {
                tracing::warn!(reason = %reason, "Import blocked by validation");
                return (RunStatus::Failed, Some(reason));
            }
        }

        // Normalize.
        state.total = parsed.records.len();
        let mut accepted = Vec::with_capacity(parsed.records.len());
        for record in &parsed.records {
            match normalize_record(record, &parsed.columns, &normalize_options) {
                Ok(normalized) => {
                    for correction in &normalized.corrections {
                        tracing::warn!(
                            line = correction.line_number,
                            column = %correction.column,
                            kind = %correction.kind,
                            original = %correction.original,
                            corrected = %correction.corrected,
                            "Soft correction applied"
                        );
                    }
                    state.corrections.extend(normalized.corrections);
                    accepted.push(PendingRow {
                        line_number: record.line_number,
                        event: normalized.event,
                        raw: record.payload(&parsed.columns),
                    });
                }
                Err(e) => {
                    tracing::debug!(line = e.line_number, reason = %e.reason, "Row rejected");
                    state.errors.push(e);
                }
            }
        }

        if cancel.is_cancelled() {
            state.abort(accepted, "cancelled");
            return (RunStatus::Cancelled, Some("cancelled".to_string()));
        }

        // Deduplicate against the store and within the file.
        let since = lookback_start(run_date, self.config.dedup_lookback_days);
        let stored = match self.store.load_dedup_keys(since).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load stored event keys");
                let reason = e.to_string();
                state.abort(accepted, &reason);
                return (RunStatus::Failed, Some(reason));
            }
        };
        let mut detector = DuplicateDetector::with_stored_keys(stored);
        tracing::debug!(stored_keys = detector.stored_keys(), since = ?since, "Duplicate window loaded");

        let mut fresh = Vec::with_capacity(accepted.len());
        for row in accepted {
            let key = row.event.key();
            let source = match detector.check(&key, row.line_number) {
                DedupCheck::New => {
                    fresh.push(row);
                    continue;
                }
                DedupCheck::DuplicateOfStored => DuplicateSource::Store,
                DedupCheck::DuplicateInFile { first_line } => DuplicateSource::InFile { first_line },
            };
            state
                .duplicates
                .push(DuplicateRecord::new(row.line_number, key, source, row.raw));
        }

        // Commit.
        let committer = BatchCommitter::new(self.config.chunk_size);
        match committer.commit(&self.store, fresh, cancel).await {
            CommitOutcome::Committed { imported, conflicts } => {
                if !conflicts.is_empty() {
                    tracing::warn!(
                        count = conflicts.len(),
                        "Events written concurrently by another run, counted as duplicates"
                    );
                }
                state.imported = imported;
                state.duplicates.extend(conflicts.into_iter().map(|row| {
                    let key = row.event.key();
                    DuplicateRecord::new(row.line_number, key, DuplicateSource::StoreConflict, row.raw)
                }));
                (RunStatus::Completed, None)
            }
            CommitOutcome::Aborted { reason, rows } => {
                let cause = reason.to_string();
                state.abort(rows, &cause);
                match reason {
                    AbortReason::Cancelled => (RunStatus::Cancelled, Some(cause)),
                    AbortReason::Storage(_) => (RunStatus::Failed, Some(cause)),
                }
            }
        }
    }

    async fn finish(
        &self,
        request: ImportRequest,
        started_at: Timestamp,
        status: RunStatus,
        failure_reason: Option<String>,
        mut state: RunState,
    ) -> Result<ImportOutcome, PipelineError> {
        state.duplicates.sort_by_key(|d| d.line_number);
        state.errors.sort_by_key(|e| e.line_number);

        let duplicate_rows = state.duplicates.len();
        let error_rows = state.errors.len();
        let total_rows = state.total;

        let mut summary = ImportRunSummary {
            id: None,
            source_file_name: request.source_file_name,
            initiator: request.initiator,
            status,
            total_rows,
            imported_rows: state.imported,
            duplicate_rows,
            error_rows,
            success_rate: success_rate(state.imported, duplicate_rows, total_rows),
            failure_reason,
            started_at,
            finished_at: Utc::now(),
        };
        debug_assert!(summary.is_balanced(), "unbalanced summary: {summary:?}");

        let recorder = AuditRecorder {
            persist_rows: self.config.persist_rejected_rows,
            flush_on_failure: self.config.flush_rows_on_failure,
        };
        let recorded = recorder
            .record(&self.store, &mut summary, &state.duplicates, &state.errors)
            .await;

        let outcome = ImportOutcome {
            summary,
            duplicates: state.duplicates,
            errors: state.errors,
            corrections: state.corrections,
            validation: state.validation,
            orphan_lines: state.orphan_lines,
        };

        match recorded {
            Ok(_) => Ok(outcome),
            Err(source) => {
                tracing::error!(error = %source, "Failed to record import run");
                Err(PipelineError::Audit {
                    source,
                    outcome: Box::new(outcome),
                })
            }
        }
    }
}
