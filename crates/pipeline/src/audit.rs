//! Import audit recorder: exactly one summary per invocation.

use accesslog_core::import_status::RunStatus;
use accesslog_core::outcome::{DuplicateRecord, ImportRunSummary, RowError};
use accesslog_core::types::DbId;

use crate::store::{EventStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRecorder {
    /// Store duplicate and error rows with the summary.
    pub persist_rows: bool,
    /// Store them for failed and cancelled runs too.
    pub flush_on_failure: bool,
}

impl Default for AuditRecorder {
    fn default() -> Self {
        Self {
            persist_rows: true,
            flush_on_failure: false,
        }
    }
}

impl AuditRecorder {
    /// Whether rows of a run ending in `status` are persisted.
    pub fn keeps_rows(&self, status: RunStatus) -> bool {
        self.persist_rows && (status == RunStatus::Completed || self.flush_on_failure)
    }

    /// Write `summary`, and the rows when configured, then set `summary.id`.
    pub async fn record<S: EventStore + ?Sized>(
        &self,
        store: &S,
        summary: &mut ImportRunSummary,
        duplicates: &[DuplicateRecord],
        errors: &[RowError],
    ) -> Result<DbId, StoreError> {
        let (duplicates, errors) = if self.keeps_rows(summary.status) {
            (duplicates, errors)
        } else {
            (&[][..], &[][..])
        };

        let id = store.record_run(summary, duplicates, errors).await?;
        summary.id = Some(id);

        tracing::info!(
            run_id = id,
            status = %summary.status,
            total = summary.total_rows,
            imported = summary.imported_rows,
            duplicates = summary.duplicate_rows,
            errors = summary.error_rows,
            success_rate = summary.success_rate,
            rows_stored = duplicates.len() + errors.len(),
            "Import run recorded"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_kept_only_when_configured() {
        let recorder = AuditRecorder::default();
        assert!(recorder.keeps_rows(RunStatus::Completed));
        assert!(!recorder.keeps_rows(RunStatus::Failed));
        assert!(!recorder.keeps_rows(RunStatus::Cancelled));

        let flushing = AuditRecorder {
            flush_on_failure: true,
            ..recorder
        };
        assert!(flushing.keeps_rows(RunStatus::Failed));

        let silent = AuditRecorder {
            persist_rows: false,
            flush_on_failure: true,
        };
        assert!(!silent.keeps_rows(RunStatus::Completed));
    }
}
