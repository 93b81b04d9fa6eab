//! Duplicate and rejected rows attached to an import run.

use accesslog_core::import_status::{ROW_KIND_DUPLICATE, ROW_KIND_ERROR};
use accesslog_core::outcome::{DuplicateRecord, RowError};
use accesslog_core::types::{DbId, Timestamp};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `import_run_rows` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImportRunRow {
    pub id: DbId,
    pub run_id: DbId,
    pub row_number: i32,
    pub kind: String,
    pub badge_number: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
    pub event_type: Option<String>,
    pub reason: String,
    pub raw_payload: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a run row.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateImportRunRow {
    pub row_number: i32,
    pub kind: &'static str,
    pub badge_number: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<NaiveTime>,
    pub event_type: Option<String>,
    pub reason: String,
    pub raw_payload: serde_json::Value,
}

fn row_number(line: usize) -> i32 {
    i32::try_from(line).unwrap_or(i32::MAX)
}

impl From<&DuplicateRecord> for CreateImportRunRow {
    fn from(dup: &DuplicateRecord) -> Self {
        Self {
            row_number: row_number(dup.line_number),
            kind: ROW_KIND_DUPLICATE,
            badge_number: Some(dup.key.badge_number.clone()),
            event_date: Some(dup.key.event_date),
            event_time: Some(dup.key.event_time),
            event_type: Some(dup.key.event_type.clone()),
            reason: dup.reason.clone(),
            raw_payload: dup.raw.to_json(),
        }
    }
}

impl From<&RowError> for CreateImportRunRow {
    fn from(err: &RowError) -> Self {
        Self {
            row_number: row_number(err.line_number),
            kind: ROW_KIND_ERROR,
            badge_number: err.badge_number.clone(),
            event_date: None,
            event_time: None,
            event_type: None,
            reason: err.reason.clone(),
            raw_payload: err.raw.to_json(),
        }
    }
}
