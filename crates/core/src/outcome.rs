//! Per-row outcomes and the run summary.
//!
//! Every logical record of a run ends up as exactly one of: an imported
//! event, a [`DuplicateRecord`] or a [`RowError`]. Accepted rows may carry
//! [`SoftCorrection`]s describing what the normalizer changed.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::dedup::DedupKey;
use crate::header::{fold_header, Column};
use crate::import_status::RunStatus;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Raw payload
// ---------------------------------------------------------------------------

/// Raw record content as `(header name, value)` pairs in file order.
///
/// Serializes as a JSON object so it can be stored in a JSONB column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPayload(Vec<(String, String)>);

impl RawPayload {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.0
    }

    /// Rebuild a payload from its stored JSON form. Non-string values are
    /// rendered with their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let entries = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| {
                        let text = match v {
                            serde_json::Value::String(s) => s.clone(),
                            serde_json::Value::Null => String::new(),
                            other => other.to_string(),
                        };
                        (k.clone(), text)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self(entries)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }

    /// Non-empty value stored under any accepted spelling of `column`.
    pub fn value_for(&self, column: Column) -> Option<&str> {
        let keys: Vec<String> = column.aliases().iter().map(|a| fold_header(a)).collect();
        self.0
            .iter()
            .find(|(name, value)| !value.trim().is_empty() && keys.contains(&fold_header(name)))
            .map(|(_, value)| value.trim())
    }
}

impl Serialize for RawPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Soft corrections
// ---------------------------------------------------------------------------

/// What the normalizer changed on an accepted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Year after the run year, clamped to the run year.
    FutureYearClamped,
    /// Hour, minute or second out of range, clamped.
    TimeClamped,
    /// Time rebuilt from a non-standard separator (`08h15`).
    TimeReconstructed,
    /// Unreadable time replaced with midnight.
    TimeDefaulted,
    /// Empty time column filled from the time embedded in the date column.
    TimeFromDate,
    /// Missing event date replaced with the run date.
    RunDateSubstituted,
    /// Unreadable optional date left empty.
    OptionalDateDropped,
}

impl CorrectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FutureYearClamped => "future_year_clamped",
            Self::TimeClamped => "time_clamped",
            Self::TimeReconstructed => "time_reconstructed",
            Self::TimeDefaulted => "time_defaulted",
            Self::TimeFromDate => "time_from_date",
            Self::RunDateSubstituted => "run_date_substituted",
            Self::OptionalDateDropped => "optional_date_dropped",
        }
    }
}

impl std::fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change applied to an accepted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftCorrection {
    pub line_number: usize,
    pub column: Column,
    pub kind: CorrectionKind,
    pub original: String,
    pub corrected: String,
}

impl std::fmt::Display for SoftCorrection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: {} '{}' -> '{}' ({})",
            self.line_number, self.column, self.original, self.corrected, self.kind
        )
    }
}

// ---------------------------------------------------------------------------
// Row errors
// ---------------------------------------------------------------------------

/// Why a row was not imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    /// Column count could not be repaired.
    Structural,
    /// A required field is missing or unreadable.
    Validation,
    /// The row was valid but the run was rolled back.
    Aborted,
}

impl RowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Validation => "validation",
            Self::Aborted => "aborted",
        }
    }
}

/// A rejected row with its raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line_number: usize,
    pub badge_number: Option<String>,
    pub kind: RowErrorKind,
    pub reason: String,
    pub raw: RawPayload,
}

impl RowError {
    pub fn structural(
        line_number: usize,
        badge_number: Option<String>,
        reason: impl Into<String>,
        raw: RawPayload,
    ) -> Self {
        Self {
            line_number,
            badge_number,
            kind: RowErrorKind::Structural,
            reason: reason.into(),
            raw,
        }
    }

    pub fn validation(
        line_number: usize,
        badge_number: Option<String>,
        reason: impl Into<String>,
        raw: RawPayload,
    ) -> Self {
        Self {
            line_number,
            badge_number,
            kind: RowErrorKind::Validation,
            reason: reason.into(),
            raw,
        }
    }

    /// A row that would have been imported by a run that was rolled back.
    pub fn aborted(
        line_number: usize,
        badge_number: String,
        cause: &str,
        raw: RawPayload,
    ) -> Self {
        Self {
            line_number,
            badge_number: Some(badge_number),
            kind: RowErrorKind::Aborted,
            reason: format!("run aborted: {cause}"),
            raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

/// Where the earlier copy of a duplicate lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DuplicateSource {
    /// Already persisted before the run started.
    Store,
    /// An earlier row of the same file.
    InFile { first_line: usize },
    /// Persisted by a concurrent run, reported by the store on insert.
    StoreConflict,
}

/// A row skipped because its key already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateRecord {
    pub line_number: usize,
    pub key: DedupKey,
    pub source: DuplicateSource,
    pub reason: String,
    pub raw: RawPayload,
}

impl DuplicateRecord {
    pub fn new(line_number: usize, key: DedupKey, source: DuplicateSource, raw: RawPayload) -> Self {
        let reason = match source {
            DuplicateSource::Store => "event already imported".to_string(),
            DuplicateSource::InFile { first_line } => {
                format!("duplicate of line {first_line} in the same file")
            }
            DuplicateSource::StoreConflict => {
                "event imported concurrently by another run".to_string()
            }
        };
        Self {
            line_number,
            key,
            source,
            reason,
            raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// `(imported + duplicates) / total * 100`, 0 for an empty run.
pub fn success_rate(imported: usize, duplicates: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (imported + duplicates) as f64 / total as f64 * 100.0
}

/// Outcome of one import invocation. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRunSummary {
    /// Assigned when the summary is persisted.
    pub id: Option<DbId>,
    pub source_file_name: String,
    pub initiator: String,
    pub status: RunStatus,
    pub total_rows: usize,
    pub imported_rows: usize,
    pub duplicate_rows: usize,
    pub error_rows: usize,
    pub success_rate: f64,
    pub failure_reason: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl ImportRunSummary {
    /// `total_rows == imported_rows + duplicate_rows + error_rows`.
    pub fn is_balanced(&self) -> bool {
        self.total_rows == self.imported_rows + self.duplicate_rows + self.error_rows
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_counts_duplicates_as_success() {
        assert_eq!(success_rate(1, 1, 4), 50.0);
        assert_eq!(success_rate(0, 0, 0), 0.0);
        assert_eq!(success_rate(3, 0, 3), 100.0);
    }

    #[test]
    fn payload_serializes_as_ordered_object() {
        let payload = RawPayload::new(vec![
            ("Numéro de badge".into(), "1001".into()),
            ("Date évènements".into(), "07/04/2025".into()),
        ]);
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"Numéro de badge":"1001","Date évènements":"07/04/2025"}"#
        );
    }

    #[test]
    fn payload_lookup_accepts_header_variants() {
        let payload = RawPayload::from_json(&serde_json::json!({
            "Numero de badge": "1001",
            "centrale": "C1",
            "Groupe": "",
        }));
        assert_eq!(payload.value_for(Column::BadgeNumber), Some("1001"));
        assert_eq!(payload.value_for(Column::Controller), Some("C1"));
        assert_eq!(payload.value_for(Column::GroupName), None);
    }

    #[test]
    fn duplicate_reason_names_first_line() {
        let key = DedupKey {
            badge_number: "1001".into(),
            event_date: chrono::NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
            event_time: chrono::NaiveTime::MIN,
            event_type: "Entrée".into(),
        };
        let dup = DuplicateRecord::new(
            5,
            key,
            DuplicateSource::InFile { first_line: 2 },
            RawPayload::default(),
        );
        assert_eq!(dup.reason, "duplicate of line 2 in the same file");
    }

    #[test]
    fn aborted_rows_carry_cause() {
        let err = RowError::aborted(3, "1001".into(), "storage unavailable", RawPayload::default());
        assert_eq!(err.kind, RowErrorKind::Aborted);
        assert_eq!(err.reason, "run aborted: storage unavailable");
    }
}
