//! Pre-import validation report.
//!
//! Runs before any storage access when the caller asks for it. A file
//! missing the badge or date column cannot be imported at all; everything
//! else is reported as per-row warnings and does not block the run.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::header::{fold_header, Column};
use crate::normalize::{normalize_record, NormalizeOptions};
use crate::outcome::CorrectionKind;
use crate::reader::ParsedFile;

/// Event natures written by the reader firmware.
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "Entrée",
    "Sortie",
    "Accès refusé",
    "Utilisateur accepté",
    "Utilisateur rejeté",
    "Utilisateur inconnu",
];

/// Identity columns an operator expects on every row.
const IDENTITY_COLUMNS: &[Column] = &[
    Column::Controller,
    Column::Reader,
    Column::LastName,
    Column::FirstName,
];

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum WarningKind {
    NonNumericBadge,
    EmptyField,
    UnknownEventType,
    Correction(CorrectionKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub line_number: usize,
    pub column: Column,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Required columns absent from the header. Non-empty means the file
    /// cannot be imported.
    pub missing_columns: Vec<Column>,
    pub records_checked: usize,
    /// Records the normalizer would reject.
    pub rejected_records: usize,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_importable(&self) -> bool {
        self.missing_columns.is_empty()
    }

    /// Human-readable reason the file cannot be imported.
    pub fn blocking_reason(&self) -> Option<String> {
        if self.missing_columns.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.missing_columns.iter().map(|c| c.canonical_name()).collect();
        Some(format!("missing required columns: {}", names.join(", ")))
    }
}

fn is_known_event_type(value: &str) -> bool {
    let folded = fold_header(value);
    KNOWN_EVENT_TYPES.iter().any(|t| fold_header(t) == folded)
}

/// Check every record of `parsed` without touching storage.
pub fn validate(parsed: &ParsedFile, options: &NormalizeOptions) -> ValidationReport {
    let columns = &parsed.columns;
    let mut report = ValidationReport {
        missing_columns: columns.missing_required(),
        records_checked: parsed.records.len(),
        ..ValidationReport::default()
    };
    if !report.is_importable() {
        return report;
    }

    for record in &parsed.records {
        let line = record.line_number;
        let mut warn = |column: Column, kind: WarningKind, message: String| {
            report.warnings.push(ValidationWarning {
                line_number: line,
                column,
                kind,
                message,
            });
        };

        if let Some(badge) = record.get(columns, Column::BadgeNumber) {
            if !NUMERIC.is_match(badge) {
                warn(
                    Column::BadgeNumber,
                    WarningKind::NonNumericBadge,
                    format!("badge number '{badge}' is not numeric"),
                );
            }
        }

        for column in IDENTITY_COLUMNS {
            if columns.index_of(*column).is_some() && record.get(columns, *column).is_none() {
                warn(*column, WarningKind::EmptyField, format!("{column} is empty"));
            }
        }

        if let Some(event_type) = record.get(columns, Column::EventType) {
            if !is_known_event_type(event_type) {
                warn(
                    Column::EventType,
                    WarningKind::UnknownEventType,
                    format!("unknown event nature '{event_type}'"),
                );
            }
        }

        match normalize_record(record, columns, options) {
            Ok(normalized) => {
                for correction in normalized.corrections {
                    warn(
                        correction.column,
                        WarningKind::Correction(correction.kind),
                        correction.to_string(),
                    );
                }
            }
            Err(_) => report.rejected_records += 1,
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read, ReaderOptions};
    use chrono::NaiveDate;

    fn options() -> NormalizeOptions {
        NormalizeOptions::new(NaiveDate::from_ymd_opt(2025, 4, 30).unwrap())
    }

    fn parse(text: &str) -> ParsedFile {
        read(text.as_bytes(), &ReaderOptions::default()).unwrap()
    }

    #[test]
    fn missing_date_column_blocks_import() {
        let parsed = parse("Numéro de badge;Centrale\n1001;C1");
        let report = validate(&parsed, &options());
        assert!(!report.is_importable());
        assert_eq!(report.missing_columns, vec![Column::EventDate]);
        assert_eq!(
            report.blocking_reason().as_deref(),
            Some("missing required columns: Date évènements")
        );
    }

    #[test]
    fn clean_file_has_no_warnings() {
        let parsed = parse(
            "Numéro de badge;Date évènements;Heure évènements;Centrale;Lecteur;Nature Evenement;Nom;Prénom\n\
             1001;07/04/2025;08:15:00;C1;L1;Entree;Dupont;Jean",
        );
        let report = validate(&parsed, &options());
        assert!(report.is_importable());
        assert_eq!(report.records_checked, 1);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn reports_row_level_warnings() {
        let parsed = parse(
            "Numéro de badge;Date évènements;Heure évènements;Centrale;Lecteur;Nature Evenement;Nom;Prénom\n\
             A12;15/06/2099;08h15;C1;;Badge perdu;Dupont;Jean\n\
             1002;32/13/2025;08:15:00;C1;L1;Sortie;Martin;Paul",
        );
        let report = validate(&parsed, &options());
        let kinds: Vec<WarningKind> = report.warnings.iter().map(|w| w.kind).collect();

        assert!(kinds.contains(&WarningKind::NonNumericBadge));
        assert!(kinds.contains(&WarningKind::EmptyField));
        assert!(kinds.contains(&WarningKind::UnknownEventType));
        assert!(kinds.contains(&WarningKind::Correction(CorrectionKind::FutureYearClamped)));
        assert!(kinds.contains(&WarningKind::Correction(CorrectionKind::TimeReconstructed)));
        assert_eq!(report.rejected_records, 1);
    }
}
