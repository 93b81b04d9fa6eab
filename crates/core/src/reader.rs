//! Line reader and record repair for badge-reader exports.
//!
//! The reader hardware writes free-text fields without quoting, so a newline
//! inside a field splits one logical record over several physical lines.
//! A physical line starts a new record when its badge-number cell is a pure
//! numeric token, or when it carries every header column; anything else is
//! merged into the pending record.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::WINDOWS_1252;
use regex::Regex;
use serde::Serialize;

use crate::header::{Column, ColumnMap};
use crate::outcome::RawPayload;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// UTF-8 byte-order mark written by spreadsheet exports.
pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Default field separator of the reader export.
pub const DEFAULT_DELIMITER: char = ';';

/// Default number of missing trailing columns padded instead of rejected.
pub const DEFAULT_SHORT_ROW_TOLERANCE: usize = 1;

static BADGE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a file is split into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub delimiter: char,
    pub has_header: bool,
    /// Records short by at most this many columns are padded.
    pub short_row_tolerance: usize,
    /// A line carrying at least as many fields as the header is its own
    /// record even when its badge cell is not numeric.
    pub standalone_complete_lines: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            has_header: true,
            short_row_tolerance: DEFAULT_SHORT_ROW_TOLERANCE,
            standalone_complete_lines: true,
        }
    }
}

/// Structural problem found while sealing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordDefect {
    TooFewColumns { found: usize, expected: usize },
    TooManyColumns { found: usize, expected: usize },
}

impl std::fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewColumns { found, expected } => {
                write!(f, "row has {found} columns, expected {expected}")
            }
            Self::TooManyColumns { found, expected } => {
                write!(f, "row has {found} non-empty columns, expected at most {expected}")
            }
        }
    }
}

/// One logical record after repair. `values` always has the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based physical line where the record starts.
    pub line_number: usize,
    pub values: Vec<String>,
    /// Physical lines merged into this record after the first.
    pub continuation_lines: usize,
    pub defect: Option<RecordDefect>,
}

impl RawRecord {
    /// Trimmed value of `column`, `None` when absent or empty.
    pub fn get(&self, columns: &ColumnMap, column: Column) -> Option<&str> {
        columns
            .index_of(column)
            .and_then(|idx| self.values.get(idx))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Raw content keyed by header name, in file order.
    pub fn payload(&self, columns: &ColumnMap) -> RawPayload {
        RawPayload::new(
            columns
                .names()
                .iter()
                .cloned()
                .zip(self.values.iter().cloned())
                .collect(),
        )
    }
}

/// Result of reading a whole file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub columns: ColumnMap,
    pub records: Vec<RawRecord>,
    /// Continuation lines seen before any record started.
    pub orphan_lines: Vec<usize>,
    /// Continuation lines merged into a pending record.
    pub repaired_lines: usize,
}

/// File-level failures. Per-record problems are carried as [`RecordDefect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("File contains no data")]
    Empty,

    #[error("Header has no badge number column")]
    MissingBadgeColumn,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode raw bytes into LF-terminated text. Input that is not valid UTF-8
/// is read as Windows-1252, the encoding of exports saved by French Windows
/// tools.
pub fn decode(bytes: &[u8]) -> String {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = match std::str::from_utf8(body) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(body).0,
    };
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split a physical line into cleaned tokens.
pub fn split_line(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter).map(clean_token).collect()
}

fn clean_token(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn is_blank(tokens: &[String]) -> bool {
    tokens.iter().all(|t| t.is_empty())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read and repair every record of `bytes`.
pub fn read(bytes: &[u8], options: &ReaderOptions) -> Result<ParsedFile, ReadError> {
    let text = decode(bytes);
    let mut lines = text
        .split('\n')
        .enumerate()
        .map(|(i, line)| (i + 1, split_line(line, options.delimiter)))
        .filter(|(_, tokens)| !is_blank(tokens));

    let columns = if options.has_header {
        let (_, mut header) = lines.next().ok_or(ReadError::Empty)?;
        while header.last().is_some_and(|h| h.is_empty()) {
            header.pop();
        }
        ColumnMap::resolve(&header)
    } else {
        ColumnMap::positional()
    };

    let badge_idx = columns
        .index_of(Column::BadgeNumber)
        .ok_or(ReadError::MissingBadgeColumn)?;

    let mut assembler = Assembler::new(columns.width(), options.short_row_tolerance);
    for (line_number, tokens) in lines {
        let numeric_badge = tokens
            .get(badge_idx)
            .is_some_and(|t| BADGE_TOKEN.is_match(t));
        let complete = options.standalone_complete_lines && tokens.len() >= assembler.width;

        if numeric_badge || complete {
            assembler.start(line_number, tokens);
        } else {
            assembler.continue_with(line_number, &tokens);
        }
    }

    let (records, orphan_lines, repaired_lines) = assembler.finish();
    Ok(ParsedFile {
        columns,
        records,
        orphan_lines,
        repaired_lines,
    })
}

/// Pending record under construction.
struct Pending {
    record: RawRecord,
    /// Highest column position covered by the physical lines so far.
    filled: usize,
}

struct Assembler {
    width: usize,
    min_width: usize,
    pending: Option<Pending>,
    records: Vec<RawRecord>,
    orphans: Vec<usize>,
    repaired: usize,
}

impl Assembler {
    fn new(width: usize, tolerance: usize) -> Self {
        Self {
            width,
            min_width: width.saturating_sub(tolerance).max(1),
            pending: None,
            records: Vec::new(),
            orphans: Vec::new(),
            repaired: 0,
        }
    }

    fn start(&mut self, line_number: usize, mut tokens: Vec<String>) {
        self.seal();

        let mut defect = None;
        if tokens.len() > self.width {
            let extra = tokens.split_off(self.width);
            if !is_blank(&extra) {
                let found = self.width + extra.iter().filter(|t| !t.is_empty()).count();
                defect = Some(RecordDefect::TooManyColumns {
                    found,
                    expected: self.width,
                });
            }
        }
        let filled = tokens.len();
        tokens.resize(self.width, String::new());

        self.pending = Some(Pending {
            record: RawRecord {
                line_number,
                values: tokens,
                continuation_lines: 0,
                defect,
            },
            filled,
        });
    }

    fn continue_with(&mut self, line_number: usize, tokens: &[String]) {
        let Some(pending) = self.pending.as_mut() else {
            self.orphans.push(line_number);
            return;
        };

        let values = &mut pending.record.values;
        let anchor = values.iter().rposition(|v| !v.is_empty()).unwrap_or(0);

        // Tokens running past the last column are dropped.
        for (target, token) in (anchor..self.width).zip(tokens) {
            if !token.is_empty() {
                append(&mut values[target], token);
            }
            pending.filled = pending.filled.max(target + 1);
        }

        pending.record.continuation_lines += 1;
        self.repaired += 1;
    }

    fn seal(&mut self) {
        let Some(Pending { mut record, filled }) = self.pending.take() else {
            return;
        };
        if record.defect.is_none() && filled < self.min_width {
            record.defect = Some(RecordDefect::TooFewColumns {
                found: filled,
                expected: self.width,
            });
        }
        self.records.push(record);
    }

    fn finish(mut self) -> (Vec<RawRecord>, Vec<usize>, usize) {
        self.seal();
        (self.records, self.orphans, self.repaired)
    }
}

fn append(cell: &mut String, token: &str) {
    if !cell.is_empty() {
        cell.push(' ');
    }
    cell.push_str(token);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Numéro de badge;Date évènements;Heure évènements;Centrale;Lecteur;\
        Nature Evenement;Nom;Prénom;Statut;Groupe;Date de début de validité;Date de création";

    fn file(lines: &[&str]) -> Vec<u8> {
        let mut text = String::from(HEADER);
        for line in lines {
            text.push('\n');
            text.push_str(line);
        }
        text.into_bytes()
    }

    fn read_default(bytes: &[u8]) -> ParsedFile {
        read(bytes, &ReaderOptions::default()).expect("readable file")
    }

    // -- decoding tests --

    #[test]
    fn strips_bom_and_normalizes_line_endings() {
        assert_eq!(decode(b"\xEF\xBB\xBFa\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn windows_1252_input_is_decoded() {
        assert_eq!(decode(b"Num\xe9ro de badge;Date \xe9v\xe8nements\r\n"), "Numéro de badge;Date évènements\n");
        assert_eq!(decode(b"\x80 \x9c"), "€ œ");
    }

    #[test]
    fn windows_1252_header_resolves_columns() {
        let parsed = read_default(
            b"Num\xe9ro de badge;Date \xe9v\xe8nements;Nature Evenement\r\n1001;07/04/2025;Entr\xe9e\r\n",
        );
        assert_eq!(parsed.columns.index_of(Column::BadgeNumber), Some(0));
        assert_eq!(parsed.columns.index_of(Column::EventDate), Some(1));
        assert_eq!(
            parsed.records[0].get(&parsed.columns, Column::EventType),
            Some("Entrée")
        );
    }

    #[test]
    fn tokens_are_trimmed_and_unquoted() {
        assert_eq!(
            split_line(" 42 ;\"Centrale A\"; ", ';'),
            vec!["42", "Centrale A", ""]
        );
    }

    // -- record tests --

    #[test]
    fn reads_crlf_file_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(
            format!("{HEADER}\r\n1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;\r\n")
                .as_bytes(),
        );
        let parsed = read_default(&bytes);

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.line_number, 2);
        assert_eq!(record.get(&parsed.columns, Column::BadgeNumber), Some("1001"));
        assert_eq!(record.get(&parsed.columns, Column::GroupName), Some("Staff"));
        assert_eq!(record.get(&parsed.columns, Column::CreationDate), None);
        assert!(record.defect.is_none());
    }

    #[test]
    fn merges_broken_line_into_pending_record() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;Centrale A;Lecteur",
            "Hall;Entrée;Dupont;Jean;Actif;Staff;01/01/2025;02/01/2025",
            "1002;07/04/2025;09:00:00;Centrale A;Lecteur B;Sortie;Martin;Paul;Actif;Staff;;",
        ]));

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.repaired_lines, 1);

        let merged = &parsed.records[0];
        assert_eq!(merged.continuation_lines, 1);
        assert!(merged.defect.is_none());
        assert_eq!(merged.get(&parsed.columns, Column::Reader), Some("Lecteur Hall"));
        assert_eq!(merged.get(&parsed.columns, Column::EventType), Some("Entrée"));
        assert_eq!(
            merged.get(&parsed.columns, Column::CreationDate),
            Some("02/01/2025")
        );
        assert_eq!(parsed.records[1].line_number, 4);
    }

    #[test]
    fn continuation_text_joins_last_non_empty_column() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;Centrale A;Lecteur;Entrée;Dupont;Jean;Actif;Groupe",
            "nord;;",
        ]));
        let record = &parsed.records[0];
        assert_eq!(record.get(&parsed.columns, Column::GroupName), Some("Groupe nord"));
        assert!(record.defect.is_none());
    }

    #[test]
    fn short_continuation_merges_under_narrow_header() {
        let parsed = read_default(
            "Numéro de badge;Date évènements;Heure évènements;Nature Evenement\n\
             123456;06/04/2025;08:30:00;Entrée\n\
             suite du libellé;partie deux;partie trois\n\
             789012;06/04/2025;08:45:00;Sortie"
                .as_bytes(),
        );
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.repaired_lines, 1);
        let merged = &parsed.records[0];
        assert_eq!(
            merged.get(&parsed.columns, Column::EventType),
            Some("Entrée suite du libellé")
        );
        assert!(merged.defect.is_none());
        assert_eq!(parsed.records[1].get(&parsed.columns, Column::BadgeNumber), Some("789012"));
    }

    #[test]
    fn line_short_of_header_width_with_empty_badge_merges() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;",
            ";07/04/2025;08:20:00;C1;L1;Entrée;Durand;Marie;Actif;Staff;",
        ]));
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.repaired_lines, 1);
    }

    #[test]
    fn continuation_past_last_column_is_dropped() {
        let parsed = read_default(
            "Numéro de badge;Date évènements;Heure évènements;Nature Evenement\n\
             123456;06/04/2025;08:30:00;Entr\n\
             ée;extra1"
                .as_bytes(),
        );
        let record = &parsed.records[0];
        assert_eq!(record.get(&parsed.columns, Column::EventType), Some("Entr ée"));
        assert_eq!(record.values.len(), 4);
        assert!(record.defect.is_none());
    }

    #[test]
    fn pads_row_short_by_tolerance() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;01/01/2025",
        ]));
        let record = &parsed.records[0];
        assert!(record.defect.is_none());
        assert_eq!(record.values.len(), 12);
    }

    #[test]
    fn flags_row_short_beyond_tolerance() {
        let parsed = read_default(&file(&["1001;07/04/2025;08:15:00"]));
        assert_eq!(
            parsed.records[0].defect,
            Some(RecordDefect::TooFewColumns {
                found: 3,
                expected: 12
            })
        );
    }

    #[test]
    fn flags_extra_non_empty_columns() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;;surplus",
        ]));
        assert_matches_defect(&parsed.records[0], "TooManyColumns");
    }

    #[test]
    fn trailing_empty_columns_are_ignored() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;;;;",
        ]));
        assert!(parsed.records[0].defect.is_none());
    }

    #[test]
    fn leading_continuation_is_orphaned() {
        let parsed = read_default(&file(&[
            "stray text;more",
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;",
        ]));
        assert_eq!(parsed.orphan_lines, vec![2]);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.repaired_lines, 0);
    }

    #[test]
    fn complete_line_with_empty_badge_stands_alone() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;",
            ";07/04/2025;08:20:00;C1;L1;Entrée;Durand;Marie;Actif;Staff;;",
        ]));
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].get(&parsed.columns, Column::BadgeNumber), None);
    }

    #[test]
    fn complete_line_merges_when_standalone_disabled() {
        let options = ReaderOptions {
            standalone_complete_lines: false,
            ..ReaderOptions::default()
        };
        let parsed = read(
            &file(&[
                "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;",
                ";07/04/2025;08:20:00;C1;L1;Entrée;Durand;Marie;Actif;Staff;;",
            ]),
            &options,
        )
        .expect("readable file");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].continuation_lines, 1);
    }

    #[test]
    fn headerless_file_uses_export_order() {
        let options = ReaderOptions {
            has_header: false,
            ..ReaderOptions::default()
        };
        let parsed = read(
            b"1001;07/04/2025;08:15:00;C1;L1;Entr\xC3\xA9e;Dupont;Jean;Actif;Staff;;",
            &options,
        )
        .expect("readable file");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(
            parsed.records[0].get(&parsed.columns, Column::EventType),
            Some("Entrée")
        );
    }

    #[test]
    fn payload_keeps_header_order() {
        let parsed = read_default(&file(&[
            "1001;07/04/2025;08:15:00;C1;L1;Entrée;Dupont;Jean;Actif;Staff;;",
        ]));
        let payload = parsed.records[0].payload(&parsed.columns);
        assert_eq!(payload.entries()[0], ("Numéro de badge".to_string(), "1001".to_string()));
        assert_eq!(payload.entries().len(), 12);
    }

    // -- file-level error tests --

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            read(b"\xEF\xBB\xBF\r\n\r\n", &ReaderOptions::default()).unwrap_err(),
            ReadError::Empty
        );
    }

    #[test]
    fn header_without_badge_column_is_rejected() {
        assert_eq!(
            read(b"Centrale;Lecteur\nC1;L1", &ReaderOptions::default()).unwrap_err(),
            ReadError::MissingBadgeColumn
        );
    }

    fn assert_matches_defect(record: &RawRecord, expected: &str) {
        let defect = record.defect.as_ref().expect("record has a defect");
        assert!(format!("{defect:?}").starts_with(expected), "got {defect:?}");
    }
}
