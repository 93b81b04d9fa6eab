//! File preview and separator detection.

use serde::Serialize;

use crate::reader::{decode, read, ReadError, ReaderOptions, DEFAULT_DELIMITER};

/// Separators recognised by [`detect_delimiter`], in tie-break order.
pub const CANDIDATE_DELIMITERS: &[char] = &[';', ',', '\t', '|'];

/// Default number of records shown by a preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

/// First records of a file as the reader sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePreview {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_records: usize,
    pub repaired_lines: usize,
    pub orphan_lines: usize,
}

/// Guess the separator from the first line of `bytes`.
pub fn detect_delimiter(bytes: &[u8]) -> char {
    let text = decode(bytes);
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    CANDIDATE_DELIMITERS
        .iter()
        .map(|d| (*d, first_line.matches(*d).count()))
        .filter(|(_, count)| *count > 0)
        // max_by_key keeps the last maximum; reverse so earlier candidates win ties.
        .rev()
        .max_by_key(|(_, count)| *count)
        .map_or(DEFAULT_DELIMITER, |(d, _)| d)
}

/// Read `bytes` and keep the first `max_rows` repaired records.
pub fn preview(
    bytes: &[u8],
    delimiter: char,
    has_header: bool,
    max_rows: usize,
) -> Result<FilePreview, ReadError> {
    let options = ReaderOptions {
        delimiter,
        has_header,
        ..ReaderOptions::default()
    };
    let parsed = read(bytes, &options)?;

    Ok(FilePreview {
        header: parsed.columns.names().to_vec(),
        rows: parsed
            .records
            .iter()
            .take(max_rows)
            .map(|r| r.values.clone())
            .collect(),
        total_records: parsed.records.len(),
        repaired_lines: parsed.repaired_lines,
        orphan_lines: parsed.orphan_lines.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_most_frequent_separator() {
        assert_eq!(detect_delimiter(b"a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter(b"a,b,c;d"), ',');
        assert_eq!(detect_delimiter(b"a\tb\tc"), '\t');
        assert_eq!(detect_delimiter(b"a|b"), '|');
    }

    #[test]
    fn ties_and_empty_input_prefer_semicolon() {
        assert_eq!(detect_delimiter(b"a;b,c"), ';');
        assert_eq!(detect_delimiter(b""), ';');
        assert_eq!(detect_delimiter(b"\xEF\xBB\xBF\r\n"), ';');
    }

    #[test]
    fn preview_limits_rows_but_counts_all() {
        let bytes = "Numéro de badge;Date évènements\n1001;07/04/2025\n1002;07/04/2025\n1003;08/04/2025\n";
        let preview = preview(bytes.as_bytes(), ';', true, 2).unwrap();
        assert_eq!(preview.header, vec!["Numéro de badge", "Date évènements"]);
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[1], vec!["1002", "07/04/2025"]);
        assert_eq!(preview.total_records, 3);
    }
}
