use accesslog_core::dedup::DEFAULT_LOOKBACK_DAYS;
use accesslog_core::error::CoreError;
use accesslog_core::normalize::MissingDatePolicy;
use accesslog_core::reader::{DEFAULT_DELIMITER, DEFAULT_SHORT_ROW_TOLERANCE};

/// Default number of events written per statement.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = 4000;

/// Import pipeline configuration loaded from environment variables.
///
/// All fields have defaults matching the reader export; override them via
/// the environment or the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Field separator (default: `;`).
    pub delimiter: char,
    /// Events per insert statement (default: `500`, range `1..=4000`).
    pub chunk_size: usize,
    /// Days of stored events loaded for duplicate checks (default: `30`).
    /// `None` loads the whole store.
    pub dedup_lookback_days: Option<u32>,
    /// Missing trailing columns padded rather than rejected (default: `1`).
    pub short_row_tolerance: usize,
    /// Lines as wide as the header stand alone even with a non-numeric badge
    /// (default: `true`).
    pub standalone_complete_lines: bool,
    pub missing_date_policy: MissingDatePolicy,
    /// Store duplicate and error rows with the run summary (default: `true`).
    pub persist_rejected_rows: bool,
    /// Also store them when the run failed or was cancelled (default: `false`).
    pub flush_rows_on_failure: bool,
    /// Take an advisory lock so concurrent imports run one after another
    /// (default: `false`).
    pub serialize_runs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            chunk_size: DEFAULT_CHUNK_SIZE,
            dedup_lookback_days: Some(DEFAULT_LOOKBACK_DAYS),
            short_row_tolerance: DEFAULT_SHORT_ROW_TOLERANCE,
            standalone_complete_lines: true,
            missing_date_policy: MissingDatePolicy::Reject,
            persist_rejected_rows: true,
            flush_rows_on_failure: false,
            serialize_runs: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default  |
    /// |------------------------------------|----------|
    /// | `IMPORT_DELIMITER`                 | `;`      |
    /// | `IMPORT_CHUNK_SIZE`                | `500`    |
    /// | `IMPORT_DEDUP_LOOKBACK_DAYS`       | `30` (`all` = whole store) |
    /// | `IMPORT_SHORT_ROW_TOLERANCE`       | `1`      |
    /// | `IMPORT_STANDALONE_COMPLETE_LINES` | `true`   |
    /// | `IMPORT_MISSING_DATE_POLICY`       | `reject` (or `run_date`) |
    /// | `IMPORT_PERSIST_REJECTED_ROWS`     | `true`   |
    /// | `IMPORT_FLUSH_ROWS_ON_FAILURE`     | `false`  |
    /// | `IMPORT_SERIALIZE_RUNS`            | `false`  |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let delimiter = match get("IMPORT_DELIMITER") {
            Some(v) => parse_delimiter(&v)?,
            None => defaults.delimiter,
        };
        let chunk_size = match get("IMPORT_CHUNK_SIZE") {
            Some(v) => parse_number("IMPORT_CHUNK_SIZE", &v)?,
            None => defaults.chunk_size,
        };
        let dedup_lookback_days = match get("IMPORT_DEDUP_LOOKBACK_DAYS") {
            Some(v) => parse_lookback(&v)?,
            None => defaults.dedup_lookback_days,
        };
        let short_row_tolerance = match get("IMPORT_SHORT_ROW_TOLERANCE") {
            Some(v) => parse_number("IMPORT_SHORT_ROW_TOLERANCE", &v)?,
            None => defaults.short_row_tolerance,
        };
        let missing_date_policy = match get("IMPORT_MISSING_DATE_POLICY") {
            Some(v) => MissingDatePolicy::from_str(&v).ok_or_else(|| {
                CoreError::Config(format!(
                    "IMPORT_MISSING_DATE_POLICY must be 'reject' or 'run_date', got '{v}'"
                ))
            })?,
            None => defaults.missing_date_policy,
        };

        let flag = |name: &str, default: bool| -> Result<bool, CoreError> {
            get(name).map_or(Ok(default), |v| parse_bool(name, &v))
        };

        let config = Self {
            delimiter,
            chunk_size,
            dedup_lookback_days,
            short_row_tolerance,
            standalone_complete_lines: flag(
                "IMPORT_STANDALONE_COMPLETE_LINES",
                defaults.standalone_complete_lines,
            )?,
            missing_date_policy,
            persist_rejected_rows: flag("IMPORT_PERSIST_REJECTED_ROWS", defaults.persist_rejected_rows)?,
            flush_rows_on_failure: flag("IMPORT_FLUSH_ROWS_ON_FAILURE", defaults.flush_rows_on_failure)?,
            serialize_runs: flag("IMPORT_SERIALIZE_RUNS", defaults.serialize_runs)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(CoreError::Config(format!(
                "chunk size must be between 1 and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.delimiter == '"' || self.delimiter == '\n' || self.delimiter == '\r' {
            return Err(CoreError::Config(format!(
                "delimiter {:?} is not usable",
                self.delimiter
            )));
        }
        Ok(())
    }
}

/// Parse a delimiter setting: a single character, or `tab`.
pub fn parse_delimiter(value: &str) -> Result<char, CoreError> {
    if value.eq_ignore_ascii_case("tab") || value == "\\t" {
        return Ok('\t');
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(CoreError::Config(format!(
            "delimiter must be a single character, got '{value}'"
        ))),
    }
}

/// Parse a lookback setting: a number of days, or `all`.
pub fn parse_lookback(value: &str) -> Result<Option<u32>, CoreError> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    parse_number("IMPORT_DEDUP_LOOKBACK_DAYS", value).map(Some)
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, CoreError> {
    value
        .parse()
        .map_err(|_| CoreError::Config(format!("{name} must be a non-negative integer, got '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, CoreError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Config(format!("{name} must be a boolean, got '{value}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<PipelineConfig, CoreError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(from_vars(&[]).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = from_vars(&[
            ("IMPORT_DELIMITER", "tab"),
            ("IMPORT_CHUNK_SIZE", "1000"),
            ("IMPORT_DEDUP_LOOKBACK_DAYS", "all"),
            ("IMPORT_SHORT_ROW_TOLERANCE", "0"),
            ("IMPORT_MISSING_DATE_POLICY", "run_date"),
            ("IMPORT_PERSIST_REJECTED_ROWS", "false"),
            ("IMPORT_FLUSH_ROWS_ON_FAILURE", "yes"),
            ("IMPORT_SERIALIZE_RUNS", "1"),
        ])
        .unwrap();

        assert_eq!(config.delimiter, '\t');
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.dedup_lookback_days, None);
        assert_eq!(config.short_row_tolerance, 0);
        assert_eq!(config.missing_date_policy, MissingDatePolicy::UseRunDate);
        assert!(!config.persist_rejected_rows);
        assert!(config.flush_rows_on_failure);
        assert!(config.serialize_runs);
    }

    #[test]
    fn rejects_out_of_range_chunk_size() {
        assert_matches!(from_vars(&[("IMPORT_CHUNK_SIZE", "0")]), Err(CoreError::Config(_)));
        assert_matches!(from_vars(&[("IMPORT_CHUNK_SIZE", "4001")]), Err(CoreError::Config(_)));
        assert!(from_vars(&[("IMPORT_CHUNK_SIZE", "4000")]).is_ok());
    }

    #[test]
    fn rejects_malformed_values() {
        assert_matches!(from_vars(&[("IMPORT_DELIMITER", ";;")]), Err(CoreError::Config(_)));
        assert_matches!(from_vars(&[("IMPORT_DEDUP_LOOKBACK_DAYS", "-1")]), Err(CoreError::Config(_)));
        assert_matches!(from_vars(&[("IMPORT_MISSING_DATE_POLICY", "today")]), Err(CoreError::Config(_)));
        assert_matches!(from_vars(&[("IMPORT_SERIALIZE_RUNS", "maybe")]), Err(CoreError::Config(_)));
    }
}
