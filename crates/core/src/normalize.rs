//! Field normalizer: raw record to access event or row error.
//!
//! Pure and side-effect free. Dates arrive in several encodings depending on
//! the export tool and the reader firmware; times are occasionally written
//! with odd separators or out-of-range components. Everything that can be
//! repaired without guessing is repaired and recorded as a [`SoftCorrection`].

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::dedup::DedupKey;
use crate::header::{Column, ColumnMap};
use crate::outcome::{CorrectionKind, RowError, SoftCorrection};
use crate::reader::RawRecord;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Event type stored when the export leaves it empty.
pub const UNKNOWN_EVENT_TYPE: &str = "Unknown";

static DMY_WITH_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})[ T]+(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?(?:[.,]\d+)?$")
        .expect("valid regex")
});
static DMY_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex"));
static YMD_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid regex"));
static DMY_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").expect("valid regex"));
static DMY_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("valid regex"));

static HMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{1,2}):(\d{1,2})(?:[.,]\d+)?$").expect("valid regex")
});
static HM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").expect("valid regex"));
static HM_ANY_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\D+(\d{1,2})(?:\D.*)?$").expect("valid regex"));

/// Date-only formats tried after the known export encodings. Two-digit
/// years go first so `07/04/25` is not read as year 7.
const GENERIC_DATE_FORMATS: &[&str] = &["%d/%m/%y", "%Y/%m/%d", "%Y.%m.%d"];

/// Date-time formats tried after the date-only ones.
const GENERIC_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do with a row whose event date column is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDatePolicy {
    /// Reject the row.
    #[default]
    Reject,
    /// Use the run date and record a soft correction.
    UseRunDate,
}

impl MissingDatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::UseRunDate => "run_date",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reject" => Some(Self::Reject),
            "run_date" => Some(Self::UseRunDate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Calendar date the run executes on; its year bounds event years.
    pub run_date: NaiveDate,
    pub missing_date_policy: MissingDatePolicy,
}

impl NormalizeOptions {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            missing_date_policy: MissingDatePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized event
// ---------------------------------------------------------------------------

/// An access event ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedAccessEvent {
    pub badge_number: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub event_type: String,
    pub controller: Option<String>,
    pub reader: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub status: Option<String>,
    pub group_name: Option<String>,
    pub validity_start_date: Option<NaiveDate>,
    pub badge_created_on: Option<NaiveDate>,
}

impl NormalizedAccessEvent {
    pub fn key(&self) -> DedupKey {
        DedupKey {
            badge_number: self.badge_number.clone(),
            event_date: self.event_date,
            event_time: self.event_time,
            event_type: self.event_type.clone(),
        }
    }
}

/// An accepted row together with the corrections applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub event: NormalizedAccessEvent,
    pub corrections: Vec<SoftCorrection>,
}

// ---------------------------------------------------------------------------
// Date parsing
// ---------------------------------------------------------------------------

/// A parsed date cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: NaiveDate,
    /// Time written in the same cell, if any.
    pub embedded_time: Option<NaiveTime>,
    /// The embedded time was out of range and got clamped.
    pub embedded_time_clamped: bool,
    /// Original year when it was after `max_year` and got clamped.
    pub clamped_from: Option<i32>,
}

/// Parse a date cell in any supported encoding.
///
/// Years after `max_year` are clamped to it; 29 February falls back to the
/// 28th when the clamped year is not a leap year. Impossible dates such as
/// `32/13/2025` return `None`.
pub fn parse_date(value: &str, max_year: i32) -> Option<ParsedDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(caps) = DMY_WITH_TIME.captures(value) {
        let (h, m) = (num(&caps, 4)?, num(&caps, 5)?);
        let s = caps.get(6).map_or(Some(0), |c| c.as_str().parse().ok())?;
        let (time, clamped) = clamp_time(h, m, s);
        let mut parsed = build_date(num(&caps, 3)? as i32, num(&caps, 2)?, num(&caps, 1)?, max_year)?;
        parsed.embedded_time = Some(time);
        parsed.embedded_time_clamped = clamped;
        return Some(parsed);
    }
    if let Some(caps) = DMY_SLASH.captures(value) {
        return build_date(num(&caps, 3)? as i32, num(&caps, 2)?, num(&caps, 1)?, max_year);
    }
    if let Some(caps) = YMD_DASH.captures(value) {
        return build_date(num(&caps, 1)? as i32, num(&caps, 2)?, num(&caps, 3)?, max_year);
    }
    if let Some(caps) = DMY_DASH.captures(value) {
        return build_date(num(&caps, 3)? as i32, num(&caps, 2)?, num(&caps, 1)?, max_year);
    }
    if let Some(caps) = DMY_DOT.captures(value) {
        return build_date(num(&caps, 3)? as i32, num(&caps, 2)?, num(&caps, 1)?, max_year);
    }

    parse_generic(value, max_year)
}

fn parse_generic(value: &str, max_year: i32) -> Option<ParsedDate> {
    let date_only = GENERIC_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|d| (d, None));
    let (date, embedded_time) = date_only.or_else(|| {
        GENERIC_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|dt| (dt.date(), Some(dt.time())))
    })?;

    let mut parsed = build_date(date.year(), date.month(), date.day(), max_year)?;
    parsed.embedded_time = embedded_time;
    Some(parsed)
}

fn build_date(year: i32, month: u32, day: u32, max_year: i32) -> Option<ParsedDate> {
    let original = NaiveDate::from_ymd_opt(year, month, day)?;
    if year <= max_year {
        return Some(ParsedDate {
            date: original,
            embedded_time: None,
            embedded_time_clamped: false,
            clamped_from: None,
        });
    }

    let date = NaiveDate::from_ymd_opt(max_year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(max_year, month, 28))?;
    Some(ParsedDate {
        date,
        embedded_time: None,
        embedded_time_clamped: false,
        clamped_from: Some(year),
    })
}

fn num(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

// ---------------------------------------------------------------------------
// Time parsing
// ---------------------------------------------------------------------------

/// Parse a time cell. Returns the time and the correction applied, if any.
///
/// Unreadable input yields midnight with [`CorrectionKind::TimeDefaulted`].
pub fn parse_time(value: &str) -> (NaiveTime, Option<CorrectionKind>) {
    let value = value.trim();

    let parts = HMS
        .captures(value)
        .and_then(|c| Some((num(&c, 1)?, num(&c, 2)?, num(&c, 3)?)))
        .map(|hms| (hms, None))
        .or_else(|| {
            HM.captures(value)
                .and_then(|c| Some((num(&c, 1)?, num(&c, 2)?, 0)))
                .map(|hms| (hms, None))
        })
        .or_else(|| {
            HM_ANY_SEPARATOR
                .captures(value)
                .and_then(|c| Some((num(&c, 1)?, num(&c, 2)?, 0)))
                .map(|hms| (hms, Some(CorrectionKind::TimeReconstructed)))
        });

    match parts {
        Some(((h, m, s), reconstructed)) => {
            let (time, clamped) = clamp_time(h, m, s);
            let correction = if clamped {
                Some(CorrectionKind::TimeClamped)
            } else {
                reconstructed
            };
            (time, correction)
        }
        None => (NaiveTime::MIN, Some(CorrectionKind::TimeDefaulted)),
    }
}

fn clamp_time(h: u32, m: u32, s: u32) -> (NaiveTime, bool) {
    let (ch, cm, cs) = (h.min(23), m.min(59), s.min(59));
    let time = NaiveTime::from_hms_opt(ch, cm, cs).unwrap_or(NaiveTime::MIN);
    (time, (ch, cm, cs) != (h, m, s))
}

// ---------------------------------------------------------------------------
// Record normalization
// ---------------------------------------------------------------------------

/// Map one repaired record to an access event or a row error.
pub fn normalize_record(
    record: &RawRecord,
    columns: &ColumnMap,
    options: &NormalizeOptions,
) -> Result<Normalized, RowError> {
    let line = record.line_number;
    let badge = record.get(columns, Column::BadgeNumber).map(str::to_string);

    if let Some(defect) = &record.defect {
        return Err(RowError::structural(
            line,
            badge,
            defect.to_string(),
            record.payload(columns),
        ));
    }

    let Some(badge_number) = badge else {
        return Err(RowError::validation(
            line,
            None,
            "missing badge number",
            record.payload(columns),
        ));
    };

    let max_year = options.run_date.year();
    let mut corrections = Vec::new();
    let mut correct = |column: Column, kind: CorrectionKind, original: &str, corrected: String| {
        corrections.push(SoftCorrection {
            line_number: line,
            column,
            kind,
            original: original.to_string(),
            corrected,
        });
    };

    // Event date.
    let date_cell = record.get(columns, Column::EventDate);
    let (event_date, embedded_time) = match date_cell {
        Some(raw) => match parse_date(raw, max_year) {
            Some(parsed) => {
                if parsed.clamped_from.is_some() {
                    correct(
                        Column::EventDate,
                        CorrectionKind::FutureYearClamped,
                        raw,
                        parsed.date.format("%d/%m/%Y").to_string(),
                    );
                }
                (
                    parsed.date,
                    parsed.embedded_time.map(|t| (t, parsed.embedded_time_clamped)),
                )
            }
            None => {
                return Err(RowError::validation(
                    line,
                    Some(badge_number),
                    format!("unparseable event date '{raw}'"),
                    record.payload(columns),
                ));
            }
        },
        None => match options.missing_date_policy {
            MissingDatePolicy::Reject => {
                return Err(RowError::validation(
                    line,
                    Some(badge_number),
                    "missing event date",
                    record.payload(columns),
                ));
            }
            MissingDatePolicy::UseRunDate => {
                correct(
                    Column::EventDate,
                    CorrectionKind::RunDateSubstituted,
                    "",
                    options.run_date.format("%d/%m/%Y").to_string(),
                );
                (options.run_date, None)
            }
        },
    };

    // Event time.
    let event_time = match record.get(columns, Column::EventTime) {
        Some(raw) => {
            let (time, kind) = parse_time(raw);
            if let Some(kind) = kind {
                correct(Column::EventTime, kind, raw, time.format("%H:%M:%S").to_string());
            }
            time
        }
        None => match embedded_time {
            Some((time, clamped)) => {
                let corrected = time.format("%H:%M:%S").to_string();
                if clamped {
                    correct(
                        Column::EventTime,
                        CorrectionKind::TimeClamped,
                        date_cell.unwrap_or_default(),
                        corrected.clone(),
                    );
                }
                correct(Column::EventTime, CorrectionKind::TimeFromDate, "", corrected);
                time
            }
            None => NaiveTime::MIN,
        },
    };

    // Optional dates never reject the row.
    let mut optional_date = |column: Column| -> Option<NaiveDate> {
        let raw = record.get(columns, column)?;
        match parse_date(raw, max_year) {
            Some(parsed) => {
                if parsed.clamped_from.is_some() {
                    correct(
                        column,
                        CorrectionKind::FutureYearClamped,
                        raw,
                        parsed.date.format("%d/%m/%Y").to_string(),
                    );
                }
                Some(parsed.date)
            }
            None => {
                correct(column, CorrectionKind::OptionalDateDropped, raw, String::new());
                None
            }
        }
    };
    let validity_start_date = optional_date(Column::ValidityStartDate);
    let badge_created_on = optional_date(Column::CreationDate);

    let text = |column: Column| record.get(columns, column).map(str::to_string);
    let event = NormalizedAccessEvent {
        badge_number,
        event_date,
        event_time,
        event_type: text(Column::EventType).unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string()),
        controller: text(Column::Controller),
        reader: text(Column::Reader),
        last_name: text(Column::LastName),
        first_name: text(Column::FirstName),
        status: text(Column::Status),
        group_name: text(Column::GroupName),
        validity_start_date,
        badge_created_on,
    };

    Ok(Normalized { event, corrections })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
