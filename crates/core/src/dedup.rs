//! Run-scoped duplicate detection.
//!
//! The detector is seeded with the keys already persisted inside the
//! lookback window and then sees every accepted row of the run in file
//! order. The first occurrence of a key wins; every later occurrence is a
//! duplicate, never an overwrite.

use std::collections::HashMap;

use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Default number of days of stored events loaded for duplicate checks.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Identity of an access event. Two events with equal keys are the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub badge_number: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub event_type: String,
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.badge_number,
            self.event_date.format("%d/%m/%Y"),
            self.event_time.format("%H:%M:%S"),
            self.event_type
        )
    }
}

/// Where the first occurrence of a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOrigin {
    Store,
    Row(usize),
}

/// Outcome of checking one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupCheck {
    /// First time this key is seen; it is now reserved for the row.
    New,
    /// The key is already persisted.
    DuplicateOfStored,
    /// An earlier row of the same file carries the key.
    DuplicateInFile { first_line: usize },
}

impl DedupCheck {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::New)
    }
}

/// Key set for a single run. Owned by the run and dropped with it.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    seen: HashMap<DedupKey, KeyOrigin>,
    stored: usize,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the detector with keys already present in the store.
    pub fn with_stored_keys(keys: impl IntoIterator<Item = DedupKey>) -> Self {
        let seen: HashMap<_, _> = keys.into_iter().map(|k| (k, KeyOrigin::Store)).collect();
        let stored = seen.len();
        Self { seen, stored }
    }

    /// Check `key` for the row starting at `line_number`, reserving it when new.
    pub fn check(&mut self, key: &DedupKey, line_number: usize) -> DedupCheck {
        match self.seen.get(key) {
            Some(KeyOrigin::Store) => DedupCheck::DuplicateOfStored,
            Some(KeyOrigin::Row(first_line)) => DedupCheck::DuplicateInFile {
                first_line: *first_line,
            },
            None => {
                self.seen.insert(key.clone(), KeyOrigin::Row(line_number));
                DedupCheck::New
            }
        }
    }

    /// Number of keys loaded from the store.
    pub fn stored_keys(&self) -> usize {
        self.stored
    }

    /// Number of keys known to the detector, stored and reserved.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// First event date included in the duplicate window, `None` for the whole store.
pub fn lookback_start(run_date: NaiveDate, lookback_days: Option<u32>) -> Option<NaiveDate> {
    lookback_days.map(|days| {
        run_date
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(badge: &str, day: u32) -> DedupKey {
        DedupKey {
            badge_number: badge.to_string(),
            event_date: NaiveDate::from_ymd_opt(2025, 4, day).unwrap(),
            event_time: NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
            event_type: "Entrée".to_string(),
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let mut detector = DuplicateDetector::new();
        assert_eq!(detector.check(&key("1001", 7), 2), DedupCheck::New);
        assert_eq!(
            detector.check(&key("1001", 7), 5),
            DedupCheck::DuplicateInFile { first_line: 2 }
        );
        assert_eq!(
            detector.check(&key("1001", 7), 9),
            DedupCheck::DuplicateInFile { first_line: 2 }
        );
        assert_eq!(detector.len(), 1);
    }

    #[test]
    fn stored_keys_are_duplicates() {
        let mut detector = DuplicateDetector::with_stored_keys([key("1001", 7), key("1002", 7)]);
        assert_eq!(detector.stored_keys(), 2);
        assert!(detector.check(&key("1001", 7), 2).is_duplicate());
        assert_eq!(detector.check(&key("1001", 8), 3), DedupCheck::New);
    }

    #[test]
    fn any_key_component_distinguishes_events() {
        let mut detector = DuplicateDetector::new();
        let base = key("1001", 7);
        let mut other_type = base.clone();
        other_type.event_type = "Sortie".to_string();
        let mut other_time = base.clone();
        other_time.event_time = NaiveTime::from_hms_opt(8, 15, 1).unwrap();

        assert_eq!(detector.check(&base, 2), DedupCheck::New);
        assert_eq!(detector.check(&other_type, 3), DedupCheck::New);
        assert_eq!(detector.check(&other_time, 4), DedupCheck::New);
    }

    #[test]
    fn lookback_window_start() {
        let run_date = NaiveDate::from_ymd_opt(2025, 4, 30).unwrap();
        assert_eq!(
            lookback_start(run_date, Some(DEFAULT_LOOKBACK_DAYS)),
            NaiveDate::from_ymd_opt(2025, 3, 31)
        );
        assert_eq!(lookback_start(run_date, None), None);
    }
}
