//! Import run status and run-row kind names.
//!
//! These match the seeded values in the `import_run_statuses` lookup table
//! and the `kind` check constraint on `import_run_rows`.

use serde::{Deserialize, Serialize};

pub const RUN_STATUS_COMPLETED: &str = "completed";
pub const RUN_STATUS_FAILED: &str = "failed";
pub const RUN_STATUS_CANCELLED: &str = "cancelled";

pub const ROW_KIND_DUPLICATE: &str = "duplicate";
pub const ROW_KIND_ERROR: &str = "error";
pub const VALID_ROW_KINDS: &[&str] = &[ROW_KIND_DUPLICATE, ROW_KIND_ERROR];

/// Terminal state of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Return the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => RUN_STATUS_COMPLETED,
            Self::Failed => RUN_STATUS_FAILED,
            Self::Cancelled => RUN_STATUS_CANCELLED,
        }
    }

    /// Parse a status string. Returns `None` for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            RUN_STATUS_COMPLETED => Some(Self::Completed),
            RUN_STATUS_FAILED => Some(Self::Failed),
            RUN_STATUS_CANCELLED => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// All valid status values.
    pub const ALL: &'static [&'static str] =
        &[RUN_STATUS_COMPLETED, RUN_STATUS_FAILED, RUN_STATUS_CANCELLED];
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_round_trip() {
        for name in RunStatus::ALL {
            let status = RunStatus::from_str(name).expect("known status");
            assert_eq!(status.as_str(), *name);
        }
        assert_eq!(RunStatus::from_str("partial"), None);
    }
}
