//! Access event model.

use accesslog_core::dedup::DedupKey;
use accesslog_core::types::{DbId, Timestamp};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `access_events` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccessEvent {
    pub id: DbId,
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
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AccessEvent {
    pub fn key(&self) -> DedupKey {
        DedupKey {
            badge_number: self.badge_number.clone(),
            event_date: self.event_date,
            event_time: self.event_time,
            event_type: self.event_type.clone(),
        }
    }
}

/// The dedup key columns of an `access_events` row.
#[derive(Debug, Clone, FromRow)]
pub struct AccessEventKey {
    pub badge_number: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub event_type: String,
}

impl From<AccessEventKey> for DedupKey {
    fn from(row: AccessEventKey) -> Self {
        DedupKey {
            badge_number: row.badge_number,
            event_date: row.event_date,
            event_time: row.event_time,
            event_type: row.event_type,
        }
    }
}
