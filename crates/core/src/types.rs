/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Initiator recorded on runs started without a user identity.
pub const SYSTEM_INITIATOR: &str = "system";
