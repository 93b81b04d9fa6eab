//! Errors raised by the pure import logic.
//!
//! Row-level problems are not errors here: they travel as
//! [`RowError`](crate::outcome::RowError) values inside a run outcome.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A caller passed values the import logic cannot work with, such as an
    /// empty or oversized insert batch.
    #[error("Invalid import input: {0}")]
    Validation(String),

    /// An `IMPORT_*` setting is missing its expected shape or range.
    #[error("Invalid import configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
