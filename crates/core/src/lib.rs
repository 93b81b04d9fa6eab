//! Pure domain logic for access-event imports: reading and repairing
//! badge-reader exports, normalizing fields, detecting duplicates and
//! building batch insert statements. No database, no async, no I/O.

pub mod batch_sql;
pub mod dedup;
pub mod error;
pub mod header;
pub mod import_status;
pub mod normalize;
pub mod outcome;
pub mod paging;
pub mod preview;
pub mod reader;
pub mod types;
pub mod validation;
