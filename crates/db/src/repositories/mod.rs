//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool`, or `&mut PgConnection` when the call must join a
//! caller-owned transaction.

pub mod access_event_repo;
pub mod import_run_repo;
pub mod import_run_row_repo;

pub use access_event_repo::AccessEventRepo;
pub use import_run_repo::ImportRunRepo;
pub use import_run_row_repo::ImportRunRowRepo;
