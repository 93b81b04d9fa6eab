//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! database row and, where the table is written to, a create DTO.

pub mod access_event;
pub mod import_run;
pub mod import_run_row;
