//! Access-event import pipeline: read, normalize, deduplicate, commit and
//! audit one badge-reader export per run.

pub mod audit;
pub mod committer;
pub mod config;
pub mod export;
pub mod history;
pub mod memory;
pub mod pg_store;
pub mod runner;
pub mod store;

pub use config::PipelineConfig;
pub use runner::{ImportOutcome, ImportPipeline, ImportRequest, PipelineError};
pub use store::{EventStore, StoreError};
