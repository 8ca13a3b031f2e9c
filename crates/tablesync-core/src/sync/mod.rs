//! Incremental replication engine

mod classify;
mod executor;
mod loader;
mod worker;

pub use classify::{classify, Classification};
pub use executor::{ApplyOutcome, ExecutionPath, UpsertExecutor};
pub use loader::{BulkLoadOptions, BulkLoader, StagingTable};
pub use worker::{run_cycle, CycleReport, SyncMode, SyncWorker};
