//! tablesync-core - Core library for tablesync
//!
//! This crate contains the replicated row model, the column metadata that
//! drives statement building, libSQL store access, and the incremental sync
//! engine that keeps a clone table eventually consistent with its source.

pub mod columns;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use config::{ConfigError, StoreLocation, SyncOptions, SyncSettings};
pub use db::{Database, StoreRole, UserProfileRepository};
pub use error::{Error, Result};
pub use models::{RowId, RowVersion, UserProfile};
pub use sync::{CycleReport, ExecutionPath, SyncMode, SyncWorker};
