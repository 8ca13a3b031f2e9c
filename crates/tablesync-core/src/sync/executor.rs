//! Applying classified rows to the target
//!
//! Small batches are written row by row. Batches at or above the bulk
//! threshold are loaded into a staging table and merged with one statement.
//! Either way the caller's transaction is the only commit point.

use serde::Serialize;
use tokio::time::timeout;

use super::classify::Classification;
use super::loader::{BulkLoadOptions, BulkLoader, StagingTable};
use crate::columns::{VersionPolicy, VersionedRow};
use crate::config::SyncOptions;
use crate::db::TargetStore;
use crate::error::{Error, Result};

/// How a batch is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// One statement per row
    Transactional,
    /// Bulk load, then a set-based merge
    Bulk,
}

impl ExecutionPath {
    /// Bulk at or above `threshold` rows, transactional below
    pub const fn for_batch(rows: usize, threshold: usize) -> Self {
        if rows >= threshold {
            Self::Bulk
        } else {
            Self::Transactional
        }
    }
}

/// What one apply wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub path: ExecutionPath,
    pub inserted: u64,
    pub updated: u64,
}

/// Writes candidate rows to the target table of `T`
pub struct UpsertExecutor<'s, 'c, T> {
    target: &'s TargetStore<'c, T>,
    options: SyncOptions,
}

impl<'s, 'c, T: VersionedRow> UpsertExecutor<'s, 'c, T> {
    pub const fn new(target: &'s TargetStore<'c, T>, options: SyncOptions) -> Self {
        Self { target, options }
    }

    /// Copy `rows` into an empty target
    ///
    /// The bulk path loads straight into the destination table.
    pub async fn bootstrap(&self, rows: &[T]) -> Result<ApplyOutcome> {
        let path = ExecutionPath::for_batch(rows.len(), self.options.bulk_threshold);
        if rows.is_empty() {
            return Ok(ApplyOutcome {
                path,
                inserted: 0,
                updated: 0,
            });
        }

        let inserted = match path {
            ExecutionPath::Bulk => {
                self.loader()
                    .load_batch(rows, T::TABLE, VersionPolicy::Replicated)
                    .await?
            }
            ExecutionPath::Transactional => {
                for row in rows {
                    self.target.insert(row).await?;
                }
                rows.len() as u64
            }
        };

        Ok(ApplyOutcome {
            path,
            inserted,
            updated: 0,
        })
    }

    /// Write the rows `classification` marks as new or stale
    ///
    /// `candidates` is the batch `classification` was computed from. The bulk
    /// path merges the whole batch; rows that were already current are
    /// rewritten with identical values.
    pub async fn apply(
        &self,
        candidates: &[T],
        classification: &Classification<'_, T>,
    ) -> Result<ApplyOutcome> {
        let path = ExecutionPath::for_batch(candidates.len(), self.options.bulk_threshold);
        match path {
            ExecutionPath::Transactional => {
                for row in &classification.to_insert {
                    self.target.insert(row).await?;
                }
                for row in &classification.to_update {
                    self.target.update(row).await?;
                }
            }
            ExecutionPath::Bulk => self.merge(candidates).await?,
        }

        Ok(ApplyOutcome {
            path,
            inserted: classification.to_insert.len() as u64,
            updated: classification.to_update.len() as u64,
        })
    }

    /// Stage `rows` and upsert them into the target in one statement
    async fn merge(&self, rows: &[T]) -> Result<()> {
        let conn = self.target.connection();
        let staging = StagingTable::create::<T>(
            conn,
            VersionPolicy::Replicated,
            self.options.command_timeout,
        )
        .await?;

        let merged = self.load_and_merge(rows, staging.name()).await;
        let released = staging.release().await;

        let merged = merged?;
        released?;
        tracing::debug!("Merged {merged} staged rows into {}", T::TABLE);
        Ok(())
    }

    async fn load_and_merge(&self, rows: &[T], staging: &str) -> Result<u64> {
        self.loader()
            .load_batch(rows, staging, VersionPolicy::Replicated)
            .await?;

        let sql = self.target.layout().upsert_from_sql(staging)?;
        let merged = timeout(
            self.options.command_timeout,
            self.target.connection().execute(&sql, ()),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "merge",
            after: self.options.command_timeout,
        })??;
        Ok(merged)
    }

    fn loader(&self) -> BulkLoader<'c> {
        BulkLoader::new(
            self.target.connection(),
            BulkLoadOptions::from(&self.options),
        )
    }
}
