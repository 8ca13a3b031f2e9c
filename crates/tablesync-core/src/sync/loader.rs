//! Bulk loading of row batches and cycle-scoped staging tables

use std::time::{Duration, Instant};

use libsql::Connection;
use tokio::time::timeout;
use uuid::Uuid;

use crate::columns::{TableLayout, TableRow, VersionPolicy};
use crate::config::{SyncOptions, DEFAULT_BULK_BATCH_SIZE, DEFAULT_BULK_TIMEOUT};
use crate::db::query::positional;
use crate::error::{Error, Result};

/// `SQLite`'s compiled-in limit on bound parameters per statement
const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Flush size and deadline of one bulk load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLoadOptions {
    /// Rows per `INSERT` statement, before clamping to the parameter limit
    pub batch_size: usize,
    /// Deadline for the whole load
    pub timeout: Duration,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BULK_BATCH_SIZE,
            timeout: DEFAULT_BULK_TIMEOUT,
        }
    }
}

impl From<&SyncOptions> for BulkLoadOptions {
    fn from(options: &SyncOptions) -> Self {
        Self {
            batch_size: options.bulk_batch_size,
            timeout: options.bulk_timeout,
        }
    }
}

/// Writes whole batches with multi-row `INSERT` statements
pub struct BulkLoader<'a> {
    conn: &'a Connection,
    options: BulkLoadOptions,
}

impl<'a> BulkLoader<'a> {
    pub const fn new(conn: &'a Connection, options: BulkLoadOptions) -> Self {
        Self { conn, options }
    }

    /// Load every row into `destination`, returning the number of rows written
    ///
    /// Columns are resolved from `T` under `policy`; an empty batch is
    /// rejected. The caller owns the surrounding transaction.
    pub async fn load_batch<T: TableRow>(
        &self,
        rows: &[T],
        destination: &str,
        policy: VersionPolicy,
    ) -> Result<u64> {
        let layout = TableLayout::for_batch(rows, policy)?;
        let started = Instant::now();

        let loaded = timeout(self.options.timeout, self.write(&layout, rows, destination))
            .await
            .map_err(|_| Error::Timeout {
                operation: "bulk load",
                after: self.options.timeout,
            })??;

        tracing::debug!(
            "Bulk loaded {loaded} rows into {destination} in {}ms",
            started.elapsed().as_millis()
        );
        Ok(loaded)
    }

    async fn write<T: TableRow>(
        &self,
        layout: &TableLayout,
        rows: &[T],
        destination: &str,
    ) -> Result<u64> {
        let mut loaded = 0;
        let columns = destination_columns(layout);
        for chunk in rows.chunks(rows_per_statement(self.options.batch_size, layout.len())) {
            let sql = format!(
                "INSERT INTO {destination} ({columns}) VALUES {}",
                layout.values_placeholders(chunk.len())
            );
            let params = chunk
                .iter()
                .flat_map(|row| layout.row_values(row))
                .collect::<Vec<_>>();
            loaded += self.conn.execute(&sql, positional(params)).await?;
        }
        Ok(loaded)
    }
}

/// Destination column list, in the order values are projected from each row
fn destination_columns(layout: &TableLayout) -> String {
    layout
        .mappings()
        .iter()
        .map(|mapping| mapping.destination)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rows per statement so that `columns` values per row stay within the parameter limit
fn rows_per_statement(batch_size: usize, columns: usize) -> usize {
    let by_parameters = MAX_BOUND_PARAMETERS / columns.max(1);
    batch_size.min(by_parameters).max(1)
}

/// A `TEMP` table shaped like a destination table, alive for one cycle
///
/// Must be ended with [`release`](Self::release), which drops it.
pub struct StagingTable<'a> {
    conn: &'a Connection,
    name: String,
    released: bool,
}

impl<'a> StagingTable<'a> {
    /// Create an empty staging table with the resolved columns of `T`
    pub async fn create<T: TableRow>(
        conn: &'a Connection,
        policy: VersionPolicy,
        command_timeout: Duration,
    ) -> Result<Self> {
        let name = format!("staging_{}", Uuid::now_v7().simple());
        let layout = TableLayout::of::<T>(policy);
        let sql = format!("CREATE TEMP TABLE {name} AS {} LIMIT 0", layout.select_sql());

        timeout(command_timeout, conn.execute(&sql, ()))
            .await
            .map_err(|_| Error::Timeout {
                operation: "staging table creation",
                after: command_timeout,
            })??;

        tracing::debug!("Created staging table {name}");
        Ok(Self {
            conn,
            name,
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop the table
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS temp.{}", self.name), ())
            .await?;
        tracing::debug!("Dropped staging table {}", self.name);
        Ok(())
    }
}

impl Drop for StagingTable<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Staging table {} dropped without release", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{query, Database, StoreRole};
    use crate::models::{RowVersion, UserProfile};
    use pretty_assertions::assert_eq;

    fn profiles(count: usize) -> Vec<UserProfile> {
        (0..count)
            .map(|i| {
                let mut profile = UserProfile::new(format!("user {i}"), "x@example.com", "1");
                profile.row_version = RowVersion::new([0, 0, 0, 0, 0, 0, 0, 1]);
                profile
            })
            .collect()
    }

    async fn temp_tables(conn: &Connection) -> i64 {
        query::scalar_i64(
            conn,
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table'",
            libsql::params::Params::None,
        )
        .await
        .unwrap()
        .unwrap_or(0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_batch_into_destination() {
        let db = Database::open_in_memory(StoreRole::Target).await.unwrap();
        let loader = BulkLoader::new(
            db.connection(),
            BulkLoadOptions {
                batch_size: 7,
                ..BulkLoadOptions::default()
            },
        );

        let rows = profiles(20);
        let loaded = loader
            .load_batch(&rows, "user_profile", VersionPolicy::Replicated)
            .await
            .unwrap();

        assert_eq!(loaded, 20);
        assert_eq!(
            query::count_rows(db.connection(), "user_profile")
                .await
                .unwrap(),
            20
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_empty_batch_fails_fast() {
        let db = Database::open_in_memory(StoreRole::Target).await.unwrap();
        let loader = BulkLoader::new(db.connection(), BulkLoadOptions::default());

        let result = loader
            .load_batch::<UserProfile>(&[], "user_profile", VersionPolicy::Replicated)
            .await;
        assert!(matches!(result, Err(Error::EmptyBatch("user_profile"))));
    }

    #[test]
    fn test_destination_columns_follow_mappings() {
        let layout = TableLayout::of::<UserProfile>(VersionPolicy::StoreGenerated);
        assert_eq!(
            destination_columns(&layout),
            "id, name, email, phone, created_at, last_updated_time"
        );
    }

    #[test]
    fn test_rows_per_statement_respects_parameter_limit() {
        assert_eq!(rows_per_statement(2000, 7), 2000);
        assert_eq!(rows_per_statement(100_000, 7), MAX_BOUND_PARAMETERS / 7);
        assert!(rows_per_statement(100_000, 7) * 7 <= MAX_BOUND_PARAMETERS);
        assert_eq!(rows_per_statement(0, 7), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_staging_table_is_shaped_and_dropped() {
        let db = Database::open_in_memory(StoreRole::Target).await.unwrap();
        let conn = db.connection();

        let staging =
            StagingTable::create::<UserProfile>(conn, VersionPolicy::Replicated, Duration::from_secs(5))
                .await
                .unwrap();
        assert!(staging.name().starts_with("staging_"));
        assert_eq!(temp_tables(conn).await, 1);

        let loader = BulkLoader::new(conn, BulkLoadOptions::default());
        let loaded = loader
            .load_batch(&profiles(3), staging.name(), VersionPolicy::Replicated)
            .await
            .unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(query::count_rows(conn, staging.name()).await.unwrap(), 3);
        assert_eq!(query::count_rows(conn, "user_profile").await.unwrap(), 0);

        staging.release().await.unwrap();
        assert_eq!(temp_tables(conn).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_staging_names_are_unique() {
        let db = Database::open_in_memory(StoreRole::Target).await.unwrap();
        let conn = db.connection();
        let timeout = Duration::from_secs(5);

        let first = StagingTable::create::<UserProfile>(conn, VersionPolicy::Replicated, timeout)
            .await
            .unwrap();
        let second = StagingTable::create::<UserProfile>(conn, VersionPolicy::Replicated, timeout)
            .await
            .unwrap();
        assert_ne!(first.name(), second.name());

        first.release().await.unwrap();
        second.release().await.unwrap();
    }
}
