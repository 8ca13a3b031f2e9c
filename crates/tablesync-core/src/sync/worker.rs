//! The sync loop
//!
//! Each cycle runs inside one target transaction. An empty target is
//! bootstrapped with every source row; otherwise the cursor (the latest
//! replicated update time) selects the source rows to classify and apply.
//! Nothing but the two tables is persisted, so a failed or interrupted cycle
//! is simply recomputed by the next one.

use std::marker::PhantomData;
use std::time::Instant;

use chrono::{DateTime, Utc};
use libsql::Connection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::classify::classify;
use super::executor::{ExecutionPath, UpsertExecutor};
use crate::columns::VersionedRow;
use crate::config::SyncOptions;
use crate::db::{Database, SourceStore, StoreTransaction, TargetStore};
use crate::error::Result;
use crate::models::UserProfile;

/// Which branch a cycle took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// The target was empty; every source row was copied
    Bootstrap,
    /// Only rows updated after the cursor were considered
    Incremental,
}

/// Summary of one committed cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub mode: SyncMode,
    /// Cursor the candidates were selected with; `None` when bootstrapping
    pub cursor: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub path: ExecutionPath,
    pub elapsed_ms: u64,
}

/// Run one cycle for row type `T`, committing or rolling back the target
pub async fn run_cycle<T: VersionedRow>(
    source: &Connection,
    target: &Connection,
    options: &SyncOptions,
) -> Result<CycleReport> {
    let started = Instant::now();
    let tx = StoreTransaction::begin(target).await?;

    match sync_within::<T>(source, tx.connection(), options).await {
        Ok(mut report) => {
            tx.commit().await?;
            report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                "Sync cycle ({:?}, {:?}) committed: {} candidates, {} inserted, {} updated, {} unchanged in {}ms",
                report.mode,
                report.path,
                report.candidates,
                report.inserted,
                report.updated,
                report.unchanged,
                report.elapsed_ms
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!("Rollback after failed sync cycle also failed: {rollback_error}");
            }
            tracing::error!(
                "Sync cycle failed after {}ms and was rolled back: {e}",
                started.elapsed().as_millis()
            );
            Err(e)
        }
    }
}

async fn sync_within<T: VersionedRow>(
    source: &Connection,
    target: &Connection,
    options: &SyncOptions,
) -> Result<CycleReport> {
    let source = SourceStore::<T>::new(source);
    let target = TargetStore::<T>::new(target);
    let executor = UpsertExecutor::new(&target, *options);

    let Some(cursor) = target.cursor().await? else {
        let rows = source.all().await?;
        tracing::debug!("Target is empty, bootstrapping {} rows", rows.len());
        let outcome = executor.bootstrap(&rows).await?;
        return Ok(CycleReport {
            mode: SyncMode::Bootstrap,
            cursor: None,
            candidates: rows.len(),
            inserted: outcome.inserted,
            updated: 0,
            unchanged: 0,
            path: outcome.path,
            elapsed_ms: 0,
        });
    };

    let candidates = source.updated_after(cursor).await?;
    tracing::debug!(
        "{} source rows updated after {cursor}",
        candidates.len()
    );
    if candidates.is_empty() {
        return Ok(CycleReport {
            mode: SyncMode::Incremental,
            cursor: Some(cursor),
            candidates: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            path: ExecutionPath::Transactional,
            elapsed_ms: 0,
        });
    }

    let classification = classify(&candidates, &target).await?;
    let outcome = executor.apply(&candidates, &classification).await?;

    Ok(CycleReport {
        mode: SyncMode::Incremental,
        cursor: Some(cursor),
        candidates: candidates.len(),
        inserted: outcome.inserted,
        updated: outcome.updated,
        unchanged: u64::try_from(classification.unchanged).unwrap_or(u64::MAX),
        path: outcome.path,
        elapsed_ms: 0,
    })
}

/// Long-lived worker replicating the table of `T` from one store into another
pub struct SyncWorker<T = UserProfile> {
    source: Database,
    target: Database,
    options: SyncOptions,
    _row: PhantomData<fn() -> T>,
}

impl<T: VersionedRow> SyncWorker<T> {
    /// Create a worker over two opened stores
    ///
    /// The target must already hold the replicated table.
    pub const fn new(source: Database, target: Database, options: SyncOptions) -> Self {
        Self {
            source,
            target,
            options,
            _row: PhantomData,
        }
    }

    pub const fn source(&self) -> &Database {
        &self.source
    }

    pub const fn target(&self) -> &Database {
        &self.target
    }

    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run a single cycle
    pub async fn run_once(&self) -> Result<CycleReport> {
        run_cycle::<T>(
            self.source.connection(),
            self.target.connection(),
            &self.options,
        )
        .await
    }

    /// Run cycles until `cancel` fires or a cycle fails
    ///
    /// Cancellation is observed before each cycle and while sleeping; a
    /// running cycle always finishes. A failed cycle ends the loop with its
    /// error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            "Sync worker started ({} -> {}, every {:?})",
            self.source.location(),
            self.target.location(),
            self.options.interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.run_once().await?;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.options.interval) => {}
            }
        }

        tracing::info!("Sync worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{query, StoreRole, UserProfileRepository};
    use crate::models::now;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn worker(options: SyncOptions) -> SyncWorker {
        let source = Database::open_in_memory(StoreRole::Source).await.unwrap();
        let target = Database::open_in_memory(StoreRole::Target).await.unwrap();
        SyncWorker::new(source, target, options)
    }

    fn repo(worker: &SyncWorker) -> UserProfileRepository<'_> {
        UserProfileRepository::new(worker.source().connection())
    }

    fn target(worker: &SyncWorker) -> TargetStore<'_, UserProfile> {
        TargetStore::new(worker.target().connection())
    }

    /// Profiles updated a minute ago, one millisecond apart, in name order
    fn backdated(names: &[&str]) -> Vec<UserProfile> {
        let base = now() - ChronoDuration::minutes(1);
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut profile = UserProfile::new(*name, format!("{name}@example.com"), "555-0100");
                profile.created_at = base + ChronoDuration::milliseconds(i as i64);
                profile.last_updated_time = profile.created_at;
                profile
            })
            .collect()
    }

    async fn seed(worker: &SyncWorker, count: usize) -> Vec<UserProfile> {
        let names: Vec<String> = (0..count).map(|i| format!("user{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let profiles = backdated(&names);
        repo(worker).create_many(&profiles).await.unwrap();
        profiles
    }

    async fn poison_target(worker: &SyncWorker) {
        worker
            .target()
            .connection()
            .execute(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON user_profile
                 WHEN NEW.name = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poison row'); END",
                (),
            )
            .await
            .unwrap();
    }

    async fn temp_tables(worker: &SyncWorker) -> Option<i64> {
        query::scalar_i64(
            worker.target().connection(),
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table'",
            libsql::params::Params::None,
        )
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bootstrap_small_source_is_transactional() {
        let worker = worker(SyncOptions::default()).await;
        seed(&worker, 5).await;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.mode, SyncMode::Bootstrap);
        assert_eq!(report.path, ExecutionPath::Transactional);
        assert_eq!(report.cursor, None);
        assert_eq!(report.inserted, 5);
        assert_eq!(target(&worker).count().await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bootstrap_threshold_boundary() {
        for (count, expected) in [
            (999, ExecutionPath::Transactional),
            (1000, ExecutionPath::Bulk),
        ] {
            let worker = worker(SyncOptions::default()).await;
            seed(&worker, count).await;

            let report = worker.run_once().await.unwrap();
            assert_eq!(report.path, expected);
            assert_eq!(report.inserted, count as u64);
            assert_eq!(target(&worker).count().await.unwrap(), count as u64);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_of_row_stamped_ahead_still_replicates() {
        let worker = worker(SyncOptions::default()).await;
        let mut ahead = UserProfile::new("Ada", "ada@example.com", "555-0100");
        ahead.last_updated_time = now() + ChronoDuration::seconds(30);
        let stored = repo(&worker).insert(&ahead).await.unwrap();
        worker.run_once().await.unwrap();

        repo(&worker)
            .update(stored.id, "Grace", "grace@example.com", "555-0101")
            .await
            .unwrap();
        let report = worker.run_once().await.unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 0);
        let copy = target(&worker).get(stored.id).await.unwrap().unwrap();
        assert_eq!(copy.name, "Grace");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bootstrap_of_empty_source_stays_in_bootstrap() {
        let worker = worker(SyncOptions::default()).await;

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.mode, SyncMode::Bootstrap);
        assert_eq!(report.candidates, 0);

        seed(&worker, 2).await;
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.mode, SyncMode::Bootstrap);
        assert_eq!(report.inserted, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resync_without_changes_is_a_no_op() {
        let worker = worker(SyncOptions::default()).await;
        seed(&worker, 10).await;

        worker.run_once().await.unwrap();
        let report = worker.run_once().await.unwrap();

        assert_eq!(report.mode, SyncMode::Incremental);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(target(&worker).count().await.unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_updates_after_bootstrap() {
        let worker = worker(SyncOptions::default()).await;
        let seeded = seed(&worker, 5).await;
        worker.run_once().await.unwrap();

        let repo = repo(&worker);
        repo.update(seeded[1].id, "Ada", "ada@example.com", "555-0101")
            .await
            .unwrap();
        repo.update(seeded[3].id, "Grace", "grace@example.com", "555-0103")
            .await
            .unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.mode, SyncMode::Incremental);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.updated, 2);
        assert_eq!(target(&worker).count().await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mutations_converge_on_target() {
        let worker = worker(SyncOptions::default()).await;
        let seeded = seed(&worker, 3).await;
        worker.run_once().await.unwrap();

        let repo = repo(&worker);
        let updated = repo
            .update(seeded[0].id, "Ada Lovelace", "ada@example.com", "555-0199")
            .await
            .unwrap();
        let created = repo
            .create("Grace", "grace@example.com", "555-0200")
            .await
            .unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);

        let target = target(&worker);
        for expected in [updated, created] {
            let copy = target.get(expected.id).await.unwrap().unwrap();
            assert_eq!(copy, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cursor_only_admits_newer_rows() {
        let worker = worker(SyncOptions::default()).await;
        let seeded = seed(&worker, 3).await;
        worker.run_once().await.unwrap();

        let t3 = seeded[2].last_updated_time;
        assert_eq!(target(&worker).cursor().await.unwrap(), Some(t3));

        // Older than the cursor: never considered
        let mut late = backdated(&["late"]).remove(0);
        late.last_updated_time = t3 - ChronoDuration::milliseconds(1);
        repo(&worker).insert(&late).await.unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.cursor, Some(t3));
        assert_eq!(report.candidates, 0);

        let mut newer = backdated(&["newer"]).remove(0);
        newer.last_updated_time = t3 + ChronoDuration::milliseconds(1);
        repo(&worker).insert(&newer).await.unwrap();

        let report = worker.run_once().await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.inserted, 1);
        assert!(target(&worker).get(late.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_incremental_threshold_selects_path() {
        let options = SyncOptions::default().with_bulk_threshold(3);
        let worker = worker(options).await;
        let seeded = seed(&worker, 4).await;
        worker.run_once().await.unwrap();

        let repo = repo(&worker);
        for profile in &seeded[..2] {
            repo.update(profile.id, "changed", "c@example.com", "1")
                .await
                .unwrap();
        }
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.path, ExecutionPath::Transactional);
        assert_eq!(report.updated, 2);

        for profile in &seeded[..3] {
            repo.update(profile.id, "changed again", "c@example.com", "1")
                .await
                .unwrap();
        }
        let report = worker.run_once().await.unwrap();
        assert_eq!(report.path, ExecutionPath::Bulk);
        assert_eq!(report.updated, 3);

        let target = target(&worker);
        for profile in &seeded[..3] {
            let copy = target.get(profile.id).await.unwrap().unwrap();
            assert_eq!(copy.name, "changed again");
        }
        assert_eq!(temp_tables(&worker).await, Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_bootstrap_rolls_back() {
        let worker = worker(SyncOptions::default()).await;
        poison_target(&worker).await;
        let profiles = backdated(&["a", "b", "c", "d", "poison"]);
        repo(&worker).create_many(&profiles).await.unwrap();

        let error = worker.run_once().await.unwrap_err();
        assert!(error.to_string().contains("poison row"));
        assert_eq!(target(&worker).count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_bulk_merge_rolls_back() {
        let worker = worker(SyncOptions::default().with_bulk_threshold(2)).await;
        let seeded = seed(&worker, 1).await;
        worker.run_once().await.unwrap();
        poison_target(&worker).await;

        let repo = repo(&worker);
        repo.update(seeded[0].id, "renamed", "r@example.com", "1")
            .await
            .unwrap();
        repo.create("poison", "p@example.com", "1").await.unwrap();

        assert!(worker.run_once().await.is_err());

        let target = target(&worker);
        assert_eq!(target.count().await.unwrap(), 1);
        let copy = target.get(seeded[0].id).await.unwrap().unwrap();
        assert_eq!(copy.name, "user0");
        assert_eq!(temp_tables(&worker).await, Some(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_stops_when_cancelled_before_first_cycle() {
        let worker = worker(SyncOptions::default()).await;
        seed(&worker, 2).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        worker.run(cancel).await.unwrap();

        assert_eq!(target(&worker).count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_stops_when_cancelled_while_sleeping() {
        let options = SyncOptions::default().with_interval(Duration::from_secs(3600));
        let worker = worker(options).await;
        seed(&worker, 2).await;

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let (result, ()) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(worker.run(cancel), async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                stopper.cancel();
            })
        })
        .await
        .unwrap();

        result.unwrap();
        assert_eq!(target(&worker).count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_returns_cycle_error() {
        let worker = worker(SyncOptions::default()).await;
        poison_target(&worker).await;
        repo(&worker).create("poison", "p@example.com", "1").await.unwrap();

        let result = worker.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
