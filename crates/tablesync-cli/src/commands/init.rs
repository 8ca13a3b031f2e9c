use tablesync_core::{Database, StoreRole, SyncSettings};

use crate::error::CliError;

/// Create the replicated table in both stores
///
/// Only missing objects are created, so running it twice is harmless.
pub async fn run_init(settings: &SyncSettings) -> Result<(), CliError> {
    Database::open_prepared(&settings.source, StoreRole::Source).await?;
    println!("Prepared source {}", settings.source);

    Database::open_prepared(&settings.target, StoreRole::Target).await?;
    println!("Prepared target {}", settings.target);
    Ok(())
}
