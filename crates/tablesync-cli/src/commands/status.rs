use tablesync_core::db::{SourceStore, TargetStore};
use tablesync_core::{Database, SyncSettings, UserProfile};

use crate::commands::common::{format_status_lines, StatusReport};
use crate::error::CliError;

pub async fn run_status(settings: &SyncSettings, as_json: bool) -> Result<(), CliError> {
    let status = collect_status(settings).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn collect_status(settings: &SyncSettings) -> Result<StatusReport, CliError> {
    let source_db = Database::open(&settings.source).await?;
    let target_db = Database::open(&settings.target).await?;
    let source = SourceStore::<UserProfile>::new(source_db.connection());
    let target = TargetStore::<UserProfile>::new(target_db.connection());

    Ok(StatusReport {
        source: settings.source.to_string(),
        target: settings.target.to_string(),
        source_rows: source.count().await?,
        target_rows: target.count().await?,
        cursor: target.cursor().await?,
    })
}
