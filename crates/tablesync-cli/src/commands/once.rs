use tablesync_core::SyncSettings;

use crate::commands::common::{format_report_line, open_worker};
use crate::error::CliError;

pub async fn run_once(settings: SyncSettings, as_json: bool) -> Result<(), CliError> {
    let worker = open_worker(settings).await?;
    let report = worker.run_once().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report_line(&report));
    }
    Ok(())
}
