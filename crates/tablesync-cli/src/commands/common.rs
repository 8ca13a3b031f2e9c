use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tablesync_core::sync::{CycleReport, ExecutionPath, SyncMode};
use tablesync_core::{Database, StoreRole, SyncSettings, SyncWorker};

use crate::cli::StoreArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub source: String,
    pub target: String,
    pub source_rows: u64,
    pub target_rows: u64,
    pub cursor: Option<DateTime<Utc>>,
}

/// Settings from the process environment, with `args` taking precedence
pub fn resolve_settings(args: &StoreArgs) -> Result<SyncSettings, CliError> {
    let settings = SyncSettings::from_env_with(|name| flag_value(args, name))?;
    settings.options.validate()?;
    Ok(settings)
}

/// The flag standing in for environment variable `name`, if given
pub fn flag_value(args: &StoreArgs, name: &str) -> Option<String> {
    match name {
        "TABLESYNC_SOURCE_URL" => args.source.clone(),
        "TABLESYNC_TARGET_URL" => args.target.clone(),
        "TABLESYNC_SOURCE_AUTH_TOKEN" => args.source_auth_token.clone(),
        "TABLESYNC_TARGET_AUTH_TOKEN" => args.target_auth_token.clone(),
        "TABLESYNC_INTERVAL_SECS" => args.interval_secs.map(|secs| secs.to_string()),
        "TABLESYNC_BULK_THRESHOLD" => args.bulk_threshold.map(|rows| rows.to_string()),
        "TABLESYNC_BULK_BATCH_SIZE" => args.bulk_batch_size.map(|rows| rows.to_string()),
        _ => None,
    }
}

/// Open both stores for syncing
///
/// The target table is created when missing; the source is never modified.
pub async fn open_worker(settings: SyncSettings) -> Result<SyncWorker, CliError> {
    let source = Database::open(&settings.source).await?;
    let target = Database::open_prepared(&settings.target, StoreRole::Target).await?;
    Ok(SyncWorker::new(source, target, settings.options))
}

pub fn format_report_line(report: &CycleReport) -> String {
    let mode = match report.mode {
        SyncMode::Bootstrap => "bootstrap",
        SyncMode::Incremental => "incremental",
    };
    let path = match report.path {
        ExecutionPath::Transactional => "transactional",
        ExecutionPath::Bulk => "bulk",
    };
    let cursor = report
        .cursor
        .map_or_else(|| "-".to_string(), format_timestamp);
    format!(
        "{mode} cycle ({path}): {} candidates, {} inserted, {} updated, {} unchanged, cursor {cursor}, {}ms",
        report.candidates, report.inserted, report.updated, report.unchanged, report.elapsed_ms
    )
}

pub fn format_status_lines(status: &StatusReport) -> Vec<String> {
    vec![
        format!("source  {}  {} rows", status.source, status.source_rows),
        format!("target  {}  {} rows", status.target, status.target_rows),
        format!(
            "cursor  {}",
            status
                .cursor
                .map_or_else(|| "none (next cycle bootstraps)".to_string(), format_timestamp)
        ),
    ]
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
