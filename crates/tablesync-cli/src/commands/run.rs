use tablesync_core::SyncSettings;
use tokio_util::sync::CancellationToken;

use crate::commands::common::open_worker;
use crate::error::CliError;

/// Host the worker until Ctrl-C or a failed cycle
pub async fn run_worker(settings: SyncSettings) -> Result<(), CliError> {
    let worker = open_worker(settings).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current cycle");
            on_interrupt.cancel();
        }
    });

    worker.run(cancel).await?;
    Ok(())
}
