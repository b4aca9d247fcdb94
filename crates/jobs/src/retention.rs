//! Periodic trimming of terminal job history.
//!
//! Runs on its own timer, decoupled from the worker's poll loop, and keeps
//! only the newest `keep_per_app` completed/failed jobs for each app.

use std::sync::Arc;
use std::time::Duration;

use shipyard_db::store::JobStore;
use tokio_util::sync::CancellationToken;

/// Default number of terminal jobs kept per app.
pub const DEFAULT_KEEP_PER_APP: i64 = 20;

/// How often the cleanup job runs.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn JobStore>,
    keep_per_app: i64,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        keep_per_app,
        interval_secs = interval.as_secs(),
        "Job retention task started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = ticker.tick() => {
                match store.trim_terminal(keep_per_app).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Job retention: trimmed old jobs");
                    }
                    Ok(_) => {
                        tracing::debug!("Job retention: nothing to trim");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Job retention: cleanup failed");
                    }
                }
            }
        }
    }
}
