use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::AppState;

/// Start the background expiration cleaner task
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.tokens.cleanup_interval_seconds);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_cleanup(&state).await;
        }
    })
}

/// Delete session records past their expiry.
///
/// Lookups already treat these as absent, so a failed pass only delays
/// reclaiming space.
pub async fn run_cleanup(state: &AppState) {
    debug!("Running expiration cleanup");

    let ledger = state.protocol.ledger().clone();
    match tokio::task::spawn_blocking(move || ledger.purge_expired()).await {
        Ok(Ok(count)) if count > 0 => debug!(sessions_cleaned = count, "Expired sessions cleaned"),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %e, "Failed to clean up expired sessions"),
        Err(e) => error!(error = %e, "Expiration cleanup task panicked"),
    }
}
