//! Periodic retention sweep.
//!
//! Calls [`SessionService::cleanup`] with the configured retention on a fixed
//! interval. A failed sweep is logged and the next tick tries again.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::services::session::SessionService;

pub fn spawn_retention_sweep(sessions: Arc<SessionService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(run(sessions, every))
}

pub async fn run(sessions: Arc<SessionService>, every: Duration) {
    tracing::info!(
        interval_secs = every.as_secs(),
        retention_days = sessions.policy().retention_days,
        "Session retention job started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match sessions.cleanup(None).await {
            Ok(outcome) if outcome.deleted > 0 => {
                tracing::info!(deleted = outcome.deleted, "Session retention: purged old rows");
            }
            Ok(_) => tracing::debug!("Session retention: no rows to purge"),
            Err(e) => tracing::error!(error = %e, "Session retention: cleanup failed"),
        }
    }
}
