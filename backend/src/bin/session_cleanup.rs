use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_backend::{
    config::Config,
    db::connection::connect_store,
    services::{SecureTokenGenerator, SessionService},
};

/// One retention sweep with `SESSION_RETENTION_DAYS`, then exit.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    if config.uses_memory_store() {
        tracing::warn!("DATABASE_URL is not set; nothing to clean in a fresh in-memory store");
    }
    let store = connect_store(&config).await?;
    let sessions = SessionService::new(
        store,
        Arc::new(SecureTokenGenerator),
        config.session_policy(),
    );

    let outcome = sessions.cleanup(None).await?;
    tracing::info!(
        deleted = outcome.deleted,
        threshold = %outcome.threshold,
        "Deleted expired sessions"
    );

    Ok(())
}
