use std::{sync::Arc, time::Duration};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_backend::{
    background,
    config::Config,
    db::connection::connect_store,
    services::{SecureTokenGenerator, SessionService},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

/// Hides credentials embedded in a connection string.
fn mask_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        database_url = %mask_database_url(&config.database_url),
        jwt_secret = %mask_secret(&config.jwt_secret),
        bind_addr = %config.bind_addr,
        session_default_ttl_minutes = config.session_default_ttl_minutes,
        session_retention_days = config.session_retention_days,
        session_cleanup_interval_minutes = config.session_cleanup_interval_minutes,
        "Loaded configuration from environment/.env"
    );

    let store = connect_store(&config).await?;
    let sessions = SessionService::new(
        store,
        Arc::new(SecureTokenGenerator),
        config.session_policy(),
    );
    let state = AppState::new(sessions, config.clone());

    let sweep = (config.session_cleanup_interval_minutes > 0).then(|| {
        background::spawn_retention_sweep(
            state.sessions.clone(),
            Duration::from_secs(config.session_cleanup_interval_minutes * 60),
        )
    });

    let app = session_backend::app(state);

    tracing::info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweep {
        handle.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
