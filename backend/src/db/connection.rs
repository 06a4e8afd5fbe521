use std::{sync::Arc, time::Duration};

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{
    config::Config,
    repositories::{MemorySessionStore, PgSessionStore, SessionStore},
};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Builds the store named by `DATABASE_URL`, running migrations for Postgres.
pub async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    if config.uses_memory_store() {
        tracing::warn!("Using in-memory session store; sessions are lost on restart");
        return Ok(Arc::new(MemorySessionStore::new()));
    }

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Arc::new(PgSessionStore::new(pool)))
}
