use anyhow::{anyhow, Context};
use std::{env, net::SocketAddr, str::FromStr};

use crate::services::session::SessionPolicy;

/// Store selector meaning "keep sessions in process memory".
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub session_default_ttl_minutes: i64,
    pub session_retention_days: i64,
    pub session_page_size_default: i64,
    pub session_page_size_max: i64,
    /// Zero disables the background retention sweep.
    pub session_cleanup_interval_minutes: u64,
    pub cors_allow_origins: Vec<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| MEMORY_DATABASE_URL.to_string());

        let jwt_secret = lookup("JWT_SECRET")
            .unwrap_or_else(|| "your-secret-key-change-this-in-production".to_string());

        let bind_addr: SocketAddr =
            parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let session_default_ttl_minutes: i64 = parse_or(&lookup, "SESSION_DEFAULT_TTL_MINUTES", 1440)?;
        let session_retention_days: i64 = parse_or(&lookup, "SESSION_RETENTION_DAYS", 30)?;
        let session_page_size_default: i64 = parse_or(&lookup, "SESSION_PAGE_SIZE_DEFAULT", 20)?;
        let session_page_size_max: i64 = parse_or(&lookup, "SESSION_PAGE_SIZE_MAX", 100)?;
        let session_cleanup_interval_minutes: u64 =
            parse_or(&lookup, "SESSION_CLEANUP_INTERVAL_MINUTES", 0)?;

        if session_default_ttl_minutes <= 0 {
            return Err(anyhow!("SESSION_DEFAULT_TTL_MINUTES must be positive"));
        }
        if session_retention_days < 0 {
            return Err(anyhow!("SESSION_RETENTION_DAYS must not be negative"));
        }
        if session_page_size_default <= 0 || session_page_size_max < session_page_size_default {
            return Err(anyhow!(
                "SESSION_PAGE_SIZE_DEFAULT must be positive and not exceed SESSION_PAGE_SIZE_MAX"
            ));
        }

        let cors_allow_origins = lookup("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url,
            jwt_secret,
            bind_addr,
            session_default_ttl_minutes,
            session_retention_days,
            session_page_size_default,
            session_page_size_max,
            session_cleanup_interval_minutes,
            cors_allow_origins,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            default_ttl_minutes: self.session_default_ttl_minutes,
            retention_days: self.session_retention_days,
            default_page_size: self.session_page_size_default,
            max_page_size: self.session_page_size_max,
            ..SessionPolicy::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        _ => Ok(default),
    }
}
