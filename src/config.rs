//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub catalog_timeout: Duration,
    pub default_timer_seconds: u32,
    pub cors_origins: CorsOrigins,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8000".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        let db_acquire_timeout = Duration::from_secs(parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 3)?);
        let catalog_timeout = Duration::from_millis(parse_or(&lookup, "CATALOG_TIMEOUT_MS", 2000)?);

        let default_timer_seconds = parse_or(&lookup, "DEFAULT_TIMER_SECONDS", 10)?;
        crate::game::validate_timer(Some(i64::from(default_timer_seconds)), default_timer_seconds)
            .context("DEFAULT_TIMER_SECONDS out of range")?;

        let cors_origins = parse_cors_origins(&lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string()));

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            db_acquire_timeout,
            catalog_timeout,
            default_timer_seconds,
            cors_origins,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

/// `*` allows any origin, otherwise a comma separated list.
fn parse_cors_origins(value: &str) -> CorsOrigins {
    let value = value.trim();
    if value == "*" {
        return CorsOrigins::Any;
    }
    CorsOrigins::List(
        value
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect(),
    )
}
