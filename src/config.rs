//! Environment-driven configuration for the scheduling server.
//!
//! `DATABASE_URL` is the only required variable; the rest fall back to
//! development defaults so a local run needs nothing beyond a database.

use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Lifetime of newly issued session tokens, also applied on refresh.
    pub session_ttl_hours: i64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let bind_addr = env_or("BIND_ADDR", "127.0.0.1:8080");
        let session_ttl_hours = env_or("SESSION_TTL_HOURS", "24")
            .parse::<i64>()
            .unwrap_or(24);

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
        })
    }
}
