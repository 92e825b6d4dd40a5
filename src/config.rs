//! Process configuration, read from the environment.

use std::env;

use anyhow::{bail, Context};
use time::Duration;

use crate::db::MEMORY_URL;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 12;
const PRODUCTION: &str = "production";

#[derive(Debug, Clone)]
pub struct Config {
    /// A PostgreSQL URL, or `memory` to keep everything in process; it
    /// must be set either way
    pub database_url: String,
    pub token_secret: String,
    pub token_lifetime: Duration,
    pub port: u16,
    /// Whether this is a production deployment, which hides internal error details
    pub production: bool,
    /// The only origin allowed to make cross-origin requests, if set
    pub cors_origin: Option<String>,
}

impl Config {
    /// Loads `.env` if present, then reads every setting from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads every setting through `lookup`, which maps a variable name to
    /// its value if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .with_context(|| {
                format!(
                    "`DATABASE_URL` not set; use a PostgreSQL URL, or `{}` for a throwaway in-memory store",
                    MEMORY_URL
                )
            })?;
        let token_secret = lookup("TOKEN_SECRET").context("`TOKEN_SECRET` not set")?;
        if token_secret.trim().is_empty() {
            bail!("`TOKEN_SECRET` must not be empty");
        }

        let token_ttl_hours = match lookup("TOKEN_TTL_HOURS") {
            Some(hours) => hours
                .parse::<i64>()
                .context("`TOKEN_TTL_HOURS` must be a whole number of hours")?,
            None => DEFAULT_TOKEN_TTL_HOURS,
        };
        let port = match lookup("PORT") {
            Some(port) => port.parse().context("`PORT` must be a port number")?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            token_secret,
            token_lifetime: Duration::hours(token_ttl_hours),
            port,
            production: lookup("APP_ENV").map_or(false, |app_env| app_env == PRODUCTION),
            cors_origin: lookup("CORS_ORIGIN").filter(|origin| !origin.is_empty()),
        })
    }
}
