use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// One year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub session_key: String,
    pub session_ttl_minutes: i64,
    pub password_pepper: String,
    /// Reject bearer tokens that are not the latest one persisted on the user.
    pub enforce_latest_token: bool,
    /// Ledger gateway base URL. Without one an in-process ledger is used.
    pub ledger_url: Option<String>,
    pub ledger_timeout_secs: u64,
    pub ledger_starting_balance: u64,
    pub store_wallet_address: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://storefront.db".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            db_min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 1)?,
            db_acquire_timeout_secs: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            session_key: required(&lookup, "SESSION_KEY")?,
            session_ttl_minutes: parse_or(&lookup, "SESSION_TTL_MINUTES", 5)?,
            password_pepper: required(&lookup, "PASSWORD_PEPPER")?,
            enforce_latest_token: parse_or(&lookup, "ENFORCE_LATEST_TOKEN", false)?,
            ledger_url: lookup("LEDGER_URL").filter(|url| !url.trim().is_empty()),
            ledger_timeout_secs: parse_or(&lookup, "LEDGER_TIMEOUT_SECS", 10)?,
            ledger_starting_balance: parse_or(&lookup, "LEDGER_STARTING_BALANCE", 10_000)?,
            store_wallet_address: lookup("STORE_WALLET_ADDRESS")
                .filter(|address| !address.trim().is_empty()),
        };

        if config.ledger_url.is_some() && config.store_wallet_address.is_none() {
            return Err(AppError::Config(
                "STORE_WALLET_ADDRESS is required when LEDGER_URL is set".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&config.session_ttl_minutes) {
            return Err(AppError::Config(format!(
                "SESSION_TTL_MINUTES must be between 1 and {}",
                MAX_SESSION_TTL_MINUTES
            )));
        }

        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes)
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Config(format!("{} must be set", key)))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
