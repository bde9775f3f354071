use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub location_queue_size: usize,
    pub pending_poll_interval: Duration,
    pub roster_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            location_queue_size: parse_or_default("LOCATION_QUEUE_SIZE", 1024)?,
            pending_poll_interval: Duration::from_secs(parse_or_default(
                "PENDING_POLL_SECS",
                120,
            )?),
            roster_poll_interval: Duration::from_secs(parse_or_default("ROSTER_POLL_SECS", 60)?),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
