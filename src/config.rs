use chrono::Utc;

use crate::error::{AppError, Result};

/// Timezone that decides which calendar day "today" is. Server and clients
/// must agree on it, so it is fixed rather than taken from the host.
pub const GAME_TIMEZONE: Utc = Utc;

/// Identity used when the auth layer supplies no user id or username.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Ticker shown alongside the model prediction.
pub const DEFAULT_SYMBOL: &str = "NVDA";

/// Leaderboard size when the caller does not ask for one.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 20;

/// Upper bound on a caller-requested leaderboard size.
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Request latency histogram bounds in microseconds (1us to 100s).
pub const LATENCY_MIN_US: u64 = 1;
pub const LATENCY_MAX_US: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Config(format!(
                "STORE_BACKEND must be 'sqlite' or 'memory', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Where predictions and guesses live (STORE_BACKEND)
    pub store_backend: StoreBackend,
    /// Ticker reported by GET /today (GAME_SYMBOL)
    pub symbol: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "guesses.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            store_backend: std::env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "sqlite".to_string())
                .parse::<StoreBackend>()?,
            symbol: std::env::var("GAME_SYMBOL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
    }

    #[test]
    fn unknown_store_backend_is_config_error() {
        let err = "dynamo".parse::<StoreBackend>().unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {err:?}");
    }
}
