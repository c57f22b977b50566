use std::time::Duration;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub request_timeout_secs: u64,
    /// Upper bound on a single fan-out write before the recipient is pruned.
    pub write_timeout_ms: u64,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Capacity of the shared work queue feeding the dispatch loop.
    pub dispatch_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            database_url: "sqlite://holler.db?mode=rwc".to_string(),
            db_max_connections: 20,
            db_min_connections: 1,
            request_timeout_secs: 30,
            write_timeout_ms: 2000,
            outbound_buffer: 64,
            dispatch_queue: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Config::default();

        Ok(Config {
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_var("SERVER_PORT", defaults.server_port)?,
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", defaults.db_min_connections)?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            write_timeout_ms: parse_var("WRITE_TIMEOUT_MS", defaults.write_timeout_ms)?,
            outbound_buffer: parse_var("OUTBOUND_BUFFER", defaults.outbound_buffer)?,
            dispatch_queue: parse_var("DISPATCH_QUEUE", defaults.dispatch_queue)?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
