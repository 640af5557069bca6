use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::linkage::projection::DEFAULT_PUBLICATION_DAY;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the linkage service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let ansi = env::var("APP_LOG_ANSI")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, ansi },
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Calculation engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Last day of the month on which the previous month's figure is still unpublished.
    pub publication_day: u32,
    pub lookup_timeout: Option<Duration>,
    /// CSV file (`index_type,date,value[,source]`) seeding the in-memory index store.
    pub index_data_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            publication_day: DEFAULT_PUBLICATION_DAY,
            lookup_timeout: None,
            index_data_path: None,
        }
    }
}

impl EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let publication_day = match env::var("LINKAGE_PUBLICATION_DAY") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|day| (1..=28).contains(day))
                .ok_or(ConfigError::InvalidPublicationDay(raw))?,
            Err(_) => DEFAULT_PUBLICATION_DAY,
        };

        let lookup_timeout = match env::var("LINKAGE_LOOKUP_TIMEOUT_MS") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .map(Duration::from_millis)
                    .ok_or(ConfigError::InvalidLookupTimeout(raw))?,
            ),
            Err(_) => None,
        };

        let index_data_path = env::var("INDEX_DATA_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            publication_day,
            lookup_timeout,
            index_data_path,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPublicationDay(String),
    InvalidLookupTimeout(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPublicationDay(value) => write!(
                f,
                "LINKAGE_PUBLICATION_DAY must be a day between 1 and 28 (got '{value}')"
            ),
            ConfigError::InvalidLookupTimeout(value) => write!(
                f,
                "LINKAGE_LOOKUP_TIMEOUT_MS must be a positive number of milliseconds (got '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidPublicationDay(_)
            | ConfigError::InvalidLookupTimeout(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_ANSI",
            "LINKAGE_PUBLICATION_DAY",
            "LINKAGE_LOOKUP_TIMEOUT_MS",
            "INDEX_DATA_CSV",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn reads_engine_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LINKAGE_PUBLICATION_DAY", "20");
        env::set_var("LINKAGE_LOOKUP_TIMEOUT_MS", "250");
        env::set_var("INDEX_DATA_CSV", "data/indices.csv");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.engine.publication_day, 20);
        assert_eq!(config.engine.lookup_timeout, Some(Duration::from_millis(250)));
        assert_eq!(
            config.engine.index_data_path,
            Some(PathBuf::from("data/indices.csv"))
        );
        reset_env();
    }

    #[test]
    fn rejects_publication_day_past_february() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LINKAGE_PUBLICATION_DAY", "31");
        match AppConfig::load() {
            Err(ConfigError::InvalidPublicationDay(value)) => assert_eq!(value, "31"),
            other => panic!("expected publication day error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }
}
