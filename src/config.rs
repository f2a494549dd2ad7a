//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::aggregate::SystemConfig;
use crate::audit::sha256_hex;
use crate::domain::{Balance, ExchangeRate};

const DEV_ADMIN_API_KEY: &str = "dev-admin-key";
const DEV_SERVICE_API_KEY: &str = "dev-service-key";

/// Where the economy document lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::InvalidValue("STORE_BACKEND")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,

    /// Database connection URL, required for the postgres backend
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// sha256 of the key granting admin permission
    pub admin_key_hash: String,

    /// sha256 of the key granting user permission
    pub service_key_hash: String,

    /// Configuration a fresh economy starts with
    pub seed: SystemConfig,

    pub scheduler_enabled: bool,
    pub scheduler_interval_secs: u64,

    /// Emit JSON log lines
    pub log_json: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    var_or(name, default)
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = var_or("ENVIRONMENT", "development");
        let is_production = environment == "production";

        let store_backend: StoreBackend = var_or("STORE_BACKEND", "postgres").parse()?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let api_key = |name: &'static str, dev_default: &str| -> Result<String, ConfigError> {
            match env::var(name) {
                Ok(key) if !key.trim().is_empty() => Ok(sha256_hex(key.trim())),
                _ if is_production => Err(ConfigError::MissingEnv(name)),
                _ => {
                    tracing::warn!("{} not set, using development default", name);
                    Ok(sha256_hex(dev_default))
                }
            }
        };
        let admin_key_hash = api_key("ADMIN_API_KEY", DEV_ADMIN_API_KEY)?;
        let service_key_hash = api_key("SERVICE_API_KEY", DEV_SERVICE_API_KEY)?;

        let rate: Decimal = parse_var("INITIAL_EXCHANGE_RATE", "100")?;
        let default_points: Decimal = parse_var("DEFAULT_POINTS", "0")?;
        let seed = SystemConfig {
            exchange_rate: ExchangeRate::new(rate)
                .map_err(|_| ConfigError::InvalidValue("INITIAL_EXCHANGE_RATE"))?,
            default_points: Balance::new(default_points)
                .map_err(|_| ConfigError::InvalidValue("DEFAULT_POINTS"))?,
            ..SystemConfig::default()
        };

        let scheduler_interval_secs: u64 = parse_var("SCHEDULER_INTERVAL_SECS", "60")?;
        if scheduler_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("SCHEDULER_INTERVAL_SECS"));
        }

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            host: var_or("HOST", "127.0.0.1"),
            port: parse_var("PORT", "3000")?,
            environment,
            admin_key_hash,
            service_key_hash,
            seed,
            scheduler_enabled: parse_var("SCHEDULER_ENABLED", "true")?,
            scheduler_interval_secs,
            log_json: var_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
