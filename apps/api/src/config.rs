//! API server configuration.
//!
//! Loaded from environment variables with fallback to defaults. Engine
//! tuning (retry, sweep, notifications) lives in `comanda.toml`, see
//! [`comanda_engine::EngineConfig`].

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite database file
    pub database_path: PathBuf,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,

    /// Pool size
    pub db_max_connections: u32,

    /// Explicit engine config file; `None` falls back to COMANDA_CONFIG
    /// and then ./comanda.toml
    pub engine_config_path: Option<PathBuf>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = ApiConfig {
            http_port: parse_var("HTTP_PORT", 8080)?,

            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("comanda.db")),

            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "comanda-dev-secret-change-in-production".to_string()),

            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,

            engine_config_path: env::var("COMANDA_CONFIG").ok().map(PathBuf::from),
        };

        if config.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
