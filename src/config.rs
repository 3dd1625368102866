use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, Result};
use tracing::info;

pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub pharmacy_display_name: String,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Loads the service configuration from the environment.
pub fn load() -> Result<Config> {
    Ok(Config {
        server: ServerConfig {
            host: try_load("SERVER_HOST", "0.0.0.0")?,
            port: try_load("SERVER_PORT", "3000")?,
        },
        database: DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "10")?,
        },
        auth: AuthConfig {
            jwt_secret: required("JWT_SECRET")?,
        },
        pharmacy_display_name: try_load("PHARMACY_DISPLAY_NAME", "Pharmacy")?,
    })
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("Environment variable {key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}"))
}
