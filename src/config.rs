use crate::error::ConfigError;
use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_exp_seconds: u64,
    /// When set, the event bus is backed by this NATS server instead of
    /// in-process dispatch.
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;
        let jwt_secret = require("JWT_SECRET")?;

        let jwt_exp_seconds = match env::var("JWT_EXP_SECONDS") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidVar("JWT_EXP_SECONDS", value))?,
            Err(_) => 3600,
        };

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("APP_PORT").unwrap_or_else(|_| "8000".to_string());
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::InvalidVar("APP_HOST/APP_PORT", format!("{host}:{port}")))?;

        let nats_url = env::var("NATS_URL").ok().filter(|url| !url.is_empty());

        Ok(Config {
            database_url,
            bind_addr,
            jwt_secret,
            jwt_exp_seconds,
            nats_url,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}
