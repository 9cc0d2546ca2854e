use std::env;
use std::str::FromStr;

use dotenv::dotenv;
use thiserror::Error;
use tracing::warn;

const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Absent means the tag cache runs in-process instead of on Redis.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub pool_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Ok(Config {
            database_url: require("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").ok(),
            jwt_secret: require("JWT_SECRET")?,
            pool_size: try_load("DATABASE_POOL_SIZE", DEFAULT_POOL_SIZE),
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn try_load<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Err(_) => default,
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("invalid {key} value {raw:?}, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_load_falls_back_on_garbage() {
        env::set_var("CONDUIT_TEST_POOL_SIZE", "not-a-number");
        assert_eq!(try_load("CONDUIT_TEST_POOL_SIZE", 10u32), 10);
        env::set_var("CONDUIT_TEST_POOL_SIZE", "32");
        assert_eq!(try_load("CONDUIT_TEST_POOL_SIZE", 10u32), 32);
        env::remove_var("CONDUIT_TEST_POOL_SIZE");
    }
}
