use std::str::FromStr;

use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use thiserror::Error;

pub mod players;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} env var not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid database url: {0}")]
    Url(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDbConfig {
    /// File path or `sqlite:` url. `:memory:` opens a private in-memory database.
    pub url: String,
    pub max_connections: u32,
}

impl PlayerDbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            url: ":memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let url =
            std::env::var("GOGO_PLAYER_DB").map_err(|_| ConfigError::Missing("GOGO_PLAYER_DB"))?;
        let max_connections = match std::env::var("GOGO_PLAYER_DB_MAX_CONNECTIONS") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "GOGO_PLAYER_DB_MAX_CONNECTIONS",
                value,
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            url,
            max_connections,
        })
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

pub fn create_player_db_pool(config: &PlayerDbConfig) -> Result<Pool<Sqlite>, ConfigError> {
    let conn_options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections.max(1));
    if config.is_memory() {
        // Every connection to `:memory:` is its own database, keep the only one alive.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    Ok(pool_options.connect_lazy_with(conn_options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config() {
        let config = PlayerDbConfig::in_memory();
        assert!(config.is_memory());
        assert_eq!(config.max_connections, 1);
        assert!(!PlayerDbConfig::new("data/players.db").is_memory());
    }

    #[tokio::test]
    async fn test_lazy_pool_connects_on_use() {
        let pool = create_player_db_pool(&PlayerDbConfig::in_memory()).unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
    }
}
