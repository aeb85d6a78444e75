//! Configuration for the SQL graph catalog
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file, falling back to local-development defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::data::CoreError;

/// Which [`GraphStore`](crate::traits::GraphStore) backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Neo4j,
}

impl FromStr for StoreBackend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "neo4j" => Ok(StoreBackend::Neo4j),
            other => Err(CoreError::Internal(format!("Unsupported graph store backend: {}", other))),
        }
    }
}

/// Configuration for the Neo4j connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub pool_size: usize,
    pub connection_retry_count: u32,
    pub connection_retry_delay: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "password".to_string(),
            database: None,
            pool_size: 10,
            connection_retry_count: 3,
            connection_retry_delay: Duration::from_secs(2),
        }
    }
}

impl Neo4jConfig {
    /// Reads `NEO4J_URI`, `NEO4J_USERNAME`, `NEO4J_PASSWORD`, `NEO4J_DATABASE`
    /// and `NEO4J_POOL_SIZE` on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(uri) = env::var("NEO4J_URI") {
            config.uri = uri;
        }
        if let Ok(username) = env::var("NEO4J_USERNAME") {
            config.username = username;
        }
        if let Ok(password) = env::var("NEO4J_PASSWORD") {
            config.password = password;
        }
        config.database = env::var("NEO4J_DATABASE").ok().filter(|db| !db.is_empty());
        if let Some(pool_size) = parse_var::<usize>("NEO4J_POOL_SIZE") {
            config.pool_size = pool_size;
        }

        config
    }
}

/// Top-level configuration shared by the CLI and the API server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default = "default_backend")]
    pub store: StoreBackend,

    #[serde(default)]
    pub neo4j: Neo4jConfig,

    /// Address the API server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origin allowed by the API server's CORS layer
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// How many documents `regenerate_all` processes at once
    #[serde(default = "default_regenerate_concurrency")]
    pub regenerate_concurrency: usize,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:4200".to_string()
}

fn default_regenerate_concurrency() -> usize {
    4
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            store: default_backend(),
            neo4j: Neo4jConfig::default(),
            bind_addr: default_bind_addr(),
            cors_origin: default_cors_origin(),
            regenerate_concurrency: default_regenerate_concurrency(),
        }
    }
}

impl KbConfig {
    /// Load configuration from `.env` and environment variables
    pub fn load() -> Result<Self, CoreError> {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    /// Build configuration from the current environment only
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self {
            neo4j: Neo4jConfig::from_env(),
            ..Self::default()
        };

        if let Ok(store) = env::var("SQLGRAPH_STORE") {
            config.store = store.parse()?;
        }
        if let Ok(bind_addr) = env::var("SQLGRAPH_BIND_ADDR") {
            config.bind_addr = bind_addr;
        }
        if let Ok(origin) = env::var("SQLGRAPH_CORS_ORIGIN") {
            config.cors_origin = origin;
        }
        if let Some(concurrency) = parse_var::<usize>("SQLGRAPH_REGENERATE_CONCURRENCY") {
            config.regenerate_concurrency = concurrency.max(1);
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid {} value: {}", name, raw);
            None
        }
    }
}
