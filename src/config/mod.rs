//! Configuration management for the booking engine
//!
//! Configuration layers: built-in defaults, an optional TOML file, then
//! environment variable overrides for deployment-specific values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::availability::{EngineConfig, OptimizerConfig};
use crate::booking::{ClaimPolicy, PgStoreConfig};
use crate::hold::HoldConfig;
use crate::notifications::WebhookConfig;
use crate::schedule::ResolverConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (holds + rotation counters)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Availability engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Schedule resolver configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Smart slot optimizer configuration
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Claim lifecycle policy
    #[serde(default)]
    pub claims: ClaimPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional booking event webhook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,

    /// Collaborator fixture file (demo/one-shot deployments)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures_path: Option<PathBuf>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. 127.0.0.1:8080
    pub bind_address: String,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            enable_cors: false,
            enable_request_logging: true,
        }
    }
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/tempora".to_string(),
            pool_size: 10,
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection string
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,

    /// Hold lifetime in seconds
    pub hold_ttl_secs: u64,

    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            hold_ttl_secs: 300,
            key_prefix: "tempora".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            engine: EngineConfig::default(),
            resolver: ResolverConfig::default(),
            optimizer: OptimizerConfig::default(),
            claims: ClaimPolicy::default(),
            logging: LoggingConfig::default(),
            webhook: None,
            fixtures_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment
    /// overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("TEMPORA_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Ok(url) = std::env::var("DATABASE_URL").or_else(|_| std::env::var("POSTGRES_URL")) {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(ttl) = env_parse("TEMPORA_HOLD_TTL_SECS") {
            self.redis.hold_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("TEMPORA_CLAIM_TTL_SECS") {
            self.claims.claim_ttl_secs = ttl;
        }
        if let Some(granularity) = env_parse("TEMPORA_GRANULARITY_MIN") {
            self.engine.default_granularity_min = granularity;
        }
        if let Ok(level) = std::env::var("TEMPORA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TEMPORA_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(path) = std::env::var("TEMPORA_FIXTURES") {
            self.fixtures_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("TEMPORA_WEBHOOK_URL") {
            self.webhook = Some(WebhookConfig::new(url));
        }
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid bind address '{}'", self.server.bind_address))?;

        anyhow::ensure!(self.database.pool_size > 0, "database pool size must be > 0");
        anyhow::ensure!(self.redis.pool_size > 0, "redis pool size must be > 0");
        anyhow::ensure!(self.redis.hold_ttl_secs > 0, "hold TTL must be > 0");
        anyhow::ensure!(self.claims.claim_ttl_secs > 0, "claim TTL must be > 0");
        anyhow::ensure!(
            (1..=240).contains(&self.engine.default_granularity_min),
            "default granularity must be within 1..=240 minutes"
        );
        anyhow::ensure!(
            self.optimizer
                .fine_granularity_min(self.engine.default_granularity_min)
                .is_some(),
            "granularity divisor {} must evenly divide the default granularity {}",
            self.optimizer.granularity_divisor,
            self.engine.default_granularity_min
        );

        if let Some(webhook) = &self.webhook {
            webhook.validate().map_err(anyhow::Error::msg)?;
        }

        Ok(())
    }

    /// Hold manager configuration derived from the redis section
    pub fn hold_config(&self) -> HoldConfig {
        HoldConfig {
            url: self.redis.url.clone(),
            pool_size: self.redis.pool_size,
            ttl_secs: self.redis.hold_ttl_secs,
            key_prefix: self.redis.key_prefix.clone(),
        }
    }

    /// Booking store configuration derived from the database section
    pub fn pg_config(&self) -> PgStoreConfig {
        PgStoreConfig::default().with_database_url(&self.database.url)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
