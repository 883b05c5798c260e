//! Token-guarded slot holds backed by Redis
//!
//! A hold is a short-lived soft reservation created when a customer selects
//! a slot, closing the display-to-purchase race window. Holds are advisory:
//! the booking claim's unique constraint is the durable serialization
//! point.
//!
//! Failure semantics are fail-closed throughout: if the shared store is
//! unreachable, a hold is treated as not acquired, never as acquired.

use chrono::{Duration, Utc};
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::Script;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Hold, SlotKey};

/// Hold manager configuration.
#[derive(Debug, Clone)]
pub struct HoldConfig {
    /// Redis URL (e.g. redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Hold lifetime in seconds (default: 5 minutes)
    pub ttl_secs: u64,

    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            ttl_secs: 300,
            key_prefix: "tempora".to_string(),
        }
    }
}

impl HoldConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            ttl_secs: std::env::var("HOLD_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            key_prefix: std::env::var("HOLD_KEY_PREFIX").unwrap_or_else(|_| "tempora".to_string()),
        }
    }
}

// Delete-only-on-token-match; a plain GET + DEL would race a concurrent
// expiry-and-reacquire and delete someone else's hold.
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed hold manager.
///
/// Constructed with [`HoldManager::connect`] when Redis is required, or
/// [`HoldManager::connect_or_degraded`] to run fail-closed without it.
pub struct HoldManager {
    pool: Option<Pool>,
    config: HoldConfig,
}

impl HoldManager {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(config: &HoldConfig) -> Result<Self> {
        let pool_config = PoolConfig::from_url(&config.url);
        let pool = pool_config
            .builder()
            .map_err(|e| crate::error::Error::config(format!("failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| crate::error::Error::config(format!("failed to create Redis pool: {e}")))?;

        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %config.url, "Connected to Redis hold store");

        Ok(Self {
            pool: Some(pool),
            config: config.clone(),
        })
    }

    /// Connect if possible, otherwise run degraded: every acquire is a
    /// fail-closed "not acquired".
    pub async fn connect_or_degraded(config: &HoldConfig) -> Self {
        match Self::connect(config).await {
            Ok(manager) => manager,
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, holds degraded to fail-closed");
                Self {
                    pool: None,
                    config: config.clone(),
                }
            }
        }
    }

    /// Whether the shared store is reachable at all.
    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Share the underlying pool with other shared-store consumers
    /// (rotation counters).
    pub fn shared_pool(&self) -> Option<Pool> {
        self.pool.clone()
    }

    pub fn config(&self) -> &HoldConfig {
        &self.config
    }

    fn hold_key(&self, slot_key: &SlotKey) -> String {
        format!("{}:hold:{}", self.config.key_prefix, slot_key.encode())
    }

    fn meta_key(&self, slot_key: &SlotKey) -> String {
        format!("{}:holdmeta:{}", self.config.key_prefix, slot_key.encode())
    }

    /// Atomically acquire a hold on a slot key.
    ///
    /// A single `SET NX PX` against the store; there is no check-then-set
    /// window for two concurrent callers to slip through. Returns `None`
    /// when the slot is already held, and also `None` (fail-closed, with a
    /// warning) when the store is unreachable.
    pub async fn acquire(&self, slot_key: &SlotKey) -> Option<Hold> {
        let ttl = Duration::seconds(self.config.ttl_secs as i64);
        let token = Uuid::new_v4().to_string();

        match self.try_acquire(slot_key, &token).await {
            Ok(true) => Some(Hold {
                slot_key: slot_key.clone(),
                token,
                expires_at: Utc::now() + ttl,
            }),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(slot_key = %slot_key, error = %e, "hold store unreachable, treating as not acquired");
                None
            }
        }
    }

    async fn try_acquire(&self, slot_key: &SlotKey, token: &str) -> Result<bool> {
        let Some(pool) = &self.pool else {
            return Ok(false);
        };
        let mut conn = pool.get().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.hold_key(slot_key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.config.ttl_secs * 1000)
            .query_async(&mut *conn)
            .await?;

        Ok(reply.is_some())
    }

    /// True only if the stored token matches and the hold has not expired.
    pub async fn verify(&self, slot_key: &SlotKey, token: &str) -> bool {
        let Some(pool) = &self.pool else {
            return false;
        };
        let result: Result<Option<String>> = async {
            let mut conn = pool.get().await?;
            let stored: Option<String> = redis::cmd("GET")
                .arg(self.hold_key(slot_key))
                .query_async(&mut *conn)
                .await?;
            Ok(stored)
        }
        .await;

        match result {
            Ok(Some(stored)) => stored == token,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(slot_key = %slot_key, error = %e, "hold verify failed");
                false
            }
        }
    }

    /// Release a hold. Deletes only on token match; a mismatched token
    /// never mutates state.
    pub async fn release(&self, slot_key: &SlotKey, token: &str) -> bool {
        let Some(pool) = &self.pool else {
            return false;
        };
        let result: Result<i64> = async {
            let mut conn = pool.get().await?;
            let deleted: i64 = Script::new(RELEASE_SCRIPT)
                .key(self.hold_key(slot_key))
                .arg(token)
                .invoke_async(&mut *conn)
                .await?;
            Ok(deleted)
        }
        .await;

        match result {
            Ok(deleted) => deleted > 0,
            Err(e) => {
                tracing::warn!(slot_key = %slot_key, error = %e, "hold release failed");
                false
            }
        }
    }

    /// Best-effort display cache for the held slot's descriptor. Never a
    /// source of truth for conflict detection.
    pub async fn store_metadata<T: Serialize + Sync>(&self, slot_key: &SlotKey, descriptor: &T) {
        let Some(pool) = &self.pool else {
            return;
        };
        let result: Result<()> = async {
            let payload = serde_json::to_vec(descriptor)?;
            let mut conn = pool.get().await?;
            let _: () = redis::cmd("SET")
                .arg(self.meta_key(slot_key))
                .arg(payload)
                .arg("EX")
                .arg(self.config.ttl_secs)
                .query_async(&mut *conn)
                .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(slot_key = %slot_key, error = %e, "failed to cache hold metadata");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot_key() -> SlotKey {
        SlotKey::new(
            "downtown",
            "alice",
            Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = HoldConfig::default();
        assert_eq!(config.ttl_secs, 300);
        assert_eq!(config.key_prefix, "tempora");
    }

    #[test]
    fn test_key_namespacing() {
        let manager = HoldManager {
            pool: None,
            config: HoldConfig::default(),
        };
        let key = manager.hold_key(&slot_key());
        assert!(key.starts_with("tempora:hold:v1:downtown:alice:"));
        assert_ne!(manager.hold_key(&slot_key()), manager.meta_key(&slot_key()));
    }

    #[tokio::test]
    async fn test_degraded_manager_fails_closed() {
        let manager = HoldManager {
            pool: None,
            config: HoldConfig::default(),
        };

        // Unreachable store: never acquired, never verified, never released
        assert!(manager.acquire(&slot_key()).await.is_none());
        assert!(!manager.verify(&slot_key(), "token").await);
        assert!(!manager.release(&slot_key(), "token").await);
        assert!(!manager.is_available());
    }

    // Integration tests require running Redis
    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_acquire_twice_yields_one_token() {
        let manager = HoldManager::connect(&HoldConfig::default()).await.unwrap();
        let key = slot_key();

        let first = manager.acquire(&key).await;
        assert!(first.is_some());

        let second = manager.acquire(&key).await;
        assert!(second.is_none());

        // Cleanup
        assert!(manager.release(&key, &first.unwrap().token).await);
    }

    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_release_requires_matching_token() {
        let manager = HoldManager::connect(&HoldConfig::default()).await.unwrap();
        let key = slot_key();

        let hold = manager.acquire(&key).await.unwrap();

        assert!(!manager.release(&key, "wrong-token").await);
        assert!(manager.verify(&key, &hold.token).await);
        assert!(manager.release(&key, &hold.token).await);
        assert!(!manager.verify(&key, &hold.token).await);
    }

    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_hold_expires() {
        let config = HoldConfig {
            ttl_secs: 1,
            ..HoldConfig::default()
        };
        let manager = HoldManager::connect(&config).await.unwrap();
        let key = slot_key();

        assert!(manager.acquire(&key).await.is_some());
        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

        // TTL elapsed: a new acquire succeeds
        let again = manager.acquire(&key).await.unwrap();
        assert!(manager.release(&key, &again.token).await);
    }
}
