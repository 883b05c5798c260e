//! Staff assignment rotation
//!
//! When the customer does not pin a staff member, assignment spreads load:
//! eligible staff bucket by current same-day booking load, the lowest
//! bucket sorts by stable id, and the starting index rotates on a
//! monotonically increasing counter per `(location, service set, day)`.
//!
//! The counter lives in the shared store so rotation stays fair across
//! processes. The in-process fallback exists because fairness here is
//! best-effort, not a correctness guarantee.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use deadpool_redis::Pool;
use sha2::{Digest, Sha256};

/// Counter retention; rotation keys are per-day so anything older is dead.
const COUNTER_TTL_SECS: u64 = 2 * 24 * 3600;

/// Load-based round-robin staff selector.
pub struct StaffRotator {
    pool: Option<Pool>,
    key_prefix: String,
    local: Mutex<HashMap<String, u64>>,
}

impl StaffRotator {
    /// Shared-store backed rotator. Pass `None` to run with the
    /// process-local counter only.
    pub fn new(pool: Option<Pool>, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Rotation counter key for one `(location, service set, day)`.
    ///
    /// The service set digests order-independently so `[a, b]` and
    /// `[b, a]` rotate together.
    pub fn rotation_key(&self, location_id: &str, service_ids: &[String], day: NaiveDate) -> String {
        let mut sorted: Vec<&String> = service_ids.iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        for id in sorted {
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        let digest = format!("{:x}", hasher.finalize());

        format!(
            "{}:rot:{}:{}:{}",
            self.key_prefix,
            location_id,
            &digest[..16],
            day
        )
    }

    /// Pick one staff member from `candidates` given their same-day loads.
    ///
    /// Returns `None` when there are no candidates. Deterministic for a
    /// fixed counter value.
    pub async fn select(
        &self,
        location_id: &str,
        service_ids: &[String],
        day: NaiveDate,
        candidates: &[String],
        loads: &HashMap<String, i64>,
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        // Lowest-load bucket, stable order
        let min_load = candidates
            .iter()
            .map(|id| loads.get(id).copied().unwrap_or(0))
            .min()?;
        let mut bucket: Vec<&String> = candidates
            .iter()
            .filter(|id| loads.get(*id).copied().unwrap_or(0) == min_load)
            .collect();
        bucket.sort();

        let key = self.rotation_key(location_id, service_ids, day);
        let counter = self.next_counter(&key).await;
        let index = (counter as usize) % bucket.len();
        Some(bucket[index].clone())
    }

    /// Monotonically increasing counter for a rotation key. Starts at 0.
    async fn next_counter(&self, key: &str) -> u64 {
        if let Some(pool) = &self.pool {
            match self.shared_counter(pool, key).await {
                Ok(value) => return value,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "shared rotation counter unavailable, using local fallback");
                }
            }
        }
        self.local_counter(key)
    }

    async fn shared_counter(&self, pool: &Pool, key: &str) -> crate::error::Result<u64> {
        let mut conn = pool.get().await?;
        let value: u64 = redis::cmd("INCR").arg(key).query_async(&mut *conn).await?;
        let _: () = redis::cmd("EXPIRE")
            .arg(key)
            .arg(COUNTER_TTL_SECS)
            .query_async(&mut *conn)
            .await?;
        // INCR starts at 1; rotation indexes from 0
        Ok(value.saturating_sub(1))
    }

    fn local_counter(&self, key: &str) -> u64 {
        let mut counters = self.local.lock().unwrap();
        let entry = counters.entry(key.to_string()).or_insert(0);
        let value = *entry;
        *entry += 1;
        value
    }
}
