//! PostgreSQL booking store
//!
//! The production [`BookingStore`]: the claim row's unique constraint on
//! `(location_id, slot_key)` is the durable serialization point, and the
//! appointment plus its items commit in the same transaction as the claim
//! confirmation. The insert-first, conflict-then-read ordering is load
//! bearing; reversing it reintroduces the check-then-act race the claim
//! exists to close.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Appointment, AppointmentItem, CustomerDetails, TimeInterval};

use super::store::{
    confirmation_code, BookingOutcome, BookingStore, ClaimPolicy, NewAppointment,
};

/// PostgreSQL store configuration.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Connection pool size
    pub pool_size: usize,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/tempora".to_string(),
            pool_size: 10,
        }
    }
}

impl PgStoreConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("POSTGRES_URL"))
            .unwrap_or_else(|_| "postgresql://localhost/tempora".to_string());

        let pool_size = std::env::var("DB_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Self {
            database_url,
            pool_size,
        }
    }

    pub fn with_database_url(mut self, url: &str) -> Self {
        self.database_url = url.to_string();
        self
    }
}

/// PostgreSQL implementation of [`BookingStore`].
pub struct PgBookingStore {
    pool: Pool,
}

impl PgBookingStore {
    /// Connect and verify the connection.
    pub async fn new(config: &PgStoreConfig) -> Result<Self> {
        let mut pool_config = PoolConfig::new();
        pool_config.url = Some(config.database_url.clone());
        pool_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::config(format!("failed to create PostgreSQL pool: {e}")))?;

        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;

        tracing::info!("Connected to PostgreSQL booking store");

        Ok(Self { pool })
    }

    /// Create the booking schema idempotently.
    pub async fn init_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS booking_claims (
                    id UUID PRIMARY KEY,
                    location_id TEXT NOT NULL,
                    slot_key TEXT NOT NULL,
                    idempotency_key TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    expires_at TIMESTAMPTZ NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    UNIQUE (location_id, slot_key)
                );

                CREATE INDEX IF NOT EXISTS idx_booking_claims_expiry
                    ON booking_claims(location_id, status, expires_at);

                CREATE TABLE IF NOT EXISTS appointments (
                    id UUID PRIMARY KEY,
                    location_id TEXT NOT NULL,
                    slot_key TEXT NOT NULL,
                    staff_id TEXT NOT NULL,
                    customer_name TEXT NOT NULL,
                    customer_email TEXT,
                    customer_phone TEXT,
                    consents JSONB NOT NULL DEFAULT '[]',
                    confirmation_code TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'confirmed',
                    idempotency_key TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_idempotency
                    ON appointments(location_id, idempotency_key)
                    WHERE idempotency_key IS NOT NULL;

                CREATE TABLE IF NOT EXISTS appointment_items (
                    id UUID PRIMARY KEY,
                    appointment_id UUID NOT NULL REFERENCES appointments(id) ON DELETE CASCADE,
                    service_id TEXT NOT NULL,
                    staff_id TEXT NOT NULL,
                    starts_at TIMESTAMPTZ NOT NULL,
                    ends_at TIMESTAMPTZ NOT NULL,
                    requires_staff BOOLEAN NOT NULL DEFAULT TRUE
                );

                CREATE INDEX IF NOT EXISTS idx_appointment_items_staff_time
                    ON appointment_items(staff_id, starts_at, ends_at);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn load_items(&self, appointment_id: &Uuid) -> Result<Vec<AppointmentItem>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, service_id, staff_id, starts_at, ends_at, requires_staff
                 FROM appointment_items
                 WHERE appointment_id = $1
                 ORDER BY starts_at",
                &[appointment_id],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| AppointmentItem {
                id: row.get("id"),
                service_id: row.get("service_id"),
                staff_id: row.get("staff_id"),
                start: row.get("starts_at"),
                end: row.get("ends_at"),
                requires_staff: row.get("requires_staff"),
            })
            .collect())
    }

    fn row_to_appointment(
        row: &tokio_postgres::Row,
        items: Vec<AppointmentItem>,
    ) -> Result<Appointment> {
        let consents: serde_json::Value = row.get("consents");
        let slot_key: String = row.get("slot_key");
        let status: String = row.get("status");

        Ok(Appointment {
            id: row.get("id"),
            location_id: row.get("location_id"),
            slot_key: slot_key.parse()?,
            staff_id: row.get("staff_id"),
            customer: CustomerDetails {
                name: row.get("customer_name"),
                email: row.get("customer_email"),
                phone: row.get("customer_phone"),
            },
            consents: serde_json::from_value(consents)?,
            confirmation_code: row.get("confirmation_code"),
            status: status
                .parse()
                .unwrap_or(crate::models::AppointmentStatus::Confirmed),
            idempotency_key: row.get("idempotency_key"),
            created_at: row.get("created_at"),
            items,
        })
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn sweep_expired_claims(
        &self,
        location_id: &str,
        policy: &ClaimPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let client = self.pool.get().await?;
        let cutoff = policy.sweep_cutoff(now);
        let deleted = client
            .execute(
                "DELETE FROM booking_claims
                 WHERE location_id = $1 AND status = 'pending' AND expires_at <= $2",
                &[&location_id, &cutoff],
            )
            .await?;

        if deleted > 0 {
            tracing::debug!(location_id = %location_id, count = deleted, "swept expired claims");
        }
        Ok(deleted)
    }

    async fn claim_and_book(
        &self,
        booking: &NewAppointment,
        policy: &ClaimPolicy,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome> {
        // Lazy sweep so abandoned or crashed attempts do not permanently
        // lock the slot.
        self.sweep_expired_claims(&booking.location_id, policy, now)
            .await?;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Insert-first: the unique constraint serializes concurrent
        // claimants; everything else happens behind it.
        let claim_id = Uuid::new_v4();
        let claim_insert = tx
            .execute(
                "INSERT INTO booking_claims
                     (id, location_id, slot_key, idempotency_key, status, expires_at, created_at)
                 VALUES ($1, $2, $3, $4, 'pending', $5, $6)",
                &[
                    &claim_id,
                    &booking.location_id,
                    &booking.slot_key.encode(),
                    &booking.idempotency_key,
                    &policy.claim_expires_at(now),
                    &now,
                ],
            )
            .await;

        if let Err(e) = claim_insert {
            drop(tx);
            if is_unique_violation(&e) {
                // Conflict-then-read: an identical earlier submission
                // replays; anything else means another request holds the
                // claim right now.
                if let Some(key) = &booking.idempotency_key {
                    if let Some(existing) = self
                        .appointment_by_idempotency(&booking.location_id, key)
                        .await?
                    {
                        return Ok(BookingOutcome::Replayed(existing));
                    }
                }
                return Err(Error::conflict(format!(
                    "slot '{}' is already claimed",
                    booking.slot_key
                )));
            }
            return Err(e.into());
        }

        // Overlap check against committed staff-occupying items, inside the
        // same transaction as the write it protects.
        for item in booking.items.iter().filter(|i| i.requires_staff) {
            let row = tx
                .query_one(
                    "SELECT COUNT(*) FROM appointment_items i
                     JOIN appointments a ON a.id = i.appointment_id
                     WHERE a.location_id = $1
                       AND i.staff_id = $2
                       AND a.status = 'confirmed'
                       AND i.requires_staff
                       AND i.starts_at < $4 AND $3 < i.ends_at",
                    &[&booking.location_id, &booking.staff_id, &item.start, &item.end],
                )
                .await?;
            let overlapping: i64 = row.get(0);
            if overlapping > 0 {
                drop(tx);
                return Err(Error::conflict(format!(
                    "staff '{}' already has a booking overlapping '{}'",
                    booking.staff_id, booking.slot_key
                )));
            }
        }

        let appointment_id = Uuid::new_v4();
        let code = confirmation_code(&appointment_id);
        let consents = serde_json::to_value(&booking.consents)?;

        let appointment_insert = tx
            .execute(
                "INSERT INTO appointments
                     (id, location_id, slot_key, staff_id, customer_name, customer_email,
                      customer_phone, consents, confirmation_code, status, idempotency_key,
                      created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'confirmed', $10, $11)",
                &[
                    &appointment_id,
                    &booking.location_id,
                    &booking.slot_key.encode(),
                    &booking.staff_id,
                    &booking.customer.name,
                    &booking.customer.email,
                    &booking.customer.phone,
                    &consents,
                    &code,
                    &booking.idempotency_key,
                    &now,
                ],
            )
            .await;

        if let Err(e) = appointment_insert {
            drop(tx);
            if is_unique_violation(&e) {
                // Same idempotency key raced in on a different slot key;
                // the committed original wins.
                if let Some(key) = &booking.idempotency_key {
                    if let Some(existing) = self
                        .appointment_by_idempotency(&booking.location_id, key)
                        .await?
                    {
                        return Ok(BookingOutcome::Replayed(existing));
                    }
                }
                return Err(Error::conflict("duplicate submission in flight"));
            }
            return Err(e.into());
        }

        let mut items = Vec::with_capacity(booking.items.len());
        for item in &booking.items {
            let item_id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO appointment_items
                     (id, appointment_id, service_id, staff_id, starts_at, ends_at, requires_staff)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &item_id,
                    &appointment_id,
                    &item.service_id,
                    &booking.staff_id,
                    &item.start,
                    &item.end,
                    &item.requires_staff,
                ],
            )
            .await?;
            items.push(AppointmentItem {
                id: item_id,
                service_id: item.service_id.clone(),
                staff_id: booking.staff_id.clone(),
                start: item.start,
                end: item.end,
                requires_staff: item.requires_staff,
            });
        }

        tx.execute(
            "UPDATE booking_claims SET status = 'confirmed' WHERE id = $1",
            &[&claim_id],
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| Error::transaction(format!("booking commit failed: {e}")))?;

        Ok(BookingOutcome::Created(Appointment {
            id: appointment_id,
            location_id: booking.location_id.clone(),
            slot_key: booking.slot_key.clone(),
            staff_id: booking.staff_id.clone(),
            customer: booking.customer.clone(),
            consents: booking.consents.clone(),
            confirmation_code: code,
            status: crate::models::AppointmentStatus::Confirmed,
            idempotency_key: booking.idempotency_key.clone(),
            created_at: now,
            items,
        }))
    }

    async fn committed_intervals(
        &self,
        location_id: &str,
        window: &TimeInterval,
    ) -> Result<BTreeMap<String, Vec<TimeInterval>>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT i.staff_id, i.starts_at, i.ends_at
                 FROM appointment_items i
                 JOIN appointments a ON a.id = i.appointment_id
                 WHERE a.location_id = $1
                   AND a.status = 'confirmed'
                   AND i.requires_staff
                   AND i.starts_at < $3 AND $2 < i.ends_at
                 ORDER BY i.staff_id, i.starts_at",
                &[&location_id, &window.start, &window.end],
            )
            .await?;

        let mut out: BTreeMap<String, Vec<TimeInterval>> = BTreeMap::new();
        for row in rows {
            let staff_id: String = row.get("staff_id");
            if let Some(iv) = TimeInterval::new(row.get("starts_at"), row.get("ends_at")) {
                out.entry(staff_id).or_default().push(iv);
            }
        }
        Ok(out)
    }

    async fn day_load(
        &self,
        location_id: &str,
        day: &TimeInterval,
    ) -> Result<HashMap<String, i64>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT i.staff_id, COUNT(*)::BIGINT AS load
                 FROM appointment_items i
                 JOIN appointments a ON a.id = i.appointment_id
                 WHERE a.location_id = $1
                   AND a.status = 'confirmed'
                   AND i.starts_at >= $2 AND i.starts_at < $3
                 GROUP BY i.staff_id",
                &[&location_id, &day.start, &day.end],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("staff_id"), row.get("load")))
            .collect())
    }

    async fn appointment_by_idempotency(
        &self,
        location_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Appointment>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, location_id, slot_key, staff_id, customer_name, customer_email,
                        customer_phone, consents, confirmation_code, status, idempotency_key,
                        created_at
                 FROM appointments
                 WHERE location_id = $1 AND idempotency_key = $2",
                &[&location_id, &idempotency_key],
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.get("id");
        let items = self.load_items(&id).await?;
        Ok(Some(Self::row_to_appointment(&row, items)?))
    }
}

// Integration tests require running PostgreSQL
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotKey;
    use chrono::TimeZone;

    use super::super::store::NewAppointmentItem;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, hour, min, 0).unwrap()
    }

    fn booking(staff: &str, hour: u32, idem: Option<&str>) -> NewAppointment {
        let start = at(hour, 0);
        // Random location so repeated test runs never collide on the
        // claim constraint
        let location_id = format!("it-{}", Uuid::new_v4().simple());
        NewAppointment {
            location_id: location_id.clone(),
            slot_key: SlotKey::new(location_id, staff, start).unwrap(),
            staff_id: staff.to_string(),
            customer: CustomerDetails {
                name: "Jo Customer".to_string(),
                email: None,
                phone: None,
            },
            consents: vec![],
            idempotency_key: idem.map(String::from),
            items: vec![NewAppointmentItem {
                service_id: "cut".to_string(),
                start,
                end: start + chrono::Duration::minutes(30),
                requires_staff: true,
            }],
        }
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL"]
    async fn test_claim_and_book_round_trip() {
        let store = PgBookingStore::new(&PgStoreConfig::from_env()).await.unwrap();
        store.init_schema().await.unwrap();

        let req = booking("alice", 9, Some("k1"));
        let now = Utc::now();
        let policy = ClaimPolicy::default();

        let created = store.claim_and_book(&req, &policy, now).await.unwrap();
        assert!(!created.was_replayed());

        // Same slot again conflicts without the idempotency key
        let mut dup = req.clone();
        dup.idempotency_key = None;
        assert!(store.claim_and_book(&dup, &policy, now).await.is_err());

        // With it, the original replays
        let replay = store.claim_and_book(&req, &policy, now).await.unwrap();
        assert!(replay.was_replayed());
        assert_eq!(replay.appointment().id, created.appointment().id);
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL"]
    async fn test_committed_intervals_visible() {
        let store = PgBookingStore::new(&PgStoreConfig::from_env()).await.unwrap();
        store.init_schema().await.unwrap();

        let req = booking("bob", 10, None);
        let now = Utc::now();
        store
            .claim_and_book(&req, &ClaimPolicy::default(), now)
            .await
            .unwrap();

        let window = TimeInterval::new(at(0, 0), at(23, 0)).unwrap();
        let intervals = store
            .committed_intervals(&req.location_id, &window)
            .await
            .unwrap();
        assert_eq!(intervals["bob"].len(), 1);
    }
}
