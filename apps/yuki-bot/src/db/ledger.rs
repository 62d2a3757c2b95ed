use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use parking_lot::Mutex;
use yuki_common::Identity;

use crate::db::pool::DbPool;
use crate::db::schema::user_times;
use crate::error::LedgerError;
use crate::models::user_time::{duration_to_millis, NewUserTime, UserTime};

/// Durable record of each identity's lifetime online time.
///
/// Backed by Postgres in production and an in-memory map in tests.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Return the stored total, creating a zero row on first sight.
    async fn ensure(&self, identity: Identity) -> Result<Duration, LedgerError>;

    /// Overwrite the stored total. Safe to repeat.
    async fn set(&self, identity: Identity, total: Duration) -> Result<(), LedgerError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn ensure(&self, identity: Identity) -> Result<Duration, LedgerError> {
        let now = Utc::now();
        let mut conn = self.pool.get().await?;

        let insert = diesel::insert_into(user_times::table)
            .values(NewUserTime {
                id: identity.0,
                total_time_ms: 0,
                first_seen_at: now,
                updated_at: now,
            })
            .on_conflict(user_times::id)
            .do_nothing();
        let created = diesel_async::RunQueryDsl::execute(insert, &mut conn).await?;
        if created > 0 {
            tracing::debug!(%identity, "ledger row created");
        }

        let row: UserTime = diesel_async::RunQueryDsl::get_result(
            user_times::table
                .find(identity.0)
                .select(UserTime::as_select()),
            &mut conn,
        )
        .await?;

        Ok(row.total())
    }

    async fn set(&self, identity: Identity, total: Duration) -> Result<(), LedgerError> {
        let now = Utc::now();
        let total_ms = duration_to_millis(total);
        let mut conn = self.pool.get().await?;

        let upsert = diesel::insert_into(user_times::table)
            .values(NewUserTime {
                id: identity.0,
                total_time_ms: total_ms,
                first_seen_at: now,
                updated_at: now,
            })
            .on_conflict(user_times::id)
            .do_update()
            .set((
                user_times::total_time_ms.eq(total_ms),
                user_times::updated_at.eq(now),
            ));
        diesel_async::RunQueryDsl::execute(upsert, &mut conn).await?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLedger {
    totals: Mutex<HashMap<Identity, Duration>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known set of totals.
    pub fn with_totals(totals: impl IntoIterator<Item = (Identity, Duration)>) -> Self {
        Self {
            totals: Mutex::new(totals.into_iter().collect()),
        }
    }

    /// Current stored total, without creating a row.
    pub fn total(&self, identity: Identity) -> Option<Duration> {
        self.totals.lock().get(&identity).copied()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn ensure(&self, identity: Identity) -> Result<Duration, LedgerError> {
        Ok(*self.totals.lock().entry(identity).or_insert(Duration::ZERO))
    }

    async fn set(&self, identity: Identity, total: Duration) -> Result<(), LedgerError> {
        self.totals.lock().insert(identity, total);
        Ok(())
    }
}
