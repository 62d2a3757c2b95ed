//! Working accrual records for live connections, keyed by session handle.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use yuki_common::{AccrualRecord, Identity, SessionHandle};

use crate::db::ledger::Ledger;
use crate::error::LedgerError;

/// Accrual record plus when it last saw a "connected for" value.
#[derive(Debug, Clone)]
pub struct TrackedSession {
    pub record: AccrualRecord,
    pub observed_at: Instant,
}

impl TrackedSession {
    fn new(identity: Identity, seed: Duration) -> Self {
        Self {
            record: AccrualRecord::new(identity, seed),
            observed_at: Instant::now(),
        }
    }

    /// Total as of `now`, assuming the connection stayed up since the last
    /// observation.
    pub fn extrapolated_total(&self, now: Instant) -> Duration {
        self.record
            .total_accrued
            .saturating_add(now.saturating_duration_since(self.observed_at))
    }
}

/// Result of folding one observation into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    /// Time added by this observation.
    pub added: Duration,
    pub record: AccrualRecord,
}

/// In-memory store of every connection the bot is currently tracking.
///
/// Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
/// entry so one record is never mutated by two callers at once.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionHandle, Mutex<TrackedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record for `handle`, seeding a new one from the ledger on
    /// first sight. Nothing is stored when the ledger read fails.
    pub async fn get_or_seed(
        &self,
        handle: SessionHandle,
        identity: Identity,
        ledger: &dyn Ledger,
    ) -> Result<AccrualRecord, LedgerError> {
        if let Some(entry) = self.sessions.get(&handle) {
            return Ok(entry.lock().record.clone());
        }

        let seed = ledger.ensure(identity).await?;
        tracing::debug!(%handle, %identity, seed_ms = seed.as_millis() as u64, "session seeded");

        let entry = self
            .sessions
            .entry(handle)
            .or_insert_with(|| Mutex::new(TrackedSession::new(identity, seed)));
        let record = entry.lock().record.clone();
        Ok(record)
    }

    /// Apply a "connected for" observation. `None` when the handle is not
    /// tracked.
    pub fn observe(&self, handle: SessionHandle, connected_for: Duration) -> Option<Observed> {
        let entry = self.sessions.get(&handle)?;
        let mut tracked = entry.lock();
        tracked.observed_at = Instant::now();
        let added = tracked.record.observe(connected_for);
        Some(Observed {
            added,
            record: tracked.record.clone(),
        })
    }

    pub fn get(&self, handle: SessionHandle) -> Option<AccrualRecord> {
        let entry = self.sessions.get(&handle)?;
        let record = entry.lock().record.clone();
        Some(record)
    }

    /// Drop the record for `handle`. Absent handles are a no-op.
    pub fn remove(&self, handle: SessionHandle) -> Option<TrackedSession> {
        self.sessions
            .remove(&handle)
            .map(|(_, tracked)| tracked.into_inner())
    }

    /// Drop every record whose handle is not in `live`. Returns how many
    /// were dropped.
    pub fn retain_live(&self, live: &HashSet<SessionHandle>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|handle, _| live.contains(handle));
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
