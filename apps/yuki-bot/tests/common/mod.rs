#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use yuki_bot::db::ledger::{Ledger, MemoryLedger};
use yuki_bot::error::{LedgerError, ServiceError};
use yuki_bot::{Driver, SessionDescriptor, SessionService};
use yuki_common::{GroupId, GroupReconciler, Identity, RankCalculator, SessionHandle};

pub const HOUR: Duration = Duration::from_secs(3600);

/// A call the driver made against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add(SessionHandle, BTreeSet<GroupId>),
    Remove(SessionHandle, BTreeSet<GroupId>),
    Notify(SessionHandle, String),
}

/// In-memory stand-in for the voice server. Group changes are applied to the
/// roster so consecutive sweeps see the result, as they would on a real server.
#[derive(Default)]
pub struct FakeService {
    roster: Mutex<Vec<SessionDescriptor>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<Identity>>,
    roster_down: AtomicBool,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn join(&self, session: SessionDescriptor) {
        self.roster.lock().push(session);
    }

    pub fn leave(&self, handle: SessionHandle) {
        self.roster.lock().retain(|s| s.handle != handle);
    }

    pub fn set_connected_for(&self, handle: SessionHandle, connected_for: Duration) {
        if let Some(session) = self.roster.lock().iter_mut().find(|s| s.handle == handle) {
            session.connected_for = connected_for;
        }
    }

    pub fn groups_of(&self, handle: SessionHandle) -> BTreeSet<GroupId> {
        self.roster
            .lock()
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| s.groups.clone())
            .unwrap_or_default()
    }

    /// Make every group command for `identity` fail.
    pub fn fail_groups_for(&self, identity: Identity) {
        self.failing.lock().insert(identity);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        self.roster_down.store(false, Ordering::SeqCst);
    }

    pub fn fail_roster(&self) {
        self.roster_down.store(true, Ordering::SeqCst);
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn check(&self, identity: Identity) -> Result<(), ServiceError> {
        if self.failing.lock().contains(&identity) {
            return Err(ServiceError::Timeout(Duration::from_secs(10)));
        }
        Ok(())
    }

    fn edit_groups(&self, handle: SessionHandle, edit: impl FnOnce(&mut BTreeSet<GroupId>)) {
        if let Some(session) = self.roster.lock().iter_mut().find(|s| s.handle == handle) {
            edit(&mut session.groups);
        }
    }
}

#[async_trait]
impl SessionService for FakeService {
    async fn list_live_sessions(&self) -> Result<Vec<SessionDescriptor>, ServiceError> {
        if self.roster_down.load(Ordering::SeqCst) {
            return Err(ServiceError::Disconnected);
        }
        Ok(self.roster.lock().clone())
    }

    async fn add_groups(
        &self,
        session: &SessionDescriptor,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), ServiceError> {
        self.check(session.identity)?;
        self.calls.lock().push(Call::Add(session.handle, groups.clone()));
        self.edit_groups(session.handle, |held| held.extend(groups.iter().copied()));
        Ok(())
    }

    async fn remove_groups(
        &self,
        session: &SessionDescriptor,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), ServiceError> {
        self.check(session.identity)?;
        self.calls.lock().push(Call::Remove(session.handle, groups.clone()));
        self.edit_groups(session.handle, |held| held.retain(|g| !groups.contains(g)));
        Ok(())
    }

    async fn notify(&self, handle: SessionHandle, text: &str) -> Result<(), ServiceError> {
        self.calls.lock().push(Call::Notify(handle, text.to_string()));
        Ok(())
    }
}

/// Memory ledger whose reads and writes can be switched off.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: MemoryLedger,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
}

impl FlakyLedger {
    pub fn with_totals(totals: impl IntoIterator<Item = (Identity, Duration)>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryLedger::with_totals(totals),
            ..Default::default()
        })
    }

    pub fn fail_reads(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    pub fn total(&self, identity: Identity) -> Option<Duration> {
        self.inner.total(identity)
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn ensure(&self, identity: Identity) -> Result<Duration, LedgerError> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("read refused".to_string()));
        }
        self.inner.ensure(identity).await
    }

    async fn set(&self, identity: Identity, total: Duration) -> Result<(), LedgerError> {
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("write refused".to_string()));
        }
        self.inner.set(identity, total).await
    }
}

pub fn client(
    identity: i64,
    handle: u32,
    groups: &[GroupId],
    connected_for: Duration,
) -> SessionDescriptor {
    SessionDescriptor {
        identity: Identity(identity),
        handle: SessionHandle(handle),
        nickname: format!("client-{identity}"),
        groups: groups.iter().copied().collect(),
        connected_for,
    }
}

pub fn groups(ids: &[GroupId]) -> BTreeSet<GroupId> {
    ids.iter().copied().collect()
}

/// Driver with the default rank ladder (1.55, groups 14..=46, base group 47).
pub fn driver(service: &Arc<FakeService>, ledger: &Arc<FlakyLedger>) -> Driver {
    let service: Arc<dyn SessionService> = service.clone();
    let ledger: Arc<dyn Ledger> = ledger.clone();
    Driver::new(
        service,
        ledger,
        RankCalculator::default(),
        GroupReconciler::default(),
    )
}
