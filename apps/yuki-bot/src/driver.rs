//! The reconciliation loop: reacts to connect/disconnect notifications and
//! periodically sweeps the full client list to heal anything they missed.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{self, MissedTickBehavior};
use yuki_common::{GroupDiff, GroupReconciler, RankCalculator, RankStatus, SessionHandle};

use crate::config::Config;
use crate::db::ledger::Ledger;
use crate::error::{ReconcileError, ServiceError};
use crate::messages;
use crate::service::{ServerEvent, SessionDescriptor, SessionService};
use crate::sessions::SessionStore;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// What the driver is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    ProcessingConnect,
    ProcessingDisconnect,
    Sweeping,
}

/// What one pass of the update pipeline did to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub added: Duration,
    pub status: RankStatus,
    pub diff: GroupDiff,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reconciled: usize,
    pub failed: usize,
    /// Tracked sessions that were no longer on the server.
    pub evicted: usize,
}

pub struct Driver {
    service: Arc<dyn SessionService>,
    ledger: Arc<dyn Ledger>,
    sessions: SessionStore,
    ranks: RankCalculator,
    groups: GroupReconciler,
    sweep_interval: Duration,
    persist_on_disconnect: bool,
    server_name: Option<String>,
    state: DriverState,
}

impl Driver {
    pub fn new(
        service: Arc<dyn SessionService>,
        ledger: Arc<dyn Ledger>,
        ranks: RankCalculator,
        groups: GroupReconciler,
    ) -> Self {
        Self {
            service,
            ledger,
            sessions: SessionStore::new(),
            ranks,
            groups,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            persist_on_disconnect: false,
            server_name: None,
            state: DriverState::Idle,
        }
    }

    pub fn from_config(
        config: &Config,
        service: Arc<dyn SessionService>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self::new(
            service,
            ledger,
            config.rank_calculator(),
            config.group_reconciler(),
        )
        .with_sweep_interval(config.sweep_interval)
        .with_persist_on_disconnect(config.persist_on_disconnect)
        .with_server_name(config.server_name.clone())
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_persist_on_disconnect(mut self, enabled: bool) -> Self {
        self.persist_on_disconnect = enabled;
        self
    }

    pub fn with_server_name(mut self, name: Option<String>) -> Self {
        self.server_name = name;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Main loop. Sweeps immediately, then every `sweep_interval`, and handles
    /// notifications in between. Returns when `shutdown` resolves or the
    /// notification stream closes; a sweep that is already running always
    /// finishes first.
    pub async fn run(
        &mut self,
        mut events: broadcast::Receiver<ServerEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval_ms = self.sweep_interval.as_millis() as u64, "reconciliation started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping reconciliation");
                    break;
                }

                result = events.recv() => {
                    match result {
                        Ok(event) => self.handle_event(event).await,
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "notification stream lagged, next sweep will catch up");
                        }
                        Err(RecvError::Closed) => {
                            tracing::warn!("notification stream closed, stopping reconciliation");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        tracing::warn!(%err, "sweep skipped, could not fetch client list");
                    }
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected(session) => {
                if let Err(err) = self.handle_connect(&session).await {
                    tracing::warn!(
                        %err,
                        handle = %session.handle,
                        identity = %session.identity,
                        "dropping connect notification"
                    );
                }
            }
            ServerEvent::Disconnected { handle, nickname } => {
                self.handle_disconnect(handle, nickname.as_deref()).await;
            }
        }
    }

    /// Seed the new session and greet it with its rank. No time is added: a
    /// fresh connection has nothing to accrue yet.
    pub async fn handle_connect(
        &mut self,
        session: &SessionDescriptor,
    ) -> Result<RankStatus, ReconcileError> {
        self.state = DriverState::ProcessingConnect;
        let result = self.welcome(session).await;
        self.state = DriverState::Idle;
        result
    }

    async fn welcome(&self, session: &SessionDescriptor) -> Result<RankStatus, ReconcileError> {
        let record = self
            .sessions
            .get_or_seed(session.handle, session.identity, self.ledger.as_ref())
            .await?;
        let status = self.ranks.status(record.total_accrued);

        tracing::info!(
            nickname = %session.nickname,
            identity = %session.identity,
            handle = %session.handle,
            rank = status.rank,
            total = %messages::humanize(status.total),
            "client connected"
        );

        let text = messages::welcome(&status, self.server_name.as_deref());
        self.service.notify(session.handle, &text).await?;
        Ok(status)
    }

    /// Forget the session. The ledger already holds the total from the last
    /// sweep unless `persist_on_disconnect` asks for a final write.
    pub async fn handle_disconnect(&mut self, handle: SessionHandle, nickname: Option<&str>) {
        self.state = DriverState::ProcessingDisconnect;

        let removed = self.sessions.remove(handle);
        tracing::info!(
            %handle,
            nickname = nickname.unwrap_or("unknown"),
            tracked = removed.is_some(),
            "client disconnected"
        );

        if let Some(tracked) = removed.filter(|_| self.persist_on_disconnect) {
            let identity = tracked.record.identity;
            let total = tracked.extrapolated_total(Instant::now());
            if let Err(err) = self.ledger.set(identity, total).await {
                tracing::warn!(%err, %identity, "could not persist total on disconnect");
            }
        }

        self.state = DriverState::Idle;
    }

    /// Reconcile every live client, then forget tracked sessions that are no
    /// longer on the server. One failing client never stops the others.
    pub async fn sweep(&mut self) -> Result<SweepReport, ServiceError> {
        self.state = DriverState::Sweeping;
        let result = self.sweep_roster().await;
        self.state = DriverState::Idle;
        result
    }

    async fn sweep_roster(&self) -> Result<SweepReport, ServiceError> {
        let roster = self.service.list_live_sessions().await?;
        let mut report = SweepReport::default();

        for session in &roster {
            match self.reconcile_session(session).await {
                Ok(outcome) => {
                    report.reconciled += 1;
                    tracing::trace!(
                        handle = %session.handle,
                        added_ms = outcome.added.as_millis() as u64,
                        total_ms = outcome.status.total.as_millis() as u64,
                        "session reconciled"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        %err,
                        handle = %session.handle,
                        identity = %session.identity,
                        "session skipped this sweep"
                    );
                }
            }
        }

        let live: HashSet<SessionHandle> = roster.iter().map(|s| s.handle).collect();
        report.evicted = self.sessions.retain_live(&live);

        tracing::debug!(
            clients = roster.len(),
            reconciled = report.reconciled,
            failed = report.failed,
            evicted = report.evicted,
            "sweep finished"
        );
        Ok(report)
    }

    /// The update pipeline for one session: accrue, rank, fix groups, persist.
    pub async fn reconcile_session(
        &self,
        session: &SessionDescriptor,
    ) -> Result<SessionOutcome, ReconcileError> {
        self.sessions
            .get_or_seed(session.handle, session.identity, self.ledger.as_ref())
            .await?;
        let observed = self
            .sessions
            .observe(session.handle, session.connected_for)
            .ok_or(ReconcileError::Untracked(session.handle))?;

        let status = self.ranks.status(observed.record.total_accrued);
        let diff = self.groups.reconcile(&session.groups, status.group);

        if !diff.add.is_empty() {
            self.service.add_groups(session, &diff.add).await?;
            if diff.promoted {
                tracing::info!(
                    nickname = %session.nickname,
                    identity = %session.identity,
                    rank = status.rank,
                    group = status.group,
                    "client promoted"
                );
                let text = messages::promotion(&status);
                if let Err(err) = self.service.notify(session.handle, &text).await {
                    tracing::warn!(%err, handle = %session.handle, "could not send promotion message");
                }
            }
        }

        if !diff.remove.is_empty() {
            tracing::debug!(
                identity = %session.identity,
                groups = ?diff.remove,
                "removing stale rank groups"
            );
            self.service.remove_groups(session, &diff.remove).await?;
        }

        self.ledger.set(session.identity, status.total).await?;

        Ok(SessionOutcome {
            added: observed.added,
            status,
            diff,
        })
    }
}
