use std::time::Duration;

use crate::id::Identity;

/// Working accrual state for one live session.
///
/// `total_accrued` is the identity's lifetime online time (seeded from the
/// ledger) plus whatever this session has added since it was first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualRecord {
    pub identity: Identity,
    pub total_accrued: Duration,
    /// Last "connected for" value reported for this session.
    pub last_observed: Duration,
}

impl AccrualRecord {
    pub fn new(identity: Identity, seed: Duration) -> Self {
        Self {
            identity,
            total_accrued: seed,
            last_observed: Duration::ZERO,
        }
    }

    /// Fold a fresh "connected for" observation into the total.
    ///
    /// Only forward progress counts: an observation below the previous one
    /// adds nothing and becomes the new baseline. Returns the time added.
    pub fn observe(&mut self, connected_for: Duration) -> Duration {
        let added = connected_for.saturating_sub(self.last_observed);
        self.total_accrued = self.total_accrued.saturating_add(added);
        self.last_observed = connected_for;
        added
    }
}
