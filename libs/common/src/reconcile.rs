//! Diffing a client's server groups against its computed rank.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::id::GroupId;
use crate::rank::DEFAULT_GROUP_RANGE;

pub const DEFAULT_BASE_GROUP: GroupId = 47;

/// Group changes needed to bring a client in line with its rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    pub add: BTreeSet<GroupId>,
    pub remove: BTreeSet<GroupId>,
    /// The client is moving into a rank group it did not hold before.
    pub promoted: bool,
}

impl GroupDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReconciler {
    base_group: GroupId,
    rank_groups: RangeInclusive<GroupId>,
}

impl Default for GroupReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_GROUP, DEFAULT_GROUP_RANGE)
    }
}

impl GroupReconciler {
    /// An inverted range collapses to its low end, matching
    /// [`RankCalculator::new`](crate::rank::RankCalculator::new).
    pub fn new(base_group: GroupId, rank_groups: RangeInclusive<GroupId>) -> Self {
        let (low, high) = rank_groups.into_inner();
        Self {
            base_group,
            rank_groups: low..=high.max(low),
        }
    }

    pub fn base_group(&self) -> GroupId {
        self.base_group
    }

    pub fn rank_groups(&self) -> RangeInclusive<GroupId> {
        self.rank_groups.clone()
    }

    /// Compute the minimal diff from `current` to "exactly one rank group,
    /// `target`". A client holding no groups at all is provisioned with the
    /// base group as well.
    pub fn reconcile(&self, current: &BTreeSet<GroupId>, target: GroupId) -> GroupDiff {
        let mut diff = GroupDiff::default();

        if current.is_empty() {
            diff.add.insert(self.base_group);
        }

        let held: BTreeSet<GroupId> = current
            .iter()
            .copied()
            .filter(|group| self.rank_groups.contains(group))
            .collect();

        if !held.contains(&target) {
            diff.add.insert(target);
            diff.promoted = true;
        }

        diff.remove = held.into_iter().filter(|group| *group != target).collect();
        diff
    }
}
