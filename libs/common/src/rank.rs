//! Rank tiers derived from accrued online time.
//!
//! Tier `n` starts at `growth_base^n` hours online, so every tier takes
//! `growth_base` times longer to clear than the one before it. Tiers map onto
//! a reserved, contiguous range of server groups.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::id::GroupId;

/// Zero-based rank tier. Tier 0 is the lowest.
pub type Rank = u32;

pub const DEFAULT_GROWTH_BASE: f64 = 1.55;
pub const DEFAULT_GROUP_RANGE: RangeInclusive<GroupId> = 14..=46;

const SECS_PER_HOUR: f64 = 3600.0;

/// Added to the tier ratio before flooring so that totals sitting exactly on
/// `growth_base^n` hours land in tier `n` regardless of `ln` rounding.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Snapshot of where a total sits on the rank ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankStatus {
    pub rank: Rank,
    pub group: GroupId,
    pub total: Duration,
    /// `None` once the top tier is reached.
    pub time_to_promotion: Option<Duration>,
}

/// Pure mapping from accrued time to rank, rank group and promotion time.
#[derive(Debug, Clone, PartialEq)]
pub struct RankCalculator {
    growth_base: f64,
    group_low: GroupId,
    group_high: GroupId,
}

impl Default for RankCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_GROWTH_BASE, DEFAULT_GROUP_RANGE)
    }
}

impl RankCalculator {
    /// A `growth_base` that is not a finite number above 1 falls back to
    /// [`DEFAULT_GROWTH_BASE`]. An inverted range collapses to its low end.
    pub fn new(growth_base: f64, group_range: RangeInclusive<GroupId>) -> Self {
        let growth_base = if growth_base.is_finite() && growth_base > 1.0 {
            growth_base
        } else {
            DEFAULT_GROWTH_BASE
        };
        let (group_low, group_high) = group_range.into_inner();
        Self {
            growth_base,
            group_low,
            group_high: group_high.max(group_low),
        }
    }

    pub fn growth_base(&self) -> f64 {
        self.growth_base
    }

    pub fn group_range(&self) -> RangeInclusive<GroupId> {
        self.group_low..=self.group_high
    }

    /// Highest tier that still has a group in the reserved range.
    pub fn max_rank(&self) -> Rank {
        self.group_high - self.group_low
    }

    /// `floor(log(hours) / log(growth_base))`, clamped to `0..=max_rank`.
    pub fn rank(&self, total: Duration) -> Rank {
        let hours = total.as_secs_f64() / SECS_PER_HOUR;
        if !hours.is_finite() || hours <= 0.0 {
            return 0;
        }

        let tier = (hours.ln() / self.growth_base.ln() + BOUNDARY_EPSILON).floor();
        if !tier.is_finite() || tier <= 0.0 {
            return 0;
        }

        (tier as u64).min(self.max_rank() as u64) as Rank
    }

    pub fn rank_group(&self, rank: Rank) -> GroupId {
        self.group_low + rank.min(self.max_rank())
    }

    /// Length of tier `rank`: `base^(rank+1) - base^rank` hours.
    pub fn tier_span(&self, rank: Rank) -> Duration {
        let start = self.tier_start_hours(rank);
        let end = self.tier_start_hours(rank.saturating_add(1));
        hours_to_duration(end - start)
    }

    /// Time left until `total` reaches the next tier.
    pub fn time_to_promotion(&self, total: Duration) -> Option<Duration> {
        let rank = self.rank(total);
        if rank >= self.max_rank() {
            return None;
        }
        let next = hours_to_duration(self.tier_start_hours(rank + 1));
        Some(next.saturating_sub(total))
    }

    pub fn status(&self, total: Duration) -> RankStatus {
        let rank = self.rank(total);
        RankStatus {
            rank,
            group: self.rank_group(rank),
            total,
            time_to_promotion: self.time_to_promotion(total),
        }
    }

    fn tier_start_hours(&self, rank: Rank) -> f64 {
        self.growth_base.powf(f64::from(rank))
    }
}

fn hours_to_duration(hours: f64) -> Duration {
    if hours.is_nan() || hours <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(hours * SECS_PER_HOUR).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(h: f64) -> Duration {
        Duration::from_secs_f64(h * SECS_PER_HOUR)
    }

    #[test]
    fn zero_time_is_lowest_tier() {
        let calc = RankCalculator::default();
        let rank = calc.rank(Duration::ZERO);
        assert_eq!(rank, 0);
        assert_eq!(calc.rank_group(rank), 14);
    }

    #[test]
    fn ten_hours_is_rank_five() {
        let calc = RankCalculator::default();
        let rank = calc.rank(Duration::from_millis(36_000_000));
        assert_eq!(rank, 5);
        assert_eq!(calc.rank_group(rank), 19);
    }

    #[test]
    fn less_than_an_hour_does_not_go_negative() {
        let calc = RankCalculator::default();
        assert_eq!(calc.rank(Duration::from_secs(30 * 60)), 0);
        assert_eq!(calc.rank(Duration::from_millis(1)), 0);
    }

    #[test]
    fn rank_is_monotonic() {
        let calc = RankCalculator::default();
        let mut prev = 0;
        for minutes in (0..200_000u64).step_by(97) {
            let rank = calc.rank(Duration::from_secs(minutes * 60));
            assert!(rank >= prev, "rank dropped at {minutes} minutes");
            prev = rank;
        }
    }

    #[test]
    fn tier_boundaries_with_tolerance() {
        let calc = RankCalculator::default();
        for k in 1..12u32 {
            let boundary = DEFAULT_GROWTH_BASE.powi(k as i32);
            assert_eq!(calc.rank(hours(boundary * (1.0 + 1e-6))), k);
            assert_eq!(calc.rank(hours(boundary * (1.0 - 1e-6))), k - 1);
        }
    }

    #[test]
    fn rank_is_capped_at_top_of_group_range() {
        let calc = RankCalculator::default();
        let forever = Duration::from_secs(u64::MAX / 4);
        let rank = calc.rank(forever);
        assert_eq!(rank, 32);
        assert_eq!(calc.rank_group(rank), 46);
        assert_eq!(calc.time_to_promotion(forever), None);
    }

    #[test]
    fn rank_group_never_leaves_range() {
        let calc = RankCalculator::new(2.0, 20..=22);
        assert_eq!(calc.rank_group(0), 20);
        assert_eq!(calc.rank_group(2), 22);
        assert_eq!(calc.rank_group(10), 22);
    }

    #[test]
    fn invalid_growth_base_falls_back_to_default() {
        assert_eq!(RankCalculator::new(1.0, 14..=46).growth_base(), DEFAULT_GROWTH_BASE);
        assert_eq!(RankCalculator::new(f64::NAN, 14..=46).growth_base(), DEFAULT_GROWTH_BASE);
        assert_eq!(RankCalculator::new(0.5, 14..=46).growth_base(), DEFAULT_GROWTH_BASE);
    }

    #[test]
    fn tier_span_follows_geometric_formula() {
        let calc = RankCalculator::default();
        let expected = DEFAULT_GROWTH_BASE.powi(6) - DEFAULT_GROWTH_BASE.powi(5);
        let span = calc.tier_span(5).as_secs_f64() / SECS_PER_HOUR;
        assert!((span - expected).abs() < 1e-6);
    }

    #[test]
    fn time_to_promotion_shrinks_within_tier() {
        let calc = RankCalculator::default();
        let early = calc.time_to_promotion(hours(10.0)).unwrap();
        let later = calc.time_to_promotion(hours(12.0)).unwrap();
        assert!(later < early);

        let expected = DEFAULT_GROWTH_BASE.powi(6) - 10.0;
        let early_hours = early.as_secs_f64() / SECS_PER_HOUR;
        assert!((early_hours - expected).abs() < 1e-6);
    }

    #[test]
    fn time_to_promotion_resets_after_crossing() {
        let calc = RankCalculator::default();
        let boundary = hours(DEFAULT_GROWTH_BASE.powi(6));
        let minute = Duration::from_secs(60);

        let before = calc.time_to_promotion(boundary - minute).unwrap();
        let after = calc.time_to_promotion(boundary + minute).unwrap();
        assert_eq!(calc.rank(boundary - minute), 5);
        assert_eq!(calc.rank(boundary + minute), 6);
        assert!(before <= Duration::from_secs(61));
        assert!(after > before);
    }

    #[test]
    fn status_bundles_everything() {
        let calc = RankCalculator::default();
        let status = calc.status(hours(10.0));
        assert_eq!(status.rank, 5);
        assert_eq!(status.group, 19);
        assert_eq!(status.total, hours(10.0));
        assert!(status.time_to_promotion.is_some());
    }
}
