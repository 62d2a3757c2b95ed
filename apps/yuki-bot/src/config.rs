use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use yuki_common::rank::{DEFAULT_GROUP_RANGE, DEFAULT_GROWTH_BASE};
use yuki_common::reconcile::DEFAULT_BASE_GROUP;
use yuki_common::{GroupId, GroupReconciler, RankCalculator};

/// Bot configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string for the time ledger.
    pub database_url: String,
    /// ServerQuery host.
    pub host: String,
    /// ServerQuery login name.
    pub username: String,
    /// ServerQuery login password.
    pub password: String,
    /// Nickname the bot shows on the server.
    pub nickname: String,
    /// ServerQuery TCP port.
    pub query_port: u16,
    /// Voice port of the virtual server to select after login.
    pub server_port: u16,
    /// How often the full client list is reconciled.
    pub sweep_interval: Duration,
    /// Each rank tier takes this many times longer than the previous one.
    pub growth_base: f64,
    /// First server group of the reserved rank range.
    pub rank_group_low: GroupId,
    /// Last server group of the reserved rank range.
    pub rank_group_high: GroupId,
    /// Group given to clients that hold no groups at all.
    pub base_group: GroupId,
    /// Write the extrapolated total to the ledger when a client disconnects.
    pub persist_on_disconnect: bool,
    /// Server name used in the welcome message.
    pub server_name: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| panic!("{name} env var is required"))
        };

        let (rank_group_low, rank_group_high) = rank_group_bounds(
            parsed(&lookup, "RANK_GROUP_LOW"),
            parsed(&lookup, "RANK_GROUP_HIGH"),
        );

        Self {
            database_url: required("DATABASE_URL"),
            host: required("TEAMSPEAK_HOST"),
            username: required("TEAMSPEAK_USER"),
            password: required("TEAMSPEAK_PASSWORD"),
            nickname: lookup("TEAMSPEAK_NICKNAME")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Yuki".to_string()),
            query_port: parsed(&lookup, "TEAMSPEAK_QUERY_PORT").unwrap_or(10011),
            server_port: parsed(&lookup, "TEAMSPEAK_SERVER_PORT").unwrap_or(9987),
            sweep_interval: parsed(&lookup, "SWEEP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(5)),
            growth_base: parsed(&lookup, "RANK_GROWTH_BASE")
                .filter(|base: &f64| base.is_finite() && *base > 1.0)
                .unwrap_or(DEFAULT_GROWTH_BASE),
            rank_group_low,
            rank_group_high,
            base_group: parsed(&lookup, "BASE_GROUP").unwrap_or(DEFAULT_BASE_GROUP),
            persist_on_disconnect: lookup("PERSIST_ON_DISCONNECT")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
            server_name: lookup("SERVER_DISPLAY_NAME").filter(|s| !s.is_empty()),
        }
    }

    pub fn rank_groups(&self) -> RangeInclusive<GroupId> {
        self.rank_group_low..=self.rank_group_high
    }

    pub fn rank_calculator(&self) -> RankCalculator {
        RankCalculator::new(self.growth_base, self.rank_groups())
    }

    pub fn group_reconciler(&self) -> GroupReconciler {
        GroupReconciler::new(self.base_group, self.rank_groups())
    }
}

/// An inverted range falls back to the default one.
fn rank_group_bounds(low: Option<GroupId>, high: Option<GroupId>) -> (GroupId, GroupId) {
    let low = low.unwrap_or(*DEFAULT_GROUP_RANGE.start());
    let high = high.unwrap_or(*DEFAULT_GROUP_RANGE.end());
    if low > high {
        tracing::warn!(low, high, "rank group range is inverted, using the default range");
        return DEFAULT_GROUP_RANGE.into_inner();
    }
    (low, high)
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}
