use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::user_times;

/// Lifetime online time of one registered client.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = user_times)]
pub struct UserTime {
    pub id: i64,
    pub total_time_ms: i64,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserTime {
    pub fn total(&self) -> Duration {
        millis_to_duration(self.total_time_ms)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_times)]
pub struct NewUserTime {
    pub id: i64,
    pub total_time_ms: i64,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Negative column values read as zero.
pub fn millis_to_duration(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

/// Saturates at `i64::MAX` milliseconds.
pub fn duration_to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
