//! Text sent to clients. Uses the server's BBCode for emphasis.

use std::time::Duration;

use yuki_common::RankStatus;

const UNITS: [(&str, u64); 4] = [("day", 86_400), ("hour", 3_600), ("minute", 60), ("second", 1)];

/// Human readable duration rounded to whole seconds, e.g.
/// `"1 day, 2 hours, 5 seconds"`.
pub fn humanize(duration: Duration) -> String {
    let mut remaining = (duration.as_millis() + 500) / 1000;
    if remaining == 0 {
        return "0 seconds".to_string();
    }

    let mut parts = Vec::new();
    for (name, secs) in UNITS {
        let secs = u128::from(secs);
        let count = remaining / secs;
        remaining %= secs;
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }
    parts.join(", ")
}

/// `"time left until the next rank is [b]..[/b]"`, or the top-rank notice.
fn next_rank(status: &RankStatus) -> String {
    match status.time_to_promotion {
        Some(left) => format!("time left until the next rank is [b]{}[/b]", humanize(left)),
        None => "you have reached the highest rank".to_string(),
    }
}

/// Greeting sent when a client connects.
pub fn welcome(status: &RankStatus, server_name: Option<&str>) -> String {
    let server = match server_name {
        Some(name) => format!("[b]{name}[/b]"),
        None => "the server".to_string(),
    };
    format!(
        "\nWelcome to {server}!\nYour current rank is [b]{}[/b] after {} with us, {}.",
        status.rank,
        humanize(status.total),
        next_rank(status),
    )
}

/// Sent when a client moves into a new rank group.
pub fn promotion(status: &RankStatus) -> String {
    format!(
        "Congratulations! Your new rank is [b]{}[/b], {}.",
        status.rank,
        next_rank(status),
    )
}
