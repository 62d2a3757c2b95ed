//! Mapping ServerQuery records onto session descriptors and server events.

use std::collections::BTreeSet;
use std::time::Duration;

use yuki_common::{GroupId, Identity, SessionHandle};

use super::codec::{parse_records, Record};
use crate::service::{SessionDescriptor, ServerEvent};

const REGULAR_CLIENT: &str = "0";

/// Whether the record describes a voice client rather than a query login.
pub fn is_regular(record: &Record) -> bool {
    record.get("client_type") == Some(REGULAR_CLIENT)
}

/// Build a descriptor from a `clientlist -groups -times` entry.
///
/// `now_ms` is the current unix time in milliseconds; the connection age is
/// derived from `client_lastconnected` and never negative.
pub fn descriptor_from_clientlist(record: &Record, now_ms: i64) -> Option<SessionDescriptor> {
    let last_connected: i64 = record.parse("client_lastconnected")?;
    let age_ms = now_ms.saturating_sub(last_connected.saturating_mul(1000));
    let connected_for = Duration::from_millis(u64::try_from(age_ms).unwrap_or(0));
    descriptor(record, connected_for)
}

fn descriptor(record: &Record, connected_for: Duration) -> Option<SessionDescriptor> {
    Some(SessionDescriptor {
        identity: Identity(record.parse("client_database_id")?),
        handle: SessionHandle(record.parse("clid")?),
        nickname: record.get("client_nickname").unwrap_or_default().to_string(),
        groups: parse_groups(record.get("client_servergroups").unwrap_or_default()),
        connected_for,
    })
}

/// `"8,47"` → `{8, 47}`. Blank or malformed ids are dropped.
pub fn parse_groups(raw: &str) -> BTreeSet<GroupId> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

/// Parse a `notify...` line into the events the bot cares about.
///
/// A client that just entered has not accrued any time in this connection
/// yet, so its descriptor carries a zero connection age.
pub fn parse_notification(line: &str) -> Vec<ServerEvent> {
    let (name, body) = line.split_once(' ').unwrap_or((line, ""));
    let records = parse_records(body);

    match name {
        "notifycliententerview" => records
            .iter()
            .filter(|record| is_regular(record))
            .filter_map(|record| descriptor(record, Duration::ZERO))
            .map(ServerEvent::Connected)
            .collect(),
        "notifyclientleftview" => records
            .iter()
            .filter_map(|record| {
                Some(ServerEvent::Disconnected {
                    handle: SessionHandle(record.parse("clid")?),
                    nickname: record.get("client_nickname").map(str::to_string),
                })
            })
            .collect(),
        _ => {
            tracing::trace!(notification = name, "ignoring notification");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_view_becomes_connected_event() {
        let events = parse_notification(
            "notifycliententerview cfid=0 ctid=1 reasonid=0 clid=5 \
             client_unique_identifier=abc= client_nickname=Alice client_database_id=42 \
             client_servergroups=8,47 client_type=0",
        );
        assert_eq!(
            events,
            vec![ServerEvent::Connected(SessionDescriptor {
                identity: Identity(42),
                handle: SessionHandle(5),
                nickname: "Alice".to_string(),
                groups: [8, 47].into_iter().collect(),
                connected_for: Duration::ZERO,
            })]
        );
    }

    #[test]
    fn query_clients_are_ignored() {
        let events = parse_notification(
            "notifycliententerview clid=9 client_nickname=bot client_database_id=1 \
             client_servergroups=2 client_type=1",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn left_view_becomes_disconnected_event() {
        let events =
            parse_notification("notifyclientleftview cfid=1 ctid=0 reasonid=8 reasonmsg=bye clid=5");
        assert_eq!(
            events,
            vec![ServerEvent::Disconnected {
                handle: SessionHandle(5),
                nickname: None,
            }]
        );
    }

    #[test]
    fn unrelated_notifications_produce_nothing() {
        assert!(parse_notification("notifytextmessage targetmode=3 msg=hi").is_empty());
    }

    #[test]
    fn clientlist_entry_derives_connection_age() {
        let record: Record = [
            ("clid", "3"),
            ("client_database_id", "17"),
            ("client_nickname", "Bob"),
            ("client_type", "0"),
            ("client_servergroups", "19,22"),
            ("client_lastconnected", "1000"),
        ]
        .into_iter()
        .collect();

        let descriptor = descriptor_from_clientlist(&record, 1_060_500).unwrap();
        assert_eq!(descriptor.identity, Identity(17));
        assert_eq!(descriptor.handle, SessionHandle(3));
        assert_eq!(descriptor.groups, [19, 22].into_iter().collect());
        assert_eq!(descriptor.connected_for, Duration::from_millis(60_500));
    }

    #[test]
    fn clock_skew_never_yields_negative_age() {
        let record: Record = [
            ("clid", "3"),
            ("client_database_id", "17"),
            ("client_lastconnected", "2000"),
        ]
        .into_iter()
        .collect();

        let descriptor = descriptor_from_clientlist(&record, 1_000_000).unwrap();
        assert_eq!(descriptor.connected_for, Duration::ZERO);
        assert!(descriptor.groups.is_empty());
    }

    #[test]
    fn records_missing_ids_are_rejected() {
        let record: Record = [("clid", "3"), ("client_lastconnected", "1")].into_iter().collect();
        assert!(descriptor_from_clientlist(&record, 5_000).is_none());
    }

    #[test]
    fn group_list_tolerates_blanks() {
        assert!(parse_groups("").is_empty());
        assert_eq!(parse_groups("8, 47,,x"), [8, 47].into_iter().collect());
    }
}
