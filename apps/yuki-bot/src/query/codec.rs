//! ServerQuery line grammar: escaping, command lines and response records.
//!
//! A response line is a list of entries separated by `|`; each entry is a
//! list of `key=value` tokens separated by spaces. Values are escaped so they
//! never contain a raw space, pipe or line break.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

const ESCAPES: [(char, &str); 11] = [
    ('\\', "\\\\"),
    ('/', "\\/"),
    (' ', "\\s"),
    ('|', "\\p"),
    ('\u{07}', "\\a"),
    ('\u{08}', "\\b"),
    ('\u{0c}', "\\f"),
    ('\n', "\\n"),
    ('\r', "\\r"),
    ('\t', "\\t"),
    ('\u{0b}', "\\v"),
];

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == c) {
            Some((_, escaped)) => out.push_str(escaped),
            None => out.push(c),
        }
    }
    out
}

pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(code) = chars.next() else {
            out.push('\\');
            break;
        };
        let raw = ESCAPES
            .iter()
            .find(|(_, escaped)| escaped.ends_with(code))
            .map(|(raw, _)| *raw);
        match raw {
            Some(raw) => out.push(raw),
            None => {
                out.push('\\');
                out.push(code);
            }
        }
    }
    out
}

/// One `|`-separated entry of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn parse_entry(entry: &str) -> Self {
        let fields = entry
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.to_string(), unescape(value)),
                None => (token.to_string(), String::new()),
            })
            .collect();
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

pub fn parse_records(line: &str) -> Vec<Record> {
    line.split('|')
        .map(Record::parse_entry)
        .filter(|record| !record.is_empty())
        .collect()
}

/// Terminal `error id=.. msg=..` line of a command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: u32,
    pub message: String,
}

pub fn parse_status(line: &str) -> Option<Status> {
    let rest = line.strip_prefix("error ")?;
    let record = Record::parse_entry(rest);
    Some(Status {
        id: record.parse("id")?,
        message: record.get("msg").unwrap_or_default().to_string(),
    })
}

/// A command line under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    line: String,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            line: name.to_string(),
        }
    }

    pub fn arg(mut self, key: &str, value: impl Display) -> Self {
        self.line.push(' ');
        self.line.push_str(key);
        self.line.push('=');
        self.line.push_str(&escape(&value.to_string()));
        self
    }

    /// Repeat `key` for every value: `sgid=1|sgid=2`.
    pub fn arg_list<T: Display>(mut self, key: &str, values: impl IntoIterator<Item = T>) -> Self {
        let joined: Vec<String> = values
            .into_iter()
            .map(|value| format!("{key}={}", escape(&value.to_string())))
            .collect();
        if !joined.is_empty() {
            self.line.push(' ');
            self.line.push_str(&joined.join("|"));
        }
        self
    }

    /// Option switch such as `-groups`.
    pub fn flag(mut self, flag: &str) -> Self {
        self.line.push_str(" -");
        self.line.push_str(flag);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_special_characters() {
        assert_eq!(escape("a b|c/d\\e"), "a\\sb\\pc\\/d\\\\e");
        assert_eq!(escape("line\nbreak\ttab"), "line\\nbreak\\ttab");
    }

    #[test]
    fn unescape_reverses_escape() {
        let raw = "Welcome to [b]Green Diode[/b]!\nRank | 5 \\ done";
        assert_eq!(unescape(&escape(raw)), raw);
    }

    #[test]
    fn unescape_keeps_unknown_sequences() {
        assert_eq!(unescape("a\\xb"), "a\\xb");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn parse_piped_records() {
        let records = parse_records(
            "clid=1 client_nickname=Alice\\sA client_servergroups=8,47|clid=2 client_nickname=Bob",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("client_nickname"), Some("Alice A"));
        assert_eq!(records[0].get("client_servergroups"), Some("8,47"));
        assert_eq!(records[1].parse::<u32>("clid"), Some(2));
    }

    #[test]
    fn bare_tokens_become_empty_values() {
        let records = parse_records("virtualserver_id=1 -flag");
        assert_eq!(records[0].get("-flag"), Some(""));
    }

    #[test]
    fn parse_status_lines() {
        assert_eq!(
            parse_status("error id=0 msg=ok"),
            Some(Status { id: 0, message: "ok".to_string() })
        );
        assert_eq!(
            parse_status("error id=2561 msg=duplicate\\sentry"),
            Some(Status { id: 2561, message: "duplicate entry".to_string() })
        );
        assert_eq!(parse_status("clid=1"), None);
    }

    #[test]
    fn command_lines_escape_values() {
        let cmd = Command::new("sendtextmessage")
            .arg("targetmode", 1)
            .arg("target", 12)
            .arg("msg", "hi there|you");
        assert_eq!(cmd.as_str(), "sendtextmessage targetmode=1 target=12 msg=hi\\sthere\\pyou");
        assert_eq!(cmd.name(), "sendtextmessage");
    }

    #[test]
    fn command_lists_and_flags() {
        let cmd = Command::new("clientaddservergroup")
            .arg("cldbid", 7)
            .arg_list("sgid", [14, 47]);
        assert_eq!(cmd.as_str(), "clientaddservergroup cldbid=7 sgid=14|sgid=47");

        let cmd = Command::new("clientlist").flag("groups").flag("times");
        assert_eq!(cmd.as_str(), "clientlist -groups -times");
    }
}
