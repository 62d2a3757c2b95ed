use std::fmt;

/// Server group identifier.
pub type GroupId = u32;

/// Stable identity of a registered user (the client database id).
///
/// Survives reconnects and keys the persistent ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(pub i64);

/// Ephemeral identifier of one live connection (the client id).
///
/// Only valid while the connection lives; a reconnect gets a fresh handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(pub u32);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prints_raw_value() {
        assert_eq!(Identity(42).to_string(), "42");
        assert_eq!(SessionHandle(7).to_string(), "7");
    }
}
