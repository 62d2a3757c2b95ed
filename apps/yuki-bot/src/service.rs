//! The bot's view of the voice server: who is online, and how to change their
//! groups or talk to them.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use yuki_common::{GroupId, Identity, SessionHandle};

use crate::error::ServiceError;

/// One live client connection as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub identity: Identity,
    pub handle: SessionHandle,
    pub nickname: String,
    pub groups: BTreeSet<GroupId>,
    /// How long this connection has been up, as the server sees it.
    pub connected_for: Duration,
}

/// Notification pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Connected(SessionDescriptor),
    Disconnected {
        handle: SessionHandle,
        nickname: Option<String>,
    },
}

#[async_trait]
pub trait SessionService: Send + Sync {
    /// All live regular (non-query) clients.
    async fn list_live_sessions(&self) -> Result<Vec<SessionDescriptor>, ServiceError>;

    /// Add server groups. Groups already held are not an error.
    async fn add_groups(
        &self,
        session: &SessionDescriptor,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), ServiceError>;

    /// Remove server groups. Groups not held are not an error.
    async fn remove_groups(
        &self,
        session: &SessionDescriptor,
        groups: &BTreeSet<GroupId>,
    ) -> Result<(), ServiceError>;

    /// Send a private text message to one connection.
    async fn notify(&self, handle: SessionHandle, text: &str) -> Result<(), ServiceError>;
}
