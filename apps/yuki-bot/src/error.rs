use diesel_async::pooled_connection::deadpool::PoolError;
use thiserror::Error;
use yuki_common::SessionHandle;

/// Failure talking to the session service. Always treated as transient: the
/// affected entry is skipped and picked up again by the next sweep.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server rejected command (id={id}): {message}")]
    Command { id: u32, message: String },

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection to server closed")]
    Disconnected,

    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Failure reading or writing the persistent ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Failure while reconciling a single session.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("session {0} is no longer tracked")]
    Untracked(SessionHandle),
}
