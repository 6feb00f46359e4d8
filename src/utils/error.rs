//! Error types for the relay.
//!
//! Per-connection failures (`SendFailed`, `Dead`, `NotOpen`) are contained by
//! the broker and transport and never fail a relay as a whole. Registry
//! conflicts are raised at startup and are fatal.

use thiserror::Error;

use crate::client::ConnectionId;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The handle is already a member of the group.
    #[error("connection {0} is already attached to topic {1}")]
    DuplicateAttach(ConnectionId, String),

    /// A message arrived on a connection that is not open.
    #[error("connection {0} is not open")]
    NotOpen(ConnectionId),

    /// The recipient did not accept the message within its time budget.
    #[error("send to connection {0} failed")]
    SendFailed(ConnectionId),

    /// The recipient has already closed.
    #[error("connection {0} is closed")]
    Dead(ConnectionId),

    /// Two startup topics claim the same path.
    #[error("topic {0} is registered more than once")]
    DuplicateTopicRegistration(String),

    #[error("topic path must be absolute: {0:?}")]
    InvalidTopicPath(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// True for failures that mean the recipient should leave its group.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RelayError::SendFailed(_) | RelayError::Dead(_))
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
