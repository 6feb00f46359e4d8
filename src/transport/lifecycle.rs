//! Connection lifecycle
//!
//! `Connection` binds one transport connection to broker operations and
//! tracks its state: `Connecting -> Open -> Closed`, with no way out of
//! `Closed`. The transport calls [`Connection::open`] once the handshake is
//! accepted, [`Connection::on_message`] per inbound data frame, and
//! [`Connection::on_close`] on close or error. Close may be reported more
//! than once; the detach happens exactly once.

use std::sync::Arc;

use tracing::{debug, info};

use crate::broker::{BroadcastGroup, Message, RelayReport, TopicRegistry};
use crate::client::{ConnectionHandle, ConnectionId};
use crate::utils::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug)]
pub struct Connection {
    topic: String,
    handle: Arc<ConnectionHandle>,
    registry: Arc<TopicRegistry>,
    group: Option<Arc<BroadcastGroup>>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(
        registry: Arc<TopicRegistry>,
        topic: impl Into<String>,
        handle: Arc<ConnectionHandle>,
    ) -> Self {
        Self {
            topic: topic.into(),
            handle,
            registry,
            group: None,
            state: ConnectionState::Connecting,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        self.handle.id()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Attach to the topic. Any failure leaves the connection `Closed`.
    pub fn open(&mut self) -> RelayResult<()> {
        if self.state != ConnectionState::Connecting {
            return Err(RelayError::NotOpen(self.handle.id().clone()));
        }

        match self.registry.attach(&self.topic, self.handle.clone()) {
            Ok(group) => {
                info!(
                    topic = %self.topic,
                    connection_id = %self.handle.id(),
                    peer = ?self.handle.peer(),
                    members = group.len(),
                    "connection open"
                );
                self.group = Some(group);
                self.state = ConnectionState::Open;
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Closed;
                self.handle.close();
                Err(err)
            }
        }
    }

    /// Relay an inbound message to the topic.
    ///
    /// Fails with `NotOpen` unless the connection is open. A connection whose
    /// handle was evicted by the relay engine is closed here.
    pub fn on_message(&mut self, message: Message) -> RelayResult<RelayReport> {
        if self.state != ConnectionState::Open {
            return Err(RelayError::NotOpen(self.handle.id().clone()));
        }
        if !self.handle.is_alive() {
            self.on_close();
            return Err(RelayError::NotOpen(self.handle.id().clone()));
        }
        let Some(group) = self.group.clone() else {
            return Err(RelayError::NotOpen(self.handle.id().clone()));
        };

        Ok(group.relay(&message, Some(self.handle.id())))
    }

    /// Detach from the topic and close the handle. Returns `true` only for
    /// the call that performed the transition.
    pub fn on_close(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        let was_open = self.state == ConnectionState::Open;
        self.state = ConnectionState::Closed;
        self.handle.close();

        if let Some(group) = self.group.take() {
            self.registry.detach(&group, self.handle.id());
        }

        if was_open {
            info!(topic = %self.topic, connection_id = %self.handle.id(), "connection closed");
        } else {
            debug!(topic = %self.topic, connection_id = %self.handle.id(), "connection abandoned before open");
        }
        true
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.on_close();
    }
}
