//! Connection handle
//!
//! `ConnectionHandle` models an attached client and holds the sending side of
//! a bounded per-connection channel. Sends never touch the socket directly,
//! so they are safe to issue while the handle is being detached or closed:
//! a closed handle answers `Dead` instead of blocking.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::utils::{RelayError, RelayResult};

pub type ConnectionId = String;

/// Outcome of a non-blocking send that did not enqueue the message.
#[derive(Debug)]
pub enum SendAttempt {
    /// The queue is full; the message is handed back for a bounded wait.
    Full(Message),
    /// The recipient cannot receive anymore.
    Unreachable(RelayError),
}

#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    sender: mpsc::Sender<Message>,
    alive: AtomicBool,
    backlogged: AtomicBool,
    closed: Notify,
}

/// Receiving side of a handle's outbound queue, owned by the socket writer.
#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::Receiver<Message>,
}

impl ConnectionHandle {
    /// Create a handle with room for `capacity` undelivered messages. The `id`
    /// is a UUID used to identify the connection across group operations.
    pub fn new(capacity: usize, peer: Option<SocketAddr>) -> (Arc<Self>, OutboundQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            peer,
            sender,
            alive: AtomicBool::new(true),
            backlogged: AtomicBool::new(false),
            closed: Notify::new(),
        });
        (handle, OutboundQueue { receiver })
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// True while a deferred send is waiting for queue space.
    pub fn is_backlogged(&self) -> bool {
        self.backlogged.load(Ordering::Acquire)
    }

    /// Claim the single deferred-send slot. Returns `false` if it is taken.
    pub fn begin_backlog(&self) -> bool {
        !self.backlogged.swap(true, Ordering::AcqRel)
    }

    pub fn end_backlog(&self) {
        self.backlogged.store(false, Ordering::Release);
    }

    /// Mark the handle closed. Returns `true` only for the call that flipped it.
    pub fn close(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        if was_alive {
            self.closed.notify_waiters();
        }
        was_alive
    }

    /// Resolves once the handle has been closed.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed.notified();
            if !self.is_alive() {
                return;
            }
            notified.await;
        }
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, message: Message) -> Result<(), SendAttempt> {
        if !self.is_alive() {
            return Err(SendAttempt::Unreachable(RelayError::Dead(self.id.clone())));
        }
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => Err(SendAttempt::Full(message)),
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(SendAttempt::Unreachable(RelayError::Dead(self.id.clone())))
            }
        }
    }

    /// Enqueue, waiting at most `budget` for queue space.
    ///
    /// Gives up early with `Dead` if the handle is closed while waiting.
    pub async fn send(&self, message: Message, budget: Duration) -> RelayResult<()> {
        if !self.is_alive() {
            return Err(RelayError::Dead(self.id.clone()));
        }
        tokio::select! {
            res = self.sender.send_timeout(message, budget) => match res {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(RelayError::SendFailed(self.id.clone())),
                Err(SendTimeoutError::Closed(_)) => {
                    self.close();
                    Err(RelayError::Dead(self.id.clone()))
                }
            },
            _ = self.closed() => Err(RelayError::Dead(self.id.clone())),
        }
    }
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}
