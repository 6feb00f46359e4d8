//! Relay engine
//!
//! The `Dispatcher` turns one relay into independent per-member sends. Each
//! member is first offered the message without waiting. Only a member whose
//! queue is full gets a spawned task that waits up to the send budget, so a
//! slow receiver never holds up the sender or the other members.
//!
//! A member has at most one deferred send in flight. While it is pending,
//! later relays are not queued behind it: a member that overflows again
//! before catching up is evicted. This keeps memory per member bounded and
//! delivery to each member in relay order.
//!
//! Members that cannot receive are detached from the group: synchronously
//! when they are already closed or still backlogged, from the spawned task
//! when the budget runs out. Nothing is reported back to the sender beyond
//! the `RelayReport`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::broker::group::BroadcastGroup;
use crate::broker::message::Message;
use crate::client::{ConnectionHandle, SendAttempt};
use crate::utils::RelayError;

/// Counts for one relay call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Members the message was offered to.
    pub attempted: usize,
    /// Enqueued immediately.
    pub queued: usize,
    /// Handed to a task waiting for queue space.
    pub deferred: usize,
    /// Found unreachable and detached during the call.
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    runtime: Handle,
    send_timeout: Duration,
}

impl Dispatcher {
    /// Timeout used when none is configured.
    pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(runtime: Handle, send_timeout: Duration) -> Self {
        Self {
            runtime,
            send_timeout,
        }
    }

    /// Dispatcher on the runtime of the calling task.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(send_timeout: Duration) -> Self {
        Self::new(Handle::current(), send_timeout)
    }

    pub fn dispatch(
        &self,
        group: &Arc<BroadcastGroup>,
        message: &Message,
        targets: Vec<Arc<ConnectionHandle>>,
    ) -> RelayReport {
        let mut report = RelayReport {
            attempted: targets.len(),
            ..RelayReport::default()
        };

        for handle in targets {
            if handle.is_backlogged() {
                report.evicted += 1;
                evict(group, &handle, RelayError::SendFailed(handle.id().clone()));
                continue;
            }
            match handle.try_send(message.clone()) {
                Ok(()) => report.queued += 1,
                Err(SendAttempt::Full(message)) if handle.begin_backlog() => {
                    report.deferred += 1;
                    self.defer(Arc::downgrade(group), handle, message);
                }
                Err(SendAttempt::Full(_)) => {
                    report.evicted += 1;
                    evict(group, &handle, RelayError::SendFailed(handle.id().clone()));
                }
                Err(SendAttempt::Unreachable(err)) => {
                    report.evicted += 1;
                    evict(group, &handle, err);
                }
            }
        }

        report
    }

    fn defer(&self, group: Weak<BroadcastGroup>, handle: Arc<ConnectionHandle>, message: Message) {
        let budget = self.send_timeout;
        self.runtime.spawn(async move {
            match handle.send(message, budget).await {
                Ok(()) => handle.end_backlog(),
                Err(err) if err.is_unreachable() => {
                    if let Some(group) = group.upgrade() {
                        warn!(
                            topic = %group.topic(),
                            connection_id = %handle.id(),
                            "dropping unresponsive member: {err}"
                        );
                        evict(&group, &handle, err);
                    } else {
                        handle.close();
                    }
                }
                Err(err) => {
                    handle.end_backlog();
                    debug!(connection_id = %handle.id(), "deferred send abandoned: {err}");
                }
            }
        });
    }
}

fn evict(group: &BroadcastGroup, handle: &ConnectionHandle, err: RelayError) {
    debug!(topic = %group.topic(), connection_id = %handle.id(), "evicting member: {err}");
    handle.close();
    group.detach(handle.id());
}
