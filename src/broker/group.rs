//! Broadcast groups
//!
//! A `BroadcastGroup` holds the handles attached to one topic. Membership is
//! guarded by a single mutex that is held only to mutate the set or to copy
//! it; relays iterate over the copy, so attach/detach during delivery never
//! changes an in-flight relay and no lock is held across a send.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::broker::message::Message;
use crate::broker::relay::{Dispatcher, RelayReport};
use crate::client::{ConnectionHandle, ConnectionId};
use crate::utils::{RelayError, RelayResult};

/// Whether a relay is delivered back to the connection that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    pub echo_to_sender: bool,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            echo_to_sender: true,
        }
    }
}

#[derive(Debug)]
pub struct BroadcastGroup {
    topic: String,
    members: Mutex<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    policy: RelayPolicy,
    dispatcher: Dispatcher,
    pinned: AtomicBool,
}

impl BroadcastGroup {
    pub fn new(topic: &str, policy: RelayPolicy, dispatcher: Dispatcher) -> Self {
        Self {
            topic: topic.to_string(),
            members: Mutex::new(HashMap::new()),
            policy,
            dispatcher,
            pinned: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Pinned groups were registered at startup and are never reaped.
    pub fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::Acquire)
    }

    pub(crate) fn pin(&self) {
        self.pinned.store(true, Ordering::Release);
    }

    fn members(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<ConnectionHandle>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a handle. It receives every relay issued after this returns.
    pub fn attach(&self, handle: Arc<ConnectionHandle>) -> RelayResult<()> {
        if !handle.is_alive() {
            return Err(RelayError::Dead(handle.id().clone()));
        }
        let mut members = self.members();
        match members.entry(handle.id().clone()) {
            Entry::Occupied(_) => Err(RelayError::DuplicateAttach(
                handle.id().clone(),
                self.topic.clone(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                debug!(topic = %self.topic, members = members.len(), "attached");
                Ok(())
            }
        }
    }

    /// Remove a handle if present. Detaching an absent handle is a no-op.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        let mut members = self.members();
        let removed = members.remove(id).is_some();
        if removed {
            debug!(topic = %self.topic, connection_id = %id, members = members.len(), "detached");
        }
        removed
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members().keys().cloned().collect()
    }

    /// Copy of the current membership.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.members().values().cloned().collect()
    }

    /// Deliver `message` to every member, skipping `sender` when echo is off.
    ///
    /// `sender` is `None` for server-originated publishes. Failures to reach
    /// individual members are absorbed here: the member is detached and the
    /// relay carries on.
    pub fn relay(
        self: &Arc<Self>,
        message: &Message,
        sender: Option<&ConnectionId>,
    ) -> RelayReport {
        let targets: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|handle| self.policy.echo_to_sender || Some(handle.id()) != sender)
            .collect();

        debug!(
            topic = %self.topic,
            recipients = targets.len(),
            bytes = message.len(),
            binary = message.is_binary(),
            "relaying"
        );

        self.dispatcher.dispatch(self, message, targets)
    }

    /// Close every member and empty the group.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.members().drain().map(|(_, handle)| handle).collect();
        for handle in &drained {
            handle.close();
        }
        if !drained.is_empty() {
            info!(topic = %self.topic, closed = drained.len(), "closed all members");
        }
        drained.len()
    }
}
