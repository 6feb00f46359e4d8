//! Topic registry
//!
//! Maps a topic key (an absolute URL path) to its `BroadcastGroup`. There is
//! never more than one group per key: creation happens under the registry
//! lock, and the lock order is always registry first, then group.
//!
//! Groups are retained for the life of the process by default. With
//! `RetentionPolicy::ReapEmpty`, groups that were not registered at startup
//! are dropped once their last member leaves through [`TopicRegistry::detach`]
//! or on a [`TopicRegistry::reap_empty`] sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::broker::group::{BroadcastGroup, RelayPolicy};
use crate::broker::message::Message;
use crate::broker::relay::{Dispatcher, RelayReport};
use crate::client::{ConnectionHandle, ConnectionId};
use crate::utils::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    Retain,
    ReapEmpty,
}

#[derive(Debug)]
pub struct TopicRegistry {
    groups: Mutex<HashMap<String, Arc<BroadcastGroup>>>,
    policy: RelayPolicy,
    retention: RetentionPolicy,
    dispatcher: Dispatcher,
}

impl TopicRegistry {
    pub fn new(policy: RelayPolicy, retention: RetentionPolicy, dispatcher: Dispatcher) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            policy,
            retention,
            dispatcher,
        }
    }

    /// Registry with default relay and retention policies.
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self::new(RelayPolicy::default(), RetentionPolicy::default(), dispatcher)
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<String, Arc<BroadcastGroup>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_locked(
        &self,
        groups: &mut HashMap<String, Arc<BroadcastGroup>>,
        key: &str,
    ) -> Arc<BroadcastGroup> {
        groups
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(topic = %key, "creating broadcast group");
                Arc::new(BroadcastGroup::new(key, self.policy, self.dispatcher.clone()))
            })
            .clone()
    }

    /// Group for `key`, created on first use. Repeated calls return the same group.
    pub fn resolve(&self, key: &str) -> Arc<BroadcastGroup> {
        let mut groups = self.groups();
        self.resolve_locked(&mut groups, key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<BroadcastGroup>> {
        self.groups().get(key).cloned()
    }

    /// Register a startup topic. Each path may be registered once.
    pub fn register(&self, key: &str) -> RelayResult<Arc<BroadcastGroup>> {
        if !key.starts_with('/') {
            return Err(RelayError::InvalidTopicPath(key.to_string()));
        }
        let mut groups = self.groups();
        if groups.get(key).is_some_and(|group| group.is_pinned()) {
            return Err(RelayError::DuplicateTopicRegistration(key.to_string()));
        }
        let group = self.resolve_locked(&mut groups, key);
        group.pin();
        info!(topic = %key, "topic registered");
        Ok(group)
    }

    /// Resolve `key` and attach `handle` to it as one step.
    pub fn attach(
        &self,
        key: &str,
        handle: Arc<ConnectionHandle>,
    ) -> RelayResult<Arc<BroadcastGroup>> {
        let mut groups = self.groups();
        let group = self.resolve_locked(&mut groups, key);
        if let Err(err) = group.attach(handle) {
            drop(groups);
            if self.retention == RetentionPolicy::ReapEmpty {
                self.release(key);
            }
            return Err(err);
        }
        Ok(group)
    }

    /// Detach `id` from `group`, then reap the group if policy allows.
    pub fn detach(&self, group: &Arc<BroadcastGroup>, id: &ConnectionId) -> bool {
        let removed = group.detach(id);
        if self.retention == RetentionPolicy::ReapEmpty {
            self.release(group.topic());
        }
        removed
    }

    /// Drop the group for `key` if it is empty and not pinned.
    pub fn release(&self, key: &str) -> bool {
        let mut groups = self.groups();
        let reapable = groups
            .get(key)
            .is_some_and(|group| !group.is_pinned() && group.is_empty());
        if reapable {
            groups.remove(key);
            debug!(topic = %key, "reaped empty broadcast group");
        }
        reapable
    }

    /// Drop every empty, unpinned group when reaping is enabled. Returns how
    /// many were dropped.
    pub fn reap_empty(&self) -> usize {
        if self.retention == RetentionPolicy::Retain {
            return 0;
        }
        let mut groups = self.groups();
        let before = groups.len();
        groups.retain(|_, group| group.is_pinned() || !group.is_empty());
        before - groups.len()
    }

    /// Server-originated publish. Returns `None` when the topic does not exist.
    pub fn publish(&self, key: &str, message: &Message) -> Option<RelayReport> {
        let group = self.get(key)?;
        Some(group.relay(message, None))
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.groups().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.groups().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups().is_empty()
    }

    /// Close every member of every group.
    pub fn shutdown(&self) -> usize {
        let groups: Vec<_> = self.groups().values().cloned().collect();
        groups.iter().map(|group| group.close_all()).sum()
    }
}
