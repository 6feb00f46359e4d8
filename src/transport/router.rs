//! Path routing
//!
//! Maps the request path of an incoming connection to a topic key. Topics
//! listed at startup are registered once; with dynamic topics enabled any
//! other absolute path is accepted and its group is created on first attach.

use std::sync::Arc;

use crate::broker::TopicRegistry;
use crate::utils::RelayResult;

#[derive(Debug)]
pub struct Router {
    registry: Arc<TopicRegistry>,
    dynamic: bool,
}

impl Router {
    /// Register every path up front. A duplicate or relative path is fatal.
    pub fn from_paths<I, S>(
        registry: Arc<TopicRegistry>,
        paths: I,
        dynamic: bool,
    ) -> RelayResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            registry.register(path.as_ref())?;
        }
        Ok(Self { registry, dynamic })
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Topic key for `path`, or `None` if nothing is served there.
    pub fn route(&self, path: &str) -> Option<String> {
        let path = path.split('?').next().unwrap_or(path);
        if self.registry.get(path).is_some_and(|group| group.is_pinned()) {
            return Some(path.to_string());
        }
        if self.dynamic && path.starts_with('/') {
            return Some(path.to_string());
        }
        None
    }
}
