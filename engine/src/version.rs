//! List version tracking.
//!
//! Every versioned batch for a list must carry exactly the next version.
//! Anything else is stale or out of order and is dropped without buffering.

use crate::{ListId, ListVersion};
use std::collections::HashMap;

/// Tracks the last accepted version for each list.
#[derive(Debug, Clone, Default)]
pub struct VersionTracker {
    versions: HashMap<ListId, ListVersion>,
}

impl VersionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            versions: HashMap::new(),
        }
    }

    /// Start tracking a list at a known version, replacing any previous value.
    pub fn initialize(&mut self, list_id: impl Into<ListId>, version: ListVersion) {
        self.versions.insert(list_id.into(), version);
    }

    /// Try to accept a batch carrying `incoming`.
    ///
    /// Accepts and advances when `incoming` is exactly one past the tracked
    /// version, or when nothing is tracked yet for the list (the tracker then
    /// adopts `incoming`). Returns false otherwise and leaves state untouched.
    pub fn try_accept(&mut self, list_id: &str, incoming: ListVersion) -> bool {
        match self.versions.get_mut(list_id) {
            Some(current) if current.checked_add(1) == Some(incoming) => {
                *current = incoming;
                true
            }
            Some(current) => {
                tracing::debug!(
                    list_id = %list_id,
                    tracked = *current,
                    incoming,
                    "rejecting out-of-order list version"
                );
                false
            }
            None => {
                self.versions.insert(list_id.to_string(), incoming);
                true
            }
        }
    }

    /// Check whether `incoming` would be accepted, without advancing.
    pub fn would_accept(&self, list_id: &str, incoming: ListVersion) -> bool {
        match self.versions.get(list_id) {
            Some(current) => current.checked_add(1) == Some(incoming),
            None => true,
        }
    }

    /// The version expected by the next batch, if one is tracked.
    pub fn expected_next(&self, list_id: &str) -> Option<ListVersion> {
        self.versions.get(list_id).map(|v| v.saturating_add(1))
    }

    /// The last accepted version for a list.
    pub fn current(&self, list_id: &str) -> Option<ListVersion> {
        self.versions.get(list_id).copied()
    }

    /// Stop tracking a list.
    pub fn forget(&mut self, list_id: &str) {
        self.versions.remove(list_id);
    }
}
