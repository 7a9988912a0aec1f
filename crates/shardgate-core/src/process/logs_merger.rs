//! Merging of event logs gathered from different shards.
//!
//! A cross-shard transaction leaves partial logs on both its source and
//! destination shard; the merged view must contain each event exactly once.
//! Event identity is the `{address, identifier, topics}` tuple, with the
//! topics folded through the injected hasher.

use std::collections::HashSet;
use std::sync::Arc;

use crate::encoding::Hasher;
use crate::types::{ApiLogs, Event};

/// Deduplicating merger over [`ApiLogs`] pairs.
pub struct LogsMerger {
    hasher: Arc<dyn Hasher>,
}

impl LogsMerger {
    #[must_use]
    pub fn new(hasher: Arc<dyn Hasher>) -> Self {
        Self { hasher }
    }

    /// Merges `extra` into `base`, dropping events already present in
    /// `base`. The merge is commutative up to event order and idempotent.
    #[must_use]
    pub fn merge(&self, base: Option<ApiLogs>, extra: Option<ApiLogs>) -> Option<ApiLogs> {
        match (base, extra) {
            (None, None) => None,
            (Some(logs), None) | (None, Some(logs)) => Some(logs),
            (Some(mut base), Some(extra)) => {
                let mut seen: HashSet<Vec<u8>> =
                    base.events.iter().map(|e| self.event_key(e)).collect();

                for event in extra.events {
                    if seen.insert(self.event_key(&event)) {
                        base.events.push(event);
                    }
                }
                Some(base)
            }
        }
    }

    fn event_key(&self, event: &Event) -> Vec<u8> {
        let mut key = Vec::with_capacity(event.address.len() + event.identifier.len() + 32);
        key.extend_from_slice(event.address.as_bytes());
        key.push(0);
        key.extend_from_slice(event.identifier.as_bytes());
        key.push(0);

        // Length-prefixed topics, so ["ab","c"] and ["a","bc"] hash apart.
        let mut topics = Vec::new();
        for topic in &event.topics {
            topics.extend_from_slice(&(topic.len() as u64).to_be_bytes());
            topics.extend_from_slice(topic.as_bytes());
        }
        key.extend_from_slice(&self.hasher.hash(&topics));
        key
    }
}
