//! Per-shard registry of upstream observer nodes.
//!
//! The pool is built once at process start from configuration and never
//! mutated afterwards; every component reads it lock-free. Within a shard
//! the declared order of observers is significant: it is the retry order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ProcessError;

/// Node class: regular observers serve the active window, full-history
/// observers also retain historical transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    Observer,
    FullHistoryObserver,
}

impl fmt::Display for ObserverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObserverKind::Observer => write!(f, "observer"),
            ObserverKind::FullHistoryObserver => write!(f, "full-history observer"),
        }
    }
}

/// One upstream node. Immutable after pool construction.
///
/// Two observers may share an address only when they serve different shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
    pub address: String,
    pub shard_id: u32,
    pub kind: ObserverKind,
}

impl Observer {
    #[must_use]
    pub fn new(address: impl Into<String>, shard_id: u32, kind: ObserverKind) -> Self {
        Self { address: address.into(), shard_id, kind }
    }

    #[must_use]
    pub fn is_full_history(&self) -> bool {
        self.kind == ObserverKind::FullHistoryObserver
    }
}

/// The per-shard ordered observer lists plus a flat all-observers view.
pub struct ObserverPool {
    by_shard: HashMap<u32, Vec<Arc<Observer>>>,
    all: Vec<Arc<Observer>>,
    shard_order: Vec<u32>,
}

impl ObserverPool {
    /// Builds the pool from the configured observer list.
    ///
    /// Shard identifiers keep their first-seen order; in-shard observer
    /// order follows the input order.
    #[must_use]
    pub fn new(observers: Vec<Observer>) -> Self {
        let mut by_shard: HashMap<u32, Vec<Arc<Observer>>> = HashMap::new();
        let mut all = Vec::with_capacity(observers.len());
        let mut shard_order = Vec::new();

        for observer in observers {
            let observer = Arc::new(observer);
            if !shard_order.contains(&observer.shard_id) {
                shard_order.push(observer.shard_id);
            }
            by_shard.entry(observer.shard_id).or_default().push(Arc::clone(&observer));
            all.push(observer);
        }

        Self { by_shard, all, shard_order }
    }

    /// Ordered retry sequence for one shard.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NoObserversForShard`] when the shard is
    /// unknown or has no observers.
    pub fn observers(&self, shard_id: u32) -> Result<Vec<Arc<Observer>>, ProcessError> {
        match self.by_shard.get(&shard_id) {
            Some(list) if !list.is_empty() => Ok(list.clone()),
            _ => Err(ProcessError::NoObserversForShard(shard_id)),
        }
    }

    /// Every observer, concatenated per-shard in declared shard order.
    #[must_use]
    pub fn all_observers(&self) -> Vec<Arc<Observer>> {
        self.all.clone()
    }

    /// The first observer of each shard, in declared shard order.
    #[must_use]
    pub fn observers_one_per_shard(&self) -> Vec<Arc<Observer>> {
        self.shard_order
            .iter()
            .filter_map(|shard| self.by_shard.get(shard).and_then(|list| list.first()))
            .cloned()
            .collect()
    }

    /// Full-history observers of one shard, in declared order.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NoObserversForShard`] when the shard has no
    /// full-history observers.
    pub fn full_history_observers(
        &self,
        shard_id: u32,
    ) -> Result<Vec<Arc<Observer>>, ProcessError> {
        let list: Vec<Arc<Observer>> = self
            .by_shard
            .get(&shard_id)
            .map(|observers| {
                observers.iter().filter(|o| o.is_full_history()).cloned().collect()
            })
            .unwrap_or_default();

        if list.is_empty() {
            return Err(ProcessError::NoObserversForShard(shard_id));
        }
        Ok(list)
    }

    /// The known shard set, metachain included, in declared order.
    #[must_use]
    pub fn shard_ids(&self) -> Vec<u32> {
        self.shard_order.clone()
    }
}
