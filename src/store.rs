//! Canonical in-memory collection for one resource type.
//!
//! The store never talks to the network. Writers publish a whole new
//! [`Snapshot`]; readers always see either the previous or the next snapshot,
//! never a partially applied one.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::types::Entity;

/// Aggregate counters derived from the items of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    /// Entities still changing server-side.
    pub transient: usize,
}

impl StoreStats {
    pub fn compute<E: Entity>(items: &[E]) -> Self {
        let mut stats = StoreStats {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            *stats.by_status.entry(item.status_label()).or_default() += 1;
            if item.is_transient() {
                stats.transient += 1;
            }
        }
        stats
    }

    pub fn count(&self, status: &str) -> usize {
        self.by_status.get(status).copied().unwrap_or(0)
    }
}

/// Immutable view of the store at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot<E> {
    pub items: Vec<E>,
    pub stats: StoreStats,
    /// Incremented on every write.
    pub version: u64,
}

impl<E: Entity> Snapshot<E> {
    fn build(items: Vec<E>, version: u64) -> Self {
        let stats = StoreStats::compute(&items);
        Self {
            items,
            stats,
            version,
        }
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.items.iter().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn has_transient(&self) -> bool {
        self.stats.transient > 0
    }
}

/// Owner-scoped mirror of a remote collection.
pub struct EntityStore<E> {
    current: ArcSwap<Snapshot<E>>,
    changes: watch::Sender<u64>,
}

impl<E: Entity> EntityStore<E> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<E>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(Snapshot::build(items, 0)),
            changes,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot<E>> {
        self.current.load_full()
    }

    /// Receiver that observes the version of every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Authoritative wholesale replacement.
    pub fn replace(&self, items: Vec<E>) -> Arc<Snapshot<E>> {
        self.apply_optimistic(move |_| items.clone())
    }

    /// Apply a pure `items -> items` function and publish the result.
    pub fn apply_optimistic<F>(&self, mutation: F) -> Arc<Snapshot<E>>
    where
        F: Fn(&[E]) -> Vec<E>,
    {
        self.current.rcu(|cur| Snapshot::build(mutation(&cur.items), cur.version + 1));
        let published = self.current.load_full();
        trace!(
            resource = E::RESOURCE,
            version = published.version,
            total = published.stats.total,
            "store snapshot published"
        );
        self.changes.send_replace(published.version);
        published
    }

    /// Remove every entity whose id is in `ids`. Unknown ids are ignored.
    /// Returns how many entities were removed.
    pub fn remove<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: HashSet<String> = ids.into_iter().map(Into::into).collect();
        let before = self.snapshot().stats.total;
        let after = self
            .apply_optimistic(|items| {
                items
                    .iter()
                    .filter(|e| !ids.contains(e.id()))
                    .cloned()
                    .collect()
            })
            .stats
            .total;
        before.saturating_sub(after)
    }

    /// Replace the entity with `id` by `f(entity)`. Returns the prior copy,
    /// or `None` (and no write) when the id is unknown.
    pub fn update<F>(&self, id: &str, f: F) -> Option<E>
    where
        F: Fn(&E) -> E,
    {
        let prior = self.snapshot().get(id).cloned()?;
        self.apply_optimistic(|items| {
            items
                .iter()
                .map(|e| if e.id() == id { f(e) } else { e.clone() })
                .collect()
        });
        Some(prior)
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }
}

impl<E: Entity> Default for EntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}
