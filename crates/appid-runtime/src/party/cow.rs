//! Copy-on-write party lists.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Immutable snapshot list, replaced as a whole on every change.
///
/// Readers never block; writers are serialized by the identity agent.
pub(crate) struct CowList<T> {
    items: ArcSwap<Vec<Arc<T>>>,
}

impl<T> CowList<T> {
    pub(crate) fn new(items: Vec<Arc<T>>) -> Self {
        Self {
            items: ArcSwap::from_pointee(items),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.items.load_full()
    }

    pub(crate) fn push(&self, item: &Arc<T>) {
        self.items.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(item));
            next
        });
    }

    /// Removes `item` (by identity). Returns whether it was present.
    pub(crate) fn remove(&self, item: &Arc<T>) -> bool {
        let previous = self.items.rcu(|current| {
            current
                .iter()
                .filter(|p| !Arc::ptr_eq(p, item))
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|p| Arc::ptr_eq(p, item))
    }

    /// Empties the list, returning what it held.
    pub(crate) fn take(&self) -> Arc<Vec<Arc<T>>> {
        self.items.swap(Arc::new(Vec::new()))
    }
}
