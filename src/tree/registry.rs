//! Path-keyed node index
//!
//! [`TreeNodeMap`] is the one structure shared by every node of a client:
//! the global path index lives in the client context, and every node keeps
//! its direct children in another instance of the same map. All mutations
//! are atomic per key; there is no lock over the whole tree.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// What the index needs to know about the values it stores
pub trait Indexed: Send + Sync {
    /// Absolute path the value is registered under
    fn key(&self) -> &str;

    /// `true` once the value has been torn down and may be replaced
    fn is_retired(&self) -> bool;
}

#[derive(Debug)]
pub struct TreeNodeMap<N = super::TreeNode> {
    inner: DashMap<String, Arc<N>>,
}

impl<N: Indexed> TreeNodeMap<N> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn get(
        &self,
        path: &str,
    ) -> Option<Arc<N>> {
        self.inner.get(path).map(|e| e.value().clone())
    }

    /// Registers `node` unless a live value already holds its path.
    ///
    /// A retired occupant (cleared but not yet removed) is replaced. On
    /// conflict the current live occupant is returned.
    pub fn insert_if_absent(
        &self,
        node: Arc<N>,
    ) -> Result<(), Arc<N>> {
        match self.inner.entry(node.key().to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_retired() {
                    occupied.insert(node);
                    Ok(())
                } else {
                    Err(occupied.get().clone())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(node);
                Ok(())
            }
        }
    }

    pub fn remove(
        &self,
        path: &str,
    ) -> Option<Arc<N>> {
        self.inner.remove(path).map(|(_, v)| v)
    }

    /// Removes `node` only if it is still the value registered under its
    /// path, so a late teardown never evicts a newer instance.
    pub fn remove_node(
        &self,
        node: &Arc<N>,
    ) -> bool {
        self.inner
            .remove_if(node.key(), |_, current| Arc::ptr_eq(current, node))
            .is_some()
    }

    /// Drops the entry for `path` if its value is retired.
    pub fn remove_if_retired(
        &self,
        path: &str,
    ) -> bool {
        self.inner.remove_if(path, |_, current| current.is_retired()).is_some()
    }

    pub fn contains(
        &self,
        path: &str,
    ) -> bool {
        self.inner.contains_key(path)
    }

    /// Point-in-time copy of all values. Never hold shard guards across an
    /// `.await`; iterate the snapshot instead.
    pub fn snapshot(&self) -> Vec<Arc<N>> {
        self.inner.iter().map(|e| e.value().clone()).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl<N: Indexed> Default for TreeNodeMap<N> {
    fn default() -> Self {
        Self::new()
    }
}
