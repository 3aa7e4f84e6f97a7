//! Entity abstractions shared by the diff
//!
//! The reconciliation engine diffs assets and albums with the same algorithm;
//! [`RemoteEntity`] is the seam that makes that generic, and
//! [`ProcessingQueue`] is the diff's result for one entity kind.

/// Implemented by every entity the engine can reconcile.
pub trait RemoteEntity: Clone {
    /// Stable identity, deterministic across fetches of the same remote state.
    fn identity(&self) -> &str;

    /// Human-readable name for diagnostics.
    fn display_name(&self) -> &str;

    /// Entity-defined equality. Two entities with equal identity may still
    /// differ (e.g. a moved album), in which case the remote copy replaces
    /// the local one.
    fn matches(&self, other: &Self) -> bool;

    /// Lets a remote entity take over local-only state before it enters a
    /// processing queue. The default keeps the remote copy untouched.
    fn absorb(self, _local: Option<&Self>) -> Self
    where
        Self: Sized,
    {
        self
    }
}

/// Diff result for one entity kind.
///
/// The three sets are pairwise disjoint by identity. Applying the queue to
/// the local set (remove `to_delete`, add `to_add`, keep `to_keep`) yields
/// exactly the remote set.
#[derive(Debug, Clone)]
pub struct ProcessingQueue<T> {
    /// Present locally but not remotely (or superseded by a changed remote copy)
    pub to_delete: Vec<T>,
    /// Present remotely but not locally (or changed remotely)
    pub to_add: Vec<T>,
    /// Present in both and unchanged
    pub to_keep: Vec<T>,
}

impl<T> ProcessingQueue<T> {
    pub fn new() -> Self {
        Self {
            to_delete: Vec::new(),
            to_add: Vec::new(),
            to_keep: Vec::new(),
        }
    }

    /// True when there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_add.is_empty()
    }
}

impl<T> Default for ProcessingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
