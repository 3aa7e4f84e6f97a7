//! Three-way diff and hierarchy resolution
//!
//! The diff partitions the remote and local sets by identity: remote-only
//! entities are added, local-only entities deleted, matching entities kept.
//! For albums, a second pass resolves hierarchical dependencies and orders
//! the queues so parents are written before their children (and removed
//! after them).

use std::collections::{HashMap, HashSet};

use tracing::debug;

use fotosync_core::domain::{Album, ProcessingQueue, RemoteEntity};

use crate::error::SyncError;

/// Computes the processing queue for one entity kind.
///
/// An entity present on both sides but failing its equality check is
/// replaced: the remote copy goes to `to_add` while the stale local copy
/// stays in `to_delete`.
pub fn processing_queues<T: RemoteEntity>(
    remote: &[T],
    local: &HashMap<String, T>,
) -> ProcessingQueue<T> {
    let mut remaining = local.clone();
    let mut queue = ProcessingQueue::new();

    for entity in remote {
        let identity = entity.identity().to_string();
        let matched = remaining
            .get(&identity)
            .map(|local_entity| entity.matches(local_entity))
            .unwrap_or(false);
        if matched {
            let local_entity = remaining.remove(&identity);
            queue
                .to_keep
                .push(entity.clone().absorb(local_entity.as_ref()));
        } else {
            debug!(entity = %entity.display_name(), "Adding remote entity");
            queue
                .to_add
                .push(entity.clone().absorb(remaining.get(&identity)));
        }
    }

    // Whatever was never referenced by the remote state gets removed
    queue.to_delete = remaining.into_values().collect();
    debug!(
        add = queue.to_add.len(),
        delete = queue.to_delete.len(),
        keep = queue.to_keep.len(),
        "Processing queues computed"
    );
    queue
}

/// Resolves hierarchical dependencies in the album queue.
///
/// A kept album with an ancestor marked for deletion did not change from a
/// diffing perspective, but its on-disk location is about to disappear: it
/// must be moved, i.e. deleted and re-added.
pub fn resolve_hierarchical_dependencies(
    mut queue: ProcessingQueue<Album>,
    local_albums: &HashMap<String, Album>,
) -> ProcessingQueue<Album> {
    let full_set: Vec<Album> = local_albums.values().cloned().collect();
    let deleted = queue.to_delete.clone();

    let mut moved = Vec::new();
    queue.to_keep.retain(|kept| {
        let ancestor_deleted = deleted
            .iter()
            .any(|candidate| kept.has_ancestor(candidate, &full_set));
        if ancestor_deleted {
            debug!(album = %kept.name, "Album has hierarchical dependency, moving");
            moved.push(kept.clone());
        }
        !ancestor_deleted
    });

    for album in moved {
        queue.to_delete.push(album.clone());
        queue.to_add.push(album);
    }
    queue
}

/// Orders a queue so that every album's parent precedes it.
///
/// Implemented as a stable peel: albums whose parent is absent from the
/// remaining set are ready; if a round makes no progress the parent graph
/// contains a cycle, which is a protocol violation, not a supported case.
pub fn sort_queue(albums: Vec<Album>) -> Result<Vec<Album>, SyncError> {
    let mut remaining = albums;
    let mut sorted = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let in_set: HashSet<String> = remaining.iter().map(|album| album.uuid.clone()).collect();
        let (ready, blocked): (Vec<Album>, Vec<Album>) =
            remaining.into_iter().partition(|album| {
                album
                    .parent
                    .as_deref()
                    .map_or(true, |parent| !in_set.contains(parent))
            });

        if ready.is_empty() {
            let identity = blocked
                .first()
                .map(|album| album.uuid.clone())
                .unwrap_or_default();
            return Err(SyncError::HierarchyCycle { identity });
        }

        sorted.extend(ready);
        remaining = blocked;
    }

    debug_assert!(queue_is_sorted(&sorted));
    Ok(sorted)
}

/// Checks the parent-before-child invariant: no album's parent appears at a
/// larger index than the album itself.
pub fn queue_is_sorted(queue: &[Album]) -> bool {
    queue.iter().enumerate().all(|(index, album)| {
        match album.parent.as_deref() {
            None => true,
            Some(parent) => !queue[index + 1..].iter().any(|later| later.uuid == parent),
        }
    })
}
