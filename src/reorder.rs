//! Drag-reorder planning.
//!
//! A drop inside one collection becomes either a single authoritative
//! rank-update call for the moved item, or, in deferred mode, a local
//! rewrite of every row's hidden rank flushed with the form submission.

use tracing::debug;

use crate::model::{Collection, ItemId};

/// What a completed drop requires of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MovePlan {
    /// Dropped back onto its own position; no call, no rewrite.
    Noop,
    /// Deferred mode: local ranks rewritten, nothing to send now.
    Deferred,
    /// One rank-update call for the moved item, rank 1-based. Neighbor
    /// ranks are the server's to recompute.
    Sync { item: ItemId, rank: u32 },
}

/// Validity predicate consulted by the drag controller before a drop is
/// allowed to complete. Inert placeholder rows are never drag sources or
/// targets, and nothing moves while sorting is disabled.
pub fn move_allowed(collection: &Collection, from: usize, to: usize) -> bool {
    if !collection.sort_enabled {
        return false;
    }
    let is_item =
        |idx: usize| collection.rows.get(idx).is_some_and(|r| r.item().is_some());
    is_item(from) && is_item(to)
}

/// Apply a completed drop to the row set and report what must follow.
/// Callers must have checked [`move_allowed`] first.
pub fn apply_move(collection: &mut Collection, old_index: usize, new_index: usize) -> MovePlan {
    if old_index == new_index {
        return MovePlan::Noop;
    }
    if old_index >= collection.rows.len() || new_index >= collection.rows.len() {
        return MovePlan::Noop;
    }

    let row = collection.rows.remove(old_index);
    collection.rows.insert(new_index, row);

    let moved = match collection.rows[new_index].item() {
        Some(item) => item,
        None => return MovePlan::Noop,
    };
    debug!(
        block = collection.block_id.as_str(),
        item = moved.id.as_str(),
        old_index,
        new_index,
        "row moved"
    );

    if moved.deferred_rank {
        rewrite_local_ranks(collection);
        MovePlan::Deferred
    } else {
        MovePlan::Sync {
            item: moved.id.clone(),
            rank: new_index as u32 + 1,
        }
    }
}

/// Walk the full row sequence and write each item's 0-based position into
/// its hidden rank input.
fn rewrite_local_ranks(collection: &mut Collection) {
    let mut rank = 0u32;
    for row in collection.rows.iter_mut() {
        if let Some(item) = row.item_mut() {
            item.local_rank = rank;
            rank += 1;
        }
    }
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
