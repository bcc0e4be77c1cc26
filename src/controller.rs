//! Orchestration of add/replace/remove/upload/reorder intents.

use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::model::{BlockId, Collection, Item, ItemId, ItemStatus, Row};
use crate::page::PageState;
use crate::queue::{UploadQueue, UploadStart};
use crate::reorder::{self, MovePlan};
use crate::store::{CollectionStore, FilePayload, RowFragment, StoreError};

/// Result of a mutating intent. Transport failures are not surfaced as
/// errors: they end in lockdown, which is page state, not a caller problem.
#[derive(Debug)]
pub enum Mutation {
    /// Rows changed; any newly admitted transfers are handed back as work
    /// orders for the caller to run.
    Applied { started: Vec<UploadStart> },
    /// The server rejected item content; an inline message was rendered and
    /// the page stays live.
    RejectedInline,
    /// Unrecoverable failure; the page is now locked.
    LockedDown,
    /// Affordance disabled, unknown id, or a call for this item is already
    /// in flight. Nothing was sent.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    /// Dropped onto its own position; no call issued.
    Noop,
    /// Deferred mode; local ranks rewritten, flushed with the form later.
    Deferred,
    /// One rank-update call sent and acknowledged.
    Synced,
    LockedDown,
    Skipped,
}

pub struct CollectionController<S> {
    store: S,
    page: PageState,
    queue: UploadQueue,
    blocks: BTreeMap<BlockId, Collection>,
    /// Per-item guard: at most one mutating call in flight per id.
    in_flight: HashSet<ItemId>,
}

impl<S: CollectionStore> CollectionController<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            page: PageState::new(),
            queue: UploadQueue::new(),
            blocks: BTreeMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Register a collection as rendered into the page, rows included.
    pub fn register_block(&mut self, collection: Collection) {
        self.blocks.insert(collection.block_id.clone(), collection);
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn block(&self, block: &BlockId) -> Option<&Collection> {
        self.blocks.get(block)
    }

    pub fn pending_uploads(&self) -> usize {
        self.queue.len()
    }

    /// Field-edit hook for the page glue; the navigation-away warning keys
    /// off this.
    pub fn set_unsaved(&mut self, unsaved: bool) {
        self.page.set_unsaved(unsaved);
    }

    /// Create one item per selected file (or a single file-less item) in
    /// `block` and queue any required transfers.
    pub fn add_items(&mut self, block: &BlockId, files: Vec<FilePayload>) -> Mutation {
        if self.page.locked() {
            return Mutation::Skipped;
        }
        match self.blocks.get(block) {
            Some(col) if col.add_enabled => {}
            _ => return Mutation::Skipped,
        }

        let metas: Vec<_> = files.iter().map(|f| f.meta.clone()).collect();
        match self.store.create_items(block, None, &metas) {
            Ok(fragments) => {
                let started = self.apply_created(block, fragments, files);
                Mutation::Applied { started }
            }
            Err(err) => self.create_failed(block, err),
        }
    }

    /// Re-render one existing item and replace its file; always exactly one
    /// updated row. An errored row retried this way re-enters the upload
    /// pipeline.
    pub fn replace_item(&mut self, block: &BlockId, item: &ItemId, file: FilePayload) -> Mutation {
        // A queued transfer counts as an in-flight mutation for its item:
        // re-enqueueing would be dropped and the replacement payload lost.
        if self.page.locked() || self.queue.contains(item) || !self.in_flight.insert(item.clone())
        {
            return Mutation::Skipped;
        }
        if self.blocks.get(block).and_then(|c| c.find(item)).is_none() {
            self.in_flight.remove(item);
            return Mutation::Skipped;
        }

        let result = self
            .store
            .create_items(block, Some(item), std::slice::from_ref(&file.meta));
        self.in_flight.remove(item);

        match result {
            Ok(fragments) => {
                let Some(fragment) = fragments.into_iter().next() else {
                    return Mutation::Skipped;
                };
                // Mechanical re-render; must not disturb the unsaved flag.
                let prior_unsaved = self.page.unsaved();
                let Some(col) = self.blocks.get_mut(block) else {
                    return Mutation::Skipped;
                };
                let pending = fragment.pending_upload;
                if let Some(row) = col.find_mut(item) {
                    row.file_optional = fragment.file_optional;
                    row.deferred_rank = fragment.deferred_rank;
                    row.message = None;
                    row.progress = None;
                    row.status = if pending {
                        ItemStatus::PendingUpload
                    } else {
                        ItemStatus::Normal
                    };
                }
                self.page.set_unsaved(prior_unsaved);
                let mut started = Vec::new();
                if pending {
                    self.queue.enqueue(item.clone(), file);
                    self.page.hold_submit();
                    started = self.queue.admit();
                }
                Mutation::Applied { started }
            }
            Err(StoreError::Validation { message }) => {
                // Recoverable: rendered as an inert note row, the same
                // surface create validation uses. The item row keeps its
                // field region active, so a message on it would never show.
                if let Some(col) = self.blocks.get_mut(block) {
                    col.rows.push(Row::Placeholder(message));
                }
                Mutation::RejectedInline
            }
            Err(err) => {
                self.fail_row(item, err.row_message(None));
                Mutation::LockedDown
            }
        }
    }

    /// Delete one item from its collection.
    pub fn remove_item(&mut self, item: &ItemId) -> Mutation {
        // Same queue guard as replace: never delete a row whose transfer
        // has not resolved yet.
        if self.page.locked() || self.queue.contains(item) || !self.in_flight.insert(item.clone())
        {
            return Mutation::Skipped;
        }
        let Some(block) = self.block_of(item) else {
            self.in_flight.remove(item);
            return Mutation::Skipped;
        };

        let result = self.store.remove_item(item);
        self.in_flight.remove(item);

        match result {
            Ok(()) => {
                let prior_unsaved = self.page.unsaved();
                let Some(col) = self.blocks.get_mut(&block) else {
                    return Mutation::Skipped;
                };
                if let Some(pos) = col.position(item) {
                    col.rows.remove(pos);
                }
                col.adjust_totals(-1);
                if col.rows.is_empty() {
                    col.visible = false;
                }
                if !col.at_capacity() {
                    col.add_enabled = true;
                }
                self.page.set_unsaved(prior_unsaved);
                debug!(item = item.as_str(), "item removed");
                Mutation::Applied {
                    started: Vec::new(),
                }
            }
            Err(err) => {
                self.fail_row(item, err.row_message(None));
                Mutation::LockedDown
            }
        }
    }

    /// Pre-drop validity check for the drag controller.
    pub fn move_allowed(&self, block: &BlockId, from: usize, to: usize) -> bool {
        !self.page.locked()
            && self
                .blocks
                .get(block)
                .is_some_and(|col| reorder::move_allowed(col, from, to))
    }

    /// Complete a drag move of the row at `old_index` to `new_index`.
    pub fn drop_item(&mut self, block: &BlockId, old_index: usize, new_index: usize) -> DropOutcome {
        if !self.move_allowed(block, old_index, new_index) {
            return DropOutcome::Skipped;
        }
        let Some(col) = self.blocks.get_mut(block) else {
            return DropOutcome::Skipped;
        };
        let Some(moved) = col.rows.get(old_index).and_then(|r| r.item()).map(|i| i.id.clone())
        else {
            return DropOutcome::Skipped;
        };
        if self.in_flight.contains(&moved) {
            return DropOutcome::Skipped;
        }

        match reorder::apply_move(col, old_index, new_index) {
            MovePlan::Noop => DropOutcome::Noop,
            MovePlan::Deferred => DropOutcome::Deferred,
            MovePlan::Sync { item, rank } => {
                self.in_flight.insert(item.clone());
                let result = self.store.move_item(&item, rank);
                self.in_flight.remove(&item);
                match result {
                    Ok(()) => DropOutcome::Synced,
                    Err(err) => {
                        // The row stays where it was dropped; there is no
                        // rollback and no retry.
                        self.fail_row(&item, err.row_message(None));
                        DropOutcome::LockedDown
                    }
                }
            }
        }
    }

    /// Deliver the outcome of a transfer started from an [`UploadStart`].
    /// Completions may arrive in any order; matching is by item identity.
    /// Returns the transfers admitted into the freed slot.
    pub fn upload_finished(
        &mut self,
        item: &ItemId,
        outcome: Result<(), StoreError>,
    ) -> Vec<UploadStart> {
        match outcome {
            Ok(()) => {
                if let Some(row) = self.row_mut(item) {
                    row.status = ItemStatus::Normal;
                    row.message = None;
                    row.progress = None;
                }
                let drained = self.queue.complete(item);
                if self.page.locked() {
                    // Remaining tasks die with the page; nothing new starts.
                    return Vec::new();
                }
                if drained {
                    self.page.release_submit();
                }
                self.queue.admit()
            }
            Err(err) => {
                warn!(item = item.as_str(), error = %err, "upload failed");
                self.queue.complete(item);
                self.fail_row(item, err.row_message(Some("upload failed")));
                Vec::new()
            }
        }
    }

    /// Advisory progress feedback; no effect on admission or correctness.
    pub fn upload_progress(&mut self, item: &ItemId, sent: u64, total: u64) {
        if let Some(row) = self.row_mut(item) {
            if row.status == ItemStatus::PendingUpload && total > 0 {
                let pct = (sent.saturating_mul(100) / total).min(100) as u8;
                row.progress = Some(pct);
            }
        }
    }

    /// Blocking convenience driver: run admitted transfers through the
    /// store, feeding completions back until nothing new is admitted.
    pub fn drive_uploads(&mut self, started: Vec<UploadStart>) {
        let mut work: VecDeque<UploadStart> = started.into();
        while let Some(start) = work.pop_front() {
            let outcome = self.store.upload_file(&start.item, &start.payload);
            for next in self.upload_finished(&start.item, outcome) {
                work.push_back(next);
            }
        }
    }

    /// Terminal page freeze. Idempotent; callable from any failure path.
    pub fn lockdown(&mut self) {
        self.page.lockdown();
        for col in self.blocks.values_mut() {
            col.add_enabled = false;
            col.sort_enabled = false;
        }
    }

    fn apply_created(
        &mut self,
        block: &BlockId,
        fragments: Vec<RowFragment>,
        files: Vec<FilePayload>,
    ) -> Vec<UploadStart> {
        let prior_unsaved = self.page.unsaved();
        let Some(col) = self.blocks.get_mut(block) else {
            return Vec::new();
        };
        let mut at = col.insert_index();
        let mut rank = col.item_count() as u32;
        let mut pending = Vec::new();

        let added = fragments.len();
        for fragment in fragments {
            let item = Item {
                id: fragment.item_id.clone(),
                block_id: block.clone(),
                status: if fragment.pending_upload {
                    ItemStatus::PendingUpload
                } else {
                    ItemStatus::Normal
                },
                message: None,
                file_optional: fragment.file_optional,
                deferred_rank: fragment.deferred_rank,
                local_rank: rank,
                progress: None,
            };
            if fragment.pending_upload {
                pending.push(fragment.item_id);
            }
            col.rows.insert(at, Row::Item(item));
            at += 1;
            rank += 1;
        }

        col.adjust_totals(added as i64);
        col.visible = true;
        if col.at_capacity() {
            col.add_enabled = false;
        }
        self.page.set_unsaved(prior_unsaved);
        debug!(block = block.as_str(), added, "rows created");

        // Files pair with pending rows in selection order.
        for (id, file) in pending.into_iter().zip(files) {
            self.queue.enqueue(id, file);
            self.page.hold_submit();
        }
        self.queue.admit()
    }

    fn create_failed(&mut self, block: &BlockId, err: StoreError) -> Mutation {
        let message = err.row_message(None);
        if let Some(col) = self.blocks.get_mut(block) {
            // An inert error row spanning the table, never counted against
            // capacity or the hidden totals.
            col.rows.push(Row::Placeholder(message));
            col.visible = true;
        }
        if err.locks_down() {
            self.lockdown();
            Mutation::LockedDown
        } else {
            Mutation::RejectedInline
        }
    }

    /// Render a failure inline on the row, then lock the page.
    fn fail_row(&mut self, item: &ItemId, message: String) {
        if let Some(row) = self.row_mut(item) {
            row.status = ItemStatus::Error;
            row.message = Some(message);
            row.progress = None;
        }
        self.lockdown();
    }

    fn block_of(&self, item: &ItemId) -> Option<BlockId> {
        self.blocks
            .values()
            .find(|col| col.find(item).is_some())
            .map(|col| col.block_id.clone())
    }

    fn row_mut(&mut self, item: &ItemId) -> Option<&mut Item> {
        self.blocks.values_mut().find_map(|col| col.find_mut(item))
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
