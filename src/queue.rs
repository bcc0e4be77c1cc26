//! Bounded-concurrency upload admission.
//!
//! A single FIFO pending list; `admit` is the only place a transfer is ever
//! started, so the in-flight bound holds no matter how enqueues burst.

use tracing::debug;

use crate::model::ItemId;
use crate::store::FilePayload;

/// At most this many transfers may be admitted and incomplete at once.
pub const SIMULTANEOUS: usize = 4;

struct Task {
    admitted: bool,
    item: ItemId,
    /// Surrendered to the caller on admission; the entry itself stays in the
    /// list until completion removes it by item identity.
    payload: Option<FilePayload>,
}

/// Work order handed back on admission. The caller performs the transfer and
/// reports the outcome by item id; completions may arrive in any order.
#[derive(Debug)]
pub struct UploadStart {
    pub item: ItemId,
    pub payload: FilePayload,
}

#[derive(Default)]
pub struct UploadQueue {
    tasks: Vec<Task>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn admitted(&self) -> usize {
        self.tasks.iter().filter(|t| t.admitted).count()
    }

    pub fn contains(&self, item: &ItemId) -> bool {
        self.tasks.iter().any(|t| &t.item == item)
    }

    /// Append a task at the tail. Enqueue is sequential, so FIFO order is
    /// unambiguous. An item already queued is not enqueued again.
    pub fn enqueue(&mut self, item: ItemId, payload: FilePayload) {
        if self.contains(&item) {
            return;
        }
        debug!(item = item.as_str(), size = payload.meta.size, "enqueue upload");
        self.tasks.push(Task {
            admitted: false,
            item,
            payload: Some(payload),
        });
    }

    /// Scan the head window and start anything not yet started. Re-invoked
    /// after every enqueue and every completion.
    pub fn admit(&mut self) -> Vec<UploadStart> {
        let mut started = Vec::new();
        for task in self.tasks.iter_mut().take(SIMULTANEOUS) {
            if task.admitted {
                continue;
            }
            task.admitted = true;
            let payload = match task.payload.take() {
                Some(p) => p,
                None => continue,
            };
            debug!(item = task.item.as_str(), "admit upload");
            started.push(UploadStart {
                item: task.item.clone(),
                payload,
            });
        }
        started
    }

    /// Remove the task for `item`, freeing its slot. Returns true when the
    /// queue is now fully drained.
    pub fn complete(&mut self, item: &ItemId) -> bool {
        if let Some(pos) = self.tasks.iter().position(|t| &t.item == item) {
            debug!(item = item.as_str(), "upload task done");
            self.tasks.remove(pos);
        }
        self.tasks.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/queue_tests.rs"]
mod tests;
