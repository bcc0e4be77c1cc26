use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-item status. `error` is terminal for the item: the only way out is a
/// user-initiated re-upload, which re-enters `pending-upload`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Normal,
    PendingUpload,
    Error,
}

/// The one row cell group that is visible for a given status. Exactly one
/// region is active per item at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Field,
    Progress,
    Message,
}

impl ItemStatus {
    pub fn active_region(self) -> Region {
        match self {
            ItemStatus::Normal => Region::Field,
            ItemStatus::PendingUpload => Region::Progress,
            ItemStatus::Error => Region::Message,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub block_id: BlockId,
    pub status: ItemStatus,
    /// Inline text shown in the message region (upload, remove, and move
    /// failures). Only meaningful while the status is `error`.
    pub message: Option<String>,
    pub file_optional: bool,
    /// When set, rank changes are held locally and flushed with the form
    /// instead of being synced per move.
    pub deferred_rank: bool,
    /// 0-based position written into the hidden rank input; only rewritten
    /// by deferred-mode reordering.
    pub local_rank: u32,
    /// Advisory upload percent, UI feedback only.
    pub progress: Option<u8>,
}

/// One table row: a real item, or an inert full-width error row (create
/// validation failures and the server-rendered field-errors row). Inert rows
/// are never drag sources or targets and do not count against capacity.
#[derive(Clone, Debug)]
pub enum Row {
    Item(Item),
    Placeholder(String),
}

impl Row {
    pub fn item(&self) -> Option<&Item> {
        match self {
            Row::Item(item) => Some(item),
            Row::Placeholder(_) => None,
        }
    }

    pub fn item_mut(&mut self) -> Option<&mut Item> {
        match self {
            Row::Item(item) => Some(item),
            Row::Placeholder(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Row::Placeholder(_))
    }
}

/// Ordered row set for one embedded collection (one `blockId`).
#[derive(Clone, Debug)]
pub struct Collection {
    pub block_id: BlockId,
    pub max_items: usize,
    pub rows: Vec<Row>,
    /// Hidden management-form counters; the form library expects both and
    /// they always move together.
    pub total_forms: u32,
    pub initial_forms: u32,
    pub add_enabled: bool,
    pub sort_enabled: bool,
    /// The table div is hidden while the collection holds no rows.
    pub visible: bool,
}

impl Collection {
    pub fn new(block_id: BlockId, max_items: usize) -> Self {
        Self {
            block_id,
            max_items,
            rows: Vec::new(),
            total_forms: 0,
            initial_forms: 0,
            add_enabled: true,
            sort_enabled: true,
            visible: false,
        }
    }

    pub fn item_count(&self) -> usize {
        self.rows.iter().filter(|r| r.item().is_some()).count()
    }

    pub fn find(&self, id: &ItemId) -> Option<&Item> {
        self.rows.iter().find_map(|r| r.item().filter(|i| &i.id == id))
    }

    pub fn find_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.rows
            .iter_mut()
            .find_map(|r| r.item_mut().filter(|i| &i.id == id))
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.item().is_some_and(|i| &i.id == id))
    }

    /// Insertion point for newly created rows: before a trailing inert row
    /// if one is present, otherwise at the end.
    pub fn insert_index(&self) -> usize {
        match self.rows.last() {
            Some(row) if row.is_placeholder() => self.rows.len() - 1,
            _ => self.rows.len(),
        }
    }

    pub fn adjust_totals(&mut self, delta: i64) {
        let n = i64::from(self.total_forms) + delta;
        self.total_forms = n.max(0) as u32;
        self.initial_forms = self.total_forms;
    }

    pub fn at_capacity(&self) -> bool {
        self.item_count() >= self.max_items
    }
}

#[cfg(test)]
#[path = "tests/model_tests.rs"]
mod tests;
