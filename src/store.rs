//! Remote collection-store contract and error taxonomy.

use serde::{Deserialize, Serialize};

use crate::model::{BlockId, ItemId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
}

#[derive(Clone, Debug)]
pub struct FilePayload {
    pub meta: FileMeta,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let size = bytes.len() as u64;
        Self {
            meta: FileMeta { name, size },
            bytes,
        }
    }
}

/// Structured row returned by create/replace, standing in for the rendered
/// row fragment of the original wire format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RowFragment {
    pub item_id: ItemId,
    /// The row was rendered expecting a file transfer to follow.
    pub pending_upload: bool,
    #[serde(default)]
    pub file_optional: bool,
    #[serde(default)]
    pub deferred_rank: bool,
}

/// Failure taxonomy for every remote call. Only `Validation` is recoverable;
/// the other two end in page lockdown.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The server rejected item content. Rendered inline, no lockdown.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The server accepted the upload request but rejected the file itself.
    #[error("upload rejected: {message}")]
    UploadRejected { message: String },

    /// Network failure, timeout, or 5xx. Always locks the page.
    #[error("{}", failure_text(*server, None))]
    Transport { server: bool },
}

impl StoreError {
    /// Inline text for the row message region, matching the page wording.
    pub fn row_message(&self, prefix: Option<&str>) -> String {
        match self {
            StoreError::Validation { message } | StoreError::UploadRejected { message } => {
                match prefix {
                    Some(p) => format!("{}: {}", p, message),
                    None => message.clone(),
                }
            }
            StoreError::Transport { server } => failure_text(*server, prefix),
        }
    }

    pub fn locks_down(&self) -> bool {
        !matches!(self, StoreError::Validation { .. })
    }
}

/// "server error" for 5xx-class failures, "communication error" otherwise.
pub fn failure_text(server: bool, prefix: Option<&str>) -> String {
    let kind = if server {
        "server error"
    } else {
        "communication error"
    };
    match prefix {
        Some(p) => format!("{}: {}", p, kind),
        None => kind.to_string(),
    }
}

/// The four remote operations consumed by the collection core. Item creation
/// and deletion go through here one at a time; file bytes travel out-of-band
/// from creation; rank updates carry only the moved item.
pub trait CollectionStore {
    /// Create new items in `block`, or re-render a single existing item when
    /// `item_id` is given (replace mode, always exactly one fragment).
    fn create_items(
        &self,
        block: &BlockId,
        item_id: Option<&ItemId>,
        files: &[FileMeta],
    ) -> Result<Vec<RowFragment>, StoreError>;

    fn upload_file(&self, item: &ItemId, payload: &FilePayload) -> Result<(), StoreError>;

    /// Rank is 1-based on the wire; the server recomputes affected
    /// neighbors itself.
    fn move_item(&self, item: &ItemId, rank: u32) -> Result<(), StoreError>;

    fn remove_item(&self, item: &ItemId) -> Result<(), StoreError>;
}
