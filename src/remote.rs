//! HTTP `CollectionStore` against the page's own URL base.
//!
//! Wire shape: `POST {base}/item`, `/file`, `/moveitem`, `/removeitem`.
//! Create and the metadata calls are urlencoded forms; the upload is
//! multipart. Create carries one `filesize{size}` = name field per file.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::model::{BlockId, ItemId};
use crate::store::{CollectionStore, FileMeta, FilePayload, RowFragment, StoreError};

/// Large-payload create gets a longer timeout than the metadata-only calls;
/// the upload itself is unbounded (progress events cover long transfers).
const CREATE_TIMEOUT: Duration = Duration::from_secs(20);
const META_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteStore {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RemoteStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // No client-wide timeout: per-request deadlines are set below and
        // uploads run as long as they need to.
        let client = reqwest::blocking::Client::builder()
            .user_agent("formrow")
            .timeout(None)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Transport failures collapse to one shape; a timeout is just another
    /// communication error. Only a response we actually received can be a
    /// server (5xx) error.
    fn transport(err: &reqwest::Error) -> StoreError {
        let server = err
            .status()
            .is_some_and(|s| s.is_server_error());
        StoreError::Transport { server }
    }

    fn status_error(resp: reqwest::blocking::Response) -> StoreError {
        let status = resp.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let message = resp
                .text()
                .unwrap_or_default()
                .trim()
                .to_string();
            StoreError::Validation { message }
        } else {
            StoreError::Transport {
                server: status.is_server_error(),
            }
        }
    }
}

impl CollectionStore for RemoteStore {
    fn create_items(
        &self,
        block: &BlockId,
        item_id: Option<&ItemId>,
        files: &[FileMeta],
    ) -> Result<Vec<RowFragment>, StoreError> {
        let mut form: Vec<(String, String)> =
            vec![("block_id".to_string(), block.as_str().to_string())];
        if let Some(id) = item_id {
            form.push(("item_id".to_string(), id.as_str().to_string()));
        }
        for file in files {
            form.push((format!("filesize{}", file.size), file.name.clone()));
        }
        debug!(block = block.as_str(), files = files.len(), "create items");

        let resp = self
            .client
            .post(self.url("/item"))
            .timeout(CREATE_TIMEOUT)
            .form(&form)
            .send()
            .map_err(|e| Self::transport(&e))?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp));
        }
        resp.json::<Vec<RowFragment>>()
            .map_err(|e| Self::transport(&e))
    }

    fn upload_file(&self, item: &ItemId, payload: &FilePayload) -> Result<(), StoreError> {
        let part = reqwest::blocking::multipart::Part::bytes(payload.bytes.clone())
            .file_name(payload.meta.name.clone());
        let form = reqwest::blocking::multipart::Form::new()
            .text("item_id", item.as_str().to_string())
            .part("file", part);
        debug!(item = item.as_str(), size = payload.meta.size, "upload file");

        let resp = self
            .client
            .post(self.url("/file"))
            .multipart(form)
            .send()
            .map_err(|e| Self::transport(&e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            // The server took the request but rejected the file itself.
            let message = resp.text().unwrap_or_default().trim().to_string();
            return Err(StoreError::UploadRejected { message });
        }
        Err(StoreError::Transport {
            server: status.is_server_error(),
        })
    }

    fn move_item(&self, item: &ItemId, rank: u32) -> Result<(), StoreError> {
        debug!(item = item.as_str(), rank, "move item");
        let rank = rank.to_string();
        let resp = self
            .client
            .post(self.url("/moveitem"))
            .timeout(META_TIMEOUT)
            .form(&[("item_id", item.as_str()), ("rank", rank.as_str())])
            .send()
            .map_err(|e| Self::transport(&e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Transport {
                server: resp.status().is_server_error(),
            })
        }
    }

    fn remove_item(&self, item: &ItemId) -> Result<(), StoreError> {
        debug!(item = item.as_str(), "remove item");
        let resp = self
            .client
            .post(self.url("/removeitem"))
            .timeout(META_TIMEOUT)
            .form(&[("item_id", item.as_str())])
            .send()
            .map_err(|e| Self::transport(&e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Transport {
                server: resp.status().is_server_error(),
            })
        }
    }
}
