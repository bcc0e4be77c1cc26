//! In-process collection-store server for integration tests.
//!
//! Serves the four endpoints the page consumes (`/item`, `/file`,
//! `/moveitem`, `/removeitem`) over an in-memory item list; the guard
//! handle offers fault injection and state inspection.

use std::collections::HashSet;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};

#[derive(Clone, Debug)]
pub struct StoredItem {
    pub id: String,
    pub block_id: String,
    pub file_name: Option<String>,
    pub uploaded_bytes: Option<usize>,
}

#[derive(Default)]
pub struct ServerState {
    next_id: u32,
    items: Vec<StoredItem>,
    /// Operation names forced to answer 500: "create", "upload", "move",
    /// "remove".
    failing: HashSet<String>,
    /// Answer uploads with a 422 rejection instead of accepting bytes.
    reject_uploads: bool,
}

pub struct ServerGuard {
    pub base_url: String,
    state: Arc<Mutex<ServerState>>,
}

impl ServerGuard {
    pub fn items(&self) -> Vec<StoredItem> {
        self.state.lock().unwrap().items.clone()
    }

    #[allow(dead_code)]
    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    #[allow(dead_code)]
    pub fn reject_uploads(&self) {
        self.state.lock().unwrap().reject_uploads = true;
    }
}

type Shared = Arc<Mutex<ServerState>>;

pub fn spawn_server() -> Result<ServerGuard> {
    let state: Shared = Arc::new(Mutex::new(ServerState::default()));

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/item", post(create_items))
        .route("/file", post(upload_file))
        .route("/moveitem", post(move_item))
        .route("/removeitem", post(remove_item))
        .with_state(state.clone());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build test runtime")?;
    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .context("bind test listener")?;
    let addr = listener.local_addr().context("listener addr")?;

    thread::spawn(move || {
        let _ = rt.block_on(axum::serve(listener, app).into_future());
    });

    let base_url = format!("http://{}", addr);
    wait_for_healthz(&base_url)?;
    Ok(ServerGuard { base_url, state })
}

fn wait_for_healthz(base_url: &str) -> Result<()> {
    let client = reqwest::blocking::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > Duration::from_secs(5) {
            anyhow::bail!("server did not become healthy at {}/healthz", base_url);
        }
        match client.get(format!("{}/healthz", base_url)).send() {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => thread::sleep(Duration::from_millis(10)),
        }
    }
}

async fn create_items(
    State(state): State<Shared>,
    Form(fields): Form<Vec<(String, String)>>,
) -> impl IntoResponse {
    let mut st = state.lock().unwrap();
    if st.failing.contains("create") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()).into_response();
    }

    let mut block_id = None;
    let mut item_id = None;
    let mut files = Vec::new();
    for (key, value) in fields {
        match key.as_str() {
            "block_id" => block_id = Some(value),
            "item_id" => item_id = Some(value),
            k if k.starts_with("filesize") => files.push(value),
            _ => {}
        }
    }
    let Some(block_id) = block_id else {
        return (StatusCode::BAD_REQUEST, "missing block_id".to_string()).into_response();
    };
    if files.iter().any(|name| name.len() > 64) {
        return (StatusCode::UNPROCESSABLE_ENTITY, "file name too long".to_string())
            .into_response();
    }

    // Replace mode: re-render one existing row.
    if let Some(id) = item_id {
        let Some(item) = st.items.iter_mut().find(|i| i.id == id) else {
            return (StatusCode::BAD_REQUEST, "unknown item".to_string()).into_response();
        };
        item.file_name = files.first().cloned();
        item.uploaded_bytes = None;
        let fragment = serde_json::json!([{
            "item_id": id,
            "pending_upload": !files.is_empty(),
            "file_optional": false,
            "deferred_rank": false,
        }]);
        return Json(fragment).into_response();
    }

    let count = files.len().max(1);
    let mut fragments = Vec::new();
    for i in 0..count {
        st.next_id += 1;
        let id = format!("i{}", st.next_id);
        st.items.push(StoredItem {
            id: id.clone(),
            block_id: block_id.clone(),
            file_name: files.get(i).cloned(),
            uploaded_bytes: None,
        });
        fragments.push(serde_json::json!({
            "item_id": id,
            "pending_upload": i < files.len(),
            "file_optional": files.is_empty(),
            "deferred_rank": false,
        }));
    }
    Json(serde_json::Value::Array(fragments)).into_response()
}

async fn upload_file(State(state): State<Shared>, mut multipart: Multipart) -> impl IntoResponse {
    let mut item_id = None;
    let mut bytes = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("item_id") => item_id = field.text().await.ok(),
            Some("file") => bytes = field.bytes().await.ok(),
            _ => {}
        }
    }

    let mut st = state.lock().unwrap();
    if st.failing.contains("upload") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()).into_response();
    }
    if st.reject_uploads {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "unsupported file type".to_string(),
        )
            .into_response();
    }
    let (Some(id), Some(bytes)) = (item_id, bytes) else {
        return (StatusCode::BAD_REQUEST, "missing field".to_string()).into_response();
    };
    let Some(item) = st.items.iter_mut().find(|i| i.id == id) else {
        return (StatusCode::BAD_REQUEST, "unknown item".to_string()).into_response();
    };
    item.uploaded_bytes = Some(bytes.len());
    StatusCode::OK.into_response()
}

async fn move_item(
    State(state): State<Shared>,
    Form(fields): Form<Vec<(String, String)>>,
) -> impl IntoResponse {
    let mut st = state.lock().unwrap();
    if st.failing.contains("move") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()).into_response();
    }

    let field = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };
    let (Some(id), Some(rank)) = (field("item_id"), field("rank")) else {
        return (StatusCode::BAD_REQUEST, "missing field".to_string()).into_response();
    };
    let Ok(rank) = rank.parse::<usize>() else {
        return (StatusCode::BAD_REQUEST, "bad rank".to_string()).into_response();
    };
    let Some(pos) = st.items.iter().position(|i| i.id == id) else {
        return (StatusCode::BAD_REQUEST, "unknown item".to_string()).into_response();
    };

    // Rank is 1-based within the item's own block; neighbors shift here,
    // on the authority side.
    let item = st.items.remove(pos);
    let block_positions: Vec<usize> = st
        .items
        .iter()
        .enumerate()
        .filter(|(_, i)| i.block_id == item.block_id)
        .map(|(idx, _)| idx)
        .collect();
    let target = rank.saturating_sub(1);
    let insert_at = block_positions
        .get(target)
        .copied()
        .unwrap_or(st.items.len());
    st.items.insert(insert_at, item);
    StatusCode::OK.into_response()
}

async fn remove_item(
    State(state): State<Shared>,
    Form(fields): Form<Vec<(String, String)>>,
) -> impl IntoResponse {
    let mut st = state.lock().unwrap();
    if st.failing.contains("remove") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()).into_response();
    }
    let Some(id) = fields
        .iter()
        .find(|(k, _)| k == "item_id")
        .map(|(_, v)| v.clone())
    else {
        return (StatusCode::BAD_REQUEST, "missing item_id".to_string()).into_response();
    };
    let Some(pos) = st.items.iter().position(|i| i.id == id) else {
        return (StatusCode::BAD_REQUEST, "unknown item".to_string()).into_response();
    };
    st.items.remove(pos);
    StatusCode::OK.into_response()
}
