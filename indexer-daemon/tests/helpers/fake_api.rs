//! In-process stand-in for the ingestion API
//!
//! Serves `POST /api/audio/init` and `POST /api/audio/:id/upload` on 127.0.0.1:0 and
//! records every request. Failures can be scripted per file name (registration) or
//! as a count of upcoming upload attempts.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One multipart part received by the upload route
#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub id: String,
    pub field_name: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct ApiState {
    inits: Mutex<Vec<Value>>,
    uploads: Mutex<Vec<ReceivedPart>>,
    upload_attempts: AtomicU32,
    next_id: AtomicU32,
    fail_init_for: Mutex<HashSet<String>>,
    fail_uploads_remaining: Mutex<u32>,
}

pub struct FakeApi {
    pub base_url: String,
    state: Arc<ApiState>,
    server: JoinHandle<()>,
}

impl FakeApi {
    pub async fn start() -> Self {
        let state = Arc::new(ApiState::default());
        let app = Router::new()
            .route("/api/audio/init", post(init))
            .route("/api/audio/:id/upload", post(upload))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            server,
        }
    }

    /// `{base_url}/api/audio`
    pub fn endpoint(&self) -> String {
        format!("{}/api/audio", self.base_url)
    }

    /// Registration of `file_name` answers 500
    pub fn fail_init_for(&self, file_name: &str) {
        self.state
            .fail_init_for
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    /// The next `count` upload attempts answer 503
    pub fn fail_next_uploads(&self, count: u32) {
        *self.state.fail_uploads_remaining.lock().unwrap() = count;
    }

    pub fn inits(&self) -> Vec<Value> {
        self.state.inits.lock().unwrap().clone()
    }

    pub fn init_file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inits()
            .iter()
            .filter_map(|body| body["fileName"].as_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Parts from accepted uploads only
    pub fn uploads(&self) -> Vec<ReceivedPart> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .uploads()
            .into_iter()
            .filter_map(|part| part.file_name)
            .collect();
        names.sort();
        names
    }

    /// Every upload request, rejected ones included
    pub fn upload_attempts(&self) -> u32 {
        self.state.upload_attempts.load(Ordering::SeqCst)
    }
}

impl Drop for FakeApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn init(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let file_name = body["fileName"].as_str().unwrap_or_default().to_string();
    state.inits.lock().unwrap().push(body.clone());

    if state.fail_init_for.lock().unwrap().contains(&file_name) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot register {}", file_name),
        ));
    }

    let id = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Json(json!({
        "id": format!("audio-{}", id),
        "fileName": file_name,
        "filePath": body["filePath"],
        "metadata": body["metadata"],
    })))
}

async fn upload(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.upload_attempts.fetch_add(1, Ordering::SeqCst);

    // Drain the body before answering so the client always sees the status
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        parts.push(ReceivedPart {
            id: id.clone(),
            field_name,
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    if take_scripted_failure(&state) {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "storage busy".to_string()));
    }

    let received: usize = parts.iter().map(|p| p.bytes.len()).sum();
    state.uploads.lock().unwrap().extend(parts);
    Ok(Json(json!({ "id": id, "received": received })))
}

fn take_scripted_failure(state: &ApiState) -> bool {
    let mut remaining = state.fail_uploads_remaining.lock().unwrap();
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}
