//! Ingestion API client
//!
//! Two remote calls against `{endpoint}` (normally `{API_URL}/api/audio`):
//! - `POST {endpoint}/init`: JSON metadata, answers `{id, ...}`. Never retried.
//! - `POST {endpoint}/{id}/upload`: multipart body with one `file` part holding the raw
//!   bytes. Retried with a fixed delay up to the configured attempt count.
//!
//! Retries carry no idempotency token, so the server may see the same upload more
//! than once for one id (at-least-once delivery).

use crate::error::UploadError;
use crate::models::{AudioFileMetadata, RegisteredUpload, UploadReceipt};
use crate::utils::{retry_fixed_delay, RetryExhausted, RetryPolicy};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;

const USER_AGENT: &str = concat!("audio-indexer/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 30;
const UPLOAD_PART_NAME: &str = "file";

/// One-shot calls against the ingestion API
///
/// Implementations make exactly one request per call; retrying is `UploadClient`'s job.
#[async_trait]
pub trait IngestApi: Send + Sync {
    /// Register file metadata, returning the id that addresses the upload
    async fn register(&self, metadata: &AudioFileMetadata) -> Result<RegisteredUpload, UploadError>;

    /// Stream the file at `path` as the body for `id`
    async fn upload_file(&self, id: &str, path: &Path) -> Result<UploadReceipt, UploadError>;
}

/// `IngestApi` over HTTP
pub struct HttpIngestApi {
    http_client: reqwest::Client,
    endpoint: Url,
    upload_timeout: Duration,
}

impl HttpIngestApi {
    pub fn new(endpoint: &str, upload_timeout: Duration) -> Result<Self, UploadError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| UploadError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(UploadError::InvalidEndpoint(endpoint.to_string()));
        }

        // No client-wide timeout: registration keeps reqwest's default (none) and the
        // upload sets its own per request.
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            upload_timeout,
        })
    }

    /// `{endpoint}/{segments...}` with each segment percent-encoded
    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Turn non-2xx responses into `UploadError::Api`
    async fn check_status(response: Response) -> Result<Response, UploadError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IngestApi for HttpIngestApi {
    async fn register(&self, metadata: &AudioFileMetadata) -> Result<RegisteredUpload, UploadError> {
        tracing::debug!(file_name = %metadata.file_name, "Registering upload");

        let response = self
            .http_client
            .post(self.url_for(&["init"]))
            .json(metadata)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| UploadError::Parse(format!("{} (body: {})", e, body)))
    }

    async fn upload_file(&self, id: &str, path: &Path) -> Result<UploadReceipt, UploadError> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part(UPLOAD_PART_NAME, part);

        tracing::debug!(id, bytes = length, path = %path.display(), "Uploading file body");

        let response = self
            .http_client
            .post(self.url_for(&[id, "upload"]))
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(UploadReceipt::from_body(status, &body))
    }
}

/// Registration plus body upload with the retry policy applied to the upload
#[derive(Clone)]
pub struct UploadClient {
    api: Arc<dyn IngestApi>,
    retry: RetryPolicy,
}

impl UploadClient {
    pub fn new(api: Arc<dyn IngestApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Single registration call; any failure is final
    pub async fn register(&self, metadata: &AudioFileMetadata) -> Result<RegisteredUpload, UploadError> {
        self.api.register(metadata).await
    }

    /// Upload the file body, retrying with a fixed delay
    ///
    /// Attempt chain: `Attempting(0) .. Attempting(max-1)`, then success or the last
    /// error, returned unchanged with the attempt count.
    pub async fn upload(
        &self,
        id: &str,
        path: &Path,
    ) -> Result<UploadReceipt, RetryExhausted<UploadError>> {
        let max_attempts = self.retry.max_attempts;

        let receipt = retry_fixed_delay("upload", self.retry, |attempt| async move {
            let result = self.api.upload_file(id, path).await;
            if let Err(e) = &result {
                tracing::error!(
                    id,
                    attempt = attempt + 1,
                    max_attempts,
                    retryable = e.is_retryable(),
                    "Upload error: {}",
                    e
                );
            }
            result
        })
        .await?;

        tracing::info!(id, "Successfully uploaded file with ID: {}", id);
        Ok(receipt)
    }
}
