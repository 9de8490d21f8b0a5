//! REST client for the local conversion backend.
//!
//! [`ConversionApi`] is the seam the readiness prober, job client, format
//! resolver and history viewer talk through; [`BackendHttp`] is the
//! [`reqwest`] implementation against `http://127.0.0.1:<port>`.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{
    ConversionRequest, FormatsPayload, HistoryRecord, JobHandle, JobSnapshot,
    HTTP_REQUEST_TIMEOUT,
};

#[derive(Debug, thiserror::Error)]
pub enum BackendApiError {
    /// Transport failure (connection refused, reset, timeout) or an
    /// undecodable body.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("unexpected backend response: {0}")]
    Decode(String),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait ConversionApi: Send + Sync {
    /// `GET /health`; any 2xx means ready.
    async fn health(&self) -> Result<(), BackendApiError>;

    /// `GET /formats`, optionally narrowed with `?file_ext=`.
    async fn formats(&self, file_ext: Option<&str>) -> Result<FormatsPayload, BackendApiError>;

    /// `POST /convert`; returns the job handle on a 2xx answer.
    async fn submit(&self, request: &ConversionRequest) -> Result<JobHandle, BackendApiError>;

    /// `GET /jobs/{job_id}`.
    async fn job_snapshot(&self, handle: &JobHandle) -> Result<JobSnapshot, BackendApiError>;

    /// `GET /history/recent?limit=N`.
    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>, BackendApiError>;

    /// `POST /open_folder`.
    async fn open_folder(&self, path: &Path) -> Result<(), BackendApiError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    items: Vec<HistoryRecord>,
}

#[derive(Debug, Clone)]
pub struct BackendHttp {
    client: reqwest::Client,
    base_url: Url,
}

impl BackendHttp {
    pub fn new(base_url: Url) -> Result<Self, BackendApiError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ConversionApi for BackendHttp {
    async fn health(&self) -> Result<(), BackendApiError> {
        let response = self.client.get(self.endpoint(&["health"])).send().await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn formats(&self, file_ext: Option<&str>) -> Result<FormatsPayload, BackendApiError> {
        let mut request = self.client.get(self.endpoint(&["formats"]));
        if let Some(file_ext) = file_ext {
            request = request.query(&[("file_ext", file_ext)]);
        }
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    async fn submit(&self, request: &ConversionRequest) -> Result<JobHandle, BackendApiError> {
        let response = self
            .client
            .post(self.endpoint(&["convert"]))
            .json(request)
            .send()
            .await?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        body.job_id
            .and_then(JobHandle::new)
            .ok_or_else(|| BackendApiError::Decode("missing job_id in /convert response".into()))
    }

    async fn job_snapshot(&self, handle: &JobHandle) -> Result<JobSnapshot, BackendApiError> {
        let response = self
            .client
            .get(self.endpoint(&["jobs", handle.as_str()]))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>, BackendApiError> {
        let response = self
            .client
            .get(self.endpoint(&["history", "recent"]))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let body: HistoryResponse = Self::parse_response(response).await?;
        Ok(body.items)
    }

    async fn open_folder(&self, path: &Path) -> Result<(), BackendApiError> {
        let path = path.to_string_lossy();
        // The backend reads `path` from the query string; the JSON body
        // carries the same value.
        let response = self
            .client
            .post(self.endpoint(&["open_folder"]))
            .query(&[("path", path.as_ref())])
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}
