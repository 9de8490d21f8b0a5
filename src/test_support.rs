//! Test doubles for the backend: a scripted in-process [`ConversionApi`] for
//! paused-time tests and an axum server for HTTP round trips.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use url::Url;

use crate::{
    BackendApiError, BackendHttp, ConversionApi, ConversionRequest, FormatsPayload,
    HistoryRecord, JobHandle, JobSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthReply {
    Up,
    Down,
    /// Never answers.
    Hang,
}

#[derive(Debug, Clone)]
pub enum SnapshotReply {
    Snapshot(JobSnapshot),
    Fail(u16),
    Hang,
}

#[derive(Debug, Clone)]
pub enum FormatsReply {
    Payload(FormatsPayload),
    Fail(u16),
}

struct Script {
    health: VecDeque<HealthReply>,
    default_health: HealthReply,
    health_probes: usize,
    submit: Result<String, u16>,
    submissions: Vec<ConversionRequest>,
    snapshots: VecDeque<SnapshotReply>,
    default_snapshot: SnapshotReply,
    job_fetches: usize,
    formats: FormatsReply,
    formats_queries: Vec<Option<String>>,
    history: Result<Vec<HistoryRecord>, u16>,
    history_limits: Vec<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            health: VecDeque::new(),
            default_health: HealthReply::Up,
            health_probes: 0,
            submit: Ok("J1".to_string()),
            submissions: Vec::new(),
            snapshots: VecDeque::new(),
            default_snapshot: SnapshotReply::Fail(404),
            job_fetches: 0,
            formats: FormatsReply::Fail(404),
            formats_queries: Vec::new(),
            history: Ok(Vec::new()),
            history_limits: Vec::new(),
        }
    }
}

fn status_error(status: u16) -> BackendApiError {
    BackendApiError::Status {
        status,
        body: format!("scripted failure {status}"),
    }
}

#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        f(&mut self.script.lock().unwrap())
    }

    pub fn script_health(&self, replies: impl IntoIterator<Item = HealthReply>) {
        self.with_script(|script| script.health.extend(replies));
    }

    pub fn set_default_health(&self, reply: HealthReply) {
        self.with_script(|script| script.default_health = reply);
    }

    pub fn health_probes(&self) -> usize {
        self.with_script(|script| script.health_probes)
    }

    pub fn set_submit(&self, reply: Result<&str, u16>) {
        self.with_script(|script| script.submit = reply.map(str::to_string));
    }

    pub fn submissions(&self) -> Vec<ConversionRequest> {
        self.with_script(|script| script.submissions.clone())
    }

    pub fn script_snapshots(&self, replies: impl IntoIterator<Item = SnapshotReply>) {
        self.with_script(|script| script.snapshots.extend(replies));
    }

    pub fn set_default_snapshot(&self, reply: SnapshotReply) {
        self.with_script(|script| script.default_snapshot = reply);
    }

    pub fn job_fetches(&self) -> usize {
        self.with_script(|script| script.job_fetches)
    }

    pub fn set_formats(&self, reply: FormatsReply) {
        self.with_script(|script| script.formats = reply);
    }

    pub fn formats_queries(&self) -> Vec<Option<String>> {
        self.with_script(|script| script.formats_queries.clone())
    }

    pub fn set_history(&self, reply: Result<Vec<HistoryRecord>, u16>) {
        self.with_script(|script| script.history = reply);
    }

    pub fn history_limits(&self) -> Vec<usize> {
        self.with_script(|script| script.history_limits.clone())
    }
}

#[async_trait]
impl ConversionApi for ScriptedApi {
    async fn health(&self) -> Result<(), BackendApiError> {
        let reply = self.with_script(|script| {
            script.health_probes += 1;
            script.health.pop_front().unwrap_or(script.default_health)
        });
        match reply {
            HealthReply::Up => Ok(()),
            HealthReply::Down => Err(status_error(503)),
            HealthReply::Hang => std::future::pending().await,
        }
    }

    async fn formats(&self, file_ext: Option<&str>) -> Result<FormatsPayload, BackendApiError> {
        let reply = self.with_script(|script| {
            script.formats_queries.push(file_ext.map(str::to_string));
            script.formats.clone()
        });
        match reply {
            FormatsReply::Payload(payload) => Ok(payload),
            FormatsReply::Fail(status) => Err(status_error(status)),
        }
    }

    async fn submit(&self, request: &ConversionRequest) -> Result<JobHandle, BackendApiError> {
        self.with_script(|script| {
            script.submissions.push(request.clone());
            match &script.submit {
                Ok(id) => JobHandle::new(id.as_str())
                    .ok_or_else(|| BackendApiError::Decode("missing job_id".into())),
                Err(status) => Err(status_error(*status)),
            }
        })
    }

    async fn job_snapshot(&self, _handle: &JobHandle) -> Result<JobSnapshot, BackendApiError> {
        let reply = self.with_script(|script| {
            script.job_fetches += 1;
            script
                .snapshots
                .pop_front()
                .unwrap_or_else(|| script.default_snapshot.clone())
        });
        match reply {
            SnapshotReply::Snapshot(snapshot) => Ok(snapshot),
            SnapshotReply::Fail(status) => Err(status_error(status)),
            SnapshotReply::Hang => std::future::pending().await,
        }
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRecord>, BackendApiError> {
        self.with_script(|script| {
            script.history_limits.push(limit);
            script.history.clone().map_err(status_error)
        })
    }

    async fn open_folder(&self, _path: &Path) -> Result<(), BackendApiError> {
        Ok(())
    }
}

struct MockState {
    healthy: bool,
    job_id: String,
    submit_status: u16,
    formats_body: Value,
    history_body: Value,
    snapshots: VecDeque<Value>,
    job_fetches: usize,
    last_submission: Option<Value>,
    last_formats_query: Option<String>,
    history_limits: Vec<usize>,
    last_open_folder: Option<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            healthy: true,
            job_id: "J1".to_string(),
            submit_status: 200,
            formats_body: json!({ "formats": [] }),
            history_body: json!({ "items": [] }),
            snapshots: VecDeque::new(),
            job_fetches: 0,
            last_submission: None,
            last_formats_query: None,
            history_limits: Vec::new(),
            last_open_folder: None,
        }
    }
}

type SharedMock = Arc<Mutex<MockState>>;

/// Loopback HTTP backend speaking the conversion service routes.
pub struct MockBackend {
    addr: SocketAddr,
    state: SharedMock,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let state = SharedMock::default();
        let app = Router::new()
            .route("/health", get(health))
            .route("/formats", get(formats))
            .route("/convert", post(convert))
            .route("/jobs/{job_id}", get(job))
            .route("/history/recent", get(history))
            .route("/open_folder", post(open_folder))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    pub fn api(&self) -> BackendHttp {
        BackendHttp::new(self.url()).unwrap()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.with_state(|state| state.healthy = healthy);
    }

    pub fn set_job_id(&self, job_id: &str) {
        self.with_state(|state| state.job_id = job_id.to_string());
    }

    pub fn set_submit_status(&self, status: u16) {
        self.with_state(|state| state.submit_status = status);
    }

    pub fn set_formats_body(&self, body: Value) {
        self.with_state(|state| state.formats_body = body);
    }

    pub fn set_history_body(&self, body: Value) {
        self.with_state(|state| state.history_body = body);
    }

    pub fn script_snapshots(&self, snapshots: impl IntoIterator<Item = Value>) {
        self.with_state(|state| state.snapshots.extend(snapshots));
    }

    pub fn job_fetches(&self) -> usize {
        self.with_state(|state| state.job_fetches)
    }

    pub fn last_submission(&self) -> Option<Value> {
        self.with_state(|state| state.last_submission.clone())
    }

    pub fn last_formats_query(&self) -> Option<String> {
        self.with_state(|state| state.last_formats_query.clone())
    }

    pub fn last_history_limit(&self) -> Option<usize> {
        self.with_state(|state| state.history_limits.last().copied())
    }

    pub fn history_fetches(&self) -> usize {
        self.with_state(|state| state.history_limits.len())
    }

    pub fn last_open_folder(&self) -> Option<String> {
        self.with_state(|state| state.last_open_folder.clone())
    }
}

async fn health(State(state): State<SharedMock>) -> StatusCode {
    if state.lock().unwrap().healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn formats(
    State(state): State<SharedMock>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.last_formats_query = query.get("file_ext").cloned();
    Json(state.formats_body.clone())
}

async fn convert(State(state): State<SharedMock>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    state.last_submission = Some(body);
    let status = StatusCode::from_u16(state.submit_status).unwrap();
    if !status.is_success() {
        return (status, "rejected by mock backend").into_response();
    }
    Json(json!({ "job_id": state.job_id })).into_response()
}

async fn job(State(state): State<SharedMock>, UrlPath(_job_id): UrlPath<String>) -> Response {
    let mut state = state.lock().unwrap();
    state.job_fetches += 1;
    match state.snapshots.pop_front() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn history(
    State(state): State<SharedMock>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let limit = query
        .get("limit")
        .and_then(|limit| limit.parse().ok())
        .unwrap_or_default();
    state.history_limits.push(limit);
    Json(state.history_body.clone())
}

async fn open_folder(
    State(state): State<SharedMock>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    state.lock().unwrap().last_open_folder = query.get("path").cloned();
    StatusCode::OK
}

/// A loopback URL nothing is listening on.
pub async fn closed_port_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap()
}
