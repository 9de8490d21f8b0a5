use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;

use crate::{
    backend_readiness::{wait_ready, ReadinessConfig},
    format_resolver::{display_label, representative_extension},
    ConversionApi, ConversionRequest, FormatCatalog, FormatResolver, HistoryRecord,
    HistoryViewer, JobEvent, JobHandle, RequestError, UserPrefs,
};

pub const STATUS_STARTING: &str = "Starting...";
pub const STATUS_SERVICE_UNAVAILABLE: &str = "Service unavailable";
pub const STATUS_CONNECTION_LOST: &str = "Lost connection to service";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewPhase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Done,
    ConnectionLost,
    Failed,
}

impl ViewPhase {
    pub fn is_busy(self) -> bool {
        matches!(self, ViewPhase::Submitting | ViewPhase::Polling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryLine {
    pub text: String,
    pub success: bool,
}

impl From<&HistoryRecord> for HistoryLine {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            text: record.display_line(),
            success: record.success,
        }
    }
}

/// What the window is populated with at launch.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialLoad {
    pub ready: bool,
    pub catalog: FormatCatalog,
    pub history: Vec<HistoryRecord>,
}

/// The format catalog is always resolved, falling back to the built-in table
/// when the backend is down. History is only read from a ready backend.
pub async fn load_initial(
    api: Arc<dyn ConversionApi>,
    readiness: &ReadinessConfig,
    history_limit: usize,
) -> InitialLoad {
    let ready = wait_ready(api.as_ref(), readiness).await;
    let catalog = FormatResolver::new(Arc::clone(&api)).load_all().await;
    let history = if ready {
        HistoryViewer::new(api).recent(history_limit).await
    } else {
        Vec::new()
    };

    InitialLoad {
        ready,
        catalog,
        history,
    }
}

/// Everything the window renders. Mutated only through the methods below and
/// [`ConversionView::apply`]; serialized as-is to the webview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionView {
    files: Vec<PathBuf>,
    format_options: Vec<FormatOption>,
    selected_format: Option<String>,
    output_dir: Option<PathBuf>,
    status: String,
    progress_percent: u8,
    phase: ViewPhase,
    active_job: Option<JobHandle>,
    last_output_dir: Option<PathBuf>,
    history: Vec<HistoryLine>,
    can_convert: bool,
}

impl ConversionView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn selected_format(&self) -> Option<&str> {
        self.selected_format.as_deref()
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn active_job(&self) -> Option<&JobHandle> {
        self.active_job.as_ref()
    }

    pub fn last_output_dir(&self) -> Option<&Path> {
        self.last_output_dir.as_deref()
    }

    pub fn history(&self) -> &[HistoryLine] {
        &self.history
    }

    pub fn format_options(&self) -> &[FormatOption] {
        &self.format_options
    }

    pub fn can_convert(&self) -> bool {
        self.can_convert
    }

    /// Appends new paths, skipping ones already selected. Returns whether the
    /// selection changed.
    pub fn add_files<I>(&mut self, paths: I) -> bool
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let before = self.files.len();
        for path in paths {
            if !self.files.contains(&path) {
                self.files.push(path);
            }
        }
        self.refresh_can_convert();
        self.files.len() != before
    }

    pub fn clear_files(&mut self) {
        self.files.clear();
        self.refresh_can_convert();
    }

    pub fn representative_extension(&self) -> Option<String> {
        representative_extension(&self.files)
    }

    /// Replaces the selector contents. The current selection survives when the
    /// new catalog still offers it, then `preferred`, then the first entry.
    pub fn set_format_catalog(&mut self, catalog: &FormatCatalog, preferred: Option<&str>) {
        self.format_options = catalog
            .tokens()
            .iter()
            .map(|token| FormatOption {
                value: token.clone(),
                label: display_label(token),
            })
            .collect();

        let keep = self
            .selected_format
            .clone()
            .filter(|current| catalog.contains(current));
        let preferred = preferred
            .map(|token| token.trim().to_lowercase())
            .filter(|token| catalog.contains(token));
        self.selected_format = keep
            .or(preferred)
            .or_else(|| catalog.tokens().first().cloned());
        self.refresh_can_convert();
    }

    pub fn select_format(&mut self, token: &str) -> bool {
        let token = token.trim().to_lowercase();
        if !self.format_options.iter().any(|option| option.value == token) {
            return false;
        }
        self.selected_format = Some(token);
        self.refresh_can_convert();
        true
    }

    pub fn set_output_dir(&mut self, dir: Option<PathBuf>) {
        self.output_dir = dir.filter(|dir| !dir.as_os_str().is_empty());
        self.refresh_can_convert();
    }

    pub fn conversion_request(&self) -> Result<ConversionRequest, RequestError> {
        ConversionRequest::new(
            self.files.clone(),
            self.selected_format.as_deref().unwrap_or_default(),
            self.output_dir.clone().unwrap_or_default(),
        )
    }

    pub fn begin_submission(&mut self) {
        self.phase = ViewPhase::Submitting;
        self.status = STATUS_STARTING.to_string();
        self.progress_percent = 0;
        self.active_job = None;
        self.refresh_can_convert();
    }

    pub fn service_unavailable(&mut self) {
        self.phase = ViewPhase::Failed;
        self.status = STATUS_SERVICE_UNAVAILABLE.to_string();
        self.refresh_can_convert();
    }

    pub fn submission_failed(&mut self, reason: &str) {
        self.phase = ViewPhase::Failed;
        self.status = reason.to_string();
        self.refresh_can_convert();
    }

    pub fn job_started(&mut self, handle: JobHandle) {
        self.phase = ViewPhase::Polling;
        self.active_job = Some(handle);
        self.refresh_can_convert();
    }

    pub fn apply_initial_load(&mut self, load: &InitialLoad, prefs: &UserPrefs) {
        if self.output_dir.is_none() {
            self.set_output_dir(prefs.last_output_dir.clone());
        }
        self.set_format_catalog(&load.catalog, prefs.last_output_format.as_deref());
        self.set_history(&load.history);
        if !load.ready {
            self.service_unavailable();
        }
    }

    pub fn set_history(&mut self, records: &[HistoryRecord]) {
        self.history = records.iter().map(HistoryLine::from).collect();
    }

    /// Applies one job event. Events for a handle other than the active one
    /// are stale and ignored.
    pub fn apply(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Progress {
                job_id,
                percent,
                message,
                ..
            } => {
                if !self.is_active(job_id) {
                    return;
                }
                self.status = message.clone();
                self.progress_percent = *percent;
            }
            JobEvent::Finished {
                job_id,
                success,
                failed,
                output_dir,
            } => {
                if !self.is_active(job_id) {
                    return;
                }
                self.status = format!("{success} succeeded, {failed} failed");
                self.progress_percent = 100;
                self.phase = ViewPhase::Done;
                self.active_job = None;
                self.last_output_dir = Some(output_dir.clone());
            }
            JobEvent::ConnectionLost { job_id } => {
                if !self.is_active(job_id) {
                    return;
                }
                self.status = STATUS_CONNECTION_LOST.to_string();
                self.phase = ViewPhase::ConnectionLost;
                self.active_job = None;
            }
            JobEvent::HistoryRefreshed { records } => self.set_history(records),
        }
        self.refresh_can_convert();
    }

    fn is_active(&self, job_id: &JobHandle) -> bool {
        self.active_job.as_ref() == Some(job_id)
    }

    fn refresh_can_convert(&mut self) {
        self.can_convert = !self.files.is_empty()
            && self.selected_format.is_some()
            && self.output_dir.is_some()
            && !self.phase.is_busy();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        format_resolver::builtin_catalog,
        test_support::{FormatsReply, HealthReply, MockBackend, ScriptedApi},
        FormatsPayload, JobClient, PollConfig, PollOutcome,
    };

    fn handle(id: &str) -> JobHandle {
        JobHandle::new(id).unwrap()
    }

    fn ready_view() -> ConversionView {
        let mut view = ConversionView::new();
        view.add_files([PathBuf::from("/a/x.docx")]);
        view.set_format_catalog(&FormatCatalog::from_tokens(["PDF", "DOCX"]), None);
        view.set_output_dir(Some(PathBuf::from("/out")));
        view
    }

    #[test]
    fn convert_requires_files_format_and_output_dir() {
        let mut view = ConversionView::new();
        assert!(!view.can_convert());

        assert!(view.add_files([PathBuf::from("/a/x.docx"), PathBuf::from("/a/x.docx")]));
        assert_eq!(view.files().len(), 1);
        assert!(!view.add_files([PathBuf::from("/a/x.docx")]));
        assert!(!view.can_convert());

        view.set_format_catalog(&FormatCatalog::from_tokens(["pdf"]), None);
        assert!(!view.can_convert());

        view.set_output_dir(Some(PathBuf::from("/out")));
        assert!(view.can_convert());

        view.clear_files();
        assert!(!view.can_convert());
    }

    #[test]
    fn format_catalog_keeps_selection_then_preference_then_first() {
        let mut view = ConversionView::new();
        view.set_format_catalog(&FormatCatalog::from_tokens(["PDF", "DOCX", "TXT"]), Some("TXT"));
        assert_eq!(view.selected_format(), Some("txt"));
        assert_eq!(view.format_options()[0].label, "PDF");

        view.set_format_catalog(&FormatCatalog::from_tokens(["TXT", "PDF"]), Some("pdf"));
        assert_eq!(view.selected_format(), Some("txt"));

        view.set_format_catalog(&FormatCatalog::from_tokens(["PNG", "JPG"]), Some("pdf"));
        assert_eq!(view.selected_format(), Some("png"));

        assert!(view.select_format("JPG"));
        assert_eq!(view.selected_format(), Some("jpg"));
        assert!(!view.select_format("mkv"));
        assert_eq!(view.selected_format(), Some("jpg"));
    }

    #[test]
    fn conversion_request_reflects_selection() {
        let request = ready_view().conversion_request().unwrap();
        assert_eq!(request.output_format(), "pdf");
        assert_eq!(request.files(), [PathBuf::from("/a/x.docx")]);

        let mut empty = ConversionView::new();
        empty.set_output_dir(Some(PathBuf::from("")));
        assert_eq!(empty.output_dir(), None);
        assert_eq!(empty.conversion_request(), Err(RequestError::NoFiles));
    }

    #[test]
    fn conversion_is_disabled_while_a_job_is_active() {
        let mut view = ready_view();
        view.begin_submission();
        assert_eq!(view.status(), STATUS_STARTING);
        assert!(!view.can_convert());

        view.job_started(handle("J1"));
        assert!(!view.can_convert());

        view.apply(&JobEvent::Finished {
            job_id: handle("J1"),
            success: 1,
            failed: 0,
            output_dir: PathBuf::from("/out"),
        });
        assert!(view.can_convert());
        assert_eq!(view.last_output_dir(), Some(Path::new("/out")));
    }

    #[test]
    fn submission_failures_reenable_conversion() {
        let mut view = ready_view();
        view.begin_submission();
        view.service_unavailable();
        assert_eq!(view.status(), STATUS_SERVICE_UNAVAILABLE);
        assert!(view.can_convert());

        view.begin_submission();
        view.submission_failed("conversion could not be started: backend API error (500): boom");
        assert_eq!(view.phase(), ViewPhase::Failed);
        assert!(view.status().contains("500"));
        assert!(view.can_convert());
    }

    #[test]
    fn connection_lost_is_distinct_from_job_failure() {
        let mut view = ready_view();
        view.begin_submission();
        view.job_started(handle("J1"));
        view.apply(&JobEvent::ConnectionLost {
            job_id: handle("J1"),
        });

        assert_eq!(view.phase(), ViewPhase::ConnectionLost);
        assert_eq!(view.status(), STATUS_CONNECTION_LOST);
        assert_eq!(view.active_job(), None);
        assert_eq!(view.last_output_dir(), None);
        assert!(view.can_convert());
    }

    #[test]
    fn partial_failure_reports_both_counts() {
        let mut view = ready_view();
        view.begin_submission();
        view.job_started(handle("J1"));
        view.apply(&JobEvent::Finished {
            job_id: handle("J1"),
            success: 3,
            failed: 2,
            output_dir: PathBuf::from("/out"),
        });
        assert_eq!(view.status(), "3 succeeded, 2 failed");
        assert_eq!(view.phase(), ViewPhase::Done);
    }

    #[test]
    fn stale_events_from_another_job_are_ignored() {
        let mut view = ready_view();
        view.begin_submission();
        view.job_started(handle("J2"));

        view.apply(&JobEvent::Progress {
            job_id: handle("J1"),
            percent: 90,
            fraction: 0.9,
            message: "old".to_string(),
        });
        view.apply(&JobEvent::ConnectionLost {
            job_id: handle("J1"),
        });

        assert_eq!(view.progress_percent(), 0);
        assert_eq!(view.phase(), ViewPhase::Polling);
    }

    #[test]
    fn history_refresh_renders_lines() {
        let mut view = ConversionView::new();
        view.apply(&JobEvent::HistoryRefreshed {
            records: vec![HistoryRecord {
                input_file: "/in/a.png".to_string(),
                output_format: "jpg".to_string(),
                timestamp: "2025-01-02T03:04:05".to_string(),
                success: true,
                error_message: None,
            }],
        });
        assert_eq!(
            view.history(),
            [HistoryLine {
                text: "JPG • a.png — 2025-01-02 03:04:05 — ✓ OK".to_string(),
                success: true,
            }]
        );
    }

    #[test]
    fn view_serializes_camel_case_for_the_webview() {
        let value = serde_json::to_value(ready_view()).unwrap();
        assert_eq!(value["canConvert"], serde_json::json!(true));
        assert_eq!(value["selectedFormat"], serde_json::json!("pdf"));
        assert_eq!(value["phase"], serde_json::json!("idle"));
        assert_eq!(value["formatOptions"][1]["label"], serde_json::json!("DOCX"));
    }

    #[tokio::test(start_paused = true)]
    async fn initial_load_offers_builtin_formats_when_backend_is_down() {
        let api = Arc::new(ScriptedApi::default());
        api.set_default_health(HealthReply::Down);
        api.set_formats(FormatsReply::Fail(503));

        let load = load_initial(api.clone(), &ReadinessConfig::default(), 10).await;

        assert!(!load.ready);
        assert_eq!(load.catalog, builtin_catalog());
        assert!(api.history_limits().is_empty());

        let mut view = ConversionView::new();
        view.apply_initial_load(
            &load,
            &UserPrefs {
                last_output_format: Some("MP3".to_string()),
                last_output_dir: Some(PathBuf::from("/out")),
            },
        );
        assert!(!view.format_options().is_empty());
        assert_eq!(view.selected_format(), Some("mp3"));
        assert_eq!(view.output_dir(), Some(Path::new("/out")));
        assert_eq!(view.status(), STATUS_SERVICE_UNAVAILABLE);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_load_reads_formats_and_history_from_ready_backend() {
        let api = Arc::new(ScriptedApi::default());
        api.set_formats(FormatsReply::Payload(FormatsPayload::List(vec![
            "PDF".to_string(),
            "TXT".to_string(),
        ])));
        api.set_history(Ok(vec![HistoryRecord {
            input_file: "/in/a.docx".to_string(),
            output_format: "pdf".to_string(),
            timestamp: "2025-01-02T03:04:05".to_string(),
            success: false,
            error_message: Some("boom".to_string()),
        }]));

        let load = load_initial(api.clone(), &ReadinessConfig::default(), 10).await;
        assert!(load.ready);
        assert_eq!(api.history_limits(), vec![10]);

        let mut view = ConversionView::new();
        view.apply_initial_load(&load, &UserPrefs::default());
        assert_eq!(view.selected_format(), Some("pdf"));
        assert_eq!(view.history().len(), 1);
        assert!(!view.history()[0].success);
        assert_eq!(view.phase(), ViewPhase::Idle);
        assert!(view.status().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_conversion_reports_progress_and_refreshes_history_once() {
        let mock = MockBackend::spawn().await;
        mock.set_job_id("J1");
        mock.script_snapshots([
            serde_json::json!({"processed": 0, "total": 2, "done": false}),
            serde_json::json!({"processed": 1, "total": 2, "done": false}),
            serde_json::json!({"processed": 2, "total": 2, "success": 2, "failed": 0, "done": true}),
        ]);

        let client = JobClient::new(Arc::new(mock.api()))
            .with_readiness(ReadinessConfig::new(
                Duration::from_secs(2),
                Duration::from_millis(50),
            ))
            .with_poll_config(PollConfig {
                interval: Duration::from_millis(20),
                ..PollConfig::default()
            });

        let view = Arc::new(Mutex::new(ready_view()));
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let request = {
            let mut view = view.lock().unwrap();
            view.begin_submission();
            view.conversion_request().unwrap()
        };
        assert_eq!(request.output_format(), "pdf");

        let handle = client.submit(&request).await.unwrap();
        assert_eq!(handle.as_str(), "J1");
        view.lock().unwrap().job_started(handle.clone());

        let (sink_view, sink_rendered) = (Arc::clone(&view), Arc::clone(&rendered));
        let job = client.watch(handle, request.output_dir().to_path_buf(), move |event| {
            let mut view = sink_view.lock().unwrap();
            view.apply(&event);
            if !matches!(event, JobEvent::HistoryRefreshed { .. }) {
                sink_rendered
                    .lock()
                    .unwrap()
                    .push((view.progress_percent(), view.status().to_string()));
            }
        });

        assert_eq!(job.wait().await, PollOutcome::Done { success: 2, failed: 0 });

        let rendered = rendered.lock().unwrap().clone();
        assert_eq!(
            rendered,
            vec![
                (0, String::new()),
                (50, String::new()),
                (100, "2 succeeded, 0 failed".to_string()),
            ]
        );
        assert_eq!(mock.job_fetches(), 3);
        assert_eq!(mock.history_fetches(), 1);
        assert_eq!(
            view.lock().unwrap().last_output_dir(),
            Some(Path::new("/out"))
        );
    }
}
