use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc, Mutex, PoisonError},
};

use tauri::{AppHandle, Emitter};

use crate::{
    user_prefs, ActiveJob, BackendApiError, BackendBridgeState, BackendConfig, BackendHttp,
    BackendSupervisor, ConversionView, FormatResolver, HistoryViewer, JobClient, UserPrefs,
    VIEW_CHANGED_EVENT,
};

/// Managed Tauri state shared by every bridge command.
pub(crate) struct DesktopState {
    pub(crate) config: BackendConfig,
    pub(crate) supervisor: BackendSupervisor,
    pub(crate) api: Arc<BackendHttp>,
    pub(crate) jobs: JobClient,
    pub(crate) formats: FormatResolver,
    pub(crate) history: HistoryViewer,
    pub(crate) submitting: AtomicBool,
    view: Mutex<ConversionView>,
    active_job: Mutex<Option<ActiveJob>>,
    prefs_path: Option<PathBuf>,
}

impl DesktopState {
    pub(crate) fn new(
        config: BackendConfig,
        prefs_path: Option<PathBuf>,
    ) -> Result<Self, BackendApiError> {
        let api = Arc::new(BackendHttp::new(config.base_url())?);
        Ok(Self {
            supervisor: BackendSupervisor::new(),
            jobs: JobClient::new(api.clone()),
            formats: FormatResolver::new(api.clone()),
            history: HistoryViewer::new(api.clone()),
            api,
            config,
            submitting: AtomicBool::new(false),
            view: Mutex::new(ConversionView::new()),
            active_job: Mutex::new(None),
            prefs_path,
        })
    }

    pub(crate) fn bridge_state(&self) -> BackendBridgeState {
        BackendBridgeState {
            running: self.supervisor.is_running(),
            port: self.config.port,
            pid: self.supervisor.pid(),
        }
    }

    pub(crate) fn with_view<T>(&self, f: impl FnOnce(&mut ConversionView) -> T) -> T {
        let mut view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut view)
    }

    pub(crate) fn view_snapshot(&self) -> ConversionView {
        self.with_view(|view| view.clone())
    }

    pub(crate) fn emit_view(&self, app_handle: &AppHandle) {
        if let Err(error) = app_handle.emit(VIEW_CHANGED_EVENT, self.view_snapshot()) {
            tracing::warn!(%error, "failed to notify webview of view change");
        }
    }

    /// Replacing the active job drops the previous one, which stops its polling.
    pub(crate) fn replace_active_job(&self, job: ActiveJob) {
        let previous = self
            .active_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(job);
        if let Some(previous) = previous {
            if !previous.is_finished() {
                tracing::info!(job_id = %previous.handle(), "abandoning previous conversion job");
            }
        }
    }

    pub(crate) fn load_prefs(&self) -> UserPrefs {
        self.prefs_path
            .as_deref()
            .map(user_prefs::read_user_prefs)
            .unwrap_or_default()
    }

    pub(crate) fn remember_prefs(&self) {
        let Some(path) = self.prefs_path.as_deref() else {
            return;
        };
        let prefs = self.with_view(|view| UserPrefs {
            last_output_format: view.selected_format().map(str::to_string),
            last_output_dir: view.output_dir().map(PathBuf::from),
        });
        if let Err(error) = user_prefs::write_user_prefs(path, &prefs) {
            tracing::warn!(%error, "failed to persist desktop preferences");
        }
    }
}
