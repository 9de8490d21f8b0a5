use std::path::PathBuf;

use tauri::{AppHandle, Manager};
use tauri_plugin_dialog::{DialogExt, FilePath};
use tokio::sync::oneshot;

use crate::{
    desktop_state::DesktopState, AtomicFlagGuard, BackendBridgeResult, BackendBridgeState,
    ConversionApi, ConversionView, SubmitError, HISTORY_RECENT_LIMIT,
};

fn into_local_paths(paths: Vec<FilePath>) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter_map(|path| match path.into_path() {
            Ok(path) => Some(path),
            Err(error) => {
                tracing::warn!(%error, "ignoring non-local dialog selection");
                None
            }
        })
        .collect()
}

/// Re-resolves the format selector from the first selected file.
async fn refresh_suggested_formats(state: &DesktopState) {
    let Some(extension) = state.with_view(|view| view.representative_extension()) else {
        return;
    };
    let catalog = state.formats.suggest(&extension).await;
    let preferred = state.load_prefs().last_output_format;
    state.with_view(|view| view.set_format_catalog(&catalog, preferred.as_deref()));
}

#[tauri::command]
pub(crate) fn desktop_bridge_get_backend_state(app_handle: AppHandle) -> BackendBridgeState {
    app_handle.state::<DesktopState>().bridge_state()
}

#[tauri::command]
pub(crate) fn desktop_bridge_get_view(app_handle: AppHandle) -> ConversionView {
    app_handle.state::<DesktopState>().view_snapshot()
}

#[tauri::command]
pub(crate) async fn desktop_bridge_pick_files(app_handle: AppHandle) -> BackendBridgeResult {
    let (sender, receiver) = oneshot::channel();
    app_handle
        .dialog()
        .file()
        .set_title("Select files to convert")
        .pick_files(move |paths| {
            let _ = sender.send(paths);
        });

    let Some(paths) = receiver.await.ok().flatten() else {
        return BackendBridgeResult::failed("No files selected.");
    };

    let state = app_handle.state::<DesktopState>();
    let added = state.with_view(|view| view.add_files(into_local_paths(paths)));
    if added {
        refresh_suggested_formats(&state).await;
    }
    state.emit_view(&app_handle);
    BackendBridgeResult::ok()
}

#[tauri::command]
pub(crate) async fn desktop_bridge_pick_output_dir(app_handle: AppHandle) -> BackendBridgeResult {
    let (sender, receiver) = oneshot::channel();
    app_handle
        .dialog()
        .file()
        .set_title("Select output folder")
        .pick_folder(move |path| {
            let _ = sender.send(path);
        });

    let Some(path) = receiver.await.ok().flatten() else {
        return BackendBridgeResult::failed("No folder selected.");
    };
    let dir = match path.into_path() {
        Ok(dir) => dir,
        Err(error) => return BackendBridgeResult::failed(format!("Invalid folder: {error}")),
    };

    let state = app_handle.state::<DesktopState>();
    state.with_view(|view| view.set_output_dir(Some(dir)));
    state.remember_prefs();
    state.emit_view(&app_handle);
    BackendBridgeResult::ok()
}

#[tauri::command]
pub(crate) fn desktop_bridge_select_format(
    app_handle: AppHandle,
    format: String,
) -> BackendBridgeResult {
    let state = app_handle.state::<DesktopState>();
    if !state.with_view(|view| view.select_format(&format)) {
        return BackendBridgeResult::failed(format!("Unsupported output format '{format}'."));
    }
    state.remember_prefs();
    state.emit_view(&app_handle);
    BackendBridgeResult::ok()
}

#[tauri::command]
pub(crate) fn desktop_bridge_clear_files(app_handle: AppHandle) -> BackendBridgeResult {
    let state = app_handle.state::<DesktopState>();
    state.with_view(ConversionView::clear_files);
    state.emit_view(&app_handle);
    BackendBridgeResult::ok()
}

#[tauri::command]
pub(crate) async fn desktop_bridge_start_conversion(app_handle: AppHandle) -> BackendBridgeResult {
    let state = app_handle.state::<DesktopState>();
    let Some(_submitting) = AtomicFlagGuard::try_set(&state.submitting) else {
        return BackendBridgeResult::failed("A conversion is already being submitted.");
    };

    let prepared = state.with_view(|view| {
        if view.phase().is_busy() {
            return Err("A conversion is already running.".to_string());
        }
        let request = view.conversion_request().map_err(|error| error.to_string())?;
        view.begin_submission();
        Ok(request)
    });
    let request = match prepared {
        Ok(request) => request,
        Err(reason) => return BackendBridgeResult::failed(reason),
    };
    state.remember_prefs();
    state.emit_view(&app_handle);

    let handle = match state.jobs.submit(&request).await {
        Ok(handle) => handle,
        Err(error) => {
            let reason = error.to_string();
            state.with_view(|view| match error {
                SubmitError::NotReady => view.service_unavailable(),
                SubmitError::Rejected(_) => view.submission_failed(&reason),
            });
            state.emit_view(&app_handle);
            return BackendBridgeResult::failed(reason);
        }
    };

    state.with_view(|view| view.job_started(handle.clone()));
    let sink_handle = app_handle.clone();
    let job = state
        .jobs
        .watch(handle, request.output_dir().to_path_buf(), move |event| {
            let state = sink_handle.state::<DesktopState>();
            state.with_view(|view| view.apply(&event));
            state.emit_view(&sink_handle);
        });
    state.replace_active_job(job);
    state.emit_view(&app_handle);
    BackendBridgeResult::ok()
}

#[tauri::command]
pub(crate) async fn desktop_bridge_refresh_history(app_handle: AppHandle) -> BackendBridgeResult {
    let state = app_handle.state::<DesktopState>();
    let records = state.history.recent(HISTORY_RECENT_LIMIT).await;
    state.with_view(|view| view.set_history(&records));
    state.emit_view(&app_handle);
    BackendBridgeResult::ok()
}

#[tauri::command]
pub(crate) async fn desktop_bridge_open_output_folder(app_handle: AppHandle) -> BackendBridgeResult {
    let state = app_handle.state::<DesktopState>();
    let Some(dir) = state.with_view(|view| view.last_output_dir().map(PathBuf::from)) else {
        return BackendBridgeResult::failed("No finished conversion to show.");
    };

    match state.api.open_folder(&dir).await {
        Ok(()) => BackendBridgeResult::ok(),
        Err(error) => {
            tracing::warn!(path = %dir.display(), %error, "failed to open output folder");
            BackendBridgeResult::failed(format!("Failed to open output folder: {error}"))
        }
    }
}
