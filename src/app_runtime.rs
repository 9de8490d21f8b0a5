use std::sync::Arc;

use tauri::{AppHandle, Manager, RunEvent};

use crate::{
    conversion_view::load_initial,
    desktop_state::DesktopState,
    logging::{app_data_dir, init_logging, resolve_desktop_log_path},
    resolve_launch_plan,
    user_prefs::desktop_state_path,
    BackendConfig, ConversionApi, ReadinessConfig, HISTORY_RECENT_LIMIT,
};

fn focus_main_window(app_handle: &AppHandle) {
    let Some(window) = app_handle.get_webview_window("main") else {
        tracing::debug!("focus skipped: main window not found");
        return;
    };
    if let Err(error) = window.unminimize() {
        tracing::debug!(%error, "failed to unminimize main window");
    }
    if let Err(error) = window.set_focus() {
        tracing::debug!(%error, "failed to focus main window");
    }
}

fn start_backend(app_handle: &AppHandle) {
    let state = app_handle.state::<DesktopState>();
    let resource_dir = app_handle.path().resource_dir().ok();
    let plan = match resolve_launch_plan(
        &state.config,
        resource_dir.as_deref(),
        !cfg!(debug_assertions),
    ) {
        Ok(plan) => plan,
        Err(error) => {
            tracing::error!(%error, "cannot resolve backend launch");
            return;
        }
    };

    if let Err(error) = state.supervisor.start(&plan) {
        tracing::error!(%error, "backend failed to start");
    }
}

/// Populates the window at launch. The selector is filled even when the
/// backend never answers; only the status line reports it.
fn spawn_initial_load(app_handle: AppHandle) {
    tauri::async_runtime::spawn(async move {
        let state = app_handle.state::<DesktopState>();
        let prefs = state.load_prefs();
        let api: Arc<dyn ConversionApi> = state.api.clone();
        let load = load_initial(api, &ReadinessConfig::default(), HISTORY_RECENT_LIMIT).await;
        if !load.ready {
            tracing::warn!("backend not ready, using built-in formats");
        }
        state.with_view(|view| view.apply_initial_load(&load, &prefs));
        state.emit_view(&app_handle);
    });
}

pub fn run() {
    let data_dir = app_data_dir();
    init_logging(data_dir.as_deref().map(resolve_desktop_log_path).as_deref());

    let config = BackendConfig::from_env();
    tracing::info!(port = config.port, "desktop process starting");
    let state = match DesktopState::new(config, data_dir.as_deref().map(desktop_state_path)) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "failed to initialize backend client");
            return;
        }
    };

    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            focus_main_window(app);
        }))
        .plugin(tauri_plugin_dialog::init())
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            crate::desktop_bridge_commands::desktop_bridge_get_backend_state,
            crate::desktop_bridge_commands::desktop_bridge_get_view,
            crate::desktop_bridge_commands::desktop_bridge_pick_files,
            crate::desktop_bridge_commands::desktop_bridge_pick_output_dir,
            crate::desktop_bridge_commands::desktop_bridge_select_format,
            crate::desktop_bridge_commands::desktop_bridge_clear_files,
            crate::desktop_bridge_commands::desktop_bridge_start_conversion,
            crate::desktop_bridge_commands::desktop_bridge_refresh_history,
            crate::desktop_bridge_commands::desktop_bridge_open_output_folder,
        ])
        .setup(|app| {
            let app_handle = app.handle().clone();
            start_backend(&app_handle);
            spawn_initial_load(app_handle);
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::ExitRequested { .. } | RunEvent::Exit => {
                app_handle.state::<DesktopState>().supervisor.stop();
            }
            _ => {}
        });
}
