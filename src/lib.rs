//! Desktop client for the PtitConvert local conversion service.
//!
//! The library owns everything that does not need a window: launching and
//! supervising the backend process, talking to its REST API, tracking jobs and
//! reducing their events into a renderable view. The Tauri shell in
//! [`app_runtime`] is compiled only with the `desktop` feature.

// Without the shell the core has no caller outside its tests.
#![cfg_attr(not(feature = "desktop"), allow(dead_code, unused_imports))]

mod app_constants;
mod app_types;
mod backend_config;
mod backend_http;
mod backend_process;
mod backend_readiness;
mod conversion_view;
mod format_resolver;
mod history_viewer;
mod job_client;
mod job_tracker;
mod launch_plan;
mod logging;
mod user_prefs;

#[cfg(feature = "desktop")]
pub mod app_runtime;
#[cfg(feature = "desktop")]
mod desktop_bridge_commands;
#[cfg(feature = "desktop")]
mod desktop_state;

#[cfg(test)]
mod test_support;

pub(crate) use app_constants::*;
pub(crate) use app_types::{
    progress_percent, AtomicFlagGuard, BackendBridgeResult, BackendBridgeState,
    ConversionRequest, HistoryRecord, JobHandle, JobSnapshot, RequestError,
};
pub(crate) use backend_config::{backend_base_url, BackendConfig};
pub(crate) use backend_http::{BackendApiError, BackendHttp, ConversionApi};
pub(crate) use backend_process::BackendSupervisor;
pub(crate) use backend_readiness::ReadinessConfig;
pub(crate) use conversion_view::ConversionView;
pub(crate) use format_resolver::{FormatCatalog, FormatResolver, FormatsPayload};
pub(crate) use history_viewer::HistoryViewer;
pub(crate) use job_client::{ActiveJob, JobClient, JobEvent, PollConfig, PollOutcome, SubmitError};
pub(crate) use job_tracker::{JobTracker, PollState, TickOutcome};
pub(crate) use launch_plan::{resolve_launch_plan, LaunchError, LaunchPlan};
pub(crate) use user_prefs::UserPrefs;
