use std::time::Duration;

pub const BACKEND_HOST: &str = "127.0.0.1";
pub const DEFAULT_BACKEND_PORT: u16 = 8787;

pub const BACKEND_PORT_ENV: &str = "PTITCONVERT_PORT";
pub const BACKEND_PYTHON_ENV: &str = "PTITCONVERT_PYTHON";
pub const PROJECT_DIR_ENV: &str = "PTITCONVERT_PROJECT_DIR";
pub const LOG_FILTER_ENV: &str = "PTITCONVERT_LOG";

pub const APP_DATA_DIR_NAME: &str = ".ptitconvert";
pub const DESKTOP_LOG_FILE: &str = "desktop.log";
pub const DESKTOP_STATE_FILE: &str = "desktop_state.json";

pub const BACKEND_ENTRYPOINT: &str = "backend/server.py";

pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const JOB_POLL_MAX_CONSECUTIVE_FAILURES: u32 = 8;
pub const JOB_POLL_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

pub const READINESS_MAX_WAIT: Duration = Duration::from_millis(8000);
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(400);
pub const READINESS_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

pub const HISTORY_RECENT_LIMIT: usize = 10;
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const BACKEND_EXIT_WATCH_INTERVAL: Duration = Duration::from_millis(250);

pub const VIEW_CHANGED_EVENT: &str = "conversion-view-changed";
