use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{APP_DATA_DIR_NAME, DESKTOP_LOG_FILE, LOG_FILTER_ENV};

const DEFAULT_LOG_FILTER: &str = "info";

/// `~/.ptitconvert`, or `None` when the home directory is unknown.
pub fn app_data_dir() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(APP_DATA_DIR_NAME))
}

pub fn resolve_desktop_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("logs").join(DESKTOP_LOG_FILE)
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber: stderr always, plus an appending file sink
/// when `log_path` can be opened. Returns `false` if a subscriber was already
/// installed.
pub fn init_logging(log_path: Option<&Path>) -> bool {
    let mut file_error = None;
    let file_layer = log_path.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(error) => {
            file_error = Some((path.to_path_buf(), error));
            None
        }
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .is_ok();

    if let Some((path, error)) = file_error {
        tracing::warn!(path = %path.display(), %error, "desktop log file unavailable; logging to stderr only");
    }
    installed
}
