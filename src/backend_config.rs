use std::{env, path::PathBuf};

use url::Url;

use crate::{
    BACKEND_HOST, BACKEND_PORT_ENV, BACKEND_PYTHON_ENV, DEFAULT_BACKEND_PORT, PROJECT_DIR_ENV,
};

/// Process-wide backend settings, read once at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub port: u16,
    pub python_override: Option<String>,
    pub project_dir: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_BACKEND_PORT,
            python_override: None,
            project_dir: None,
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_backend_port(lookup(BACKEND_PORT_ENV).as_deref());
        let python_override = lookup(BACKEND_PYTHON_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let project_dir = lookup(PROJECT_DIR_ENV)
            .map(|value| PathBuf::from(value.trim()))
            .filter(|path| !path.as_os_str().is_empty());

        Self {
            port,
            python_override,
            project_dir,
        }
    }

    pub fn base_url(&self) -> Url {
        backend_base_url(self.port)
    }
}

pub fn parse_backend_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return DEFAULT_BACKEND_PORT;
    };

    match raw.parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            tracing::warn!(
                value = raw,
                default = DEFAULT_BACKEND_PORT,
                "invalid {BACKEND_PORT_ENV}; using default port"
            );
            DEFAULT_BACKEND_PORT
        }
    }
}

pub fn backend_base_url(port: u16) -> Url {
    // Safe because the host is a literal IPv4 address and the port is a u16.
    Url::parse(&format!("http://{BACKEND_HOST}:{port}/"))
        .expect("loopback backend url is always valid")
}
