use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{BackendConfig, BACKEND_ENTRYPOINT, BACKEND_PORT_ENV};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub envs: Vec<(String, String)>,
    pub packaged_mode: bool,
}

impl LaunchPlan {
    pub fn debug_command(&self) -> Vec<String> {
        let mut parts = vec![self.cmd.clone()];
        parts.extend(self.args.iter().cloned());
        parts
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("backend is already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("backend entry point is missing: {}", .0.display())]
    MissingEntrypoint(PathBuf),
    #[error("failed to spawn backend process {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },
}

/// Relative location of the pre-built backend inside the resource directory.
pub fn packaged_backend_relative_path() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("backend").join("macos").join("backend")
    } else if cfg!(target_os = "windows") {
        PathBuf::from("backend").join("win").join("backend.exe")
    } else {
        PathBuf::from("backend").join("linux").join("backend")
    }
}

/// Packaged builds run the native backend when it ships with the bundle and
/// fall back to the development interpreter otherwise.
pub fn resolve_launch_plan(
    config: &BackendConfig,
    resource_dir: Option<&Path>,
    packaged_build: bool,
) -> Result<LaunchPlan, LaunchError> {
    if packaged_build {
        if let Some(plan) = resource_dir.and_then(|dir| resolve_packaged_launch(config, dir)) {
            return Ok(plan);
        }
        tracing::warn!(
            resource_dir = ?resource_dir,
            "packaged backend executable not found; using development launch"
        );
    }

    resolve_dev_launch(config)
}

pub fn resolve_packaged_launch(config: &BackendConfig, resource_dir: &Path) -> Option<LaunchPlan> {
    let executable = resource_dir.join(packaged_backend_relative_path());
    if !executable.is_file() {
        return None;
    }

    let cwd = executable
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| resource_dir.to_path_buf());
    Some(LaunchPlan {
        cmd: executable.to_string_lossy().to_string(),
        args: Vec::new(),
        cwd,
        envs: backend_envs(config, true),
        packaged_mode: true,
    })
}

pub fn resolve_dev_launch(config: &BackendConfig) -> Result<LaunchPlan, LaunchError> {
    let project_dir = config
        .project_dir
        .clone()
        .or_else(detect_project_root)
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let entrypoint = project_dir.join(BACKEND_ENTRYPOINT);
    if !entrypoint.is_file() {
        return Err(LaunchError::MissingEntrypoint(entrypoint));
    }

    let (cmd, mut args) = resolve_dev_interpreter(config.python_override.as_deref(), &project_dir);
    args.push(BACKEND_ENTRYPOINT.to_string());

    Ok(LaunchPlan {
        cmd,
        args,
        cwd: project_dir,
        envs: backend_envs(config, false),
        packaged_mode: false,
    })
}

/// Explicit override first, then the project's `.venv`, then the system
/// interpreter.
pub fn resolve_dev_interpreter(
    python_override: Option<&str>,
    project_dir: &Path,
) -> (String, Vec<String>) {
    if let Some(raw) = python_override {
        match shlex::split(raw) {
            Some(mut pieces) if !pieces.is_empty() => {
                let cmd = pieces.remove(0);
                return (cmd, pieces);
            }
            _ => {
                tracing::warn!(value = raw, "ignoring unusable interpreter override");
            }
        }
    }

    let venv_python = if cfg!(target_os = "windows") {
        project_dir.join(".venv").join("Scripts").join("python.exe")
    } else {
        project_dir.join(".venv").join("bin").join("python")
    };
    if venv_python.is_file() {
        return (venv_python.to_string_lossy().to_string(), Vec::new());
    }

    let system_python = if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    };
    (system_python.to_string(), Vec::new())
}

fn backend_envs(config: &BackendConfig, packaged_mode: bool) -> Vec<(String, String)> {
    let mut envs = vec![(BACKEND_PORT_ENV.to_string(), config.port.to_string())];
    if !packaged_mode {
        envs.push(("PYTHONUNBUFFERED".to_string(), "1".to_string()));
        envs.push((
            "PYTHONIOENCODING".to_string(),
            env::var("PYTHONIOENCODING").unwrap_or_else(|_| "utf-8".to_string()),
        ));
    }
    envs
}

fn detect_project_root() -> Option<PathBuf> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let mut candidates = vec![manifest_dir.clone()];
    if let Some(parent) = manifest_dir.parent() {
        candidates.push(parent.to_path_buf());
    }
    if let Ok(current_dir) = env::current_dir() {
        candidates.push(current_dir);
    }

    candidates
        .into_iter()
        .find(|candidate| candidate.join(BACKEND_ENTRYPOINT).is_file())
        .map(|candidate| candidate.canonicalize().unwrap_or(candidate))
}
