use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("no input files selected")]
    NoFiles,
    #[error("input file path must be absolute: {}", .0.display())]
    RelativeInput(PathBuf),
    #[error("no output format selected")]
    NoFormat,
    #[error("no output directory selected")]
    NoOutputDir,
}

/// One submission to `POST /convert`. Validated on construction and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    files: Vec<PathBuf>,
    output_format: String,
    output_dir: PathBuf,
}

impl ConversionRequest {
    pub fn new(
        files: Vec<PathBuf>,
        output_format: &str,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, RequestError> {
        if files.is_empty() {
            return Err(RequestError::NoFiles);
        }
        if let Some(relative) = files.iter().find(|path| !path.is_absolute()) {
            return Err(RequestError::RelativeInput(relative.clone()));
        }

        let output_format = output_format.trim().to_lowercase();
        if output_format.is_empty() {
            return Err(RequestError::NoFormat);
        }

        let output_dir = output_dir.into();
        if output_dir.as_os_str().is_empty() {
            return Err(RequestError::NoOutputDir);
        }

        Ok(Self {
            files,
            output_format,
            output_dir,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Backend-issued job identifier; the only key used when polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return None;
        }
        Some(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time read of `GET /jobs/{job_id}`. Every field is optional on the
/// wire; the backend omits counters it has not touched yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobSnapshot {
    pub processed: u64,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub current_file: Option<String>,
    pub message: Option<String>,
    pub done: bool,
}

impl JobSnapshot {
    pub fn progress_fraction(&self) -> f64 {
        progress_fraction(self.processed, self.total)
    }
}

pub fn progress_fraction(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed as f64 / total as f64).clamp(0.0, 1.0)
}

pub fn progress_percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// One row of `GET /history/recent`. Owned by the backend; rendered only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRecord {
    pub input_file: String,
    pub output_format: String,
    pub timestamp: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub success: bool,
    pub error_message: Option<String>,
}

impl HistoryRecord {
    pub fn file_name(&self) -> &str {
        self.input_file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.input_file)
    }

    pub fn display_timestamp(&self) -> String {
        let raw = self.timestamp.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
        }
        raw.chars().take(19).collect()
    }

    pub fn display_line(&self) -> String {
        let outcome = if self.success { "✓ OK" } else { "✗ Failed" };
        format!(
            "{} • {} — {} — {}",
            self.output_format.to_uppercase(),
            self.file_name(),
            self.display_timestamp(),
            outcome
        )
    }
}

// SQLite-backed history reports booleans as 0/1.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value,
        Some(Flag::Int(value)) => value != 0,
        Some(Flag::Text(value)) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        ),
        None => false,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendBridgeState {
    pub running: bool,
    pub port: u16,
    pub pid: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BackendBridgeResult {
    pub ok: bool,
    pub reason: Option<String>,
}

impl BackendBridgeResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

pub struct AtomicFlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AtomicFlagGuard<'a> {
    pub fn try_set(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { flag })
    }
}

impl Drop for AtomicFlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
