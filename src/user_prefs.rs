use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use crate::DESKTOP_STATE_FILE;

const OUTPUT_FORMAT_FIELD: &str = "lastOutputFormat";
const OUTPUT_DIR_FIELD: &str = "lastOutputDir";

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to create preferences directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read preferences {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write preferences {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Selections remembered between launches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPrefs {
    pub last_output_format: Option<String>,
    pub last_output_dir: Option<PathBuf>,
}

pub fn desktop_state_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DESKTOP_STATE_FILE)
}

fn empty_state_object() -> Value {
    Value::Object(Map::new())
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = empty_state_object();
    }
    // Safe because `value` was just normalized into an object.
    value
        .as_object_mut()
        .expect("value was just normalized into a JSON object")
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value?
        .as_str()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Missing or unreadable state yields defaults.
pub fn read_user_prefs(state_path: &Path) -> UserPrefs {
    let Ok(raw) = fs::read_to_string(state_path) else {
        return UserPrefs::default();
    };
    let parsed = match serde_json::from_str::<Value>(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(path = %state_path.display(), %error, "ignoring malformed desktop state");
            return UserPrefs::default();
        }
    };

    UserPrefs {
        last_output_format: non_blank(parsed.get(OUTPUT_FORMAT_FIELD)).map(str::to_lowercase),
        last_output_dir: non_blank(parsed.get(OUTPUT_DIR_FIELD)).map(PathBuf::from),
    }
}

/// Updates the remembered fields, leaving any other keys in the file alone.
pub fn write_user_prefs(state_path: &Path, prefs: &UserPrefs) -> Result<(), PrefsError> {
    if let Some(parent_dir) = state_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|source| PrefsError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;
    }

    let mut parsed = match fs::read_to_string(state_path) {
        Ok(raw) => serde_json::from_str::<Value>(&raw).unwrap_or_else(|error| {
            tracing::warn!(
                path = %state_path.display(),
                %error,
                "failed to parse desktop state; resetting state file"
            );
            empty_state_object()
        }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => empty_state_object(),
        Err(source) => {
            return Err(PrefsError::Read {
                path: state_path.to_path_buf(),
                source,
            })
        }
    };

    let object = ensure_object(&mut parsed);
    match &prefs.last_output_format {
        Some(format) => {
            object.insert(OUTPUT_FORMAT_FIELD.to_string(), Value::String(format.clone()));
        }
        None => {
            object.remove(OUTPUT_FORMAT_FIELD);
        }
    }
    match &prefs.last_output_dir {
        Some(dir) => {
            object.insert(
                OUTPUT_DIR_FIELD.to_string(),
                Value::String(dir.to_string_lossy().into_owned()),
            );
        }
        None => {
            object.remove(OUTPUT_DIR_FIELD);
        }
    }

    let serialized = serde_json::to_string_pretty(&parsed)?;
    fs::write(state_path, serialized).map_err(|source| PrefsError::Write {
        path: state_path.to_path_buf(),
        source,
    })
}
