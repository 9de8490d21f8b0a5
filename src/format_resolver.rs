use std::{path::Path, sync::Arc};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::ConversionApi;

/// Every shape `/formats` is known to answer with. Anything else is treated as
/// malformed and resolved from the built-in table instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FormatsPayload {
    /// `{ "formats": ["PDF", "DOCX"] }`
    Enveloped { formats: Vec<String> },
    /// `["PDF", "DOCX"]`
    List(Vec<String>),
    /// `{ "images": ["PNG"], "documents": ["PDF"] }`
    Grouped(IndexMap<String, Vec<String>>),
}

/// Ordered, case-insensitively unique output-format tokens, stored lower-case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormatCatalog {
    tokens: Vec<String>,
}

impl FormatCatalog {
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: IndexSet<String> = tokens
            .into_iter()
            .map(|token| token.as_ref().trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        Self {
            tokens: unique.into_iter().collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        let token = token.trim().to_lowercase();
        self.tokens.iter().any(|known| *known == token)
    }

    pub fn display_tokens(&self) -> Vec<String> {
        self.tokens.iter().map(|token| display_label(token)).collect()
    }
}

pub fn display_label(token: &str) -> String {
    token.to_uppercase()
}

pub fn normalize_formats(payload: FormatsPayload) -> FormatCatalog {
    match payload {
        FormatsPayload::Enveloped { formats } | FormatsPayload::List(formats) => {
            FormatCatalog::from_tokens(formats)
        }
        FormatsPayload::Grouped(groups) => {
            FormatCatalog::from_tokens(groups.into_values().flatten())
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "webp"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];
const RICH_DOCUMENT_EXTENSIONS: &[&str] = &["epub", "odt", "rtf"];
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "csv", "ods"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "rar", "7z"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi"];

const BUILTIN_FORMATS: &[(&[&str], &[&str])] = &[
    (
        IMAGE_EXTENSIONS,
        &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "pdf"],
    ),
    (DOCUMENT_EXTENSIONS, &["pdf", "docx", "txt"]),
    (
        RICH_DOCUMENT_EXTENSIONS,
        &["pdf", "docx", "txt", "epub", "odt", "rtf"],
    ),
    (SPREADSHEET_EXTENSIONS, &["xlsx", "csv", "ods", "pdf"]),
    (ARCHIVE_EXTENSIONS, &["zip", "tar", "7z"]),
    (AUDIO_EXTENSIONS, &["mp3", "wav", "flac", "ogg"]),
    (VIDEO_EXTENSIONS, &["mp4", "avi", "mkv", "mov"]),
];

/// Built-in suggestion for one extension; unknown extensions get every
/// built-in format so the selector is never empty.
pub fn builtin_formats_for_extension(extension: &str) -> FormatCatalog {
    let extension = normalize_extension(extension);
    BUILTIN_FORMATS
        .iter()
        .find(|(extensions, _)| extensions.contains(&extension.as_str()))
        .map(|(_, formats)| FormatCatalog::from_tokens(formats.iter()))
        .unwrap_or_else(builtin_catalog)
}

pub fn builtin_catalog() -> FormatCatalog {
    FormatCatalog::from_tokens(BUILTIN_FORMATS.iter().flat_map(|(_, formats)| formats.iter()))
}

pub fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

/// Lower-cased extension of the first selected file. Mixed selections are not
/// checked for compatibility.
pub fn representative_extension<P: AsRef<Path>>(files: &[P]) -> Option<String> {
    files
        .first()
        .and_then(|path| path.as_ref().extension())
        .map(|extension| normalize_extension(&extension.to_string_lossy()))
        .filter(|extension| !extension.is_empty())
}

#[derive(Clone)]
pub struct FormatResolver {
    api: Arc<dyn ConversionApi>,
}

impl FormatResolver {
    pub fn new(api: Arc<dyn ConversionApi>) -> Self {
        Self { api }
    }

    pub async fn suggest(&self, extension: &str) -> FormatCatalog {
        let extension = normalize_extension(extension);
        if extension.is_empty() {
            return builtin_catalog();
        }

        match self.api.formats(Some(&extension)).await {
            Ok(payload) => {
                let catalog = normalize_formats(payload);
                if !catalog.is_empty() {
                    return catalog;
                }
                tracing::info!(extension, "backend suggested no formats; using built-in table");
            }
            Err(error) => {
                tracing::warn!(extension, %error, "format suggestion failed; using built-in table");
            }
        }
        builtin_formats_for_extension(&extension)
    }

    pub async fn load_all(&self) -> FormatCatalog {
        match self.api.formats(None).await {
            Ok(payload) => {
                let catalog = normalize_formats(payload);
                if !catalog.is_empty() {
                    return catalog;
                }
                tracing::info!("backend returned an empty format catalog; using built-in table");
            }
            Err(error) => {
                tracing::warn!(%error, "format catalog unavailable; using built-in table");
            }
        }
        builtin_catalog()
    }
}
