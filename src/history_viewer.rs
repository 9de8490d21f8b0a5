use std::sync::Arc;

use crate::{ConversionApi, HistoryRecord};

/// Read-only, best-effort access to recent conversions.
#[derive(Clone)]
pub struct HistoryViewer {
    api: Arc<dyn ConversionApi>,
}

impl HistoryViewer {
    pub fn new(api: Arc<dyn ConversionApi>) -> Self {
        Self { api }
    }

    /// Most recent first, at most `limit` records. A failed read yields an
    /// empty list.
    pub async fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        if limit == 0 {
            return Vec::new();
        }

        match self.api.recent_history(limit).await {
            Ok(mut records) => {
                records.truncate(limit);
                records
            }
            Err(error) => {
                tracing::warn!(%error, "history refresh failed");
                Vec::new()
            }
        }
    }
}
