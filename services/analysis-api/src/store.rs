//! In-memory analysis store
//!
//! One record per submitted analysis. A record is created in `Processing`
//! before the background task starts and transitions exactly once to
//! `Completed` or `Failed`; both carry the full result shape, split into
//! the summary document and the HTML report.
//!
//! Records are held in-process for the process lifetime with no eviction;
//! memory grows with the number of submissions, dominated by the stored
//! HTML reports. Acceptable at the expected submission volume, since
//! durable persistence lives behind the API boundary, not here.

use std::collections::HashMap;

use pipeline::ProcessedResult;
use serde::Serialize;
use tokio::sync::RwLock;

/// Lifecycle of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Completed,
    Failed,
}

/// Stored state of one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub id: String,
    pub status: AnalysisStatus,
    /// Summary document, present once the task finished
    pub resultado: Option<serde_json::Value>,
    /// HTML report, stored separately from the summary
    pub html: Option<String>,
}

/// Concurrent map of analysis records.
#[derive(Debug, Default)]
pub struct AnalysisStore {
    inner: RwLock<HashMap<String, AnalysisRecord>>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new analysis in `Processing` state. Returns `false`
    /// without touching the map when the id is already taken, so a repeated
    /// submission cannot overwrite an earlier record.
    pub async fn insert_processing(&self, id: &str) -> bool {
        let mut records = self.inner.write().await;
        if records.contains_key(id) {
            return false;
        }
        records.insert(
            id.to_string(),
            AnalysisRecord {
                id: id.to_string(),
                status: AnalysisStatus::Processing,
                resultado: None,
                html: None,
            },
        );
        true
    }

    /// Drop a record, used to roll back a registration whose submission was
    /// rejected after the insert.
    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    /// Store the outcome of a finished task. A failed task still stores the
    /// full failure shape so clients always get a renderable result.
    pub async fn finish(&self, id: &str, status: AnalysisStatus, result: ProcessedResult) {
        let mut records = self.inner.write().await;
        if let Some(record) = records.get_mut(id) {
            record.status = status;
            record.resultado = Some(result.json);
            record.html = Some(result.html);
        }
    }

    pub async fn get(&self, id: &str) -> Option<AnalysisRecord> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
