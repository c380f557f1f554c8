//! Result post-processing for persistence
//!
//! The stored record keeps the summary JSON and the HTML report in separate
//! columns; the report can run to hundreds of kilobytes and must not be
//! duplicated inside the JSON document.

use provider::AnalysisResult;

/// An analysis result split for storage: summary document plus the HTML
/// report.
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    /// The summary fields (wire names), without `html_content`.
    pub json: serde_json::Value,
    pub html: String,
}

/// Split a result into its persisted parts.
pub fn process(result: &AnalysisResult) -> ProcessedResult {
    let mut json = serde_json::to_value(result)
        .unwrap_or_else(|_| serde_json::json!({ "id": result.id }));
    if let Some(map) = json.as_object_mut() {
        map.remove("html_content");
    }
    ProcessedResult {
        json,
        html: result.html_content.clone(),
    }
}
