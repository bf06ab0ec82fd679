use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateExportRequest {
    /// Restrict the export to these submissions; all delivered ones otherwise.
    #[serde(default)]
    pub(crate) submission_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExportResponse {
    pub(crate) export_id: String,
    pub(crate) row_count: i32,
}
