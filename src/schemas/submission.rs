use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::types::SubmissionStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSubmissionRequest {
    pub(crate) source_external_id: String,
    pub(crate) candidate_public_id: String,
    pub(crate) assignment_public_id: String,
    /// Inline submission text; stored as the raw artifact when present.
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSubmissionResponse {
    pub(crate) submission_id: String,
    pub(crate) state: SubmissionStatus,
    pub(crate) created: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadSubmissionFileResponse {
    pub(crate) submission_id: String,
    pub(crate) state: SubmissionStatus,
    pub(crate) artifacts: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StageAttempts {
    pub(crate) telegram_ingest: i32,
    pub(crate) normalization: i32,
    pub(crate) evaluation: i32,
    pub(crate) delivery: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionStatusResponse {
    pub(crate) submission_id: String,
    pub(crate) candidate_public_id: String,
    pub(crate) assignment_public_id: String,
    pub(crate) state: SubmissionStatus,
    pub(crate) attempts: StageAttempts,
    pub(crate) last_error_code: Option<String>,
    pub(crate) last_error_message: Option<String>,
    /// Latest artifact ref per stage, as `bucket/object_key`.
    pub(crate) artifacts: HashMap<String, String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}
