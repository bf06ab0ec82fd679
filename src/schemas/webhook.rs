use serde::{Deserialize, Serialize};

use crate::db::types::SubmissionStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct TelegramWebhookRequest {
    pub(crate) update_id: String,
    pub(crate) candidate_public_id: String,
    pub(crate) assignment_public_id: String,
    pub(crate) file_id: String,
    #[serde(default)]
    pub(crate) file_name: Option<String>,
    /// Chat to deliver feedback to once the pipeline completes.
    #[serde(default)]
    pub(crate) chat_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TelegramWebhookResponse {
    pub(crate) submission_id: String,
    pub(crate) state: SubmissionStatus,
    pub(crate) created: bool,
}
