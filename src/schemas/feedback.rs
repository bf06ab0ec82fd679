use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct FeedbackQuery {
    #[serde(default)]
    pub(crate) submission_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FeedbackItem {
    pub(crate) submission_id: String,
    pub(crate) score_1_10: i32,
    pub(crate) candidate_feedback: serde_json::Value,
    pub(crate) updated_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FeedbackListResponse {
    pub(crate) items: Vec<FeedbackItem>,
}
