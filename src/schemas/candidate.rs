use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateCandidateRequest {
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    #[serde(default)]
    pub(crate) source_type: Option<String>,
    #[serde(default)]
    pub(crate) source_external_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CandidateResponse {
    pub(crate) candidate_public_id: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
}
