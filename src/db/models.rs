use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Candidate {
    pub(crate) id: i64,
    pub(crate) public_id: String,
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: i64,
    pub(crate) public_id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

/// The scheduling aggregate root. Never deleted; mutated only through the
/// claim repository once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: i64,
    pub(crate) public_id: String,
    pub(crate) candidate_id: i64,
    pub(crate) assignment_id: i64,
    pub(crate) status: SubmissionStatus,
    pub(crate) attempt_telegram_ingest: i32,
    pub(crate) attempt_normalization: i32,
    pub(crate) attempt_evaluation: i32,
    pub(crate) attempt_delivery: i32,
    pub(crate) claimed_by: Option<String>,
    pub(crate) claimed_at: Option<PrimitiveDateTime>,
    pub(crate) lease_expires_at: Option<PrimitiveDateTime>,
    pub(crate) last_error_code: Option<String>,
    pub(crate) last_error_message: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SubmissionSource {
    pub(crate) id: i64,
    pub(crate) submission_id: i64,
    pub(crate) source_type: String,
    pub(crate) source_external_id: String,
    pub(crate) payload_ref: Option<String>,
    pub(crate) metadata: Json<serde_json::Value>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Artifact {
    pub(crate) id: i64,
    pub(crate) submission_id: i64,
    pub(crate) stage: String,
    pub(crate) bucket: String,
    pub(crate) object_key: String,
    pub(crate) schema_version: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Evaluation {
    pub(crate) id: i64,
    pub(crate) submission_id: i64,
    pub(crate) score_1_10: i32,
    pub(crate) criteria_scores: Json<serde_json::Value>,
    pub(crate) organizer_feedback: Json<serde_json::Value>,
    pub(crate) candidate_feedback: Json<serde_json::Value>,
    pub(crate) ai_assistance_likelihood: f64,
    pub(crate) ai_assistance_confidence: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct LlmRun {
    pub(crate) id: i64,
    pub(crate) submission_id: i64,
    pub(crate) provider: String,
    pub(crate) model: String,
    pub(crate) api_base: String,
    pub(crate) chain_version: String,
    pub(crate) spec_version: String,
    pub(crate) response_language: String,
    pub(crate) temperature: f64,
    pub(crate) seed: Option<i64>,
    pub(crate) tokens_input: i64,
    pub(crate) tokens_output: i64,
    pub(crate) latency_ms: i64,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Export {
    pub(crate) id: i64,
    pub(crate) public_id: String,
    pub(crate) bucket: String,
    pub(crate) object_key: String,
    pub(crate) row_count: i32,
    pub(crate) created_at: PrimitiveDateTime,
}
