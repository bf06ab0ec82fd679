use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::Evaluation;

#[derive(Debug, Clone)]
pub(crate) struct EvaluationUpsert {
    pub(crate) score_1_10: i32,
    pub(crate) criteria_scores: serde_json::Value,
    pub(crate) organizer_feedback: serde_json::Value,
    pub(crate) candidate_feedback: serde_json::Value,
    pub(crate) ai_assistance_likelihood: f64,
    pub(crate) ai_assistance_confidence: f64,
}

/// At most one evaluation per submission; re-running the evaluate stage
/// overwrites in place, which keeps the handler idempotent.
pub(crate) async fn upsert(
    pool: &PgPool,
    submission_public_id: &str,
    params: EvaluationUpsert,
) -> Result<(), sqlx::Error> {
    let now = primitive_now_utc();
    sqlx::query(
        "INSERT INTO evaluations
            (submission_id, score_1_10, criteria_scores, organizer_feedback,
             candidate_feedback, ai_assistance_likelihood, ai_assistance_confidence,
             created_at, updated_at)
         SELECT s.id, $2, $3, $4, $5, $6, $7, $8, $8
         FROM submissions s
         WHERE s.public_id = $1
         ON CONFLICT (submission_id) DO UPDATE
         SET score_1_10 = EXCLUDED.score_1_10,
             criteria_scores = EXCLUDED.criteria_scores,
             organizer_feedback = EXCLUDED.organizer_feedback,
             candidate_feedback = EXCLUDED.candidate_feedback,
             ai_assistance_likelihood = EXCLUDED.ai_assistance_likelihood,
             ai_assistance_confidence = EXCLUDED.ai_assistance_confidence,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(submission_public_id)
    .bind(params.score_1_10)
    .bind(Json(params.criteria_scores))
    .bind(Json(params.organizer_feedback))
    .bind(Json(params.candidate_feedback))
    .bind(params.ai_assistance_likelihood)
    .bind(params.ai_assistance_confidence)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn find_by_submission(
    pool: &PgPool,
    submission_public_id: &str,
) -> Result<Option<Evaluation>, sqlx::Error> {
    sqlx::query_as::<_, Evaluation>(
        "SELECT e.id, e.submission_id, e.score_1_10, e.criteria_scores,
                e.organizer_feedback, e.candidate_feedback,
                e.ai_assistance_likelihood, e.ai_assistance_confidence,
                e.created_at, e.updated_at
         FROM evaluations e
         JOIN submissions s ON s.id = e.submission_id
         WHERE s.public_id = $1",
    )
    .bind(submission_public_id)
    .fetch_optional(pool)
    .await
}

/// Candidate-facing feedback readout for `GET /feedback`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct FeedbackRow {
    pub(crate) submission_public_id: String,
    pub(crate) score_1_10: i32,
    pub(crate) candidate_feedback: Json<serde_json::Value>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn list_feedback(
    pool: &PgPool,
    submission_public_id: Option<&str>,
) -> Result<Vec<FeedbackRow>, sqlx::Error> {
    sqlx::query_as::<_, FeedbackRow>(
        "SELECT s.public_id AS submission_public_id,
                e.score_1_10,
                e.candidate_feedback,
                e.updated_at
         FROM evaluations e
         JOIN submissions s ON s.id = e.submission_id
         WHERE s.status IN ('evaluated', 'delivery_in_progress', 'delivered')
           AND ($1::text IS NULL OR s.public_id = $1)
         ORDER BY e.updated_at DESC, e.id DESC",
    )
    .bind(submission_public_id)
    .fetch_all(pool)
    .await
}
