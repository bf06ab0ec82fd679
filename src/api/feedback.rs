use axum::extract::Query;
use axum::{extract::State, routing::get, Json, Router};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::repositories::evaluations;
use crate::schemas::{FeedbackItem, FeedbackListResponse, FeedbackQuery};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_feedback))
}

async fn list_feedback(
    State(state): State<AppState>,
    Query(query): Query<FeedbackQuery>,
) -> Result<Json<FeedbackListResponse>, ApiError> {
    let rows = evaluations::list_feedback(state.db(), query.submission_id.as_deref())
        .await
        .map_err(|err| ApiError::internal(err, "Failed to list feedback"))?;

    let items = rows
        .into_iter()
        .map(|row| FeedbackItem {
            submission_id: row.submission_public_id,
            score_1_10: row.score_1_10,
            candidate_feedback: row.candidate_feedback.0,
            updated_at: format_primitive(row.updated_at),
        })
        .collect();

    Ok(Json(FeedbackListResponse { items }))
}
