use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::db::types::SubmissionStatus;
use crate::domain::ids::{validate_assignment_id, validate_candidate_id};
use crate::repositories::submissions::{self, CreateSubmissionError};
use crate::schemas::{TelegramWebhookRequest, TelegramWebhookResponse};

pub(crate) const TELEGRAM_SOURCE_TYPE: &str = "telegram_webhook";

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/telegram", post(telegram_webhook))
}

/// Idempotent intake: replays of the same `update_id` resolve to the first
/// submission and report `created: false`.
async fn telegram_webhook(
    State(state): State<AppState>,
    Json(request): Json<TelegramWebhookRequest>,
) -> Result<Json<TelegramWebhookResponse>, ApiError> {
    validate_candidate_id(&request.candidate_public_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;
    validate_assignment_id(&request.assignment_public_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;
    if request.update_id.trim().is_empty() {
        return Err(ApiError::UnprocessableEntity("update_id must be non-empty".to_string()));
    }
    if request.file_id.trim().is_empty() {
        return Err(ApiError::UnprocessableEntity("file_id must be non-empty".to_string()));
    }

    let file_name = request.file_name.clone().unwrap_or_else(|| "submission.bin".to_string());
    let persisted = submissions::create_with_source(
        state.db(),
        &request.candidate_public_id,
        &request.assignment_public_id,
        TELEGRAM_SOURCE_TYPE,
        &request.update_id,
        SubmissionStatus::TelegramUpdateReceived,
        json!({
            "update_id": request.update_id,
            "file_id": request.file_id,
            "file_name": file_name,
            "chat_id": request.chat_id,
            "entrypoint": "telegram_webhook",
        }),
        None,
    )
    .await
    .map_err(|err| match err {
        CreateSubmissionError::UnknownCandidate(id) => {
            ApiError::BadRequest(format!("candidate not found: {id}"))
        }
        CreateSubmissionError::UnknownAssignment(id) => {
            ApiError::BadRequest(format!("assignment not found: {id}"))
        }
        CreateSubmissionError::Db(err) => {
            ApiError::internal(err, "Failed to persist telegram update")
        }
    })?;

    Ok(Json(TelegramWebhookResponse {
        submission_id: persisted.submission_id,
        state: persisted.status,
        created: persisted.created,
    }))
}
