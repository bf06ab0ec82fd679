use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::repositories::candidates;
use crate::schemas::{CandidateResponse, CreateCandidateRequest};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", post(create_candidate))
}

async fn create_candidate(
    State(state): State<AppState>,
    Json(request): Json<CreateCandidateRequest>,
) -> Result<Json<CandidateResponse>, ApiError> {
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "first_name and last_name must be non-empty".to_string(),
        ));
    }

    let candidate = match (&request.source_type, &request.source_external_id) {
        (Some(source_type), Some(source_external_id)) => candidates::get_or_create_by_source(
            state.db(),
            source_type,
            source_external_id,
            &request.first_name,
            &request.last_name,
            json!({}),
        )
        .await
        .map_err(|err| ApiError::internal(err, "Failed to create candidate"))?,
        _ => candidates::create(state.db(), &request.first_name, &request.last_name)
            .await
            .map_err(|err| ApiError::internal(err, "Failed to create candidate"))?,
    };

    Ok(Json(CandidateResponse {
        candidate_public_id: candidate.public_id,
        first_name: candidate.first_name,
        last_name: candidate.last_name,
    }))
}
