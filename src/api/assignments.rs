use axum::extract::Query;
use axum::{extract::State, routing::get, Json, Router};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::repositories::assignments;
use crate::schemas::{
    AssignmentResponse, CreateAssignmentRequest, ListAssignmentsQuery, ListAssignmentsResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_assignments).post(create_assignment))
}

async fn create_assignment(
    State(state): State<AppState>,
    Json(request): Json<CreateAssignmentRequest>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    if request.title.trim().is_empty() || request.description.trim().is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "title and description must be non-empty".to_string(),
        ));
    }

    let assignment = assignments::create(
        state.db(),
        &request.title,
        &request.description,
        request.is_active,
    )
    .await
    .map_err(|err| ApiError::internal(err, "Failed to create assignment"))?;

    Ok(Json(AssignmentResponse {
        assignment_public_id: assignment.public_id,
        title: assignment.title,
        description: assignment.description,
        is_active: assignment.is_active,
    }))
}

async fn list_assignments(
    State(state): State<AppState>,
    Query(query): Query<ListAssignmentsQuery>,
) -> Result<Json<ListAssignmentsResponse>, ApiError> {
    let items = assignments::list(state.db(), query.active_only)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to list assignments"))?
        .into_iter()
        .map(|assignment| AssignmentResponse {
            assignment_public_id: assignment.public_id,
            title: assignment.title,
            description: assignment.description,
            is_active: assignment.is_active,
        })
        .collect();

    Ok(Json(ListAssignmentsResponse { items }))
}
