use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::domain::artifacts::{
    encode_export_rows, join_string_list, summarize_criteria, ExportRowArtifact,
    EXPORTS_SCHEMA_VERSION,
};
use crate::domain::ids::{new_export_public_id, validate_export_id};
use crate::repositories::{exports, submissions};
use crate::schemas::{CreateExportRequest, ExportResponse};

const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(300);

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_export))
        .route("/:export_id/download", get(download_export))
}

/// Snapshot delivered submissions into one CSV object in the artifact store.
async fn create_export(
    State(state): State<AppState>,
    Json(request): Json<CreateExportRequest>,
) -> Result<Json<ExportResponse>, ApiError> {
    let storage = state.storage().ok_or_else(|| {
        ApiError::ServiceUnavailable("artifact storage is not configured".to_string())
    })?;

    let rows = submissions::list_for_export(state.db(), request.submission_ids.as_deref())
        .await
        .map_err(|err| ApiError::internal(err, "Failed to collect export rows"))?;

    let export_rows: Vec<ExportRowArtifact> = rows
        .into_iter()
        .map(|row| {
            let organizer = &row.organizer_feedback.0;
            ExportRowArtifact {
                candidate_identifier: format!(
                    "{} {}",
                    row.candidate_first_name, row.candidate_last_name
                ),
                assignment_identifier: row.assignment_title.clone(),
                score_1_10: row.score_1_10,
                criteria_summary: summarize_criteria(&row.criteria_scores.0),
                strengths: join_string_list(organizer.get("strengths")),
                issues: join_string_list(organizer.get("issues")),
                recommendations: join_string_list(organizer.get("recommendations")),
                chain_version: row.chain_version.clone().unwrap_or_default(),
                model: row.model.clone().unwrap_or_default(),
                spec_version: row.spec_version.clone().unwrap_or_default(),
                response_language: row.response_language.clone().unwrap_or_default(),
                schema_version: EXPORTS_SCHEMA_VERSION.to_string(),
            }
        })
        .collect();

    let export_id = new_export_public_id();
    let object_key = format!("exports/{export_id}.csv");
    let row_count = export_rows.len() as i32;

    storage
        .put_bytes(&object_key, "text/csv", encode_export_rows(&export_rows))
        .await
        .map_err(|err| ApiError::internal(err, "Failed to store export"))?;

    exports::insert(state.db(), &export_id, storage.bucket(), &object_key, row_count)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to record export"))?;

    Ok(Json(ExportResponse { export_id, row_count }))
}

async fn download_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> Result<Redirect, ApiError> {
    validate_export_id(&export_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;

    let storage = state.storage().ok_or_else(|| {
        ApiError::ServiceUnavailable("artifact storage is not configured".to_string())
    })?;

    let export = exports::find_by_public_id(state.db(), &export_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to read export"))?
        .ok_or_else(|| ApiError::NotFound(format!("export not found: {export_id}")))?;

    let url = storage
        .presign_get(&export.object_key, DOWNLOAD_URL_TTL)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to presign export download"))?;

    Ok(Redirect::temporary(&url))
}
