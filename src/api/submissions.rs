use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::db::types::SubmissionStatus;
use crate::domain::ids::{validate_assignment_id, validate_candidate_id, validate_submission_id};
use crate::repositories::submissions::CreateSubmissionError;
use crate::repositories::{claims, submissions};
use crate::schemas::{
    CreateSubmissionRequest, CreateSubmissionResponse, StageAttempts, SubmissionStatusResponse,
    UploadSubmissionFileResponse,
};

const API_SOURCE_TYPE: &str = "api_upload";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_submission))
        .route("/file", post(upload_submission_file))
        .route("/:submission_id", get(get_submission_status))
}

async fn create_submission(
    State(state): State<AppState>,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<Json<CreateSubmissionResponse>, ApiError> {
    validate_candidate_id(&request.candidate_public_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;
    validate_assignment_id(&request.assignment_public_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;
    if request.source_external_id.trim().is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "source_external_id must be non-empty".to_string(),
        ));
    }

    let file_name = request.file_name.clone().unwrap_or_else(|| "submission.md".to_string());
    let persisted = submissions::create_with_source(
        state.db(),
        &request.candidate_public_id,
        &request.assignment_public_id,
        API_SOURCE_TYPE,
        &request.source_external_id,
        SubmissionStatus::Uploaded,
        json!({
            "entrypoint": "api_submission",
            "file_name": file_name,
        }),
        None,
    )
    .await
    .map_err(map_create_error)?;

    // Inline content becomes the raw artifact so normalization has input.
    if persisted.created {
        if let Some(content) = &request.content {
            store_raw_artifact(
                &state,
                &persisted.submission_id,
                &file_name,
                content.clone().into_bytes(),
            )
            .await?;
        }
    }

    Ok(Json(CreateSubmissionResponse {
        submission_id: persisted.submission_id,
        state: persisted.status,
        created: persisted.created,
    }))
}

async fn upload_submission_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadSubmissionFileResponse>, ApiError> {
    let mut candidate_public_id = None;
    let mut assignment_public_id = None;
    let mut source_external_id = None;
    let mut file_name = None;
    let mut payload: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("candidate_public_id") => {
                candidate_public_id = Some(read_text_field(field).await?);
            }
            Some("assignment_public_id") => {
                assignment_public_id = Some(read_text_field(field).await?);
            }
            Some("source_external_id") => {
                source_external_id = Some(read_text_field(field).await?);
            }
            Some("file") => {
                file_name = field.file_name().map(|name| name.to_string());
                payload = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| ApiError::BadRequest(format!("failed to read file: {err}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let candidate_public_id = candidate_public_id
        .ok_or_else(|| ApiError::UnprocessableEntity("candidate_public_id is required".to_string()))?;
    let assignment_public_id = assignment_public_id
        .ok_or_else(|| ApiError::UnprocessableEntity("assignment_public_id is required".to_string()))?;
    let payload =
        payload.ok_or_else(|| ApiError::UnprocessableEntity("file is required".to_string()))?;

    validate_candidate_id(&candidate_public_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;
    validate_assignment_id(&assignment_public_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;

    let file_name = file_name.unwrap_or_else(|| "submission.bin".to_string());
    let source_external_id =
        source_external_id.unwrap_or_else(|| format!("upload-{}", Uuid::new_v4()));

    let persisted = submissions::create_with_source(
        state.db(),
        &candidate_public_id,
        &assignment_public_id,
        API_SOURCE_TYPE,
        &source_external_id,
        SubmissionStatus::Uploaded,
        json!({
            "entrypoint": "api_file_upload",
            "file_name": file_name,
        }),
        None,
    )
    .await
    .map_err(map_create_error)?;

    let mut artifacts = HashMap::new();
    if persisted.created {
        let object_key =
            store_raw_artifact(&state, &persisted.submission_id, &file_name, payload).await?;
        artifacts.insert("raw".to_string(), object_key);
    }

    Ok(Json(UploadSubmissionFileResponse {
        submission_id: persisted.submission_id,
        state: persisted.status,
        artifacts,
    }))
}

async fn get_submission_status(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<SubmissionStatusResponse>, ApiError> {
    validate_submission_id(&submission_id)
        .map_err(|err| ApiError::UnprocessableEntity(err.to_string()))?;

    let view = submissions::status_view(state.db(), &submission_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to read submission"))?
        .ok_or_else(|| ApiError::NotFound(format!("submission not found: {submission_id}")))?;

    let trace = claims::artifact_trace(state.db(), &submission_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to read artifact trace"))?;

    // Rows arrive oldest-first; the map keeps the latest ref per stage.
    let mut artifacts = HashMap::new();
    for artifact in trace {
        artifacts
            .insert(artifact.stage, format!("{}/{}", artifact.bucket, artifact.object_key));
    }

    Ok(Json(SubmissionStatusResponse {
        submission_id: view.public_id,
        candidate_public_id: view.candidate_public_id,
        assignment_public_id: view.assignment_public_id,
        state: view.status,
        attempts: StageAttempts {
            telegram_ingest: view.attempt_telegram_ingest,
            normalization: view.attempt_normalization,
            evaluation: view.attempt_evaluation,
            delivery: view.attempt_delivery,
        },
        last_error_code: view.last_error_code,
        last_error_message: view.last_error_message,
        artifacts,
        created_at: format_primitive(view.created_at),
        updated_at: format_primitive(view.updated_at),
    }))
}

async fn store_raw_artifact(
    state: &AppState,
    submission_id: &str,
    file_name: &str,
    payload: Vec<u8>,
) -> Result<String, ApiError> {
    let storage = state
        .storage()
        .ok_or_else(|| ApiError::ServiceUnavailable("artifact storage is not configured".to_string()))?;

    let object_key = format!("raw/{submission_id}/{file_name}");
    storage
        .put_bytes(&object_key, "application/octet-stream", payload)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to store raw artifact"))?;

    claims::link_artifact(state.db(), submission_id, "raw", storage.bucket(), &object_key, None)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to link raw artifact"))?;

    Ok(object_key)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart field: {err}")))
}

fn map_create_error(err: CreateSubmissionError) -> ApiError {
    match err {
        CreateSubmissionError::UnknownCandidate(id) => {
            ApiError::BadRequest(format!("candidate not found: {id}"))
        }
        CreateSubmissionError::UnknownAssignment(id) => {
            ApiError::BadRequest(format!("assignment not found: {id}"))
        }
        CreateSubmissionError::Db(err) => ApiError::internal(err, "Failed to create submission"),
    }
}
