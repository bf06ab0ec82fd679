use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Submission, SubmissionSource};
use crate::db::types::SubmissionStatus;
use crate::domain::ids::new_submission_public_id;
use crate::repositories::is_unique_violation;

const PUBLIC_ID_MINT_RETRIES: usize = 5;

#[derive(Debug, Error)]
pub(crate) enum CreateSubmissionError {
    #[error("candidate not found: {0}")]
    UnknownCandidate(String),
    #[error("assignment not found: {0}")]
    UnknownAssignment(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Outcome of the idempotent intake upsert.
#[derive(Debug, Clone)]
pub(crate) struct UpsertSourceResult {
    pub(crate) submission_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) created: bool,
}

/// Create a submission together with its identity-mapping source row, or
/// resolve to the existing submission when the `(source_type,
/// source_external_id)` pair was seen before. Runs in one transaction so a
/// replayed intake can never produce two submissions.
pub(crate) async fn create_with_source(
    pool: &PgPool,
    candidate_public_id: &str,
    assignment_public_id: &str,
    source_type: &str,
    source_external_id: &str,
    initial_status: SubmissionStatus,
    metadata: serde_json::Value,
    payload_ref: Option<&str>,
) -> Result<UpsertSourceResult, CreateSubmissionError> {
    let mut tx = pool.begin().await?;

    if let Some(existing) = find_by_source_tx(&mut tx, source_type, source_external_id).await? {
        tx.commit().await?;
        return Ok(existing);
    }

    let candidate_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM candidates WHERE public_id = $1",
    )
    .bind(candidate_public_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| CreateSubmissionError::UnknownCandidate(candidate_public_id.to_string()))?;

    let assignment_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM assignments WHERE public_id = $1",
    )
    .bind(assignment_public_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| CreateSubmissionError::UnknownAssignment(assignment_public_id.to_string()))?;

    let now = primitive_now_utc();
    let mut created: Option<(i64, String)> = None;
    for _ in 0..PUBLIC_ID_MINT_RETRIES {
        let public_id = new_submission_public_id();
        let result = sqlx::query_scalar::<_, i64>(
            "INSERT INTO submissions
                (public_id, candidate_id, assignment_id, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id",
        )
        .bind(&public_id)
        .bind(candidate_id)
        .bind(assignment_id)
        .bind(initial_status)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        match result {
            Ok(id) => {
                created = Some((id, public_id));
                break;
            }
            Err(err) if is_unique_violation(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    let Some((submission_pk, submission_id)) = created else {
        return Err(sqlx::Error::Protocol(
            "failed to allocate unique submission public id".into(),
        )
        .into());
    };

    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO submission_sources
            (submission_id, source_type, source_external_id, payload_ref, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (source_type, source_external_id) DO NOTHING
         RETURNING id",
    )
    .bind(submission_pk)
    .bind(source_type)
    .bind(source_external_id)
    .bind(payload_ref)
    .bind(Json(metadata))
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    if inserted.is_none() {
        // A concurrent intake won the source row; its submission is canonical
        // and ours rolls back with the transaction.
        tx.rollback().await?;
        let existing = find_by_source(pool, source_type, source_external_id).await?;
        return existing.ok_or_else(|| {
            sqlx::Error::Protocol("submission source conflict without existing row".into()).into()
        });
    }

    tx.commit().await?;
    Ok(UpsertSourceResult { submission_id, status: initial_status, created: true })
}

async fn find_by_source_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    source_type: &str,
    source_external_id: &str,
) -> Result<Option<UpsertSourceResult>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, SubmissionStatus)>(
        "SELECT s.public_id, s.status
         FROM submissions s
         JOIN submission_sources ss ON ss.submission_id = s.id
         WHERE ss.source_type = $1 AND ss.source_external_id = $2",
    )
    .bind(source_type)
    .bind(source_external_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|(submission_id, status)| UpsertSourceResult {
        submission_id,
        status,
        created: false,
    }))
}

async fn find_by_source(
    pool: &PgPool,
    source_type: &str,
    source_external_id: &str,
) -> Result<Option<UpsertSourceResult>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, SubmissionStatus)>(
        "SELECT s.public_id, s.status
         FROM submissions s
         JOIN submission_sources ss ON ss.submission_id = s.id
         WHERE ss.source_type = $1 AND ss.source_external_id = $2",
    )
    .bind(source_type)
    .bind(source_external_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(submission_id, status)| UpsertSourceResult {
        submission_id,
        status,
        created: false,
    }))
}

pub(crate) async fn find_by_public_id(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(
        "SELECT id, public_id, candidate_id, assignment_id, status,
                attempt_telegram_ingest, attempt_normalization, attempt_evaluation,
                attempt_delivery, claimed_by, claimed_at, lease_expires_at,
                last_error_code, last_error_message, created_at, updated_at
         FROM submissions WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await
}

/// Status view joined with the public identities, for `GET /submissions/:id`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SubmissionStatusRow {
    pub(crate) public_id: String,
    pub(crate) candidate_public_id: String,
    pub(crate) assignment_public_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) attempt_telegram_ingest: i32,
    pub(crate) attempt_normalization: i32,
    pub(crate) attempt_evaluation: i32,
    pub(crate) attempt_delivery: i32,
    pub(crate) last_error_code: Option<String>,
    pub(crate) last_error_message: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn status_view(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<SubmissionStatusRow>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionStatusRow>(
        "SELECT s.public_id,
                c.public_id AS candidate_public_id,
                a.public_id AS assignment_public_id,
                s.status,
                s.attempt_telegram_ingest,
                s.attempt_normalization,
                s.attempt_evaluation,
                s.attempt_delivery,
                s.last_error_code,
                s.last_error_message,
                s.created_at,
                s.updated_at
         FROM submissions s
         JOIN candidates c ON c.id = s.candidate_id
         JOIN assignments a ON a.id = s.assignment_id
         WHERE s.public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await
}

/// The submission's intake source of a given type, with its metadata payload
/// (file ids, chat ids).
pub(crate) async fn source_of_type(
    pool: &PgPool,
    public_id: &str,
    source_type: &str,
) -> Result<Option<SubmissionSource>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionSource>(
        "SELECT ss.id, ss.submission_id, ss.source_type, ss.source_external_id,
                ss.payload_ref, ss.metadata, ss.created_at
         FROM submission_sources ss
         JOIN submissions s ON s.id = ss.submission_id
         WHERE s.public_id = $1 AND ss.source_type = $2
         ORDER BY ss.created_at DESC, ss.id DESC
         LIMIT 1",
    )
    .bind(public_id)
    .bind(source_type)
    .fetch_optional(pool)
    .await
}

/// The submission's most recent intake source of any type.
pub(crate) async fn primary_source(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<SubmissionSource>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionSource>(
        "SELECT ss.id, ss.submission_id, ss.source_type, ss.source_external_id,
                ss.payload_ref, ss.metadata, ss.created_at
         FROM submission_sources ss
         JOIN submissions s ON s.id = ss.submission_id
         WHERE s.public_id = $1
         ORDER BY ss.created_at DESC, ss.id DESC
         LIMIT 1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await
}

/// Everything an export row needs, joined across evaluation and the latest
/// llm run.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExportSourceRow {
    pub(crate) submission_public_id: String,
    pub(crate) candidate_first_name: String,
    pub(crate) candidate_last_name: String,
    pub(crate) assignment_title: String,
    pub(crate) score_1_10: i32,
    pub(crate) criteria_scores: Json<serde_json::Value>,
    pub(crate) organizer_feedback: Json<serde_json::Value>,
    pub(crate) chain_version: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) spec_version: Option<String>,
    pub(crate) response_language: Option<String>,
}

pub(crate) async fn list_for_export(
    pool: &PgPool,
    submission_ids: Option<&[String]>,
) -> Result<Vec<ExportSourceRow>, sqlx::Error> {
    sqlx::query_as::<_, ExportSourceRow>(
        "SELECT s.public_id AS submission_public_id,
                c.first_name AS candidate_first_name,
                c.last_name AS candidate_last_name,
                a.title AS assignment_title,
                e.score_1_10,
                e.criteria_scores,
                e.organizer_feedback,
                llm.chain_version,
                llm.model,
                llm.spec_version,
                llm.response_language
         FROM submissions s
         JOIN candidates c ON c.id = s.candidate_id
         JOIN assignments a ON a.id = s.assignment_id
         JOIN evaluations e ON e.submission_id = s.id
         LEFT JOIN LATERAL (
             SELECT chain_version, spec_version, response_language, model
             FROM llm_runs lr
             WHERE lr.submission_id = s.id
             ORDER BY lr.created_at DESC, lr.id DESC
             LIMIT 1
         ) llm ON TRUE
         WHERE s.status = 'delivered'
           AND ($1::text[] IS NULL OR s.public_id = ANY($1))
         ORDER BY s.created_at, s.id",
    )
    .bind(submission_ids)
    .fetch_all(pool)
    .await
}
