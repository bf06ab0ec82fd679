//! Scheduler gateway. Every operation is one conditional statement whose
//! WHERE clause is the scheduling invariant; callers never pre-check.

use sqlx::PgPool;
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};

use crate::core::time::primitive_now_utc;
use crate::db::models::Artifact;
use crate::db::types::SubmissionStatus;
use crate::domain::lifecycle::{is_legal_transition, Stage};

/// Expired claims moved back to the retry pool per statement per tick.
const RECLAIM_BATCH_LIMIT: i64 = 50;

pub(crate) const RECLAIM_ERROR_CODE: &str = "lease_expired";
const RECLAIM_RETRY_MESSAGE: &str = "claim lease expired and was reclaimed";
const RECLAIM_DEAD_MESSAGE: &str = "claim lease expired and reached max attempts";

/// Time-bounded exclusive ownership of one submission at one stage.
#[derive(Debug, Clone)]
pub(crate) struct WorkClaim {
    pub(crate) public_id: String,
    pub(crate) stage: Stage,
    /// 1-based number of the attempt this claim represents.
    pub(crate) attempt: i32,
    pub(crate) lease_expires_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct ArtifactRef {
    pub(crate) bucket: String,
    pub(crate) object_key: String,
    pub(crate) schema_version: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum TransitionError {
    #[error("illegal transition: {from} -> {to}")]
    IllegalEdge { from: &'static str, to: &'static str },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

// The attempt counter column differs per stage. Each statement exists once
// per stage as a compile-time constant; column names are never interpolated
// at runtime.

macro_rules! claim_next_sql {
    ($attempt:literal) => {
        concat!(
            "WITH candidate AS (
                SELECT id FROM submissions
                WHERE status = $1
                ORDER BY created_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE submissions
            SET status = $2,
                claimed_by = $3,
                claimed_at = $4,
                lease_expires_at = $5,
                updated_at = $4
            FROM candidate
            WHERE submissions.id = candidate.id
            RETURNING submissions.public_id, submissions.",
            $attempt,
            " AS attempt, submissions.lease_expires_at"
        )
    };
}

macro_rules! finalize_failure_retry_sql {
    ($attempt:literal) => {
        concat!(
            "UPDATE submissions
            SET status = $4,
                ",
            $attempt,
            " = ",
            $attempt,
            " + 1,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error_code = $5,
                last_error_message = $6,
                updated_at = $8
            WHERE public_id = $1
              AND status = $2
              AND claimed_by = $3
              AND lease_expires_at > $8
              AND ",
            $attempt,
            " + 1 < $7"
        )
    };
}

macro_rules! reclaim_retry_sql {
    ($attempt:literal) => {
        concat!(
            "WITH expired AS (
                SELECT id FROM submissions
                WHERE status = $1
                  AND lease_expires_at <= $2
                  AND ",
            $attempt,
            " + 1 < $3
                ORDER BY lease_expires_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            UPDATE submissions
            SET status = $5,
                ",
            $attempt,
            " = ",
            $attempt,
            " + 1,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error_code = $6,
                last_error_message = $7,
                updated_at = $2
            FROM expired
            WHERE submissions.id = expired.id
            RETURNING submissions.public_id"
        )
    };
}

macro_rules! reclaim_dead_letter_sql {
    ($attempt:literal) => {
        concat!(
            "WITH expired AS (
                SELECT id FROM submissions
                WHERE status = $1
                  AND lease_expires_at <= $2
                  AND ",
            $attempt,
            " + 1 >= $3
                ORDER BY lease_expires_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            UPDATE submissions
            SET status = $5,
                ",
            $attempt,
            " = ",
            $attempt,
            " + 1,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error_code = $6,
                last_error_message = $7,
                updated_at = $2
            FROM expired
            WHERE submissions.id = expired.id
            RETURNING submissions.public_id"
        )
    };
}

const CLAIM_NEXT_TELEGRAM_INGEST: &str = claim_next_sql!("attempt_telegram_ingest");
const CLAIM_NEXT_NORMALIZE: &str = claim_next_sql!("attempt_normalization");
const CLAIM_NEXT_EVALUATE: &str = claim_next_sql!("attempt_evaluation");
const CLAIM_NEXT_DELIVER: &str = claim_next_sql!("attempt_delivery");

const FINALIZE_RETRY_TELEGRAM_INGEST: &str = finalize_failure_retry_sql!("attempt_telegram_ingest");
const FINALIZE_RETRY_NORMALIZE: &str = finalize_failure_retry_sql!("attempt_normalization");
const FINALIZE_RETRY_EVALUATE: &str = finalize_failure_retry_sql!("attempt_evaluation");
const FINALIZE_RETRY_DELIVER: &str = finalize_failure_retry_sql!("attempt_delivery");

const RECLAIM_RETRY_TELEGRAM_INGEST: &str = reclaim_retry_sql!("attempt_telegram_ingest");
const RECLAIM_RETRY_NORMALIZE: &str = reclaim_retry_sql!("attempt_normalization");
const RECLAIM_RETRY_EVALUATE: &str = reclaim_retry_sql!("attempt_evaluation");
const RECLAIM_RETRY_DELIVER: &str = reclaim_retry_sql!("attempt_delivery");

const RECLAIM_DEAD_TELEGRAM_INGEST: &str = reclaim_dead_letter_sql!("attempt_telegram_ingest");
const RECLAIM_DEAD_NORMALIZE: &str = reclaim_dead_letter_sql!("attempt_normalization");
const RECLAIM_DEAD_EVALUATE: &str = reclaim_dead_letter_sql!("attempt_evaluation");
const RECLAIM_DEAD_DELIVER: &str = reclaim_dead_letter_sql!("attempt_delivery");

const HEARTBEAT_CLAIM: &str = "UPDATE submissions
    SET lease_expires_at = $5, updated_at = $4
    WHERE public_id = $1
      AND status = $2
      AND claimed_by = $3
      AND lease_expires_at > $4";

const FINALIZE_SUCCESS: &str = "UPDATE submissions
    SET status = $4,
        claimed_by = NULL,
        claimed_at = NULL,
        lease_expires_at = NULL,
        last_error_code = NULL,
        last_error_message = NULL,
        updated_at = $5
    WHERE public_id = $1
      AND status = $2
      AND claimed_by = $3
      AND lease_expires_at > $5";

// The inner FOR UPDATE serializes terminal finalization against a concurrent
// reclaim pass; whichever commits first wins and the loser matches nothing.
const FINALIZE_FAILURE_TERMINAL: &str = "WITH target AS (
        SELECT id FROM submissions
        WHERE public_id = $1
          AND status = $2
          AND claimed_by = $3
        FOR UPDATE
    )
    UPDATE submissions
    SET status = $4,
        claimed_by = NULL,
        claimed_at = NULL,
        lease_expires_at = NULL,
        last_error_code = $5,
        last_error_message = $6,
        updated_at = $7
    FROM target
    WHERE submissions.id = target.id";

const TRANSITION_STATE: &str = "UPDATE submissions
    SET status = $3, updated_at = $4
    WHERE public_id = $1
      AND status = $2";

const LINK_ARTIFACT: &str = "INSERT INTO artifacts
        (submission_id, stage, bucket, object_key, schema_version, created_at)
    SELECT s.id, $2, $3, $4, $5, $6
    FROM submissions s
    WHERE s.public_id = $1";

const LATEST_ARTIFACT: &str = "SELECT a.bucket, a.object_key, a.schema_version
    FROM artifacts a
    JOIN submissions s ON s.id = a.submission_id
    WHERE s.public_id = $1 AND a.stage = $2
    ORDER BY a.created_at DESC, a.id DESC
    LIMIT 1";

const ARTIFACT_TRACE: &str = "SELECT a.id, a.submission_id, a.stage, a.bucket, a.object_key,
        a.schema_version, a.created_at
    FROM artifacts a
    JOIN submissions s ON s.id = a.submission_id
    WHERE s.public_id = $1
    ORDER BY a.created_at ASC, a.id ASC";

pub(crate) fn claim_statement(stage: Stage) -> &'static str {
    match stage {
        Stage::TelegramIngest => CLAIM_NEXT_TELEGRAM_INGEST,
        Stage::Normalize => CLAIM_NEXT_NORMALIZE,
        Stage::Evaluate => CLAIM_NEXT_EVALUATE,
        Stage::Deliver => CLAIM_NEXT_DELIVER,
    }
}

fn finalize_retry_statement(stage: Stage) -> &'static str {
    match stage {
        Stage::TelegramIngest => FINALIZE_RETRY_TELEGRAM_INGEST,
        Stage::Normalize => FINALIZE_RETRY_NORMALIZE,
        Stage::Evaluate => FINALIZE_RETRY_EVALUATE,
        Stage::Deliver => FINALIZE_RETRY_DELIVER,
    }
}

fn reclaim_retry_statement(stage: Stage) -> &'static str {
    match stage {
        Stage::TelegramIngest => RECLAIM_RETRY_TELEGRAM_INGEST,
        Stage::Normalize => RECLAIM_RETRY_NORMALIZE,
        Stage::Evaluate => RECLAIM_RETRY_EVALUATE,
        Stage::Deliver => RECLAIM_RETRY_DELIVER,
    }
}

fn reclaim_dead_letter_statement(stage: Stage) -> &'static str {
    match stage {
        Stage::TelegramIngest => RECLAIM_DEAD_TELEGRAM_INGEST,
        Stage::Normalize => RECLAIM_DEAD_NORMALIZE,
        Stage::Evaluate => RECLAIM_DEAD_EVALUATE,
        Stage::Deliver => RECLAIM_DEAD_DELIVER,
    }
}

/// Claim the oldest submission waiting in the stage's source state.
///
/// `FOR UPDATE SKIP LOCKED` keeps concurrent claimants from blocking on or
/// observing the same row: of N workers racing, exactly one gets the claim.
pub(crate) async fn claim_next(
    pool: &PgPool,
    stage: Stage,
    worker_id: &str,
    lease_seconds: u64,
) -> Result<Option<WorkClaim>, sqlx::Error> {
    let lifecycle = stage.lifecycle();
    let now = primitive_now_utc();
    let lease_expires_at = now + Duration::seconds(lease_seconds as i64);

    let row = sqlx::query_as::<_, (String, i32, PrimitiveDateTime)>(claim_statement(stage))
        .bind(lifecycle.source)
        .bind(lifecycle.in_progress)
        .bind(worker_id)
        .bind(now)
        .bind(lease_expires_at)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(public_id, attempt, lease_expires_at)| WorkClaim {
        public_id,
        stage,
        attempt: attempt + 1,
        lease_expires_at,
    }))
}

/// Extend the lease. `false` means the lease was lost (reclaimed, finalized,
/// or expired) and the holder must treat it as cancellation.
pub(crate) async fn heartbeat_claim(
    pool: &PgPool,
    public_id: &str,
    stage: Stage,
    worker_id: &str,
    lease_seconds: u64,
) -> Result<bool, sqlx::Error> {
    let now = primitive_now_utc();
    let lease_expires_at = now + Duration::seconds(lease_seconds as i64);

    let updated = sqlx::query(HEARTBEAT_CLAIM)
        .bind(public_id)
        .bind(stage.lifecycle().in_progress)
        .bind(worker_id)
        .bind(now)
        .bind(lease_expires_at)
        .execute(pool)
        .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn finalize_success(
    pool: &PgPool,
    public_id: &str,
    stage: Stage,
    worker_id: &str,
) -> Result<bool, sqlx::Error> {
    let lifecycle = stage.lifecycle();
    let updated = sqlx::query(FINALIZE_SUCCESS)
        .bind(public_id)
        .bind(lifecycle.in_progress)
        .bind(worker_id)
        .bind(lifecycle.success)
        .bind(primitive_now_utc())
        .execute(pool)
        .await?;

    Ok(updated.rows_affected() > 0)
}

/// Record a retryable failure: increment the stage attempt counter and park
/// the submission in the stage's failed state. `false` when the lease was
/// lost or the attempt budget is exhausted; the caller escalates to
/// [`finalize_failure_terminal`].
pub(crate) async fn finalize_failure_retry(
    pool: &PgPool,
    public_id: &str,
    stage: Stage,
    worker_id: &str,
    error_code: &str,
    error_message: &str,
    max_attempts: i32,
) -> Result<bool, sqlx::Error> {
    let lifecycle = stage.lifecycle();
    let updated = sqlx::query(finalize_retry_statement(stage))
        .bind(public_id)
        .bind(lifecycle.in_progress)
        .bind(worker_id)
        .bind(lifecycle.failed)
        .bind(error_code)
        .bind(error_message)
        .bind(max_attempts)
        .bind(primitive_now_utc())
        .execute(pool)
        .await?;

    Ok(updated.rows_affected() > 0)
}

/// Move a claim to `dead_letter`. Does not touch the attempt counter: the
/// attempt that brought us here is already accounted for.
pub(crate) async fn finalize_failure_terminal(
    pool: &PgPool,
    public_id: &str,
    stage: Stage,
    worker_id: &str,
    error_code: &str,
    error_message: &str,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(FINALIZE_FAILURE_TERMINAL)
        .bind(public_id)
        .bind(stage.lifecycle().in_progress)
        .bind(worker_id)
        .bind(SubmissionStatus::DeadLetter)
        .bind(error_code)
        .bind(error_message)
        .bind(primitive_now_utc())
        .execute(pool)
        .await?;

    Ok(updated.rows_affected() > 0)
}

/// Return expired claims with attempt budget left to the stage's failed
/// (retry) state. Returns the reclaimed public ids.
pub(crate) async fn reclaim_expired_retry(
    pool: &PgPool,
    stage: Stage,
    max_attempts: i32,
) -> Result<Vec<String>, sqlx::Error> {
    let lifecycle = stage.lifecycle();
    sqlx::query_scalar::<_, String>(reclaim_retry_statement(stage))
        .bind(lifecycle.in_progress)
        .bind(primitive_now_utc())
        .bind(max_attempts)
        .bind(RECLAIM_BATCH_LIMIT)
        .bind(lifecycle.failed)
        .bind(RECLAIM_ERROR_CODE)
        .bind(RECLAIM_RETRY_MESSAGE)
        .fetch_all(pool)
        .await
}

/// Dead-letter expired claims whose attempt budget is spent. Together with
/// [`reclaim_expired_retry`] this partitions the expired-claim set.
pub(crate) async fn reclaim_expired_dead_letter(
    pool: &PgPool,
    stage: Stage,
    max_attempts: i32,
) -> Result<Vec<String>, sqlx::Error> {
    let lifecycle = stage.lifecycle();
    sqlx::query_scalar::<_, String>(reclaim_dead_letter_statement(stage))
        .bind(lifecycle.in_progress)
        .bind(primitive_now_utc())
        .bind(max_attempts)
        .bind(RECLAIM_BATCH_LIMIT)
        .bind(SubmissionStatus::DeadLetter)
        .bind(RECLAIM_ERROR_CODE)
        .bind(RECLAIM_DEAD_MESSAGE)
        .fetch_all(pool)
        .await
}

/// Stage-agnostic guarded status edge; used by ingress and operator requeue.
pub(crate) async fn transition_state(
    pool: &PgPool,
    public_id: &str,
    from: SubmissionStatus,
    to: SubmissionStatus,
) -> Result<bool, TransitionError> {
    if from == to {
        return Ok(true);
    }
    if !is_legal_transition(from, to) {
        return Err(TransitionError::IllegalEdge { from: from.as_str(), to: to.as_str() });
    }

    let updated = sqlx::query(TRANSITION_STATE)
        .bind(public_id)
        .bind(from)
        .bind(to)
        .bind(primitive_now_utc())
        .execute(pool)
        .await?;

    Ok(updated.rows_affected() > 0)
}

/// Append-only artifact linkage. Duplicate rows are fine; reads take the
/// latest per stage.
pub(crate) async fn link_artifact(
    pool: &PgPool,
    public_id: &str,
    stage_tag: &str,
    bucket: &str,
    object_key: &str,
    schema_version: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(LINK_ARTIFACT)
        .bind(public_id)
        .bind(stage_tag)
        .bind(bucket)
        .bind(object_key)
        .bind(schema_version)
        .bind(primitive_now_utc())
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn latest_artifact(
    pool: &PgPool,
    public_id: &str,
    stage_tag: &str,
) -> Result<Option<ArtifactRef>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, String, Option<String>)>(LATEST_ARTIFACT)
        .bind(public_id)
        .bind(stage_tag)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(bucket, object_key, schema_version)| ArtifactRef {
        bucket,
        object_key,
        schema_version,
    }))
}

/// All artifact rows for a submission in creation order, for the status trace.
pub(crate) async fn artifact_trace(
    pool: &PgPool,
    public_id: &str,
) -> Result<Vec<Artifact>, sqlx::Error> {
    sqlx::query_as::<_, Artifact>(ARTIFACT_TRACE).bind(public_id).fetch_all(pool).await
}

#[cfg(test)]
mod tests;
