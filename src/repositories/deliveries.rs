use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::types::DeliveryStatus;

pub(crate) async fn insert(
    pool: &PgPool,
    submission_public_id: &str,
    channel: &str,
    status: DeliveryStatus,
    external_message_id: Option<&str>,
    attempts: i32,
    last_error_code: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO deliveries
            (submission_id, channel, status, external_message_id, attempts,
             last_error_code, created_at)
         SELECT s.id, $2, $3, $4, $5, $6, $7
         FROM submissions s
         WHERE s.public_id = $1",
    )
    .bind(submission_public_id)
    .bind(channel)
    .bind(status.as_str())
    .bind(external_message_id)
    .bind(attempts)
    .bind(last_error_code)
    .bind(primitive_now_utc())
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn exists_for_submission(
    pool: &PgPool,
    submission_public_id: &str,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query_scalar::<_, i64>(
        "SELECT d.id
         FROM deliveries d
         JOIN submissions s ON s.id = d.submission_id
         WHERE s.public_id = $1 AND d.status = 'sent'
         LIMIT 1",
    )
    .bind(submission_public_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}
