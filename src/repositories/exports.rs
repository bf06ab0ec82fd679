use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::Export;

pub(crate) async fn insert(
    pool: &PgPool,
    public_id: &str,
    bucket: &str,
    object_key: &str,
    row_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exports (public_id, bucket, object_key, row_count, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(public_id)
    .bind(bucket)
    .bind(object_key)
    .bind(row_count)
    .bind(primitive_now_utc())
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn find_by_public_id(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<Export>, sqlx::Error> {
    sqlx::query_as::<_, Export>(
        "SELECT id, public_id, bucket, object_key, row_count, created_at
         FROM exports WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await
}
