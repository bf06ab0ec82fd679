use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::Assignment;
use crate::domain::ids::new_assignment_public_id;
use crate::repositories::is_unique_violation;

const PUBLIC_ID_MINT_RETRIES: usize = 5;

pub(crate) async fn create(
    pool: &PgPool,
    title: &str,
    description: &str,
    is_active: bool,
) -> Result<Assignment, sqlx::Error> {
    let now = primitive_now_utc();
    for _ in 0..PUBLIC_ID_MINT_RETRIES {
        let public_id = new_assignment_public_id();
        let result = sqlx::query_as::<_, Assignment>(
            "INSERT INTO assignments (public_id, title, description, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, public_id, title, description, is_active, created_at",
        )
        .bind(&public_id)
        .bind(title)
        .bind(description)
        .bind(is_active)
        .bind(now)
        .fetch_one(pool)
        .await;

        match result {
            Ok(assignment) => return Ok(assignment),
            Err(err) if is_unique_violation(&err) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(sqlx::Error::Protocol("failed to allocate unique assignment public id".into()))
}

pub(crate) async fn list(
    pool: &PgPool,
    active_only: bool,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(
        "SELECT id, public_id, title, description, is_active, created_at
         FROM assignments
         WHERE is_active OR NOT $1
         ORDER BY created_at, id",
    )
    .bind(active_only)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_public_id(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(
        "SELECT id, public_id, title, description, is_active, created_at
         FROM assignments WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await
}
