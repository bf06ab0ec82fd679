use sqlx::types::Json;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::Candidate;
use crate::domain::ids::new_candidate_public_id;
use crate::repositories::is_unique_violation;

const PUBLIC_ID_MINT_RETRIES: usize = 5;

pub(crate) async fn create(
    pool: &PgPool,
    first_name: &str,
    last_name: &str,
) -> Result<Candidate, sqlx::Error> {
    let now = primitive_now_utc();
    for _ in 0..PUBLIC_ID_MINT_RETRIES {
        let public_id = new_candidate_public_id();
        let result = sqlx::query_as::<_, Candidate>(
            "INSERT INTO candidates (public_id, first_name, last_name, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, public_id, first_name, last_name, created_at",
        )
        .bind(&public_id)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .fetch_one(pool)
        .await;

        match result {
            Ok(candidate) => return Ok(candidate),
            Err(err) if is_unique_violation(&err) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(sqlx::Error::Protocol("failed to allocate unique candidate public id".into()))
}

/// Resolve or create a candidate from an external identity. Re-posted
/// identities always map to the same candidate row.
pub(crate) async fn get_or_create_by_source(
    pool: &PgPool,
    source_type: &str,
    source_external_id: &str,
    first_name: &str,
    last_name: &str,
    metadata: serde_json::Value,
) -> Result<Candidate, sqlx::Error> {
    let mut tx = pool.begin().await?;

    if let Some(existing) = find_by_source(&mut tx, source_type, source_external_id).await? {
        tx.commit().await?;
        return Ok(existing);
    }

    let now = primitive_now_utc();
    let mut created: Option<Candidate> = None;
    for _ in 0..PUBLIC_ID_MINT_RETRIES {
        let public_id = new_candidate_public_id();
        let result = sqlx::query_as::<_, Candidate>(
            "INSERT INTO candidates (public_id, first_name, last_name, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, public_id, first_name, last_name, created_at",
        )
        .bind(&public_id)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        match result {
            Ok(candidate) => {
                created = Some(candidate);
                break;
            }
            Err(err) if is_unique_violation(&err) => continue,
            Err(err) => return Err(err),
        }
    }
    let Some(candidate) = created else {
        return Err(sqlx::Error::Protocol("failed to allocate unique candidate public id".into()));
    };

    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO candidate_sources
            (candidate_id, source_type, source_external_id, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (source_type, source_external_id) DO NOTHING
         RETURNING id",
    )
    .bind(candidate.id)
    .bind(source_type)
    .bind(source_external_id)
    .bind(Json(metadata))
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    if inserted.is_none() {
        // Lost the race; the winner's candidate is the canonical one.
        let existing = find_by_source(&mut tx, source_type, source_external_id).await?;
        tx.commit().await?;
        return existing.ok_or_else(|| {
            sqlx::Error::Protocol("candidate source conflict without existing row".into())
        });
    }

    tx.commit().await?;
    Ok(candidate)
}

async fn find_by_source(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    source_type: &str,
    source_external_id: &str,
) -> Result<Option<Candidate>, sqlx::Error> {
    sqlx::query_as::<_, Candidate>(
        "SELECT c.id, c.public_id, c.first_name, c.last_name, c.created_at
         FROM candidates c
         JOIN candidate_sources cs ON cs.candidate_id = c.id
         WHERE cs.source_type = $1 AND cs.source_external_id = $2",
    )
    .bind(source_type)
    .bind(source_external_id)
    .fetch_optional(&mut **tx)
    .await
}

pub(crate) async fn find_by_public_id(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<Candidate>, sqlx::Error> {
    sqlx::query_as::<_, Candidate>(
        "SELECT id, public_id, first_name, last_name, created_at
         FROM candidates WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await
}
