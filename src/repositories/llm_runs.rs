use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::LlmRun;

/// One audit row per model invocation; never updated.
#[derive(Debug, Clone)]
pub(crate) struct LlmRunInsert {
    pub(crate) provider: String,
    pub(crate) model: String,
    pub(crate) api_base: String,
    pub(crate) chain_version: String,
    pub(crate) spec_version: String,
    pub(crate) response_language: String,
    pub(crate) temperature: f64,
    pub(crate) seed: Option<i64>,
    pub(crate) tokens_input: i64,
    pub(crate) tokens_output: i64,
    pub(crate) latency_ms: i64,
}

pub(crate) async fn insert(
    pool: &PgPool,
    submission_public_id: &str,
    params: LlmRunInsert,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO llm_runs
            (submission_id, provider, model, api_base, chain_version, spec_version,
             response_language, temperature, seed, tokens_input, tokens_output,
             latency_ms, created_at)
         SELECT s.id, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
         FROM submissions s
         WHERE s.public_id = $1",
    )
    .bind(submission_public_id)
    .bind(&params.provider)
    .bind(&params.model)
    .bind(&params.api_base)
    .bind(&params.chain_version)
    .bind(&params.spec_version)
    .bind(&params.response_language)
    .bind(params.temperature)
    .bind(params.seed)
    .bind(params.tokens_input)
    .bind(params.tokens_output)
    .bind(params.latency_ms)
    .bind(primitive_now_utc())
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn latest(
    pool: &PgPool,
    submission_public_id: &str,
) -> Result<Option<LlmRun>, sqlx::Error> {
    sqlx::query_as::<_, LlmRun>(
        "SELECT lr.id, lr.submission_id, lr.provider, lr.model, lr.api_base,
                lr.chain_version, lr.spec_version, lr.response_language, lr.temperature,
                lr.seed, lr.tokens_input, lr.tokens_output, lr.latency_ms, lr.created_at
         FROM llm_runs lr
         JOIN submissions s ON s.id = lr.submission_id
         WHERE s.public_id = $1
         ORDER BY lr.created_at DESC, lr.id DESC
         LIMIT 1",
    )
    .bind(submission_public_id)
    .fetch_optional(pool)
    .await
}
