pub(crate) mod assignments;
pub(crate) mod candidates;
pub(crate) mod claims;
pub(crate) mod deliveries;
pub(crate) mod evaluations;
pub(crate) mod exports;
pub(crate) mod llm_runs;
pub(crate) mod submissions;

/// Postgres unique-violation SQLSTATE, used by the public-id retry loops and
/// idempotent source upserts.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
