use super::*;
use crate::db::types::SubmissionStatus as S;
use crate::test_support;

const MAX_ATTEMPTS: i32 = 3;

#[test]
fn each_claim_statement_names_only_its_stage_column() {
    let columns = [
        "attempt_telegram_ingest",
        "attempt_normalization",
        "attempt_evaluation",
        "attempt_delivery",
    ];
    for (stage, column) in Stage::ALL.into_iter().zip(columns) {
        let sql = claim_statement(stage);
        assert!(sql.contains(column), "{stage} claim must return {column}");
        for other in columns.iter().filter(|name| **name != column) {
            assert!(!sql.contains(other), "{stage} claim must not touch {other}");
        }
    }
}

#[test]
fn claim_statement_uses_skip_locked() {
    for stage in Stage::ALL {
        assert!(claim_statement(stage).contains("FOR UPDATE SKIP LOCKED"));
    }
}

#[test]
fn reclaim_statements_partition_on_the_attempt_budget() {
    for stage in Stage::ALL {
        assert!(reclaim_retry_statement(stage).contains("+ 1 < $3"));
        assert!(reclaim_dead_letter_statement(stage).contains("+ 1 >= $3"));
    }
}

#[test]
fn finalize_retry_guards_on_lease_owner_and_budget() {
    for stage in Stage::ALL {
        let sql = finalize_retry_statement(stage);
        assert!(sql.contains("claimed_by = $3"));
        assert!(sql.contains("lease_expires_at > $8"));
        assert!(sql.contains("+ 1 < $7"));
    }
}

#[test]
fn terminal_statement_takes_a_row_lock() {
    assert!(FINALIZE_FAILURE_TERMINAL.contains("FOR UPDATE"));
    assert!(!FINALIZE_FAILURE_TERMINAL.contains("attempt_"));
}

#[tokio::test]
async fn claim_next_takes_the_oldest_waiting_submission() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    let first = test_support::seed_submission(pool, S::Uploaded).await;
    let _second = test_support::seed_submission(pool, S::Uploaded).await;

    let claim = claim_next(pool, Stage::Normalize, "worker-a", 30)
        .await
        .expect("claim")
        .expect("a submission is waiting");

    assert_eq!(claim.public_id, first);
    assert_eq!(claim.attempt, 1);

    let row = test_support::fetch_submission(pool, &first).await;
    assert_eq!(row.status, S::NormalizationInProgress);
    assert_eq!(row.claimed_by.as_deref(), Some("worker-a"));
    assert!(row.claimed_at.is_some());
    assert!(row.lease_expires_at.is_some());
    assert_eq!(row.attempt_normalization, 0);
}

#[tokio::test]
async fn claim_next_ignores_other_and_terminal_states() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    test_support::seed_submission(pool, S::Delivered).await;
    test_support::seed_submission(pool, S::DeadLetter).await;
    test_support::seed_submission(pool, S::Normalized).await;

    let claim = claim_next(pool, Stage::Normalize, "worker-a", 30).await.expect("claim");
    assert!(claim.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_claimants_one_winner() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    test_support::seed_submission(pool, S::Uploaded).await;

    let mut handles = Vec::new();
    for worker in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            claim_next(&pool, Stage::Normalize, &format!("worker-{worker}"), 30).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("join").expect("claim").is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
}

#[tokio::test]
async fn heartbeat_extends_only_the_owners_live_lease() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    let id = test_support::seed_submission(pool, S::Uploaded).await;
    let claim = claim_next(pool, Stage::Normalize, "worker-a", 30)
        .await
        .expect("claim")
        .expect("claimed");

    assert!(heartbeat_claim(pool, &id, Stage::Normalize, "worker-a", 60).await.expect("hb"));
    let row = test_support::fetch_submission(pool, &id).await;
    assert!(row.lease_expires_at.expect("lease") > claim.lease_expires_at);

    // Not the owner.
    assert!(!heartbeat_claim(pool, &id, Stage::Normalize, "worker-b", 60).await.expect("hb"));

    // Expired lease cannot be revived.
    test_support::force_lease(pool, &id, S::NormalizationInProgress, "worker-a", -5).await;
    assert!(!heartbeat_claim(pool, &id, Stage::Normalize, "worker-a", 60).await.expect("hb"));
}

#[tokio::test]
async fn finalize_success_advances_and_clears_lease_and_errors() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    let id = test_support::seed_submission(pool, S::Uploaded).await;
    sqlx::query(
        "UPDATE submissions SET last_error_code = 'retryable_transient',
         last_error_message = 'earlier failure' WHERE public_id = $1",
    )
    .bind(&id)
    .execute(pool)
    .await
    .expect("seed error fields");

    claim_next(pool, Stage::Normalize, "worker-a", 30).await.expect("claim").expect("claimed");
    assert!(finalize_success(pool, &id, Stage::Normalize, "worker-a").await.expect("finalize"));

    let row = test_support::fetch_submission(pool, &id).await;
    assert_eq!(row.status, S::Normalized);
    assert!(row.claimed_by.is_none());
    assert!(row.claimed_at.is_none());
    assert!(row.lease_expires_at.is_none());
    assert!(row.last_error_code.is_none());
    assert!(row.last_error_message.is_none());
}

#[tokio::test]
async fn crash_recovery_reclaims_expired_claim_into_retry_pool() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    let id = test_support::seed_submission(pool, S::Uploaded).await;
    claim_next(pool, Stage::Normalize, "worker-a", 30).await.expect("claim").expect("claimed");
    // The worker dies; its lease runs out.
    test_support::force_lease(pool, &id, S::NormalizationInProgress, "worker-a", -2).await;

    let reclaimed =
        reclaim_expired_retry(pool, Stage::Normalize, MAX_ATTEMPTS).await.expect("reclaim");
    assert_eq!(reclaimed, vec![id.clone()]);

    let row = test_support::fetch_submission(pool, &id).await;
    assert_eq!(row.status, S::FailedNormalization);
    assert_eq!(row.attempt_normalization, 1);
    assert!(row.claimed_by.is_none());
    assert_eq!(row.last_error_code.as_deref(), Some(RECLAIM_ERROR_CODE));
}

#[tokio::test]
async fn loser_of_a_reclaim_race_cannot_finalize() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    let id = test_support::seed_submission(pool, S::Uploaded).await;
    claim_next(pool, Stage::Normalize, "worker-a", 30).await.expect("claim").expect("claimed");
    test_support::force_lease(pool, &id, S::NormalizationInProgress, "worker-a", -2).await;
    reclaim_expired_retry(pool, Stage::Normalize, MAX_ATTEMPTS).await.expect("reclaim");

    // Worker A comes back from the dead and tries to commit its result.
    assert!(!finalize_success(pool, &id, Stage::Normalize, "worker-a").await.expect("finalize"));
    assert!(
        !finalize_failure_retry(
            pool,
            &id,
            Stage::Normalize,
            "worker-a",
            "retryable_transient",
            "late failure",
            MAX_ATTEMPTS,
        )
        .await
        .expect("finalize")
    );

    // The reclaimer's outcome stands.
    let row = test_support::fetch_submission(pool, &id).await;
    assert_eq!(row.status, S::FailedNormalization);
    assert_eq!(row.attempt_normalization, 1);
}

#[tokio::test]
async fn expired_claims_partition_between_retry_and_dead_letter() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();

    let fresh = test_support::seed_submission(pool, S::Uploaded).await;
    let spent = test_support::seed_submission(pool, S::Uploaded).await;
    test_support::force_lease(pool, &fresh, S::NormalizationInProgress, "worker-a", -2).await;
    test_support::force_lease(pool, &spent, S::NormalizationInProgress, "worker-b", -2).await;
    test_support::set_attempt(pool, &spent, "attempt_normalization", MAX_ATTEMPTS - 1).await;

    let retried =
        reclaim_expired_retry(pool, Stage::Normalize, MAX_ATTEMPTS).await.expect("reclaim");
    let dead =
        reclaim_expired_dead_letter(pool, Stage::Normalize, MAX_ATTEMPTS).await.expect("reclaim");

    assert_eq!(retried, vec![fresh.clone()]);
    assert_eq!(dead, vec![spent.clone()]);

    let fresh_row = test_support::fetch_submission(pool, &fresh).await;
    assert_eq!(fresh_row.status, S::FailedNormalization);
    assert_eq!(fresh_row.attempt_normalization, 1);

    let spent_row = test_support::fetch_submission(pool, &spent).await;
    assert_eq!(spent_row.status, S::DeadLetter);
    assert_eq!(spent_row.attempt_normalization, MAX_ATTEMPTS);

    // A second pass finds nothing; both reclaims are idempotent.
    assert!(reclaim_expired_retry(pool, Stage::Normalize, MAX_ATTEMPTS)
        .await
        .expect("reclaim")
        .is_empty());
    assert!(reclaim_expired_dead_letter(pool, Stage::Normalize, MAX_ATTEMPTS)
        .await
        .expect("reclaim")
        .is_empty());
}

#[tokio::test]
async fn attempts_exhaust_into_dead_letter_after_three_failed_cycles() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let id = test_support::seed_submission(pool, S::Uploaded).await;

    // Cycles 1 and 2: claim, fail, operator requeue.
    for expected_attempt in 1..=2 {
        claim_next(pool, Stage::Normalize, "worker-a", 30)
            .await
            .expect("claim")
            .expect("claimed");
        assert!(finalize_failure_retry(
            pool,
            &id,
            Stage::Normalize,
            "worker-a",
            "retryable_transient",
            "upstream timed out",
            MAX_ATTEMPTS,
        )
        .await
        .expect("finalize"));

        let row = test_support::fetch_submission(pool, &id).await;
        assert_eq!(row.status, S::FailedNormalization);
        assert_eq!(row.attempt_normalization, expected_attempt);
        assert_eq!(row.last_error_code.as_deref(), Some("retryable_transient"));

        assert!(transition_state(pool, &id, S::FailedNormalization, S::Uploaded)
            .await
            .expect("requeue"));
    }

    // Cycle 3: the budget check rejects the retry; terminal takes over.
    claim_next(pool, Stage::Normalize, "worker-a", 30).await.expect("claim").expect("claimed");
    assert!(!finalize_failure_retry(
        pool,
        &id,
        Stage::Normalize,
        "worker-a",
        "retryable_transient",
        "upstream timed out",
        MAX_ATTEMPTS,
    )
    .await
    .expect("finalize"));
    assert!(finalize_failure_terminal(
        pool,
        &id,
        Stage::Normalize,
        "worker-a",
        "retryable_transient",
        "upstream timed out",
    )
    .await
    .expect("finalize"));

    let row = test_support::fetch_submission(pool, &id).await;
    assert_eq!(row.status, S::DeadLetter);
    assert_eq!(row.last_error_code.as_deref(), Some("retryable_transient"));
    // Terminal finalization does not touch the counter.
    assert_eq!(row.attempt_normalization, 2);

    // Dead-lettered submissions are never claimed again.
    assert!(claim_next(pool, Stage::Normalize, "worker-a", 30)
        .await
        .expect("claim")
        .is_none());
}

#[tokio::test]
async fn transition_state_rejects_illegal_edges_and_stale_sources() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let id = test_support::seed_submission(pool, S::Uploaded).await;

    let err = transition_state(pool, &id, S::Uploaded, S::Evaluated).await.unwrap_err();
    assert!(matches!(err, TransitionError::IllegalEdge { .. }));

    // Legal edge, wrong current status.
    assert!(!transition_state(pool, &id, S::Normalized, S::EvaluationInProgress)
        .await
        .expect("transition"));

    // Legal edge, matching status.
    assert!(transition_state(pool, &id, S::Uploaded, S::NormalizationInProgress)
        .await
        .expect("transition"));
    let row = test_support::fetch_submission(pool, &id).await;
    assert_eq!(row.status, S::NormalizationInProgress);
}

#[tokio::test]
async fn artifact_linkage_is_append_only_with_latest_wins_reads() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let id = test_support::seed_submission(pool, S::Uploaded).await;

    link_artifact(pool, &id, "normalized", "artifacts", "normalized/v1.json", Some("normalized:v1"))
        .await
        .expect("link");
    link_artifact(pool, &id, "normalized", "artifacts", "normalized/v2.json", Some("normalized:v1"))
        .await
        .expect("link");
    link_artifact(pool, &id, "raw", "artifacts", "raw/file.md", None).await.expect("link");

    let latest = latest_artifact(pool, &id, "normalized")
        .await
        .expect("latest")
        .expect("artifact present");
    assert_eq!(latest.object_key, "normalized/v2.json");
    assert_eq!(latest.schema_version.as_deref(), Some("normalized:v1"));

    let trace = artifact_trace(pool, &id).await.expect("trace");
    assert_eq!(trace.len(), 3);

    assert!(latest_artifact(pool, &id, "evaluation").await.expect("latest").is_none());
}
