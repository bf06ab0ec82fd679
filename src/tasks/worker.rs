use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::sync::watch;

use crate::core::state::AppState;
use crate::domain::errors::ErrorKind;
use crate::domain::evaluation_chain::EvaluationChainSpec;
use crate::domain::lifecycle::Stage;
use crate::repositories::claims::{self, WorkClaim};
use crate::services::llm::LlmClient;
use crate::services::storage::StorageService;
use crate::services::telegram::TelegramClient;
use crate::tasks::handlers;

/// What a stage handler hands back to the loop.
#[derive(Debug, Clone)]
pub(crate) struct ProcessResult {
    pub(crate) success: bool,
    pub(crate) error_kind: Option<ErrorKind>,
    pub(crate) detail: String,
    pub(crate) artifact: Option<StageArtifact>,
}

#[derive(Debug, Clone)]
pub(crate) struct StageArtifact {
    pub(crate) object_key: String,
    pub(crate) schema_version: Option<String>,
}

impl ProcessResult {
    pub(crate) fn success(detail: impl Into<String>, artifact: Option<StageArtifact>) -> Self {
        Self { success: true, error_kind: None, detail: detail.into(), artifact }
    }

    pub(crate) fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { success: false, error_kind: Some(kind), detail: detail.into(), artifact: None }
    }
}

/// Everything a stage handler may touch. Handlers stay stateless; all state
/// lives behind these handles.
#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub(crate) state: AppState,
    pub(crate) storage: StorageService,
    pub(crate) telegram: Option<TelegramClient>,
    pub(crate) llm: Option<LlmClient>,
    pub(crate) chain: Option<Arc<EvaluationChainSpec>>,
}

impl WorkerDeps {
    pub(crate) fn db(&self) -> &PgPool {
        self.state.db()
    }
}

/// One stage's per-tick orchestrator: reclaim, claim, heartbeat, process,
/// link, finalize.
pub(crate) struct WorkerLoop {
    stage: Stage,
    worker_id: String,
    deps: WorkerDeps,
}

impl WorkerLoop {
    pub(crate) fn new(stage: Stage, worker_id: String, deps: WorkerDeps) -> Self {
        Self { stage, worker_id, deps }
    }

    pub(crate) fn stage(&self) -> Stage {
        self.stage
    }

    /// Returns whether the tick did work. An `Err` means infrastructure
    /// trouble: no submission state was changed and the runner backs off.
    pub(crate) async fn run_once(&self, shutdown: watch::Receiver<bool>) -> Result<bool> {
        let worker = self.deps.state.settings().worker().clone();
        let pool = self.deps.db();

        let reclaimed_retry =
            claims::reclaim_expired_retry(pool, self.stage, worker.max_attempts)
                .await
                .context("reclaim (retry) failed")?;
        let reclaimed_dead =
            claims::reclaim_expired_dead_letter(pool, self.stage, worker.max_attempts)
                .await
                .context("reclaim (dead-letter) failed")?;
        if !reclaimed_retry.is_empty() || !reclaimed_dead.is_empty() {
            tracing::warn!(
                stage = %self.stage,
                retried = reclaimed_retry.len(),
                dead_lettered = reclaimed_dead.len(),
                "reclaimed expired claims"
            );
            metrics::counter!("reclaims_total", "stage" => self.stage.as_str(), "outcome" => "retry")
                .increment(reclaimed_retry.len() as u64);
            metrics::counter!("reclaims_total", "stage" => self.stage.as_str(), "outcome" => "dead_letter")
                .increment(reclaimed_dead.len() as u64);
        }

        let Some(claim) =
            claims::claim_next(pool, self.stage, &self.worker_id, worker.claim_lease_seconds)
                .await
                .context("claim_next failed")?
        else {
            return Ok(false);
        };

        tracing::info!(
            submission_id = %claim.public_id,
            stage = %claim.stage,
            attempt = claim.attempt,
            worker_id = %self.worker_id,
            lease_expires_at = %crate::core::time::format_primitive(claim.lease_expires_at),
            "claimed submission"
        );
        metrics::counter!("stage_claims_total", "stage" => self.stage.as_str()).increment(1);

        let timer = std::time::Instant::now();

        // The heartbeat task owns the lease while the handler runs. Its stop
        // sender doubles as a guard: if this function bails out early the
        // dropped sender stops the task.
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);
        let heartbeat = tokio::spawn(heartbeat_loop(
            pool.clone(),
            claim.public_id.clone(),
            self.stage,
            self.worker_id.clone(),
            worker.claim_lease_seconds,
            worker.heartbeat_interval_ms,
            stop_rx,
            cancel_tx,
        ));

        // Hard ceiling on one tick; the heartbeat keeps the lease alive below
        // it, so a handler hitting this is stuck, not slow.
        let tick_deadline = Duration::from_secs(worker.claim_lease_seconds * 4);

        let result = tokio::select! {
            result = handlers::process(self.stage, &claim, &self.deps) => result,
            _ = flag_raised(cancel_rx.clone()) => {
                Ok(ProcessResult::failure(ErrorKind::Cancelled, "handler cancelled: lease lost"))
            }
            _ = flag_raised(shutdown.clone()) => {
                Ok(ProcessResult::failure(ErrorKind::Cancelled, "handler cancelled: shutting down"))
            }
            _ = tokio::time::sleep(tick_deadline) => {
                Ok(ProcessResult::failure(ErrorKind::Cancelled, "handler cancelled: tick deadline exceeded"))
            }
        };

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                // Infrastructure failure: leave the row to its lease and let
                // the runner back off.
                let _ = stop_tx.send(true);
                let _ = heartbeat.await;
                return Err(err);
            }
        };

        self.finalize(&claim, &result).await;

        let _ = stop_tx.send(true);
        let _ = heartbeat.await;

        metrics::histogram!("stage_duration_seconds", "stage" => self.stage.as_str())
            .record(timer.elapsed().as_secs_f64());

        Ok(true)
    }

    async fn finalize(&self, claim: &WorkClaim, result: &ProcessResult) {
        let pool = self.deps.db();
        let max_attempts = self.deps.state.settings().worker().max_attempts;

        // A negative business outcome is still the stage's successful result.
        let success =
            result.success || result.error_kind == Some(ErrorKind::PermanentBusiness);

        if success {
            if let Some(artifact) = &result.artifact {
                let linked = claims::link_artifact(
                    pool,
                    &claim.public_id,
                    self.stage.artifact_stage(),
                    self.deps.storage.bucket(),
                    &artifact.object_key,
                    artifact.schema_version.as_deref(),
                )
                .await;
                if let Err(err) = linked {
                    tracing::error!(
                        submission_id = %claim.public_id,
                        stage = %self.stage,
                        error = %err,
                        "failed to link artifact; abandoning claim to reclaim"
                    );
                    return;
                }
            }

            match claims::finalize_success(pool, &claim.public_id, self.stage, &self.worker_id)
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        submission_id = %claim.public_id,
                        stage = %self.stage,
                        "stage completed"
                    );
                    metrics::counter!("stage_success_total", "stage" => self.stage.as_str())
                        .increment(1);
                }
                Ok(false) => {
                    // Lease lost to a reclaimer; their outcome stands.
                    tracing::warn!(
                        submission_id = %claim.public_id,
                        stage = %self.stage,
                        "finalize_success_rejected"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        submission_id = %claim.public_id,
                        stage = %self.stage,
                        error = %err,
                        "finalize_success errored"
                    );
                }
            }
            return;
        }

        let kind = result.error_kind.unwrap_or(ErrorKind::RetryableTransient);
        let code = kind.as_str();
        metrics::counter!("stage_failures_total", "stage" => self.stage.as_str(), "kind" => code)
            .increment(1);

        if !kind.is_terminal() {
            match claims::finalize_failure_retry(
                pool,
                &claim.public_id,
                self.stage,
                &self.worker_id,
                code,
                &result.detail,
                max_attempts,
            )
            .await
            {
                Ok(true) => {
                    tracing::warn!(
                        submission_id = %claim.public_id,
                        stage = %self.stage,
                        error_code = code,
                        detail = %result.detail,
                        "stage failed; parked for retry"
                    );
                    return;
                }
                Ok(false) => {
                    // Either the budget is spent (fall through to terminal)
                    // or the lease was lost (terminal will also miss).
                }
                Err(err) => {
                    tracing::error!(
                        submission_id = %claim.public_id,
                        stage = %self.stage,
                        error = %err,
                        "finalize_failure_retry errored"
                    );
                    return;
                }
            }
        }

        match claims::finalize_failure_terminal(
            pool,
            &claim.public_id,
            self.stage,
            &self.worker_id,
            code,
            &result.detail,
        )
        .await
        {
            Ok(true) => {
                tracing::error!(
                    submission_id = %claim.public_id,
                    stage = %self.stage,
                    error_code = code,
                    detail = %result.detail,
                    "stage failed terminally; dead-lettered"
                );
                metrics::counter!("dead_letters_total", "stage" => self.stage.as_str())
                    .increment(1);
            }
            Ok(false) => {
                tracing::warn!(
                    submission_id = %claim.public_id,
                    stage = %self.stage,
                    "finalize_failure_rejected; lease lost"
                );
            }
            Err(err) => {
                tracing::error!(
                    submission_id = %claim.public_id,
                    stage = %self.stage,
                    error = %err,
                    "finalize_failure_terminal errored"
                );
            }
        }
    }
}

/// Resolves when the watched flag flips to true; pends forever otherwise.
async fn flag_raised(mut rx: watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[allow(clippy::too_many_arguments)]
async fn heartbeat_loop(
    pool: PgPool,
    public_id: String,
    stage: Stage,
    worker_id: String,
    lease_seconds: u64,
    interval_ms: u64,
    mut stop: watch::Receiver<bool>,
    cancel: watch::Sender<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    // The immediate first tick just renews the fresh lease; harmless.
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                match claims::heartbeat_claim(&pool, &public_id, stage, &worker_id, lease_seconds).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            submission_id = %public_id,
                            stage = %stage,
                            worker_id = %worker_id,
                            "lease_lost; cancelling handler"
                        );
                        metrics::counter!("lease_lost_total", "stage" => stage.as_str())
                            .increment(1);
                        let _ = cancel.send(true);
                        break;
                    }
                    Err(err) => {
                        // A failed heartbeat call is not a lost lease; the
                        // next tick retries until the lease itself expires.
                        tracing::warn!(
                            submission_id = %public_id,
                            stage = %stage,
                            error = %err,
                            "heartbeat errored; will retry"
                        );
                    }
                }
            }
        }
    }
}
