use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::roles::RuntimeRole;
use crate::core::state::AppState;
use crate::domain::evaluation_chain::EvaluationChainSpec;
use crate::domain::lifecycle::Stage;
use crate::services::llm::LlmClient;
use crate::services::storage::StorageService;
use crate::services::telegram::TelegramClient;
use crate::tasks::runner::WorkerRuntimeState;
use crate::tasks::worker::{WorkerDeps, WorkerLoop};

pub(crate) struct RuntimeContainer {
    pub(crate) state: AppState,
    pub(crate) worker: Option<(WorkerLoop, Arc<WorkerRuntimeState>)>,
}

/// Wire concrete clients into the role. Worker roles get a claim loop; the
/// api role only serves HTTP.
pub(crate) async fn build_runtime(
    role: RuntimeRole,
    settings: Settings,
    db: PgPool,
    storage: Option<StorageService>,
) -> anyhow::Result<RuntimeContainer> {
    let Some(stage) = role.stage() else {
        let state = AppState::new(role.as_str().to_string(), settings, db, storage, None);
        return Ok(RuntimeContainer { state, worker: None });
    };

    let worker_storage = storage
        .clone()
        .context("worker roles require S3 storage configuration (S3_ACCESS_KEY/S3_SECRET_KEY)")?;

    let telegram = TelegramClient::from_settings(&settings)?;
    if stage == Stage::TelegramIngest && telegram.is_none() {
        bail!("worker-ingest-telegram requires TELEGRAM_BOT_TOKEN");
    }

    let (llm, chain) = if stage == Stage::Evaluate {
        let chain =
            EvaluationChainSpec::load(Path::new(&settings.llm().chain_spec_path))
                .context("failed to load evaluation chain spec")?;
        (Some(LlmClient::from_settings(&settings)?), Some(Arc::new(chain)))
    } else {
        (None, None)
    };

    let runtime = Arc::new(WorkerRuntimeState::default());
    let state = AppState::new(
        role.as_str().to_string(),
        settings,
        db,
        storage,
        Some(runtime.clone()),
    );

    let deps = WorkerDeps {
        state: state.clone(),
        storage: worker_storage,
        telegram,
        llm,
        chain,
    };

    let worker_id = format!("{}-{}", role.as_str(), Uuid::new_v4());
    let worker_loop = WorkerLoop::new(stage, worker_id, deps);

    Ok(RuntimeContainer { state, worker: Some((worker_loop, runtime)) })
}

/// Validate configuration and wiring without touching the network or the
/// database. Backs `--dry-run-startup`.
pub(crate) fn validate_wiring(role: RuntimeRole, settings: &Settings) -> anyhow::Result<()> {
    let Some(stage) = role.stage() else {
        return Ok(());
    };

    if settings.s3().access_key.is_empty() || settings.s3().secret_key.is_empty() {
        bail!("role {} requires S3_ACCESS_KEY/S3_SECRET_KEY", role.as_str());
    }

    if stage == Stage::TelegramIngest && settings.telegram().bot_token.is_empty() {
        bail!("role {} requires TELEGRAM_BOT_TOKEN", role.as_str());
    }

    if stage == Stage::Evaluate {
        EvaluationChainSpec::load(Path::new(&settings.llm().chain_spec_path))
            .context("failed to load evaluation chain spec")?;
        if settings.llm().api_key.is_empty() {
            bail!("role {} requires LLM_API_KEY", role.as_str());
        }
    }

    Ok(())
}
