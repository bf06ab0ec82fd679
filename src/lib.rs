pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod domain;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use tokio::sync::watch;

use crate::core::roles::RuntimeRole;
use crate::core::{config::Settings, telemetry};
use crate::services::storage::StorageService;

pub fn supported_roles() -> &'static [&'static str] {
    &core::roles::SUPPORTED_ROLES
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub role: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dry_run_startup: bool,
}

pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let role = RuntimeRole::parse(&options.role)
        .ok_or_else(|| anyhow::anyhow!("unsupported role: {}", options.role))?;

    let mut settings = Settings::load()?;
    if let Some(host) = options.host {
        settings = settings.with_server_host(host);
    }
    if let Some(port) = options.port {
        settings = settings.with_server_port(port);
    }

    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let worker = settings.worker();
    if 3 * worker.heartbeat_interval_ms >= worker.claim_lease_seconds * 1000 {
        tracing::warn!(
            heartbeat_interval_ms = worker.heartbeat_interval_ms,
            claim_lease_seconds = worker.claim_lease_seconds,
            "heartbeat interval leaves no slack: one missed heartbeat may lose the lease"
        );
    }

    if options.dry_run_startup {
        core::bootstrap::validate_wiring(role, &settings)?;
        tracing::info!(role = role.as_str(), "dry-run startup complete");
        return Ok(());
    }

    let db = db::init_pool(&settings).await?;
    db::run_migrations(&db).await?;

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("S3 credentials absent; artifact storage disabled");
    }

    let container =
        core::bootstrap::build_runtime(role, settings, db, storage).await?;
    let state = container.state.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_task = container.worker.map(|(worker_loop, runtime)| {
        tokio::spawn(tasks::runner::run(
            worker_loop,
            state.settings().worker().clone(),
            runtime,
            shutdown_rx.clone(),
        ))
    });

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        role = role.as_str(),
        environment = %state.settings().runtime().environment.as_str(),
        artifact_compat_policy = state.settings().artifact().compat_policy.as_str(),
        "Gradeflow listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal())
        .await;

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown to worker loop");
    }
    if let Some(task) = worker_task {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "Worker task join failed");
        }
    }

    result?;

    Ok(())
}
