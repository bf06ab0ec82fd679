use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::storage::StorageService;
use crate::tasks::runner::WorkerRuntimeState;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    role: String,
    settings: Settings,
    db: PgPool,
    storage: Option<StorageService>,
    worker_runtime: Option<Arc<WorkerRuntimeState>>,
}

impl AppState {
    pub(crate) fn new(
        role: String,
        settings: Settings,
        db: PgPool,
        storage: Option<StorageService>,
        worker_runtime: Option<Arc<WorkerRuntimeState>>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { role, settings, db, storage, worker_runtime }) }
    }

    pub(crate) fn role(&self) -> &str {
        &self.inner.role
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn worker_runtime(&self) -> Option<&Arc<WorkerRuntimeState>> {
        self.inner.worker_runtime.as_ref()
    }
}
