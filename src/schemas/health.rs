use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
    pub(crate) role: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReadyResponse {
    pub(crate) status: String,
    pub(crate) role: String,
    pub(crate) worker_loop_enabled: bool,
    pub(crate) worker_loop_ready: bool,
    pub(crate) worker_metrics: WorkerMetrics,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct WorkerMetrics {
    pub(crate) started: bool,
    pub(crate) stopped: bool,
    pub(crate) ticks_total: u64,
    pub(crate) claims_total: u64,
    pub(crate) idle_ticks_total: u64,
    pub(crate) errors_total: u64,
}
