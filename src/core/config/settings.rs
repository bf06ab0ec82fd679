use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_environment, parse_i32, parse_positive_u64,
    parse_u16, parse_u64,
};
use super::types::{
    ArtifactSettings, ConfigError, CorsSettings, DatabaseSettings, LlmSettings, RuntimeSettings,
    S3Settings, ServerHost, ServerPort, ServerSettings, Settings, TelegramSettings,
    TelemetrySettings, WorkerSettings,
};
use crate::domain::artifacts::CompatPolicy;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADEFLOW_HOST", "0.0.0.0");
        let port = env_or_default("GRADEFLOW_PORT", "8000");

        let environment =
            parse_environment(env_optional("GRADEFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config = env_optional("GRADEFLOW_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let cors_origins = env_optional("GRADEFLOW_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradeflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradeflow_db");
        let database_url = env_optional("DATABASE_URL");

        let worker = WorkerSettings {
            poll_interval_ms: parse_positive_u64(
                "WORKER_POLL_INTERVAL_MS",
                env_or_default("WORKER_POLL_INTERVAL_MS", "200"),
                200,
            ),
            idle_backoff_ms: parse_positive_u64(
                "WORKER_IDLE_BACKOFF_MS",
                env_or_default("WORKER_IDLE_BACKOFF_MS", "1000"),
                1000,
            ),
            error_backoff_ms: parse_positive_u64(
                "WORKER_ERROR_BACKOFF_MS",
                env_or_default("WORKER_ERROR_BACKOFF_MS", "2000"),
                2000,
            ),
            claim_lease_seconds: parse_positive_u64(
                "WORKER_CLAIM_LEASE_SECONDS",
                env_or_default("WORKER_CLAIM_LEASE_SECONDS", "30"),
                30,
            ),
            heartbeat_interval_ms: parse_positive_u64(
                "WORKER_HEARTBEAT_INTERVAL_MS",
                env_or_default("WORKER_HEARTBEAT_INTERVAL_MS", "10000"),
                10000,
            ),
            max_attempts: parse_i32(
                "WORKER_MAX_ATTEMPTS",
                env_or_default("WORKER_MAX_ATTEMPTS", "3"),
            )?,
        };

        let llm = LlmSettings {
            provider: env_or_default("LLM_PROVIDER", "openai"),
            api_key: env_or_default("LLM_API_KEY", ""),
            base_url: env_or_default("LLM_BASE_URL", "https://api.openai.com/v1"),
            request_timeout_seconds: parse_u64(
                "LLM_REQUEST_TIMEOUT",
                env_or_default("LLM_REQUEST_TIMEOUT", "120"),
            )?,
            chain_spec_path: env_or_default(
                "LLM_CHAIN_SPEC_PATH",
                "chains/assignment_review_v1.yaml",
            ),
        };

        let telegram = TelegramSettings {
            bot_token: env_or_default("TELEGRAM_BOT_TOKEN", ""),
            api_base: env_or_default("TELEGRAM_API_BASE", "https://api.telegram.org"),
        };

        let s3 = S3Settings {
            endpoint: env_or_default("S3_ENDPOINT", "http://localhost:9000"),
            access_key: env_or_default("S3_ACCESS_KEY", ""),
            secret_key: env_or_default("S3_SECRET_KEY", ""),
            bucket: env_or_default("S3_BUCKET", "gradeflow-artifacts"),
            region: env_or_default("S3_REGION", "us-east-1"),
        };

        let compat_policy_raw = env_or_default("ARTIFACT_COMPAT_POLICY", "strict");
        let compat_policy = CompatPolicy::parse(&compat_policy_raw).ok_or(
            ConfigError::InvalidValue {
                field: "ARTIFACT_COMPAT_POLICY",
                value: compat_policy_raw,
            },
        )?;

        let log_level = env_or_default("GRADEFLOW_LOG_LEVEL", "info");
        let json = env_optional("GRADEFLOW_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled = env_optional("PROMETHEUS_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            worker,
            llm,
            telegram,
            s3,
            artifact: ArtifactSettings { compat_policy },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn with_server_port(mut self, port: u16) -> Self {
        self.server.port = ServerPort(port);
        self
    }

    pub(crate) fn with_server_host(mut self, host: String) -> Self {
        self.server.host = ServerHost(host);
        self
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn worker(&self) -> &WorkerSettings {
        &self.worker
    }

    pub(crate) fn llm(&self) -> &LlmSettings {
        &self.llm
    }

    pub(crate) fn telegram(&self) -> &TelegramSettings {
        &self.telegram
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn artifact(&self) -> &ArtifactSettings {
        &self.artifact
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.max_attempts < 1 {
            return Err(ConfigError::InvalidValue {
                field: "WORKER_MAX_ATTEMPTS",
                value: self.worker.max_attempts.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.llm.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("LLM_API_KEY"));
        }
        if self.telegram.bot_token.is_empty() {
            return Err(ConfigError::MissingSecret("TELEGRAM_BOT_TOKEN"));
        }
        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn set_base_env() {
        std::env::set_var("GRADEFLOW_ENV", "test");
        std::env::set_var("GRADEFLOW_STRICT_CONFIG", "0");
        test_support::clear_worker_env();
    }

    #[test]
    fn defaults_match_the_operational_contract() {
        let _guard = test_support::env_lock();
        set_base_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.worker().poll_interval_ms, 200);
        assert_eq!(settings.worker().idle_backoff_ms, 1000);
        assert_eq!(settings.worker().error_backoff_ms, 2000);
        assert_eq!(settings.worker().claim_lease_seconds, 30);
        assert_eq!(settings.worker().heartbeat_interval_ms, 10000);
        assert_eq!(settings.worker().max_attempts, 3);
        assert_eq!(settings.artifact().compat_policy, CompatPolicy::Strict);
    }

    #[test]
    fn worker_env_overrides_apply() {
        let _guard = test_support::env_lock();
        set_base_env();
        std::env::set_var("WORKER_POLL_INTERVAL_MS", "50");
        std::env::set_var("WORKER_CLAIM_LEASE_SECONDS", "5");
        std::env::set_var("WORKER_MAX_ATTEMPTS", "7");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.worker().poll_interval_ms, 50);
        assert_eq!(settings.worker().claim_lease_seconds, 5);
        assert_eq!(settings.worker().max_attempts, 7);

        test_support::clear_worker_env();
    }

    #[test]
    fn zero_intervals_fall_back_to_defaults() {
        let _guard = test_support::env_lock();
        set_base_env();
        std::env::set_var("WORKER_IDLE_BACKOFF_MS", "0");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.worker().idle_backoff_ms, 1000);

        test_support::clear_worker_env();
    }

    #[test]
    fn unknown_compat_policy_is_rejected() {
        let _guard = test_support::env_lock();
        set_base_env();
        std::env::set_var("ARTIFACT_COMPAT_POLICY", "lenient");

        let err = Settings::load().expect_err("must reject");
        assert!(matches!(err, ConfigError::InvalidValue { field, .. }
            if field == "ARTIFACT_COMPAT_POLICY"));

        std::env::remove_var("ARTIFACT_COMPAT_POLICY");
    }
}
