use crate::domain::lifecycle::Stage;

pub(crate) const SUPPORTED_ROLES: [&str; 5] = [
    "api",
    "worker-ingest-telegram",
    "worker-normalize",
    "worker-evaluate",
    "worker-deliver",
];

/// What this process does. One process, one role; the schema migrator is an
/// external job, not a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuntimeRole {
    Api,
    WorkerIngestTelegram,
    WorkerNormalize,
    WorkerEvaluate,
    WorkerDeliver,
}

impl RuntimeRole {
    pub(crate) fn parse(role: &str) -> Option<Self> {
        match role {
            "api" => Some(Self::Api),
            "worker-ingest-telegram" => Some(Self::WorkerIngestTelegram),
            "worker-normalize" => Some(Self::WorkerNormalize),
            "worker-evaluate" => Some(Self::WorkerEvaluate),
            "worker-deliver" => Some(Self::WorkerDeliver),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::WorkerIngestTelegram => "worker-ingest-telegram",
            Self::WorkerNormalize => "worker-normalize",
            Self::WorkerEvaluate => "worker-evaluate",
            Self::WorkerDeliver => "worker-deliver",
        }
    }

    pub(crate) fn stage(self) -> Option<Stage> {
        match self {
            Self::Api => None,
            Self::WorkerIngestTelegram => Some(Stage::TelegramIngest),
            Self::WorkerNormalize => Some(Stage::Normalize),
            Self::WorkerEvaluate => Some(Stage::Evaluate),
            Self::WorkerDeliver => Some(Stage::Deliver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_role_parses_back_to_itself() {
        for name in SUPPORTED_ROLES {
            let role = RuntimeRole::parse(name).expect("role parses");
            assert_eq!(role.as_str(), name);
        }
    }

    #[test]
    fn unknown_roles_are_rejected() {
        assert!(RuntimeRole::parse("migrator").is_none());
        assert!(RuntimeRole::parse("").is_none());
        assert!(RuntimeRole::parse("worker").is_none());
    }

    #[test]
    fn only_worker_roles_map_to_stages() {
        assert_eq!(RuntimeRole::Api.stage(), None);
        assert_eq!(RuntimeRole::WorkerNormalize.stage(), Some(Stage::Normalize));
        assert_eq!(RuntimeRole::WorkerEvaluate.stage(), Some(Stage::Evaluate));
        assert_eq!(RuntimeRole::WorkerDeliver.stage(), Some(Stage::Deliver));
        assert_eq!(
            RuntimeRole::WorkerIngestTelegram.stage(),
            Some(Stage::TelegramIngest)
        );
    }
}
