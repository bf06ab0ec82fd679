use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy carried by stage handlers. The worker loop maps it to a
/// finalize decision; the code is persisted as `last_error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ErrorKind {
    /// Network timeout, upstream 5xx, LLM rate limit.
    RetryableTransient,
    /// Lease lost or reclaim race; the reclaim already accounted the attempt.
    RetryableResource,
    /// Malformed input or schema mismatch; retrying cannot help.
    PermanentBadInput,
    /// A negative business outcome that is itself the successful result.
    PermanentBusiness,
    /// Handler cancelled by lease loss or shutdown.
    Cancelled,
    /// Repository or dependency unreachable; the tick errors out instead of
    /// changing submission state.
    FatalInfrastructure,
}

impl ErrorKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::RetryableTransient => "retryable_transient",
            Self::RetryableResource => "retryable_resource",
            Self::PermanentBadInput => "permanent_bad_input",
            Self::PermanentBusiness => "permanent_business",
            Self::Cancelled => "cancelled",
            Self::FatalInfrastructure => "fatal_infrastructure",
        }
    }

    /// Terminal failures dead-letter on the first occurrence.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::PermanentBadInput)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub(crate) enum DomainError {
    #[error("invalid public id: {0}")]
    InvalidPublicId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bad_input_is_terminal() {
        assert!(ErrorKind::PermanentBadInput.is_terminal());
        assert!(!ErrorKind::RetryableTransient.is_terminal());
        assert!(!ErrorKind::RetryableResource.is_terminal());
        assert!(!ErrorKind::Cancelled.is_terminal());
        assert!(!ErrorKind::FatalInfrastructure.is_terminal());
    }

    #[test]
    fn codes_match_the_persisted_vocabulary() {
        assert_eq!(ErrorKind::RetryableTransient.as_str(), "retryable_transient");
        assert_eq!(ErrorKind::Cancelled.as_str(), "cancelled");
        assert_eq!(ErrorKind::PermanentBadInput.as_str(), "permanent_bad_input");
    }
}
