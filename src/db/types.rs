use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Submission lifecycle states. Stored as TEXT; the migration carries the
/// matching CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub(crate) enum SubmissionStatus {
    TelegramUpdateReceived,
    TelegramIngestInProgress,
    Uploaded,
    NormalizationInProgress,
    Normalized,
    EvaluationInProgress,
    Evaluated,
    DeliveryInProgress,
    Delivered,
    FailedTelegramIngest,
    FailedNormalization,
    FailedEvaluation,
    FailedDelivery,
    DeadLetter,
}

impl SubmissionStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::TelegramUpdateReceived => "telegram_update_received",
            Self::TelegramIngestInProgress => "telegram_ingest_in_progress",
            Self::Uploaded => "uploaded",
            Self::NormalizationInProgress => "normalization_in_progress",
            Self::Normalized => "normalized",
            Self::EvaluationInProgress => "evaluation_in_progress",
            Self::Evaluated => "evaluated",
            Self::DeliveryInProgress => "delivery_in_progress",
            Self::Delivered => "delivered",
            Self::FailedTelegramIngest => "failed_telegram_ingest",
            Self::FailedNormalization => "failed_normalization",
            Self::FailedEvaluation => "failed_evaluation",
            Self::FailedDelivery => "failed_delivery",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Terminal states are never claimed again.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::DeadLetter)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub(crate) enum DeliveryStatus {
    Sent,
    Skipped,
}

impl DeliveryStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_serde() {
        let value = serde_json::to_value(SubmissionStatus::NormalizationInProgress).unwrap();
        assert_eq!(value, "normalization_in_progress");
        let parsed: SubmissionStatus = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, SubmissionStatus::NormalizationInProgress);
    }

    #[test]
    fn terminal_states() {
        assert!(SubmissionStatus::Delivered.is_terminal());
        assert!(SubmissionStatus::DeadLetter.is_terminal());
        assert!(!SubmissionStatus::FailedDelivery.is_terminal());
        assert!(!SubmissionStatus::Uploaded.is_terminal());
    }
}
