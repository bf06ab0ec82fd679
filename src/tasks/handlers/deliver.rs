use anyhow::{Context, Result};
use serde_json::Value;

use crate::db::types::DeliveryStatus;
use crate::domain::artifacts::{
    encode_export_rows, join_string_list, summarize_criteria, ExportRowArtifact,
    EXPORTS_SCHEMA_VERSION,
};
use crate::domain::errors::ErrorKind;
use crate::repositories::claims::WorkClaim;
use crate::repositories::{candidates, deliveries, evaluations, llm_runs, submissions};
use crate::services::telegram::TelegramError;
use crate::tasks::handlers::ingest_telegram::SOURCE_TYPE as TELEGRAM_SOURCE;
use crate::tasks::worker::{ProcessResult, StageArtifact, WorkerDeps};

const CHANNEL: &str = "telegram";

/// Send candidate feedback and write the export row artifact. A submission
/// without any delivery channel is recorded as skipped and still succeeds:
/// "nowhere to deliver" is an answer, not an error.
pub(crate) async fn process_claim(
    claim: &WorkClaim,
    deps: &WorkerDeps,
) -> Result<ProcessResult> {
    let evaluation = evaluations::find_by_submission(deps.db(), &claim.public_id)
        .await
        .context("failed to read evaluation")?;
    let Some(evaluation) = evaluation else {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            "evaluation is missing for submission",
        ));
    };

    let view = submissions::status_view(deps.db(), &claim.public_id)
        .await
        .context("failed to read submission")?
        .context("submission row disappeared mid-claim")?;
    let candidate = candidates::find_by_public_id(deps.db(), &view.candidate_public_id)
        .await
        .context("failed to read candidate")?
        .context("candidate referenced by submission is missing")?;

    let message = feedback_message(evaluation.score_1_10, &evaluation.candidate_feedback.0);

    let chat_id = submissions::source_of_type(deps.db(), &claim.public_id, TELEGRAM_SOURCE)
        .await
        .context("failed to read submission source")?
        .and_then(|source| source.metadata.0.get("chat_id").and_then(Value::as_i64));

    let already_sent = deliveries::exists_for_submission(deps.db(), &claim.public_id)
        .await
        .context("failed to read delivery history")?;

    match (deps.telegram.as_ref(), chat_id) {
        _ if already_sent => {
            // A crash after send but before finalize lands here on re-run.
            tracing::info!(
                submission_id = %claim.public_id,
                "delivery already recorded; not re-sending"
            );
        }
        (Some(telegram), Some(chat_id)) => match telegram.send_message(chat_id, &message).await {
            Ok(message_id) => {
                deliveries::insert(
                    deps.db(),
                    &claim.public_id,
                    CHANNEL,
                    DeliveryStatus::Sent,
                    Some(&message_id),
                    claim.attempt,
                    None,
                )
                .await
                .context("failed to record delivery")?;
            }
            Err(TelegramError::Transport(detail)) => {
                return Ok(ProcessResult::failure(ErrorKind::RetryableTransient, detail));
            }
            Err(TelegramError::Rejected(detail)) => {
                return Ok(ProcessResult::failure(ErrorKind::PermanentBadInput, detail));
            }
        },
        _ => {
            deliveries::insert(
                deps.db(),
                &claim.public_id,
                CHANNEL,
                DeliveryStatus::Skipped,
                None,
                claim.attempt,
                Some("no_delivery_channel"),
            )
            .await
            .context("failed to record skipped delivery")?;
            tracing::info!(
                submission_id = %claim.public_id,
                "no delivery channel; feedback available via API only"
            );
        }
    }

    let llm_run = llm_runs::latest(deps.db(), &claim.public_id)
        .await
        .context("failed to read llm run")?;

    let organizer = &evaluation.organizer_feedback.0;
    let row = ExportRowArtifact {
        candidate_identifier: format!("{} {}", candidate.first_name, candidate.last_name),
        assignment_identifier: view.assignment_public_id.clone(),
        score_1_10: evaluation.score_1_10,
        criteria_summary: summarize_criteria(&evaluation.criteria_scores.0),
        strengths: join_string_list(organizer.get("strengths")),
        issues: join_string_list(organizer.get("issues")),
        recommendations: join_string_list(organizer.get("recommendations")),
        chain_version: llm_run.as_ref().map(|run| run.chain_version.clone()).unwrap_or_default(),
        model: llm_run.as_ref().map(|run| run.model.clone()).unwrap_or_default(),
        spec_version: llm_run.as_ref().map(|run| run.spec_version.clone()).unwrap_or_default(),
        response_language: llm_run
            .as_ref()
            .map(|run| run.response_language.clone())
            .unwrap_or_default(),
        schema_version: EXPORTS_SCHEMA_VERSION.to_string(),
    };

    let object_key = format!("delivery/{}.csv", claim.public_id);
    if let Err(err) =
        deps.storage.put_bytes(&object_key, "text/csv", encode_export_rows(&[row])).await
    {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            format!("failed to store delivery artifact: {err:#}"),
        ));
    }

    Ok(ProcessResult::success(
        "delivery completed",
        Some(StageArtifact {
            object_key,
            schema_version: Some(EXPORTS_SCHEMA_VERSION.to_string()),
        }),
    ))
}

fn feedback_message(score: i32, candidate_feedback: &Value) -> String {
    let summary = candidate_feedback.get("summary").and_then(Value::as_str).unwrap_or("");
    let went_well = join_string_list(candidate_feedback.get("what_went_well"));
    let to_improve = join_string_list(candidate_feedback.get("what_to_improve"));

    let mut message = format!("Your submission was reviewed. Score: {score}/10.");
    if !summary.is_empty() {
        message.push_str(&format!("\n\n{summary}"));
    }
    if !went_well.is_empty() {
        message.push_str(&format!("\n\nWhat went well: {went_well}"));
    }
    if !to_improve.is_empty() {
        message.push_str(&format!("\n\nWhat to improve: {to_improve}"));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feedback_message_includes_score_and_sections() {
        let feedback = json!({
            "summary": "Solid work.",
            "what_went_well": ["clear structure"],
            "what_to_improve": ["more tests", "handle errors"],
        });
        let message = feedback_message(8, &feedback);
        assert!(message.contains("Score: 8/10"));
        assert!(message.contains("Solid work."));
        assert!(message.contains("clear structure"));
        assert!(message.contains("more tests; handle errors"));
    }

    #[test]
    fn feedback_message_tolerates_missing_sections() {
        let message = feedback_message(5, &json!({}));
        assert!(message.contains("Score: 5/10"));
        assert!(!message.contains("What went well"));
    }

    #[test]
    fn criteria_summary_is_compact() {
        let criteria = json!([
            {"id": "correctness", "score": 8, "reason": "ok"},
            {"id": "edge_cases", "score": 6, "reason": "meh"},
        ]);
        assert_eq!(summarize_criteria(&criteria), "correctness: 8; edge_cases: 6");
        assert_eq!(summarize_criteria(&json!({})), "");
    }
}
