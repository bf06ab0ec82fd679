use anyhow::{Context, Result};
use serde_json::Value;

use crate::domain::errors::ErrorKind;
use crate::repositories::claims::WorkClaim;
use crate::repositories::submissions;
use crate::services::telegram::TelegramError;
use crate::tasks::worker::{ProcessResult, StageArtifact, WorkerDeps};

pub(crate) const SOURCE_TYPE: &str = "telegram_webhook";

/// Pull the submitted file out of Telegram and persist it as the raw
/// artifact. Idempotent: the storage key is derived from the submission id,
/// so a re-run after a crash overwrites the same object.
pub(crate) async fn process_claim(
    claim: &WorkClaim,
    deps: &WorkerDeps,
) -> Result<ProcessResult> {
    let source = submissions::source_of_type(deps.db(), &claim.public_id, SOURCE_TYPE)
        .await
        .context("failed to read submission source")?;

    let Some(source) = source else {
        return Ok(ProcessResult::failure(
            ErrorKind::PermanentBadInput,
            "telegram source is missing for submission",
        ));
    };

    let metadata = &source.metadata.0;
    let Some(file_id) = metadata.get("file_id").and_then(Value::as_str).filter(|id| !id.is_empty())
    else {
        return Ok(ProcessResult::failure(
            ErrorKind::PermanentBadInput,
            "telegram webhook metadata.file_id is required",
        ));
    };
    let file_name = metadata
        .get("file_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or("submission.bin");

    let telegram =
        deps.telegram.as_ref().context("telegram client is not configured for this role")?;

    let payload = match telegram.get_file_bytes(file_id).await {
        Ok(payload) => payload,
        Err(TelegramError::Rejected(detail)) => {
            return Ok(ProcessResult::failure(ErrorKind::PermanentBadInput, detail));
        }
        Err(TelegramError::Transport(detail)) => {
            return Ok(ProcessResult::failure(ErrorKind::RetryableTransient, detail));
        }
    };

    let object_key = format!("raw/{}/{}", claim.public_id, file_name);
    if let Err(err) =
        deps.storage.put_bytes(&object_key, "application/octet-stream", payload).await
    {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            format!("failed to store raw artifact: {err:#}"),
        ));
    }

    Ok(ProcessResult::success(
        "telegram payload ingested",
        Some(StageArtifact { object_key, schema_version: None }),
    ))
}
