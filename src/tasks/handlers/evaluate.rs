use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::domain::artifacts::{check_schema, decode_normalized, NORMALIZED_SCHEMA_VERSION};
use crate::domain::errors::ErrorKind;
use crate::domain::evaluation_chain::{ChainSpecError, EvaluationChainSpec};
use crate::domain::scoring::{deterministic_score_1_10, CriterionScore};
use crate::repositories::assignments;
use crate::repositories::claims::{self, WorkClaim};
use crate::repositories::evaluations::{self, EvaluationUpsert};
use crate::repositories::llm_runs::{self, LlmRunInsert};
use crate::services::llm::LlmError;
use crate::tasks::worker::{ProcessResult, StageArtifact, WorkerDeps};

/// Score the normalized submission with the language model. Every model call
/// is audited in `llm_runs`; the evaluation row is an upsert so replays
/// converge on the same state.
pub(crate) async fn process_claim(
    claim: &WorkClaim,
    deps: &WorkerDeps,
) -> Result<ProcessResult> {
    let chain = deps.chain.as_ref().context("evaluation chain spec is not loaded")?;
    let llm = deps.llm.as_ref().context("llm client is not configured for this role")?;
    let policy = deps.state.settings().artifact().compat_policy;

    let normalized_ref = claims::latest_artifact(deps.db(), &claim.public_id, "normalized")
        .await
        .context("failed to read normalized artifact ref")?;
    let Some(normalized_ref) = normalized_ref else {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            "normalized artifact is missing",
        ));
    };

    if normalized_ref.bucket != deps.storage.bucket() {
        return Ok(ProcessResult::failure(
            ErrorKind::PermanentBadInput,
            format!("normalized artifact lives in unreachable bucket {}", normalized_ref.bucket),
        ));
    }

    if let Some(version) = normalized_ref.schema_version.as_deref() {
        if let Err(err) = check_schema(NORMALIZED_SCHEMA_VERSION, version, policy) {
            return Ok(ProcessResult::failure(ErrorKind::PermanentBadInput, err.to_string()));
        }
    }

    let payload = match deps.storage.get_bytes(&normalized_ref.object_key).await {
        Ok(payload) => payload,
        Err(err) => {
            return Ok(ProcessResult::failure(
                ErrorKind::RetryableTransient,
                format!("failed to fetch normalized artifact: {err:#}"),
            ));
        }
    };

    let artifact = match decode_normalized(&payload, policy) {
        Ok(artifact) => artifact,
        Err(err) => {
            return Ok(ProcessResult::failure(ErrorKind::PermanentBadInput, err.to_string()));
        }
    };

    let assignment = assignments::find_by_public_id(deps.db(), &artifact.assignment_public_id)
        .await
        .context("failed to read assignment")?
        .context("assignment referenced by artifact is missing")?;

    let inputs = json!({
        "assignment_title": assignment.title,
        "assignment_description": assignment.description,
        "content_markdown": artifact.content_markdown,
    });
    // A placeholder miss is a chain-spec defect, not a property of this
    // submission; error the tick instead of dead-lettering.
    let user_prompt = match chain.render_user_prompt(&inputs) {
        Ok(prompt) => prompt,
        Err(err @ ChainSpecError::MissingPlaceholder(_)) => {
            return Err(anyhow::anyhow!(err).context("chain spec template is broken"));
        }
        Err(err) => return Err(anyhow::anyhow!(err)),
    };

    let outcome = match llm.evaluate(chain, &user_prompt).await {
        Ok(outcome) => outcome,
        Err(LlmError::Unavailable(detail)) => {
            return Ok(ProcessResult::failure(ErrorKind::RetryableTransient, detail));
        }
        Err(LlmError::InvalidResponse(detail)) => {
            return Ok(ProcessResult::failure(ErrorKind::PermanentBadInput, detail));
        }
    };

    llm_runs::insert(
        deps.db(),
        &claim.public_id,
        LlmRunInsert {
            provider: llm.provider().to_string(),
            model: chain.model.clone(),
            api_base: llm.api_base().to_string(),
            chain_version: chain.chain_version.clone(),
            spec_version: chain.spec_version.clone(),
            response_language: chain.runtime.response_language.clone(),
            temperature: chain.runtime.temperature,
            seed: chain.runtime.seed,
            tokens_input: outcome.tokens_input,
            tokens_output: outcome.tokens_output,
            latency_ms: outcome.latency_ms,
        },
    )
    .await
    .context("failed to record llm run")?;

    if let Err(err) = chain.validate_response(&outcome.payload) {
        return Ok(ProcessResult::failure(ErrorKind::PermanentBadInput, err.to_string()));
    }

    let criteria = criterion_scores(chain, &outcome.payload);
    let score = deterministic_score_1_10(&criteria);

    let ai_assistance = outcome.payload.get("ai_assistance");
    let likelihood = ai_assistance
        .and_then(|node| node.get("likelihood"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let confidence = ai_assistance
        .and_then(|node| node.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    evaluations::upsert(
        deps.db(),
        &claim.public_id,
        EvaluationUpsert {
            score_1_10: score,
            criteria_scores: outcome
                .payload
                .get("criteria")
                .cloned()
                .unwrap_or_else(|| json!([])),
            organizer_feedback: outcome
                .payload
                .get("organizer_feedback")
                .cloned()
                .unwrap_or_else(|| json!({})),
            candidate_feedback: outcome
                .payload
                .get("candidate_feedback")
                .cloned()
                .unwrap_or_else(|| json!({})),
            ai_assistance_likelihood: likelihood,
            ai_assistance_confidence: confidence,
        },
    )
    .await
    .context("failed to persist evaluation")?;

    let object_key = format!("llm-output/{}.json", claim.public_id);
    let raw_reply = serde_json::to_vec(&outcome.payload).unwrap_or_default();
    if let Err(err) = deps.storage.put_bytes(&object_key, "application/json", raw_reply).await {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            format!("failed to store llm output artifact: {err:#}"),
        ));
    }

    Ok(ProcessResult::success(
        format!("evaluation completed with score {score}"),
        Some(StageArtifact {
            object_key,
            schema_version: Some(chain.spec_version.clone()),
        }),
    ))
}

/// Join the model's per-criterion scores with the rubric's weights. Criteria
/// the rubric does not know get weight zero and cannot move the score.
fn criterion_scores(chain: &EvaluationChainSpec, payload: &Value) -> Vec<CriterionScore> {
    let Some(reported) = payload.get("criteria").and_then(Value::as_array) else {
        return Vec::new();
    };

    reported
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?.to_string();
            let score = item.get("score")?.as_i64()?;
            let weight = chain
                .rubric
                .criteria
                .iter()
                .find(|criterion| criterion.id == id)
                .map(|criterion| criterion.weight)
                .unwrap_or(0.0);
            Some(CriterionScore { id, score, weight })
        })
        .collect()
}
