use anyhow::{Context, Result};
use serde_json::json;

use crate::domain::artifacts::{
    encode_normalized, NormalizedArtifact, NORMALIZED_SCHEMA_VERSION,
};
use crate::domain::errors::ErrorKind;
use crate::repositories::claims::{self, WorkClaim};
use crate::repositories::submissions;
use crate::tasks::worker::{ProcessResult, StageArtifact, WorkerDeps};

/// Turn the raw upload into the canonical markdown artifact the evaluator
/// consumes. The output key is derived from the submission id, so re-runs
/// overwrite rather than duplicate.
pub(crate) async fn process_claim(
    claim: &WorkClaim,
    deps: &WorkerDeps,
) -> Result<ProcessResult> {
    let raw_ref = claims::latest_artifact(deps.db(), &claim.public_id, "raw")
        .await
        .context("failed to read raw artifact ref")?;

    let Some(raw_ref) = raw_ref else {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            "raw artifact is missing",
        ));
    };

    if raw_ref.bucket != deps.storage.bucket() {
        return Ok(ProcessResult::failure(
            ErrorKind::PermanentBadInput,
            format!("raw artifact lives in unreachable bucket {}", raw_ref.bucket),
        ));
    }

    let payload = match deps.storage.get_bytes(&raw_ref.object_key).await {
        Ok(payload) => payload,
        Err(err) => {
            return Ok(ProcessResult::failure(
                ErrorKind::RetryableTransient,
                format!("failed to fetch raw artifact: {err:#}"),
            ));
        }
    };

    let extension = file_extension(&raw_ref.object_key);
    let Some(language) = fence_language(extension) else {
        return Ok(ProcessResult::failure(
            ErrorKind::PermanentBadInput,
            format!("unsupported submission format: .{extension}"),
        ));
    };

    let byte_count = payload.len();
    let Ok(text) = String::from_utf8(payload) else {
        return Ok(ProcessResult::failure(
            ErrorKind::PermanentBadInput,
            "submission payload is not valid UTF-8",
        ));
    };

    let view = submissions::status_view(deps.db(), &claim.public_id)
        .await
        .context("failed to read submission")?
        .context("submission row disappeared mid-claim")?;
    let source = submissions::primary_source(deps.db(), &claim.public_id)
        .await
        .context("failed to read submission source")?;
    let source_type =
        source.map(|row| row.source_type).unwrap_or_else(|| "api_upload".to_string());

    let artifact = NormalizedArtifact {
        submission_public_id: claim.public_id.clone(),
        assignment_public_id: view.assignment_public_id,
        source_type,
        content_markdown: render_markdown(&text, language),
        normalization_metadata: json!({
            "parser": "text",
            "source_key": raw_ref.object_key,
            "file_extension": extension,
            "bytes": byte_count,
        }),
        schema_version: NORMALIZED_SCHEMA_VERSION.to_string(),
    };

    let object_key = format!("normalized/{}.json", claim.public_id);
    if let Err(err) =
        deps.storage.put_bytes(&object_key, "application/json", encode_normalized(&artifact)).await
    {
        return Ok(ProcessResult::failure(
            ErrorKind::RetryableTransient,
            format!("failed to store normalized artifact: {err:#}"),
        ));
    }

    Ok(ProcessResult::success(
        "normalization completed",
        Some(StageArtifact {
            object_key,
            schema_version: Some(NORMALIZED_SCHEMA_VERSION.to_string()),
        }),
    ))
}

fn file_extension(key: &str) -> &str {
    key.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
        .unwrap_or("")
}

/// Markdown-ish files pass through; known code files get fenced. Anything
/// else is an unsupported format.
fn fence_language(extension: &str) -> Option<Option<&'static str>> {
    match extension.to_ascii_lowercase().as_str() {
        "md" | "markdown" | "txt" => Some(None),
        "rs" => Some(Some("rust")),
        "py" => Some(Some("python")),
        "json" => Some(Some("json")),
        _ => None,
    }
}

fn render_markdown(text: &str, language: Option<&'static str>) -> String {
    match language {
        None => text.to_string(),
        Some(language) => format!("```{language}\n{text}\n```"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_the_final_path_segment() {
        assert_eq!(file_extension("raw/sub_x/solution.rs"), "rs");
        assert_eq!(file_extension("raw/sub_x/archive.tar.gz"), "gz");
        assert_eq!(file_extension("raw/sub_x/README"), "");
    }

    #[test]
    fn markdown_passes_through_code_gets_fenced() {
        assert_eq!(render_markdown("# hi", None), "# hi");
        assert_eq!(render_markdown("fn main() {}", Some("rust")), "```rust\nfn main() {}\n```");
    }

    #[test]
    fn format_allowlist() {
        assert_eq!(fence_language("md"), Some(None));
        assert_eq!(fence_language("TXT"), Some(None));
        assert_eq!(fence_language("rs"), Some(Some("rust")));
        assert_eq!(fence_language("py"), Some(Some("python")));
        assert_eq!(fence_language("exe"), None);
        assert_eq!(fence_language(""), None);
    }
}
