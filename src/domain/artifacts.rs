use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const NORMALIZED_SCHEMA_VERSION: &str = "normalized:v1";
pub(crate) const EXPORTS_SCHEMA_VERSION: &str = "exports:v1";

/// Produced by the normalize stage, consumed by the evaluate stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NormalizedArtifact {
    pub(crate) submission_public_id: String,
    pub(crate) assignment_public_id: String,
    /// Ingress path that created the source payload.
    pub(crate) source_type: String,
    /// Canonical text used as LLM input.
    pub(crate) content_markdown: String,
    /// Parser/mime/warnings trace from normalization.
    pub(crate) normalization_metadata: serde_json::Value,
    pub(crate) schema_version: String,
}

/// Stable tabular row for CSV export and delivery reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExportRowArtifact {
    pub(crate) candidate_identifier: String,
    pub(crate) assignment_identifier: String,
    pub(crate) score_1_10: i32,
    pub(crate) criteria_summary: String,
    pub(crate) strengths: String,
    pub(crate) issues: String,
    pub(crate) recommendations: String,
    pub(crate) chain_version: String,
    pub(crate) model: String,
    pub(crate) spec_version: String,
    pub(crate) response_language: String,
    pub(crate) schema_version: String,
}

/// How strictly stored schema versions are checked on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompatPolicy {
    /// Exact version match required.
    Strict,
    /// Same family (prefix before `:`) accepted.
    Compatible,
}

impl CompatPolicy {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "strict" => Some(Self::Strict),
            "compatible" => Some(Self::Compatible),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Compatible => "compatible",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ArtifactError {
    #[error("artifact schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: &'static str, actual: String },
    #[error("artifact payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

pub(crate) fn encode_normalized(artifact: &NormalizedArtifact) -> Vec<u8> {
    // Serialization of a plain struct cannot fail.
    serde_json::to_vec(artifact).unwrap_or_default()
}

pub(crate) fn decode_normalized(
    payload: &[u8],
    policy: CompatPolicy,
) -> Result<NormalizedArtifact, ArtifactError> {
    let artifact: NormalizedArtifact = serde_json::from_slice(payload)?;
    check_schema(NORMALIZED_SCHEMA_VERSION, &artifact.schema_version, policy)?;
    Ok(artifact)
}

pub(crate) fn encode_export_rows(rows: &[ExportRowArtifact]) -> Vec<u8> {
    if rows.is_empty() {
        return Vec::new();
    }

    let mut out = String::new();
    out.push_str(
        "candidate_identifier,assignment_identifier,score_1_10,criteria_summary,strengths,\
         issues,recommendations,chain_version,model,spec_version,response_language,\
         schema_version\n",
    );
    for row in rows {
        let fields = [
            row.candidate_identifier.as_str(),
            row.assignment_identifier.as_str(),
            &row.score_1_10.to_string(),
            row.criteria_summary.as_str(),
            row.strengths.as_str(),
            row.issues.as_str(),
            row.recommendations.as_str(),
            row.chain_version.as_str(),
            row.model.as_str(),
            row.spec_version.as_str(),
            row.response_language.as_str(),
            row.schema_version.as_str(),
        ];
        let encoded: Vec<String> = fields.iter().map(|field| csv_field(field)).collect();
        out.push_str(&encoded.join(","));
        out.push('\n');
    }
    out.into_bytes()
}

pub(crate) fn check_schema(
    expected: &'static str,
    actual: &str,
    policy: CompatPolicy,
) -> Result<(), ArtifactError> {
    if actual == expected {
        return Ok(());
    }

    if policy == CompatPolicy::Compatible {
        let expected_family = expected.split(':').next().unwrap_or(expected);
        let actual_family = actual.split(':').next().unwrap_or(actual);
        if expected_family == actual_family {
            return Ok(());
        }
    }

    Err(ArtifactError::SchemaMismatch { expected, actual: actual.to_string() })
}

/// Compact `id: score` rendering of the criteria JSON for reports.
pub(crate) fn summarize_criteria(criteria: &serde_json::Value) -> String {
    let Some(items) = criteria.as_array() else {
        return String::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            let score = item.get("score")?.as_i64()?;
            Some(format!("{id}: {score}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn join_string_list(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items.iter().filter_map(serde_json::Value::as_str).collect::<Vec<_>>().join("; ")
        })
        .unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized_fixture(schema_version: &str) -> NormalizedArtifact {
        NormalizedArtifact {
            submission_public_id: "sub_01J8ZC3A6W5V9XKQ4T2M7R8DNE".to_string(),
            assignment_public_id: "asg_01J8ZC3A6W5V9XKQ4T2M7R8DNF".to_string(),
            source_type: "api_upload".to_string(),
            content_markdown: "# solution".to_string(),
            normalization_metadata: serde_json::json!({"parser": "text"}),
            schema_version: schema_version.to_string(),
        }
    }

    #[test]
    fn normalized_round_trip_under_strict() {
        let artifact = normalized_fixture(NORMALIZED_SCHEMA_VERSION);
        let decoded =
            decode_normalized(&encode_normalized(&artifact), CompatPolicy::Strict).unwrap();
        assert_eq!(decoded.content_markdown, "# solution");
        assert_eq!(decoded.source_type, "api_upload");
    }

    #[test]
    fn strict_rejects_newer_version_in_same_family() {
        let artifact = normalized_fixture("normalized:v2");
        let err =
            decode_normalized(&encode_normalized(&artifact), CompatPolicy::Strict).unwrap_err();
        assert!(matches!(err, ArtifactError::SchemaMismatch { .. }));
    }

    #[test]
    fn compatible_accepts_same_family_only() {
        let artifact = normalized_fixture("normalized:v2");
        decode_normalized(&encode_normalized(&artifact), CompatPolicy::Compatible).unwrap();

        let artifact = normalized_fixture("exports:v1");
        let err = decode_normalized(&encode_normalized(&artifact), CompatPolicy::Compatible)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::SchemaMismatch { .. }));
    }

    #[test]
    fn export_rows_encode_with_header_and_quoting() {
        let row = ExportRowArtifact {
            candidate_identifier: "Doe, Jane".to_string(),
            assignment_identifier: "asg_01J8ZC3A6W5V9XKQ4T2M7R8DNF".to_string(),
            score_1_10: 8,
            criteria_summary: "correctness: 8".to_string(),
            strengths: "says \"works\"".to_string(),
            issues: String::new(),
            recommendations: "more tests".to_string(),
            chain_version: "assignment-review:1".to_string(),
            model: "gpt-4o".to_string(),
            spec_version: "v1".to_string(),
            response_language: "en".to_string(),
            schema_version: EXPORTS_SCHEMA_VERSION.to_string(),
        };

        let csv = String::from_utf8(encode_export_rows(&[row])).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("candidate_identifier,"));
        let data = lines.next().unwrap();
        assert!(data.starts_with("\"Doe, Jane\","));
        assert!(data.contains("\"says \"\"works\"\"\""));
    }

    #[test]
    fn empty_export_encodes_to_nothing() {
        assert!(encode_export_rows(&[]).is_empty());
    }

    #[test]
    fn compat_policy_parses_known_values() {
        assert_eq!(CompatPolicy::parse("strict"), Some(CompatPolicy::Strict));
        assert_eq!(CompatPolicy::parse("compatible"), Some(CompatPolicy::Compatible));
        assert_eq!(CompatPolicy::parse("lenient"), None);
    }
}
