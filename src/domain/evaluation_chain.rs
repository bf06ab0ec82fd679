use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

static ISO_LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(?:-[A-Z]{2})?$").unwrap());
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.-]+)\s*\}\}").unwrap());

/// Versioned description of one evaluation run: model, prompts, rubric and
/// the JSON shape the model must reply with. Everything recorded into
/// `llm_runs` for reproducibility comes from here.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EvaluationChainSpec {
    pub(crate) spec_version: String,
    pub(crate) chain_version: String,
    pub(crate) model: String,
    pub(crate) runtime: RuntimeConfig,
    pub(crate) rubric: RubricConfig,
    pub(crate) prompts: PromptsConfig,
    pub(crate) llm_response: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RuntimeConfig {
    pub(crate) temperature: f64,
    #[serde(default)]
    pub(crate) seed: Option<i64>,
    pub(crate) response_language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RubricConfig {
    pub(crate) criteria: Vec<RubricCriterion>,
    pub(crate) ai_assistance_policy: AiAssistancePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RubricCriterion {
    pub(crate) id: String,
    pub(crate) description: String,
    pub(crate) weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AiAssistancePolicy {
    pub(crate) enabled: bool,
    pub(crate) affects_score: bool,
    pub(crate) require_fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PromptsConfig {
    pub(crate) system: String,
    pub(crate) user_template: String,
}

#[derive(Debug, Error)]
pub(crate) enum ChainSpecError {
    #[error("failed to read chain spec {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("chain spec is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("chain spec is invalid: {0}")]
    Invalid(String),
    #[error("missing placeholder value: {0}")]
    MissingPlaceholder(String),
    #[error("llm response rejected at {path}: {reason}")]
    ResponseSchema { path: String, reason: String },
}

impl EvaluationChainSpec {
    pub(crate) fn load(path: &Path) -> Result<Self, ChainSpecError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ChainSpecError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ChainSpecError> {
        let spec: Self = serde_yaml::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), ChainSpecError> {
        if self.spec_version.is_empty() || self.chain_version.is_empty() || self.model.is_empty()
        {
            return Err(ChainSpecError::Invalid(
                "spec_version, chain_version and model must be non-empty".to_string(),
            ));
        }
        if !ISO_LANGUAGE_RE.is_match(&self.runtime.response_language) {
            return Err(ChainSpecError::Invalid(
                "runtime.response_language must be an ISO code such as 'en' or 'ru'".to_string(),
            ));
        }
        if self.rubric.criteria.is_empty() {
            return Err(ChainSpecError::Invalid(
                "rubric.criteria must contain at least one criterion".to_string(),
            ));
        }
        if self.rubric.criteria.iter().map(|item| item.weight).sum::<f64>() <= 0.0 {
            return Err(ChainSpecError::Invalid(
                "rubric.criteria total weight must be > 0".to_string(),
            ));
        }

        let schema = &self.llm_response;
        if schema.get("type").and_then(Value::as_str) != Some("json") {
            return Err(ChainSpecError::Invalid("llm_response.type must be 'json'".to_string()));
        }
        if !schema.get("required").is_some_and(Value::is_array) {
            return Err(ChainSpecError::Invalid(
                "llm_response.required must be a list".to_string(),
            ));
        }
        if !schema.get("properties").is_some_and(Value::is_object) {
            return Err(ChainSpecError::Invalid(
                "llm_response.properties must be an object".to_string(),
            ));
        }

        Ok(())
    }

    /// Substitute `{{path.to.value}}` placeholders from the stage inputs,
    /// falling back to the spec's own fields (model, runtime, rubric).
    pub(crate) fn render_user_prompt(&self, inputs: &Value) -> Result<String, ChainSpecError> {
        let spec_map = self.as_lookup_map();
        let mut missing: Option<String> = None;

        let rendered = PLACEHOLDER_RE.replace_all(&self.prompts.user_template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            let value = lookup_dot_path(inputs, key).or_else(|| lookup_dot_path(&spec_map, key));
            match value {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => {
                    if missing.is_none() {
                        missing = Some(key.to_string());
                    }
                    String::new()
                }
            }
        });

        match missing {
            Some(key) => Err(ChainSpecError::MissingPlaceholder(key)),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Check a model reply against the chain's `llm_response` schema.
    pub(crate) fn validate_response(&self, payload: &Value) -> Result<(), ChainSpecError> {
        validate_node(payload, &self.llm_response, "$")
    }

    fn as_lookup_map(&self) -> Value {
        serde_json::json!({
            "spec_version": self.spec_version,
            "chain_version": self.chain_version,
            "model": self.model,
            "runtime": {
                "temperature": self.runtime.temperature,
                "seed": self.runtime.seed,
                "response_language": self.runtime.response_language,
            },
            "rubric": {
                "criteria": self.rubric.criteria.iter().map(|item| {
                    serde_json::json!({
                        "id": item.id,
                        "description": item.description,
                        "weight": item.weight,
                    })
                }).collect::<Vec<_>>(),
            },
        })
    }
}

fn lookup_dot_path(data: &Value, path: &str) -> Option<Value> {
    let mut current = data;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

fn validate_node(value: &Value, schema: &Value, path: &str) -> Result<(), ChainSpecError> {
    let reject = |reason: &str| {
        Err(ChainSpecError::ResponseSchema { path: path.to_string(), reason: reason.to_string() })
    };

    match schema.get("type").and_then(Value::as_str) {
        Some("json") | Some("object") => {
            let Some(object) = value.as_object() else {
                return reject("expected object");
            };
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for field in required {
                    let Some(name) = field.as_str() else {
                        return reject("invalid required field name in schema");
                    };
                    if !object.contains_key(name) {
                        return Err(ChainSpecError::ResponseSchema {
                            path: format!("{path}.{name}"),
                            reason: "required field is missing".to_string(),
                        });
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (key, field_schema) in properties {
                    if let Some(field_value) = object.get(key) {
                        validate_node(field_value, field_schema, &format!("{path}.{key}"))?;
                    }
                }
            }
            Ok(())
        }
        Some("array") => {
            let Some(items) = value.as_array() else {
                return reject("expected array");
            };
            let Some(item_schema) = schema.get("items") else {
                return reject("array schema must define items");
            };
            for (idx, item) in items.iter().enumerate() {
                validate_node(item, item_schema, &format!("{path}[{idx}]"))?;
            }
            Ok(())
        }
        Some("string") => {
            if value.is_string() {
                Ok(())
            } else {
                reject("expected string")
            }
        }
        Some("integer") => {
            let Some(number) = value.as_i64() else {
                return reject("expected integer");
            };
            check_bounds(number as f64, schema, path)
        }
        Some("number") => {
            let Some(number) = value.as_f64() else {
                return reject("expected number");
            };
            check_bounds(number, schema, path)
        }
        Some("boolean") => {
            if value.is_boolean() {
                Ok(())
            } else {
                reject("expected boolean")
            }
        }
        other => Err(ChainSpecError::ResponseSchema {
            path: path.to_string(),
            reason: format!("unsupported schema type {other:?}"),
        }),
    }
}

fn check_bounds(number: f64, schema: &Value, path: &str) -> Result<(), ChainSpecError> {
    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        if number < minimum {
            return Err(ChainSpecError::ResponseSchema {
                path: path.to_string(),
                reason: "value is below minimum".to_string(),
            });
        }
    }
    if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
        if number > maximum {
            return Err(ChainSpecError::ResponseSchema {
                path: path.to_string(),
                reason: "value is above maximum".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC_YAML: &str = r#"
spec_version: v1
chain_version: assignment-review:1
model: gpt-4o
runtime:
  temperature: 0.1
  seed: 42
  response_language: en
rubric:
  criteria:
    - id: correctness
      description: Does the solution work
      weight: 0.5
    - id: code_quality
      description: Is it readable
      weight: 0.5
  ai_assistance_policy:
    enabled: true
    affects_score: false
    require_fields: [likelihood, confidence]
prompts:
  system: You are a strict reviewer.
  user_template: |
    Assignment: {{assignment_title}}
    Language: {{runtime.response_language}}
    Solution:
    {{content_markdown}}
llm_response:
  type: json
  required: [criteria, ai_assistance]
  properties:
    criteria:
      type: array
      items:
        type: object
        required: [id, score]
        properties:
          id: { type: string }
          score: { type: integer, minimum: 1, maximum: 10 }
    ai_assistance:
      type: object
      required: [likelihood]
      properties:
        likelihood: { type: number, minimum: 0, maximum: 1 }
"#;

    #[test]
    fn parses_and_validates_the_fixture() {
        let spec = EvaluationChainSpec::parse(SPEC_YAML).unwrap();
        assert_eq!(spec.chain_version, "assignment-review:1");
        assert_eq!(spec.runtime.seed, Some(42));
        assert_eq!(spec.rubric.criteria.len(), 2);
    }

    #[test]
    fn rejects_bad_language_code() {
        let raw = SPEC_YAML.replace("response_language: en", "response_language: english");
        assert!(matches!(
            EvaluationChainSpec::parse(&raw),
            Err(ChainSpecError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_empty_criteria() {
        let raw = SPEC_YAML.replace(
            "  criteria:\n    - id: correctness\n      description: Does the solution work\n      weight: 0.5\n    - id: code_quality\n      description: Is it readable\n      weight: 0.5",
            "  criteria: []",
        );
        assert!(matches!(
            EvaluationChainSpec::parse(&raw),
            Err(ChainSpecError::Invalid(_))
        ));
    }

    #[test]
    fn renders_placeholders_from_inputs_and_spec() {
        let spec = EvaluationChainSpec::parse(SPEC_YAML).unwrap();
        let inputs = serde_json::json!({
            "assignment_title": "FizzBuzz",
            "content_markdown": "fn main() {}",
        });
        let prompt = spec.render_user_prompt(&inputs).unwrap();
        assert!(prompt.contains("Assignment: FizzBuzz"));
        assert!(prompt.contains("Language: en"));
        assert!(prompt.contains("fn main() {}"));
    }

    #[test]
    fn rendering_fails_on_unknown_placeholder() {
        let spec = EvaluationChainSpec::parse(SPEC_YAML).unwrap();
        let err = spec.render_user_prompt(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ChainSpecError::MissingPlaceholder(_)));
    }

    #[test]
    fn accepts_a_conforming_response() {
        let spec = EvaluationChainSpec::parse(SPEC_YAML).unwrap();
        let payload = serde_json::json!({
            "criteria": [
                {"id": "correctness", "score": 8},
                {"id": "code_quality", "score": 7},
            ],
            "ai_assistance": {"likelihood": 0.3},
        });
        spec.validate_response(&payload).unwrap();
    }

    #[test]
    fn rejects_missing_required_field() {
        let spec = EvaluationChainSpec::parse(SPEC_YAML).unwrap();
        let payload = serde_json::json!({
            "criteria": [{"id": "correctness", "score": 8}],
        });
        let err = spec.validate_response(&payload).unwrap_err();
        assert!(matches!(err, ChainSpecError::ResponseSchema { .. }));
    }

    #[test]
    fn rejects_out_of_range_score() {
        let spec = EvaluationChainSpec::parse(SPEC_YAML).unwrap();
        let payload = serde_json::json!({
            "criteria": [{"id": "correctness", "score": 11}],
            "ai_assistance": {"likelihood": 0.3},
        });
        let err = spec.validate_response(&payload).unwrap_err();
        assert!(matches!(err, ChainSpecError::ResponseSchema { .. }));
    }

    #[test]
    fn embedded_default_chain_parses() {
        EvaluationChainSpec::parse(include_str!("../../chains/assignment_review_v1.yaml"))
            .unwrap();
    }
}
