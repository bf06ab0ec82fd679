use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::domain::evaluation_chain::EvaluationChainSpec;

const MAX_RETRIES: u32 = 3;

/// OpenAI-compatible chat-completions client used by the evaluate stage.
#[derive(Debug, Clone)]
pub(crate) struct LlmClient {
    client: Client,
    provider: String,
    api_key: String,
    base_url: String,
}

/// One completed model call, with the counters the audit log wants.
#[derive(Debug, Clone)]
pub(crate) struct LlmOutcome {
    pub(crate) payload: Value,
    pub(crate) tokens_input: i64,
    pub(crate) tokens_output: i64,
    pub(crate) latency_ms: i64,
}

#[derive(Debug, Error)]
pub(crate) enum LlmError {
    /// Rate limit, upstream 5xx, network failure: worth retrying later.
    #[error("llm provider unavailable: {0}")]
    Unavailable(String),
    /// The provider answered but the reply cannot be used.
    #[error("llm response invalid: {0}")]
    InvalidResponse(String),
}

impl LlmClient {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(settings.llm().request_timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            provider: settings.llm().provider.clone(),
            api_key: settings.llm().api_key.clone(),
            base_url: settings.llm().base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn provider(&self) -> &str {
        &self.provider
    }

    pub(crate) fn api_base(&self) -> &str {
        &self.base_url
    }

    /// Run one evaluation call. Transient provider failures are retried with
    /// exponential backoff before giving up as [`LlmError::Unavailable`].
    pub(crate) async fn evaluate(
        &self,
        chain: &EvaluationChainSpec,
        user_prompt: &str,
    ) -> Result<LlmOutcome, LlmError> {
        let timer = Instant::now();

        let mut payload = json!({
            "model": chain.model,
            "messages": [
                {"role": "system", "content": chain.prompts.system},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": chain.runtime.temperature,
            "response_format": {"type": "json_object"}
        });
        if let Some(seed) = chain.runtime.seed {
            payload["seed"] = json!(seed);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = String::new();
        let mut body = Value::Null;
        let mut answered = false;

        for attempt in 0..=MAX_RETRIES {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        body = resp
                            .json()
                            .await
                            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
                        answered = true;
                        break;
                    }
                    let text = resp.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("provider returned {status}: {text}");
                    } else {
                        return Err(LlmError::InvalidResponse(format!(
                            "provider rejected request with {status}: {text}"
                        )));
                    }
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if !answered {
            return Err(LlmError::Unavailable(last_error));
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing choices[0].message.content".to_string())
            })?;

        let parsed: Value = serde_json::from_str(content)
            .map_err(|err| LlmError::InvalidResponse(format!("reply is not JSON: {err}")))?;

        let tokens_input = body
            .get("usage")
            .and_then(|usage| usage.get("prompt_tokens"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let tokens_output = body
            .get("usage")
            .and_then(|usage| usage.get("completion_tokens"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Ok(LlmOutcome {
            payload: parsed,
            tokens_input,
            tokens_output,
            latency_ms: timer.elapsed().as_millis() as i64,
        })
    }
}
