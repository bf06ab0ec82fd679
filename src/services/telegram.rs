use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Clone)]
pub(crate) struct TelegramClient {
    client: Client,
    token: String,
    api_base: String,
}

#[derive(Debug, Error)]
pub(crate) enum TelegramError {
    /// The referenced file or chat does not exist; retrying cannot help.
    #[error("telegram rejected the request: {0}")]
    Rejected(String),
    /// Network-level or upstream failure; retryable.
    #[error("telegram transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Deserialize)]
struct TgGetFileResponse {
    ok: bool,
    result: Option<TgFile>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgSendMessageResponse {
    ok: bool,
    result: Option<TgMessage>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
}

impl TelegramClient {
    /// `None` when no bot token is configured (API-upload-only deployments).
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.telegram().bot_token.is_empty() {
            return Ok(None);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Some(Self {
            client,
            token: settings.telegram().bot_token.clone(),
            api_base: settings.telegram().api_base.trim_end_matches('/').to_string(),
        }))
    }

    pub(crate) async fn get_file_bytes(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let response = self
            .client
            .get(format!("{}/bot{}/getFile", self.api_base, self.token))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|err| TelegramError::Transport(err.to_string()))?;

        let payload: TgGetFileResponse =
            response.json().await.map_err(|err| TelegramError::Transport(err.to_string()))?;

        if !payload.ok {
            return Err(TelegramError::Rejected(
                payload.description.unwrap_or_else(|| "getFile returned ok=false".to_string()),
            ));
        }

        let file_path = payload
            .result
            .and_then(|file| file.file_path)
            .ok_or_else(|| TelegramError::Rejected("getFile missing file_path".to_string()))?;

        let response = self
            .client
            .get(format!("{}/file/bot{}/{}", self.api_base, self.token, file_path))
            .send()
            .await
            .map_err(|err| TelegramError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(TelegramError::Transport(format!(
                "file download returned {}",
                response.status()
            )));
        }

        let bytes =
            response.bytes().await.map_err(|err| TelegramError::Transport(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Send feedback text; returns the external message id for the delivery
    /// audit row.
    pub(crate) async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
    ) -> Result<String, TelegramError> {
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|err| TelegramError::Transport(err.to_string()))?;

        let payload: TgSendMessageResponse =
            response.json().await.map_err(|err| TelegramError::Transport(err.to_string()))?;

        if !payload.ok {
            return Err(TelegramError::Rejected(
                payload
                    .description
                    .unwrap_or_else(|| "sendMessage returned ok=false".to_string()),
            ));
        }

        let message = payload.result.ok_or_else(|| {
            TelegramError::Rejected("sendMessage returned ok without a message".to_string())
        })?;

        Ok(message.message_id.to_string())
    }
}
