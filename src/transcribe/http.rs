// HTTP speech-to-text backend.
//
// Posts base64-encoded segment audio as JSON to a configured endpoint and
// expects `{"text": "..."}` back. Transient failures are retried with
// exponential backoff inside the call; whatever escapes here is swallowed by
// the dispatcher.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::Transcriber;
use crate::config::TranscriptionConfig;

#[derive(Debug, Clone)]
pub struct HttpTranscriberConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl HttpTranscriberConfig {
    /// Build from the pipeline config; fails when no endpoint is configured.
    pub fn from_pipeline(config: &TranscriptionConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .context("no transcription endpoint configured")?;
        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct HttpTranscriber {
    client: reqwest::Client,
    config: HttpTranscriberConfig,
}

impl HttpTranscriber {
    pub fn new(config: HttpTranscriberConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    async fn request_once(
        &self,
        audio_base64: &str,
        mime_type: &str,
        language_hint: &str,
    ) -> Result<String> {
        let body = json!({
            "audio": audio_base64,
            "mime_type": mime_type,
            "language": language_hint,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("transcription endpoint returned {status}: {detail}");
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("failed to parse transcription response")?;
        Ok(parsed.text)
    }
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio_base64: &str,
        mime_type: &str,
        language_hint: &str,
    ) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .request_once(audio_base64, mime_type, language_hint)
                .await
            {
                Ok(text) => return Ok(text),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(err).with_context(|| {
                            format!("transcription failed after {attempt} attempts")
                        });
                    }
                    let delay = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "transcription attempt {attempt}/{} failed ({err:#}), retrying in {:?}",
                        self.config.max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
