use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Summarizer;

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
    domain: &'a str,
    output_format: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: String,
}

/// Fallback summarization provider.
pub struct SarvamSummarizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SarvamSummarizer {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Summarizer for SarvamSummarizer {
    fn name(&self) -> &'static str {
        "Sarvam"
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        let url = format!("{}/summarize", self.base_url);
        debug!("Summarizing {} chars via Sarvam", transcript.len());

        let body = SummarizeRequest {
            text: transcript,
            domain: "meeting",
            output_format: "bullet",
            language: "en-IN",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Sarvam")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Sarvam request failed with status {}: {}", status, text);
        }

        let parsed: SummarizeResponse = response
            .json()
            .await
            .context("Failed to parse Sarvam response")?;

        if parsed.summary.trim().is_empty() {
            anyhow::bail!("Sarvam response contained no summary");
        }

        info!("Summary produced: {} chars", parsed.summary.len());
        Ok(parsed.summary.trim().to_string())
    }
}
