//! Transcript summarization providers.
//!
//! Providers are tried in order; the first success wins. The OpenAI
//! chat-completions provider is primary, with an optional Sarvam fallback.

mod openai;
mod sarvam;

use anyhow::Result;
use async_trait::async_trait;

pub use openai::OpenAiSummarizer;
pub use sarvam::SarvamSummarizer;

use crate::config::SummarizerConfig;

/// Instruction sent with every summarization request.
pub const SUMMARY_PROMPT: &str =
    "Analyze the transcript. 1) List speakers. 2) Provide a concise 3-sentence summary.";

/// A text-in/text-out summarization service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, transcript: &str) -> Result<String>;
}

/// Build the provider chain from config: OpenAI, then Sarvam if configured.
pub fn build_summarizers(config: &SummarizerConfig) -> Vec<Box<dyn Summarizer>> {
    let mut providers: Vec<Box<dyn Summarizer>> = vec![Box::new(OpenAiSummarizer::new(
        &config.openai_api_key,
        &config.openai_model,
    ))];

    if !config.sarvam_api_key.is_empty() {
        providers.push(Box::new(SarvamSummarizer::new(
            &config.sarvam_api_key,
            &config.sarvam_base_url,
        )));
    }

    providers
}
