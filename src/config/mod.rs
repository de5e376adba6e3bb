use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub video: VideoConfig,
    pub summarizer: SummarizerConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret for verifying the call platform's x-signature header.
    pub secret: String,
    /// Disable only in non-production environments.
    pub verify_signatures: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub base_url: String,
    pub api_key: String,
    /// Call type used when the webhook payload does not carry one.
    pub call_type: String,
    /// Wait after call creation before requesting the realtime agent
    /// connection, so the platform backend has converged.
    pub agent_join_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub sarvam_api_key: String,
    pub sarvam_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Transcript character budget before summarization.
    pub max_transcript_chars: usize,
    /// Attempts per transcript job before it is abandoned.
    pub job_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 4720,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            verify_signatures: true,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://video.example.com/api/v2".to_string(),
            api_key: String::new(),
            call_type: "default".to_string(),
            agent_join_delay_ms: 1000,
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            sarvam_api_key: String::new(),
            sarvam_base_url: "https://api.sarvam.ai".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_transcript_chars: 15_000,
            job_attempts: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config.with_env_fallbacks());
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config.with_env_fallbacks())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Reject configurations that cannot work as configured. An empty secret
    /// with verification enabled would HMAC over an empty key, which any
    /// sender can forge.
    pub fn validate(&self) -> Result<()> {
        if self.webhook.verify_signatures && self.webhook.secret.is_empty() {
            anyhow::bail!(
                "Webhook signature verification is enabled but no secret is set; \
                 configure [webhook].secret or WEBHOOK_SECRET, or disable \
                 verify_signatures for non-production use"
            );
        }
        Ok(())
    }

    /// Fill empty secrets from the environment.
    fn with_env_fallbacks(mut self) -> Self {
        fill_from_env(&mut self.webhook.secret, "WEBHOOK_SECRET");
        fill_from_env(&mut self.video.api_key, "VIDEO_API_KEY");
        fill_from_env(&mut self.summarizer.openai_api_key, "OPENAI_API_KEY");
        fill_from_env(&mut self.summarizer.sarvam_api_key, "SARVAM_API_KEY");
        self
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty() {
        if let Ok(value) = std::env::var(var) {
            *slot = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4720);
        assert!(config.webhook.verify_signatures);
        assert_eq!(config.pipeline.max_transcript_chars, 15_000);
        assert_eq!(config.pipeline.job_attempts, 3);
        assert_eq!(config.video.agent_join_delay_ms, 1000);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [webhook]
            secret = "s3cret"
            verify_signatures = false
            "#,
        )
        .unwrap();

        assert_eq!(config.webhook.secret, "s3cret");
        assert!(!config.webhook.verify_signatures);
        assert_eq!(config.summarizer.openai_model, "gpt-4o-mini");
    }

    #[test]
    fn test_validate_rejects_verification_without_secret() {
        let config = Config::default();
        assert!(config.webhook.verify_signatures);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_secret_or_disabled_verification() {
        let mut config = Config::default();
        config.webhook.secret = "s3cret".to_string();
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.webhook.verify_signatures = false;
        assert!(config.validate().is_ok());
    }
}
