//! Outbound call-control commands to the video platform.
//!
//! The lifecycle machine treats these as best-effort side effects: the store
//! transition is the source of truth, and a failed command never rolls a
//! committed transition back.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A member registered on a call at creation time.
#[derive(Debug, Clone, Serialize)]
pub struct CallMember {
    pub user_id: String,
    pub role: String,
}

impl CallMember {
    /// Admin role guarantees the agent join rights on the call.
    pub fn admin(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            role: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    pub r#type: String,
    pub threshold: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Realtime voice session options, passed through to the platform verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeSessionOptions {
    pub voice: String,
    pub turn_detection: TurnDetection,
    pub input_audio_transcription: InputAudioTranscription,
}

impl Default for RealtimeSessionOptions {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            turn_detection: TurnDetection {
                r#type: "server_vad".to_string(),
                threshold: 0.5,
            },
            input_audio_transcription: InputAudioTranscription {
                model: "whisper-1".to_string(),
            },
        }
    }
}

/// Commands the lifecycle machine issues against the video platform.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Ensure the call exists with the given members registered.
    async fn get_or_create_call(
        &self,
        call_type: &str,
        call_id: &str,
        members: &[CallMember],
    ) -> Result<()>;

    /// Bridge an AI voice session into the call with the given instructions.
    async fn connect_agent(
        &self,
        call_type: &str,
        call_id: &str,
        agent_user_id: &str,
        instructions: &str,
        options: &RealtimeSessionOptions,
    ) -> Result<()>;

    /// End the call for everyone.
    async fn end_call(&self, call_type: &str, call_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    code: Option<i64>,
}

/// HTTP client for the video platform's call API.
pub struct VideoApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VideoApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&text) {
                anyhow::bail!(
                    "Video API error {}: {} (code: {:?})",
                    status,
                    err.message.unwrap_or_default(),
                    err.code
                );
            }
            anyhow::bail!("Video API request failed with status {}: {}", status, text);
        }

        Ok(())
    }
}

#[async_trait]
impl CallControl for VideoApiClient {
    async fn get_or_create_call(
        &self,
        call_type: &str,
        call_id: &str,
        members: &[CallMember],
    ) -> Result<()> {
        self.post(
            &format!("call/{}/{}", call_type, call_id),
            serde_json::json!({ "data": { "members": members } }),
        )
        .await?;

        info!("Call {}:{} ensured with {} member(s)", call_type, call_id, members.len());
        Ok(())
    }

    async fn connect_agent(
        &self,
        call_type: &str,
        call_id: &str,
        agent_user_id: &str,
        instructions: &str,
        options: &RealtimeSessionOptions,
    ) -> Result<()> {
        self.post(
            &format!("call/{}/{}/connect_agent", call_type, call_id),
            serde_json::json!({
                "agent_user_id": agent_user_id,
                "instructions": instructions,
                "session": options,
            }),
        )
        .await?;

        info!("Agent {} bridged into call {}:{}", agent_user_id, call_type, call_id);
        Ok(())
    }

    async fn end_call(&self, call_type: &str, call_id: &str) -> Result<()> {
        self.post(
            &format!("call/{}/{}/mark_ended", call_type, call_id),
            serde_json::json!({}),
        )
        .await?;

        info!("Call {}:{} ended", call_type, call_id);
        Ok(())
    }
}
