//! Transcript processing pipeline.
//!
//! Runs once a transcript artifact is ready: load + idempotency guard, fetch,
//! summarize, finalize. The runner delivering jobs retries with at-least-once
//! semantics, so every step is safe to re-execute from scratch; the guard in
//! step 1 and the absolute finalize write are what make that true.

pub mod transcript;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::meetings::{MeetingRepository, MeetingStatus};
use crate::db::Database;
use crate::summarize::Summarizer;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Terminal: retrying will never succeed.
    #[error("Meeting {0} not found")]
    MeetingNotFound(String),
    #[error("Transcript fetch failed: {0}")]
    TranscriptFetch(#[source] anyhow::Error),
    #[error("Summarization failed: {0}")]
    Summarize(#[source] anyhow::Error),
    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MeetingNotFound(_))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    /// Guard short-circuit: the meeting was already finalized.
    AlreadyProcessed,
}

/// Fetches a transcript artifact body.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP transcript fetcher.
pub struct HttpTranscriptSource {
    client: reqwest::Client,
}

impl HttpTranscriptSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTranscriptSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to request transcript artifact")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Transcript fetch returned status {}", status);
        }

        response.text().await.context("Failed to read transcript body")
    }
}

pub struct TranscriptPipeline {
    db: Database,
    source: Box<dyn TranscriptSource>,
    summarizers: Vec<Box<dyn Summarizer>>,
    max_transcript_chars: usize,
}

impl TranscriptPipeline {
    pub fn new(
        db: Database,
        source: Box<dyn TranscriptSource>,
        summarizers: Vec<Box<dyn Summarizer>>,
        max_transcript_chars: usize,
    ) -> Self {
        Self {
            db,
            source,
            summarizers,
            max_transcript_chars,
        }
    }

    /// Run the pipeline for one meeting.
    pub async fn process(
        &self,
        meeting_id: &str,
        transcript_url: &str,
    ) -> Result<PipelineOutcome, PipelineError> {
        // Step 1: load + idempotency guard
        let meeting = {
            let db = self.db.clone();
            let id = meeting_id.to_string();
            tokio::task::spawn_blocking(move || {
                let conn = db.lock();
                MeetingRepository::get(&conn, &id)
            })
            .await
            .context("Meeting load task failed")
            .map_err(PipelineError::Storage)?
            .map_err(PipelineError::Storage)?
        };

        let Some(meeting) = meeting else {
            return Err(PipelineError::MeetingNotFound(meeting_id.to_string()));
        };

        if meeting.transcript_processed || meeting.status == MeetingStatus::Completed {
            info!("Meeting {} already processed, skipping", meeting_id);
            return Ok(PipelineOutcome::AlreadyProcessed);
        }

        // Step 2: fetch transcript
        let raw = self
            .source
            .fetch(transcript_url)
            .await
            .map_err(PipelineError::TranscriptFetch)?;

        let text = transcript::extract_text(&raw);
        let text = transcript::truncate_chars(&text, self.max_transcript_chars);
        info!(
            "Meeting {} transcript fetched: {} chars after budget",
            meeting_id,
            text.len()
        );

        // Step 3: summarize, first provider to succeed wins
        let summary = self.summarize(text).await.map_err(PipelineError::Summarize)?;

        // Step 4: finalize — absolute state, safe under re-delivery
        {
            let db = self.db.clone();
            let id = meeting_id.to_string();
            let summary = summary.clone();
            tokio::task::spawn_blocking(move || {
                let conn = db.lock();
                MeetingRepository::finalize(&conn, &id, &summary)
            })
            .await
            .context("Finalize task failed")
            .map_err(PipelineError::Storage)?
            .map_err(PipelineError::Storage)?;
        }

        info!("Meeting {} completed: summary {} chars", meeting_id, summary.len());
        Ok(PipelineOutcome::Completed)
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        let mut last_err = None;
        for provider in &self.summarizers {
            match provider.summarize(transcript).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    warn!("Summarizer {} failed: {}", provider.name(), e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("No summarization providers configured")))
    }
}
