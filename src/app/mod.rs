//! Service wiring.
//!
//! All collaborators are constructed here and injected explicitly — the
//! database handle, the call-platform client, and the job queue are
//! process-scoped values passed down, never ambient globals.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api::{ApiServer, ApiState};
use crate::callcontrol::VideoApiClient;
use crate::config::Config;
use crate::db::Database;
use crate::global;
use crate::jobs;
use crate::lifecycle::MeetingLifecycle;
use crate::pipeline::{HttpTranscriptSource, TranscriptPipeline};
use crate::summarize::build_summarizers;

pub async fn run_service() -> Result<()> {
    info!("Starting colloquy service");

    let config = Config::load()?;
    config.validate()?;
    let db = Database::open(&global::db_file()?)?;

    let call_control = Arc::new(VideoApiClient::new(
        &config.video.base_url,
        &config.video.api_key,
    ));

    let pipeline = TranscriptPipeline::new(
        db.clone(),
        Box::new(HttpTranscriptSource::new()),
        build_summarizers(&config.summarizer),
        config.pipeline.max_transcript_chars,
    );

    let (job_queue, job_runner) = jobs::channel(pipeline, config.pipeline.job_attempts);
    let runner_handle = tokio::spawn(job_runner.run());

    let lifecycle = Arc::new(MeetingLifecycle::new(
        db.clone(),
        call_control,
        job_queue,
        Duration::from_millis(config.video.agent_join_delay_ms),
    ));

    if !config.webhook.verify_signatures {
        info!("Webhook signature verification is DISABLED (non-production mode)");
    }

    let state = ApiState {
        db,
        lifecycle,
        webhook: config.webhook.clone(),
        default_call_type: config.video.call_type.clone(),
    };

    let server = ApiServer::new(&config.server.bind, config.server.port, state);
    let result = server.start().await;

    runner_handle.abort();
    result
}
