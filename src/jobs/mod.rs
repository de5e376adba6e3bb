//! Transcript job queue and worker.
//!
//! The seam between the webhook path and the transcript pipeline. Delivery is
//! at-least-once: a job is retried up to a bounded attempt count with backoff,
//! and the pipeline's idempotency guard makes re-delivery safe. A terminal
//! pipeline error stops retrying immediately; exhausting attempts leaves the
//! meeting parked in `processing` for manual intervention.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::pipeline::TranscriptPipeline;

const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Internal "transcript ready" event.
#[derive(Debug, Clone)]
pub struct TranscriptReady {
    pub meeting_id: String,
    pub transcript_url: String,
}

/// Cloneable producer handle held by the lifecycle machine.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<TranscriptReady>,
}

impl JobQueue {
    pub fn new(tx: mpsc::Sender<TranscriptReady>) -> Self {
        Self { tx }
    }

    pub async fn enqueue(&self, job: TranscriptReady) -> bool {
        match self.tx.send(job).await {
            Ok(()) => true,
            Err(e) => {
                error!("Transcript job queue closed, dropping job: {}", e);
                false
            }
        }
    }
}

/// Worker that drains the queue and drives the pipeline.
pub struct JobRunner {
    rx: mpsc::Receiver<TranscriptReady>,
    pipeline: TranscriptPipeline,
    attempts: u32,
}

/// Build a connected queue/runner pair.
pub fn channel(pipeline: TranscriptPipeline, attempts: u32) -> (JobQueue, JobRunner) {
    let (tx, rx) = mpsc::channel(64);
    (
        JobQueue::new(tx),
        JobRunner {
            rx,
            pipeline,
            attempts: attempts.max(1),
        },
    )
}

impl JobRunner {
    pub async fn run(mut self) {
        info!("Transcript job runner started");
        while let Some(job) = self.rx.recv().await {
            self.deliver(job).await;
        }
        info!("Transcript job runner stopped");
    }

    async fn deliver(&self, job: TranscriptReady) {
        for attempt in 1..=self.attempts {
            match self
                .pipeline
                .process(&job.meeting_id, &job.transcript_url)
                .await
            {
                Ok(outcome) => {
                    info!(
                        "Transcript job for meeting {} done on attempt {}: {:?}",
                        job.meeting_id, attempt, outcome
                    );
                    return;
                }
                Err(e) if e.is_terminal() => {
                    error!(
                        "Transcript job for meeting {} failed terminally: {}",
                        job.meeting_id, e
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        "Transcript job for meeting {} failed (attempt {}/{}): {}",
                        job.meeting_id, attempt, self.attempts, e
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        // Accepted failure mode: meeting stays in `processing`
        error!(
            "Transcript job for meeting {} abandoned after {} attempts",
            job.meeting_id, self.attempts
        );
    }

    #[cfg(test)]
    pub(crate) async fn deliver_once(&self, job: TranscriptReady) {
        self.deliver(job).await;
    }
}
