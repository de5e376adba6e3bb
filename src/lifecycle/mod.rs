//! Meeting lifecycle state machine.
//!
//! Each webhook event maps to a conditional status transition in the store;
//! the affected-row count from that single UPDATE is the race gate. Whichever
//! delivery wins performs the call-control side effects; every loser treats
//! "zero rows" as success-no-op. Side-effect failures are logged and never
//! roll back a committed transition.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::callcontrol::{CallControl, CallMember, RealtimeSessionOptions};
use crate::db::agents::AgentRepository;
use crate::db::meetings::MeetingRepository;
use crate::db::Database;
use crate::jobs::{JobQueue, TranscriptReady};
use crate::webhook::{EventKind, InboundEvent};

/// What a handler did with an event. Both variants are HTTP-level success.
#[derive(Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The transition (or field update) was applied by this delivery.
    Applied,
    /// Nothing to do: race lost, precondition unmet, or ignorable kind.
    Noop(&'static str),
}

impl HandlerOutcome {
    /// Status string reported back to the platform: `"ok"` when the delivery
    /// applied, otherwise the no-op reason (e.g. `"already active"` for the
    /// losing side of a concurrent start).
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Applied => "ok",
            Self::Noop(reason) => *reason,
        }
    }
}

pub struct MeetingLifecycle {
    db: Database,
    call_control: Arc<dyn CallControl>,
    jobs: JobQueue,
    agent_join_delay: Duration,
}

impl MeetingLifecycle {
    pub fn new(
        db: Database,
        call_control: Arc<dyn CallControl>,
        jobs: JobQueue,
        agent_join_delay: Duration,
    ) -> Self {
        Self {
            db,
            call_control,
            jobs,
            agent_join_delay,
        }
    }

    /// Dispatch a parsed webhook event to its transition handler.
    pub async fn handle(&self, event: InboundEvent) -> Result<HandlerOutcome> {
        let meeting_id = event.meeting_id.clone();
        let call_type = event.call_type.clone();

        match event.kind {
            EventKind::SessionStarted => self.session_started(&call_type, &meeting_id).await,
            EventKind::ParticipantLeft { user_id } => {
                self.participant_left(&call_type, &meeting_id, user_id.as_deref())
                    .await
            }
            EventKind::SessionEnded => self.session_ended(&meeting_id).await,
            EventKind::TranscriptionReady { url } => {
                self.transcription_ready(&meeting_id, url.as_deref()).await
            }
            EventKind::RecordingReady { url } => {
                self.recording_ready(&meeting_id, url.as_deref()).await
            }
            EventKind::Unknown(kind) => {
                info!("Ignoring unknown event kind '{}' for meeting {}", kind, meeting_id);
                Ok(HandlerOutcome::Noop("unknown event kind"))
            }
        }
    }

    /// `call.session_started`: conditional `upcoming -> active`, then a
    /// best-effort agent join.
    async fn session_started(&self, call_type: &str, meeting_id: &str) -> Result<HandlerOutcome> {
        let won = self
            .with_conn({
                let id = meeting_id.to_string();
                move |conn| MeetingRepository::start_if_upcoming(conn, &id, Utc::now())
            })
            .await?;

        if !won {
            // Already active, cancelled, completed, or unknown id. The single-
            // join guarantee lives here: only the winning delivery continues.
            info!("Meeting {} not in upcoming state, skipping start", meeting_id);
            return Ok(HandlerOutcome::Noop("already active"));
        }

        info!("Meeting {} is now active", meeting_id);

        let agent = self
            .with_conn({
                let id = meeting_id.to_string();
                move |conn| {
                    let meeting = MeetingRepository::get(conn, &id)?
                        .context("Meeting row vanished after transition")?;
                    AgentRepository::get(conn, &meeting.agent_id)
                }
            })
            .await?;

        let Some(agent) = agent else {
            warn!("Meeting {} has no agent row, running without assistant", meeting_id);
            return Ok(HandlerOutcome::Applied);
        };

        if agent.instructions.is_empty() {
            info!(
                "Agent {} has no instructions, skipping join for meeting {}",
                agent.id, meeting_id
            );
            return Ok(HandlerOutcome::Applied);
        }

        // Degraded-mode on failure: the meeting is genuinely active whether or
        // not the assistant makes it into the call.
        if let Err(e) = self
            .join_agent(call_type, meeting_id, &agent.id, &agent.instructions)
            .await
        {
            error!("Agent join failed for meeting {}: {:#}", meeting_id, e);
        }

        Ok(HandlerOutcome::Applied)
    }

    async fn join_agent(
        &self,
        call_type: &str,
        call_id: &str,
        agent_id: &str,
        instructions: &str,
    ) -> Result<()> {
        self.call_control
            .get_or_create_call(call_type, call_id, &[CallMember::admin(agent_id)])
            .await?;

        // Let the platform backend converge before the realtime connect. A
        // pragmatic wait; the conditional update above is the actual gate.
        tokio::time::sleep(self.agent_join_delay).await;

        self.call_control
            .connect_agent(
                call_type,
                call_id,
                agent_id,
                instructions,
                &RealtimeSessionOptions::default(),
            )
            .await
    }

    /// `call.session_participant_left`: only a human leaving ends the
    /// meeting; the agent dropping off is not a termination signal.
    async fn participant_left(
        &self,
        call_type: &str,
        meeting_id: &str,
        left_user_id: Option<&str>,
    ) -> Result<HandlerOutcome> {
        let meeting = self
            .with_conn({
                let id = meeting_id.to_string();
                move |conn| MeetingRepository::get(conn, &id)
            })
            .await?;

        let Some(meeting) = meeting else {
            return Ok(HandlerOutcome::Noop("unknown meeting"));
        };

        if left_user_id == Some(meeting.agent_id.as_str()) {
            info!("Agent left meeting {}, no transition", meeting_id);
            return Ok(HandlerOutcome::Noop("agent left"));
        }

        let won = self
            .with_conn({
                let id = meeting_id.to_string();
                move |conn| MeetingRepository::end_if_active(conn, &id, Utc::now())
            })
            .await?;

        if !won {
            return Ok(HandlerOutcome::Noop("not active"));
        }

        info!("Meeting {} is now processing", meeting_id);

        // Best-effort; the call may already be winding down on its own.
        if let Err(e) = self.call_control.end_call(call_type, meeting_id).await {
            warn!("End-call failed for meeting {}: {:#}", meeting_id, e);
        }

        Ok(HandlerOutcome::Applied)
    }

    /// `call.session_ended` / `call.ended`: alternate processing trigger.
    /// The call is already over, so no end-call command is issued.
    async fn session_ended(&self, meeting_id: &str) -> Result<HandlerOutcome> {
        let won = self
            .with_conn({
                let id = meeting_id.to_string();
                move |conn| MeetingRepository::end_if_active(conn, &id, Utc::now())
            })
            .await?;

        if won {
            info!("Meeting {} is now processing (session ended)", meeting_id);
            Ok(HandlerOutcome::Applied)
        } else {
            Ok(HandlerOutcome::Noop("not active"))
        }
    }

    /// `call.transcription_ready`: store the artifact URL and hand the
    /// meeting to the transcript pipeline. Duplicate deliveries were already
    /// filtered by the dedup ledger, so one delivery means one job.
    async fn transcription_ready(
        &self,
        meeting_id: &str,
        url: Option<&str>,
    ) -> Result<HandlerOutcome> {
        let Some(url) = url else {
            warn!("transcription_ready for meeting {} without a url", meeting_id);
            return Ok(HandlerOutcome::Noop("no transcript url"));
        };

        self.with_conn({
            let id = meeting_id.to_string();
            let url = url.to_string();
            move |conn| MeetingRepository::set_transcript_url(conn, &id, &url)
        })
        .await?;

        info!("Meeting {} transcript ready: {}", meeting_id, url);

        self.jobs
            .enqueue(TranscriptReady {
                meeting_id: meeting_id.to_string(),
                transcript_url: url.to_string(),
            })
            .await;

        Ok(HandlerOutcome::Applied)
    }

    /// `call.recording_ready`: store the artifact URL.
    async fn recording_ready(
        &self,
        meeting_id: &str,
        url: Option<&str>,
    ) -> Result<HandlerOutcome> {
        let Some(url) = url else {
            warn!("recording_ready for meeting {} without a url", meeting_id);
            return Ok(HandlerOutcome::Noop("no recording url"));
        };

        self.with_conn({
            let id = meeting_id.to_string();
            let url = url.to_string();
            move |conn| MeetingRepository::set_recording_url(conn, &id, &url)
        })
        .await?;

        info!("Meeting {} recording ready: {}", meeting_id, url);
        Ok(HandlerOutcome::Applied)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock();
            f(&conn)
        })
        .await
        .context("Database task failed")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::meetings::{MeetingStatus, NewMeeting};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Records every command; optionally fails all of them.
    struct RecordingControl {
        commands: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingControl {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                commands: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }

        fn record(&self, cmd: String) -> Result<()> {
            self.commands.lock().unwrap().push(cmd);
            if self.fail {
                anyhow::bail!("platform unavailable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CallControl for RecordingControl {
        async fn get_or_create_call(
            &self,
            call_type: &str,
            call_id: &str,
            members: &[CallMember],
        ) -> Result<()> {
            self.record(format!(
                "create {}:{} members={}",
                call_type,
                call_id,
                members.iter().map(|m| m.user_id.as_str()).collect::<Vec<_>>().join(",")
            ))
        }

        async fn connect_agent(
            &self,
            call_type: &str,
            call_id: &str,
            agent_user_id: &str,
            _instructions: &str,
            _options: &RealtimeSessionOptions,
        ) -> Result<()> {
            self.record(format!("connect {}:{} agent={}", call_type, call_id, agent_user_id))
        }

        async fn end_call(&self, call_type: &str, call_id: &str) -> Result<()> {
            self.record(format!("end {}:{}", call_type, call_id))
        }
    }

    struct Fixture {
        db: Database,
        control: Arc<RecordingControl>,
        lifecycle: MeetingLifecycle,
        jobs_rx: mpsc::Receiver<TranscriptReady>,
    }

    fn fixture(fail_control: bool) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let control = RecordingControl::new(fail_control);
        let (tx, jobs_rx) = mpsc::channel(8);
        let lifecycle = MeetingLifecycle::new(
            db.clone(),
            control.clone(),
            JobQueue::new(tx),
            Duration::ZERO,
        );
        Fixture {
            db,
            control,
            lifecycle,
            jobs_rx,
        }
    }

    fn seed(db: &Database, meeting_id: &str, instructions: &str) {
        let conn = db.lock();
        AgentRepository::insert(&conn, "agent-1", "user-1", "Notetaker", instructions).unwrap();
        MeetingRepository::insert(
            &conn,
            &NewMeeting {
                id: meeting_id.to_string(),
                owner_user_id: "user-1".to_string(),
                agent_id: "agent-1".to_string(),
                name: "Standup".to_string(),
            },
        )
        .unwrap();
    }

    fn status(db: &Database, id: &str) -> MeetingStatus {
        let conn = db.lock();
        MeetingRepository::get(&conn, id).unwrap().unwrap().status
    }

    fn started(meeting_id: &str) -> InboundEvent {
        InboundEvent::parse(
            &format!(r#"{{"type":"call.session_started","call":{{"id":"{meeting_id}"}}}}"#),
            "default",
        )
        .unwrap()
    }

    #[test]
    fn test_outcome_status_labels() {
        assert_eq!(HandlerOutcome::Applied.status_label(), "ok");
        assert_eq!(
            HandlerOutcome::Noop("already active").status_label(),
            "already active"
        );
    }

    #[tokio::test]
    async fn test_session_started_joins_agent_once() {
        let f = fixture(false);
        seed(&f.db, "m1", "Take notes.");

        let outcome = f.lifecycle.handle(started("m1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Active);
        assert_eq!(
            f.control.commands(),
            vec![
                "create default:m1 members=agent-1".to_string(),
                "connect default:m1 agent=agent-1".to_string(),
            ]
        );

        // Redelivery: race lost, no second join
        let outcome = f.lifecycle.handle(started("m1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Noop("already active"));
        assert_eq!(f.control.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_session_started_without_instructions_skips_join() {
        let f = fixture(false);
        seed(&f.db, "m1", "");

        let outcome = f.lifecycle.handle(started("m1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Active);
        assert!(f.control.commands().is_empty());
    }

    #[tokio::test]
    async fn test_join_failure_does_not_roll_back_transition() {
        let f = fixture(true);
        seed(&f.db, "m1", "Take notes.");

        let outcome = f.lifecycle.handle(started("m1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Active);
    }

    #[tokio::test]
    async fn test_unknown_meeting_start_is_noop() {
        let f = fixture(false);
        let outcome = f.lifecycle.handle(started("ghost")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Noop("already active"));
        assert!(f.control.commands().is_empty());
    }

    fn left(meeting_id: &str, user_id: &str) -> InboundEvent {
        InboundEvent::parse(
            &format!(
                r#"{{"type":"call.session_participant_left","call_cid":"default:{meeting_id}",
                    "participant":{{"user_id":"{user_id}"}}}}"#
            ),
            "default",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_human_leaving_ends_meeting() {
        let f = fixture(false);
        seed(&f.db, "m1", "Take notes.");
        f.lifecycle.handle(started("m1")).await.unwrap();

        let outcome = f.lifecycle.handle(left("m1", "user-1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Processing);
        assert!(f.control.commands().contains(&"end default:m1".to_string()));
    }

    #[tokio::test]
    async fn test_agent_leaving_is_not_a_termination_signal() {
        let f = fixture(false);
        seed(&f.db, "m1", "Take notes.");
        f.lifecycle.handle(started("m1")).await.unwrap();

        let outcome = f.lifecycle.handle(left("m1", "agent-1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Noop("agent left"));
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Active);
    }

    #[tokio::test]
    async fn test_participant_left_before_start_never_regresses() {
        let f = fixture(false);
        seed(&f.db, "m1", "Take notes.");

        let outcome = f.lifecycle.handle(left("m1", "user-1")).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Noop("not active"));
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Upcoming);
        // No end-call for a race loss
        assert!(f.control.commands().is_empty());
    }

    #[tokio::test]
    async fn test_session_ended_transitions_without_end_call() {
        let f = fixture(false);
        seed(&f.db, "m1", "");
        f.lifecycle.handle(started("m1")).await.unwrap();

        let event = InboundEvent::parse(
            r#"{"type":"call.session_ended","call":{"id":"m1"}}"#,
            "default",
        )
        .unwrap();
        let outcome = f.lifecycle.handle(event).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Processing);
        assert!(!f.control.commands().iter().any(|c| c.starts_with("end")));
    }

    #[tokio::test]
    async fn test_transcription_ready_stores_url_and_enqueues_job() {
        let mut f = fixture(false);
        seed(&f.db, "m1", "");

        let event = InboundEvent::parse(
            r#"{"type":"call.transcription_ready","call_cid":"default:m1",
                "transcription":{"url":"https://cdn/t.json"}}"#,
            "default",
        )
        .unwrap();
        let outcome = f.lifecycle.handle(event).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Applied);

        {
            let conn = f.db.lock();
            let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
            assert_eq!(meeting.transcript_url.as_deref(), Some("https://cdn/t.json"));
        }

        let job = f.jobs_rx.recv().await.unwrap();
        assert_eq!(job.meeting_id, "m1");
        assert_eq!(job.transcript_url, "https://cdn/t.json");
        // Exactly one job per delivery
        assert!(f.jobs_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recording_ready_stores_url() {
        let f = fixture(false);
        seed(&f.db, "m1", "");

        let event = InboundEvent::parse(
            r#"{"type":"call.recording_ready","call_cid":"default:m1",
                "recording":{"url":"https://cdn/r.mp4"}}"#,
            "default",
        )
        .unwrap();
        f.lifecycle.handle(event).await.unwrap();

        let conn = f.db.lock();
        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.recording_url.as_deref(), Some("https://cdn/r.mp4"));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_acknowledged_and_ignored() {
        let f = fixture(false);
        seed(&f.db, "m1", "Take notes.");

        let event = InboundEvent::parse(
            r#"{"type":"call.reaction_new","call":{"id":"m1"}}"#,
            "default",
        )
        .unwrap();
        let outcome = f.lifecycle.handle(event).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Noop("unknown event kind"));
        assert_eq!(status(&f.db, "m1"), MeetingStatus::Upcoming);
    }
}
