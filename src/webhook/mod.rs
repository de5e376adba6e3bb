//! Inbound call-platform event parsing.
//!
//! The platform sends several payload shapes over time; this module
//! normalizes them into an [`InboundEvent`] carrying a canonical meeting id,
//! the call type, the platform-assigned event id (when present), and a typed
//! [`EventKind`]. Unknown kinds are preserved as `Unknown` so the dispatcher
//! can acknowledge and ignore them.

pub mod signature;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Bad JSON")]
    BadJson(#[from] serde_json::Error),
    #[error("No meeting id in payload")]
    MissingMeetingId,
}

/// Typed event kinds the lifecycle machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SessionStarted,
    ParticipantLeft { user_id: Option<String> },
    SessionEnded,
    TranscriptionReady { url: Option<String> },
    RecordingReady { url: Option<String> },
    Unknown(String),
}

/// A normalized inbound webhook event.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Platform-assigned event id; the dedup key when present.
    pub event_id: Option<String>,
    pub kind: EventKind,
    pub call_type: String,
    /// Canonical meeting id; doubles as the platform call id.
    pub meeting_id: String,
}

impl InboundEvent {
    /// Parse a raw webhook body.
    ///
    /// The meeting id may arrive as `call.id`, as the second half of a
    /// `call_cid` ("type:id") composite, or echoed back in
    /// `call.custom.meetingId` from call creation.
    pub fn parse(raw_body: &str, default_call_type: &str) -> Result<Self, ParseError> {
        let payload: Value = serde_json::from_str(raw_body)?;

        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let event_id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let cid = payload.get("call_cid").and_then(Value::as_str);

        let meeting_id = payload
            .pointer("/call/id")
            .and_then(Value::as_str)
            .or_else(|| cid.map(strip_call_type))
            .or_else(|| payload.pointer("/call/custom/meetingId").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::MissingMeetingId)?
            .to_string();

        let call_type = payload
            .pointer("/call/type")
            .and_then(Value::as_str)
            .or_else(|| cid.and_then(|c| c.split_once(':').map(|(t, _)| t)))
            .filter(|t| !t.is_empty())
            .unwrap_or(default_call_type)
            .to_string();

        let kind = match event_type.as_str() {
            "call.session_started" => EventKind::SessionStarted,
            "call.session_participant_left" => EventKind::ParticipantLeft {
                user_id: payload
                    .pointer("/participant/user_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "call.session_ended" | "call.ended" => EventKind::SessionEnded,
            "call.transcription_ready" => EventKind::TranscriptionReady {
                url: payload
                    .pointer("/transcription/url")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "call.recording_ready" => EventKind::RecordingReady {
                url: payload
                    .pointer("/recording/url")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            other => EventKind::Unknown(other.to_string()),
        };

        Ok(Self {
            event_id,
            kind,
            call_type,
            meeting_id,
        })
    }

    /// Event type string, for the dedup ledger's audit column.
    pub fn type_str(&self) -> &str {
        match &self.kind {
            EventKind::SessionStarted => "call.session_started",
            EventKind::ParticipantLeft { .. } => "call.session_participant_left",
            EventKind::SessionEnded => "call.session_ended",
            EventKind::TranscriptionReady { .. } => "call.transcription_ready",
            EventKind::RecordingReady { .. } => "call.recording_ready",
            EventKind::Unknown(s) => s,
        }
    }
}

fn strip_call_type(cid: &str) -> &str {
    match cid.split_once(':') {
        Some((_, id)) => id,
        None => cid,
    }
}
