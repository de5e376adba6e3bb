//! Meeting record persistence and lifecycle transitions.
//!
//! Status changes are single conditional UPDATE statements gated on the
//! expected prior status. The affected-row count is the race-free gate:
//! exactly one of any number of concurrent callers observes `true`, everyone
//! else gets a no-op. Never replace these with read-then-write logic.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a meeting.
///
/// Forward-only: `upcoming -> active -> processing -> completed`, with
/// `cancelled` reachable from `upcoming` by user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Upcoming,
    Active,
    Processing,
    Completed,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "active" => Ok(Self::Active),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => anyhow::bail!("Invalid meeting status: {}", s),
        }
    }
}

/// A meeting row.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub id: String,
    pub owner_user_id: String,
    pub agent_id: String,
    pub name: String,
    pub status: MeetingStatus,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub transcript_url: Option<String>,
    pub recording_url: Option<String>,
    pub transcript_processed: bool,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields required to create a meeting.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub id: String,
    pub owner_user_id: String,
    pub agent_id: String,
    pub name: String,
}

const MEETING_COLUMNS: &str = "id, owner_user_id, agent_id, name, status, started_at, ended_at, \
     transcript_url, recording_url, transcript_processed, summary, created_at, updated_at";

fn map_meeting(row: &Row<'_>) -> rusqlite::Result<MeetingRecord> {
    let status: String = row.get(4)?;
    Ok(MeetingRecord {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        agent_id: row.get(2)?,
        name: row.get(3)?,
        status: MeetingStatus::from_str(&status).map_err(|_| rusqlite::Error::InvalidQuery)?,
        started_at: row.get(5)?,
        ended_at: row.get(6)?,
        transcript_url: row.get(7)?,
        recording_url: row.get(8)?,
        transcript_processed: row.get::<_, i64>(9)? != 0,
        summary: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Repository for meeting records.
pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a new meeting (status = upcoming).
    pub fn insert(conn: &Connection, meeting: &NewMeeting) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO meetings (id, owner_user_id, agent_id, name, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'upcoming', ?5, ?5)",
            params![meeting.id, meeting.owner_user_id, meeting.agent_id, meeting.name, now],
        )
        .context("Failed to insert meeting")?;
        Ok(())
    }

    /// Get a meeting by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<MeetingRecord>> {
        conn.query_row(
            &format!("SELECT {MEETING_COLUMNS} FROM meetings WHERE id = ?1"),
            params![id],
            map_meeting,
        )
        .optional()
        .context("Failed to query meeting")
    }

    /// List a user's meetings, newest first.
    pub fn list_for_owner(
        conn: &Connection,
        owner_user_id: &str,
        limit: usize,
    ) -> Result<Vec<MeetingRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MEETING_COLUMNS} FROM meetings WHERE owner_user_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ))
            .context("Failed to prepare meetings list query")?;

        let rows = stmt
            .query_map(params![owner_user_id, limit as i64], map_meeting)
            .context("Failed to list meetings")?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    /// Conditional transition `upcoming -> active`, stamping `started_at`.
    /// Returns `true` iff this caller won the transition.
    pub fn start_if_upcoming(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE meetings SET status = 'active', started_at = ?2, updated_at = ?2 \
                 WHERE id = ?1 AND status = 'upcoming'",
                params![id, now.to_rfc3339()],
            )
            .context("Failed to mark meeting active")?;
        Ok(changed == 1)
    }

    /// Conditional transition `active -> processing`, stamping `ended_at`.
    pub fn end_if_active(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE meetings SET status = 'processing', ended_at = ?2, updated_at = ?2 \
                 WHERE id = ?1 AND status = 'active'",
                params![id, now.to_rfc3339()],
            )
            .context("Failed to mark meeting processing")?;
        Ok(changed == 1)
    }

    /// Conditional transition `upcoming -> cancelled` (user action).
    pub fn cancel_if_upcoming(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE meetings SET status = 'cancelled', updated_at = ?2 \
                 WHERE id = ?1 AND status = 'upcoming'",
                params![id, Utc::now().to_rfc3339()],
            )
            .context("Failed to cancel meeting")?;
        Ok(changed == 1)
    }

    /// Store the transcript artifact location. No status gate.
    pub fn set_transcript_url(conn: &Connection, id: &str, url: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET transcript_url = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, url, Utc::now().to_rfc3339()],
        )
        .context("Failed to set transcript url")?;
        Ok(())
    }

    /// Store the recording artifact location. No status gate.
    pub fn set_recording_url(conn: &Connection, id: &str, url: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET recording_url = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, url, Utc::now().to_rfc3339()],
        )
        .context("Failed to set recording url")?;
        Ok(())
    }

    /// Terminal write: summary + transcript_processed + completed, in one
    /// statement. Pure absolute state, safe to re-execute on a retried run.
    pub fn finalize(conn: &Connection, id: &str, summary: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET summary = ?2, transcript_processed = 1, \
             status = 'completed', updated_at = ?3 WHERE id = ?1",
            params![id, summary, Utc::now().to_rfc3339()],
        )
        .context("Failed to finalize meeting")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn insert_meeting(conn: &Connection, id: &str) {
        MeetingRepository::insert(
            conn,
            &NewMeeting {
                id: id.to_string(),
                owner_user_id: "user-1".to_string(),
                agent_id: "agent-1".to_string(),
                name: "Standup".to_string(),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_insert_and_get() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");

        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Upcoming);
        assert_eq!(meeting.agent_id, "agent-1");
        assert!(meeting.started_at.is_none());
        assert!(!meeting.transcript_processed);
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_db();
        assert!(MeetingRepository::get(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_start_wins_exactly_once() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");

        assert!(MeetingRepository::start_if_upcoming(&conn, "m1", Utc::now()).unwrap());
        // Redelivery loses the gate
        assert!(!MeetingRepository::start_if_upcoming(&conn, "m1", Utc::now()).unwrap());

        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Active);
        assert!(meeting.started_at.is_some());
    }

    #[test]
    fn test_start_unknown_meeting_is_noop() {
        let conn = setup_db();
        assert!(!MeetingRepository::start_if_upcoming(&conn, "ghost", Utc::now()).unwrap());
    }

    #[test]
    fn test_end_requires_active() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");

        // participant-left before session-started: no regression
        assert!(!MeetingRepository::end_if_active(&conn, "m1", Utc::now()).unwrap());
        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Upcoming);
        assert!(meeting.ended_at.is_none());

        MeetingRepository::start_if_upcoming(&conn, "m1", Utc::now()).unwrap();
        assert!(MeetingRepository::end_if_active(&conn, "m1", Utc::now()).unwrap());
        assert!(!MeetingRepository::end_if_active(&conn, "m1", Utc::now()).unwrap());

        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Processing);
        assert!(meeting.ended_at.is_some());
    }

    #[test]
    fn test_cancel_only_from_upcoming() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");

        assert!(MeetingRepository::cancel_if_upcoming(&conn, "m1").unwrap());
        // Cancelled is terminal for the webhook path too
        assert!(!MeetingRepository::start_if_upcoming(&conn, "m1", Utc::now()).unwrap());

        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Cancelled);
    }

    #[test]
    fn test_finalize() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");
        MeetingRepository::start_if_upcoming(&conn, "m1", Utc::now()).unwrap();
        MeetingRepository::end_if_active(&conn, "m1", Utc::now()).unwrap();

        MeetingRepository::finalize(&conn, "m1", "Two speakers; shipped the thing.").unwrap();

        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Completed);
        assert!(meeting.transcript_processed);
        assert_eq!(
            meeting.summary.as_deref(),
            Some("Two speakers; shipped the thing.")
        );

        // Completed excludes every webhook-path precondition
        assert!(!MeetingRepository::start_if_upcoming(&conn, "m1", Utc::now()).unwrap());
        assert!(!MeetingRepository::end_if_active(&conn, "m1", Utc::now()).unwrap());
    }

    #[test]
    fn test_artifact_urls() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");

        MeetingRepository::set_transcript_url(&conn, "m1", "https://cdn/t.json").unwrap();
        MeetingRepository::set_recording_url(&conn, "m1", "https://cdn/r.mp4").unwrap();

        let meeting = MeetingRepository::get(&conn, "m1").unwrap().unwrap();
        assert_eq!(meeting.transcript_url.as_deref(), Some("https://cdn/t.json"));
        assert_eq!(meeting.recording_url.as_deref(), Some("https://cdn/r.mp4"));
    }

    #[test]
    fn test_list_for_owner() {
        let conn = setup_db();
        insert_meeting(&conn, "m1");
        insert_meeting(&conn, "m2");

        let meetings = MeetingRepository::list_for_owner(&conn, "user-1", 10).unwrap();
        assert_eq!(meetings.len(), 2);

        let other = MeetingRepository::list_for_owner(&conn, "user-2", 10).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            MeetingStatus::Upcoming,
            MeetingStatus::Active,
            MeetingStatus::Processing,
            MeetingStatus::Completed,
            MeetingStatus::Cancelled,
        ] {
            assert_eq!(MeetingStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(MeetingStatus::from_str("bogus").is_err());
    }
}
