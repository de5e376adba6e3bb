//! Webhook event deduplication ledger.
//!
//! The call platform delivers at-least-once; this table's primary key is the
//! gate that makes redelivery harmless. The insert is a single atomic
//! statement, not check-then-insert, so two concurrent deliveries of the same
//! event id race safely: exactly one observes a new row.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};

pub struct EventLedger;

impl EventLedger {
    /// Record an external event id if it has not been seen before.
    ///
    /// Returns `true` on first delivery, `false` for a duplicate. Duplicates
    /// are expected traffic, not errors — callers short-circuit with a
    /// neutral success response.
    pub fn record_if_new(conn: &Connection, event_id: &str, event_type: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO webhook_events (id, type, received_at) \
                 VALUES (?1, ?2, ?3)",
                params![event_id, event_type, Utc::now().to_rfc3339()],
            )
            .context("Failed to record webhook event")?;
        Ok(changed == 1)
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

    #[test]
    fn test_first_insert_wins() {
        let conn = setup_db();
        assert!(EventLedger::record_if_new(&conn, "e1", "call.session_started").unwrap());
        assert!(!EventLedger::record_if_new(&conn, "e1", "call.session_started").unwrap());
    }

    #[test]
    fn test_same_id_different_type_is_still_duplicate() {
        let conn = setup_db();
        assert!(EventLedger::record_if_new(&conn, "e1", "call.session_started").unwrap());
        // Type is stored for audit only; identity is the id alone
        assert!(!EventLedger::record_if_new(&conn, "e1", "call.transcription_ready").unwrap());
    }

    #[test]
    fn test_distinct_ids_pass() {
        let conn = setup_db();
        assert!(EventLedger::record_if_new(&conn, "e1", "call.session_started").unwrap());
        assert!(EventLedger::record_if_new(&conn, "e2", "call.session_started").unwrap());
    }
}
