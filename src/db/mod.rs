//! SQLite persistence layer.
//!
//! Repositories are thin structs of associated functions over a raw
//! `rusqlite::Connection` — raw SQL, no ORM. The [`Database`] handle wraps a
//! single shared connection; async callers clone it and do their work inside
//! `tokio::task::spawn_blocking`.
//!
//! All lifecycle mutations go through single-statement conditional updates in
//! [`meetings::MeetingRepository`]; those, plus the unique-key insert in
//! [`events::EventLedger`], are the only concurrency-safety primitives the
//! service relies on.

pub mod agents;
pub mod events;
pub mod init;
pub mod meetings;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use init::migrate;

/// Shared handle to the service database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = init::init_db(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests; clones share the same connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
