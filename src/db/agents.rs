//! Agent profile persistence.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// An agent row: a named instruction profile for the voice assistant.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub instructions: String,
    pub created_at: String,
    pub updated_at: String,
}

fn map_agent(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    Ok(AgentRecord {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        instructions: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const AGENT_COLUMNS: &str = "id, owner_user_id, name, instructions, created_at, updated_at";

/// Repository for agent records.
pub struct AgentRepository;

impl AgentRepository {
    pub fn insert(
        conn: &Connection,
        id: &str,
        owner_user_id: &str,
        name: &str,
        instructions: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO agents (id, owner_user_id, name, instructions, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, owner_user_id, name, instructions, now],
        )
        .context("Failed to insert agent")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<AgentRecord>> {
        conn.query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            map_agent,
        )
        .optional()
        .context("Failed to query agent")
    }

    pub fn list_for_owner(
        conn: &Connection,
        owner_user_id: &str,
        limit: usize,
    ) -> Result<Vec<AgentRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE owner_user_id = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ))
            .context("Failed to prepare agents list query")?;

        let rows = stmt
            .query_map(params![owner_user_id, limit as i64], map_agent)
            .context("Failed to list agents")?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    pub fn update_instructions(conn: &Connection, id: &str, instructions: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE agents SET instructions = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, instructions, Utc::now().to_rfc3339()],
            )
            .context("Failed to update agent instructions")?;
        Ok(changed == 1)
    }

    pub fn delete(conn: &Connection, id: &str, owner_user_id: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "DELETE FROM agents WHERE id = ?1 AND owner_user_id = ?2",
                params![id, owner_user_id],
            )
            .context("Failed to delete agent")?;
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
    fn test_insert_and_get() {
        let conn = setup_db();
        AgentRepository::insert(&conn, "a1", "user-1", "Notetaker", "Take notes.").unwrap();

        let agent = AgentRepository::get(&conn, "a1").unwrap().unwrap();
        assert_eq!(agent.name, "Notetaker");
        assert_eq!(agent.instructions, "Take notes.");
    }

    #[test]
    fn test_get_missing() {
        let conn = setup_db();
        assert!(AgentRepository::get(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_update_instructions() {
        let conn = setup_db();
        AgentRepository::insert(&conn, "a1", "user-1", "Notetaker", "").unwrap();

        assert!(AgentRepository::update_instructions(&conn, "a1", "Be brief.").unwrap());
        let agent = AgentRepository::get(&conn, "a1").unwrap().unwrap();
        assert_eq!(agent.instructions, "Be brief.");

        assert!(!AgentRepository::update_instructions(&conn, "ghost", "x").unwrap());
    }

    #[test]
    fn test_delete_is_owner_scoped() {
        let conn = setup_db();
        AgentRepository::insert(&conn, "a1", "user-1", "Notetaker", "").unwrap();

        assert!(!AgentRepository::delete(&conn, "a1", "user-2").unwrap());
        assert!(AgentRepository::delete(&conn, "a1", "user-1").unwrap());
        assert!(AgentRepository::get(&conn, "a1").unwrap().is_none());
    }

    #[test]
    fn test_list_for_owner() {
        let conn = setup_db();
        AgentRepository::insert(&conn, "a1", "user-1", "One", "").unwrap();
        AgentRepository::insert(&conn, "a2", "user-1", "Two", "").unwrap();
        AgentRepository::insert(&conn, "a3", "user-2", "Other", "").unwrap();

        let agents = AgentRepository::list_for_owner(&conn, "user-1", 10).unwrap();
        assert_eq!(agents.len(), 2);
    }
}
