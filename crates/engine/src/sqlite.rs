//! SQLite persistence gateway.
//!
//! The whole store is kept as one JSON document in a single-row table and
//! replaced inside a transaction on every flush.

use std::path::Path;

use bidrec_core::{Error, PersistenceGateway, Result, Store};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS store_state (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    payload    TEXT NOT NULL,
    flushed_at TEXT NOT NULL
);
";

fn storage(e: rusqlite::Error) -> Error {
    Error::storage(e.to_string())
}

/// Persists the store in a SQLite database.
pub struct SqliteGateway {
    conn: Connection,
}

impl SqliteGateway {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(storage)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(storage)?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(storage)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self { conn })
    }

    /// When the store was last flushed, as RFC 3339 text.
    pub fn last_flushed_at(&self) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT flushed_at FROM store_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage)
    }
}

impl PersistenceGateway for SqliteGateway {
    fn load(&mut self) -> Result<Option<Store>> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM store_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage)?;
        match payload {
            Some(json) => {
                let store = serde_json::from_str(&json)?;
                debug!(bytes = json.len(), "loaded store from sqlite");
                Ok(Some(store))
            }
            None => Ok(None),
        }
    }

    fn flush(&mut self, store: &Store) -> Result<()> {
        let payload = serde_json::to_string(store)?;
        let tx = self.conn.transaction().map_err(storage)?;
        tx.execute(
            "INSERT INTO store_state (id, payload, flushed_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, flushed_at = excluded.flushed_at",
            params![payload, Utc::now().to_rfc3339()],
        )
        .map_err(storage)?;
        tx.commit().map_err(storage)?;
        debug!(bytes = payload.len(), "flushed store to sqlite");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidrec_core::Project;

    fn sample() -> Store {
        let mut store = Store::new();
        let id = store.allocate_id();
        store.projects.insert(
            id,
            Project {
                id,
                name: "Depot".to_string(),
                project_date: None,
                county: Some("Kent".to_string()),
                building_sf: Some(12_500.0),
                notes: None,
            },
        );
        store
    }

    #[test]
    fn test_empty_database_loads_none() {
        let mut gateway = SqliteGateway::in_memory().unwrap();
        assert!(gateway.load().unwrap().is_none());
        assert!(gateway.last_flushed_at().unwrap().is_none());
    }

    #[test]
    fn test_flush_then_load() {
        let mut gateway = SqliteGateway::in_memory().unwrap();
        let store = sample();
        gateway.flush(&store).unwrap();
        assert_eq!(gateway.load().unwrap(), Some(store.clone()));

        let mut changed = store;
        changed.projects.clear();
        gateway.flush(&changed).unwrap();
        assert_eq!(gateway.load().unwrap(), Some(changed));
        assert!(gateway.last_flushed_at().unwrap().is_some());
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let path = std::env::temp_dir().join(format!("bidrec-sqlite-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let store = sample();
        {
            let mut gateway = SqliteGateway::open(&path).unwrap();
            gateway.flush(&store).unwrap();
        }
        let mut reopened = SqliteGateway::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(store));

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
