//! SQLite backend: one row per entry plus a single metadata row

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use chronicle_types::{DEFAULT_ICON, TimelineDocument, TimelineEntry, TimelineMetadata};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use super::PersistenceBackend;
use crate::timeline::error::TimelineError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS timeline (
        id               TEXT PRIMARY KEY,
        year             TEXT NOT NULL,
        title            TEXT NOT NULL,
        icon             TEXT,
        players_concepts TEXT NOT NULL DEFAULT '[]',
        details          TEXT NOT NULL,
        quote            TEXT,
        learn_more_links TEXT NOT NULL DEFAULT '[]',
        created_at       TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at       TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS timeline_metadata (
        id           INTEGER PRIMARY KEY,
        title        TEXT NOT NULL,
        description  TEXT,
        last_updated TEXT NOT NULL
    );
";

const SELECT_ENTRY: &str = "SELECT id, year, title, icon, players_concepts, details, quote, \
     learn_more_links FROM timeline";

const INSERT_ENTRY: &str = "INSERT INTO timeline \
     (id, year, title, icon, players_concepts, details, quote, learn_more_links) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

/// Queries run on the blocking pool; the connection is shared behind a mutex.
pub struct TableBackend {
    conn: Arc<Mutex<Connection>>,
}

impl TableBackend {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TimelineError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, TimelineError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, TimelineError> {
        conn.execute_batch(SCHEMA)?;

        let initial = TimelineMetadata::default();
        conn.execute(
            "INSERT OR IGNORE INTO timeline_metadata (id, title, description, last_updated)
             VALUES (1, ?1, ?2, ?3)",
            params![initial.title, initial.description, initial.last_updated],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T, TimelineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, TimelineError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            work(&mut conn)
        })
        .await?
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: Option<String> = row.get(idx)?;
    serde_json::from_str(raw.as_deref().unwrap_or("[]"))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimelineEntry> {
    Ok(TimelineEntry {
        id: row.get(0)?,
        year: row.get(1)?,
        title: row.get(2)?,
        icon: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        players_concepts: json_column(row, 4)?,
        details: row.get(5)?,
        quote: row.get(6)?,
        learn_more_links: json_column(row, 7)?,
    })
}

fn insert_row(conn: &Connection, entry: &TimelineEntry) -> Result<(), TimelineError> {
    let icon = if entry.icon.is_empty() {
        DEFAULT_ICON
    } else {
        entry.icon.as_str()
    };
    conn.execute(
        INSERT_ENTRY,
        params![
            entry.id,
            entry.year,
            entry.title,
            icon,
            serde_json::to_string(&entry.players_concepts)?,
            entry.details,
            entry.quote,
            serde_json::to_string(&entry.learn_more_links)?,
        ],
    )?;
    Ok(())
}

fn is_constraint_violation(err: &TimelineError) -> bool {
    matches!(
        err,
        TimelineError::Database(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
    )
}

fn read_document(conn: &mut Connection) -> Result<TimelineDocument, TimelineError> {
    let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} ORDER BY year, rowid"))?;
    let timeline = stmt
        .query_map([], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let metadata = conn
        .query_row(
            "SELECT title, description, last_updated FROM timeline_metadata WHERE id = 1",
            [],
            |row| {
                Ok(TimelineMetadata {
                    title: row.get(0)?,
                    description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    last_updated: row.get(2)?,
                })
            },
        )
        .optional()?
        .unwrap_or_default();

    Ok(TimelineDocument { timeline, metadata })
}

fn replace_document(conn: &mut Connection, document: &TimelineDocument) -> Result<(), TimelineError> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT OR REPLACE INTO timeline_metadata (id, title, description, last_updated)
         VALUES (1, ?1, ?2, ?3)",
        params![
            document.metadata.title,
            document.metadata.description,
            document.metadata.last_updated
        ],
    )?;
    tx.execute("DELETE FROM timeline", [])?;
    for entry in &document.timeline {
        insert_row(&tx, entry)?;
    }

    // Dropping the transaction without commit rolls back
    tx.commit()?;
    Ok(())
}

fn append_entry(
    conn: &mut Connection,
    entry: &TimelineEntry,
    updated: NaiveDate,
) -> Result<(), TimelineError> {
    if let Err(err) = insert_row(conn, entry) {
        if !is_constraint_violation(&err) {
            return Err(err);
        }
        let existing = conn
            .query_row(
                &format!("{SELECT_ENTRY} WHERE id = ?1"),
                [&entry.id],
                entry_from_row,
            )
            .optional()?;
        return Err(match existing {
            Some(existing) => TimelineError::Conflict {
                id: entry.id.clone(),
                existing: Box::new(existing),
            },
            None => err,
        });
    }

    conn.execute(
        "UPDATE timeline_metadata SET last_updated = ?1 WHERE id = 1",
        params![updated],
    )?;
    Ok(())
}

#[async_trait]
impl PersistenceBackend for TableBackend {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn load(&self) -> Result<TimelineDocument, TimelineError> {
        self.with_connection(read_document).await
    }

    async fn store(&self, document: &TimelineDocument) -> Result<(), TimelineError> {
        let document = document.clone();
        self.with_connection(move |conn| replace_document(conn, &document))
            .await
    }

    async fn insert_entry(
        &self,
        entry: &TimelineEntry,
        updated: NaiveDate,
    ) -> Result<(), TimelineError> {
        let entry = entry.clone();
        self.with_connection(move |conn| append_entry(conn, &entry, updated))
            .await
    }
}
