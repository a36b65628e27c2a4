//! `SQLite`-backed paper metadata store.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};

use super::MetadataStore;
use crate::models::PaperRecord;
use crate::{Error, Result};

/// `SQLite` metadata store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`.
/// WAL mode and `busy_timeout` mitigate contention:
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **`busy_timeout`**: waits up to 5 seconds for locks instead of failing
/// - **NORMAL synchronous**: balances durability with performance
pub struct SqliteMetadataStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database file (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteMetadataStore {
    /// Opens (creating if needed) a metadata store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .and_then(|()| conn.pragma_update(None, "synchronous", "NORMAL"))
            .and_then(|()| conn.pragma_update(None, "busy_timeout", 5000))
            .map_err(|e| Error::OperationFailed {
                operation: "configure_sqlite".to_string(),
                cause: e.to_string(),
            })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS papers (
                id        INTEGER PRIMARY KEY,
                arxiv_id  TEXT NOT NULL UNIQUE,
                title     TEXT NOT NULL UNIQUE,
                authors   TEXT NOT NULL,
                url       TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_papers_table".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Path of the backing database file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::OperationFailed {
            operation: "lock_sqlite".to_string(),
            cause: "connection lock poisoned".to_string(),
        })
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn insert(&self, record: &PaperRecord) -> Result<()> {
        let authors = serde_json::to_string(&record.authors).map_err(|e| Error::OperationFailed {
            operation: "serialize_authors".to_string(),
            cause: e.to_string(),
        })?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO papers (id, arxiv_id, title, authors, url) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.id, record.arxiv_id, record.title, authors, record.url],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Duplicate(format!(
                    "a paper with this id, title, or arXiv id already exists: '{}'",
                    record.title
                ))
            }
            other => Error::OperationFailed {
                operation: "insert_paper".to_string(),
                cause: other.to_string(),
            },
        })?;

        Ok(())
    }

    fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<PaperRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, arxiv_id, title, authors, url FROM papers WHERE id IN ({placeholders})"
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::OperationFailed {
            operation: "prepare_get_by_ids".to_string(),
            cause: e.to_string(),
        })?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| Error::OperationFailed {
                operation: "query_get_by_ids".to_string(),
                cause: e.to_string(),
            })?;

        let mut records = Vec::with_capacity(ids.len());
        for row in rows {
            let (id, arxiv_id, title, authors_json, url) =
                row.map_err(|e| Error::OperationFailed {
                    operation: "read_paper_row".to_string(),
                    cause: e.to_string(),
                })?;

            let authors: Vec<String> =
                serde_json::from_str(&authors_json).map_err(|e| Error::OperationFailed {
                    operation: "deserialize_authors".to_string(),
                    cause: e.to_string(),
                })?;

            records.push(PaperRecord {
                id,
                arxiv_id,
                title,
                authors,
                url,
            });
        }
        Ok(records)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))
            .map_err(|e| Error::OperationFailed {
                operation: "count_papers".to_string(),
                cause: e.to_string(),
            })?;

        usize::try_from(count).map_err(|e| Error::OperationFailed {
            operation: "count_papers".to_string(),
            cause: e.to_string(),
        })
    }
}
