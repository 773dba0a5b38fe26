//! SQLite-backed event catalog.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use eventfeed_core::EventRecord;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use super::schema;
use super::{Catalog, CatalogSession};
use crate::{Error, Result};

/// Configuration for the SQLite catalog.
#[derive(Debug, Clone)]
pub struct SqliteCatalogConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl Default for SqliteCatalogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/events.db"),
        }
    }
}

/// Event catalog stored in one SQLite database.
///
/// A session holds the connection lock until it is dropped, so runs against
/// one catalog handle never interleave.
pub struct SqliteCatalog {
    config: SqliteCatalogConfig,
    /// SQLite connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open or create a catalog with the given configuration.
    pub fn open(config: SqliteCatalogConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        let conn = Connection::open(&config.db_path)
            .map_err(|e| Error::Database(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Database(format!("Failed to set PRAGMA: {}", e)))?;

        schema::init_schema(&conn)
            .map_err(|e| Error::Database(format!("Failed to init schema: {}", e)))?;

        Ok(Self {
            config,
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let config = SqliteCatalogConfig {
            db_path: PathBuf::from(":memory:"),
        };

        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory SQLite: {}", e)))?;

        schema::init_schema(&conn)
            .map_err(|e| Error::Database(format!("Failed to init schema: {}", e)))?;

        Ok(Self {
            config,
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .map_err(|e| Error::Database(format!("Failed to count events: {}", e)))?;
        Ok(count as u64)
    }
}

impl Catalog for SqliteCatalog {
    type Session<'a> = SqliteSession<'a>;

    fn session(&self) -> Result<SqliteSession<'_>> {
        debug!(db = %self.config.db_path.display(), "Acquiring catalog session");
        Ok(SqliteSession {
            conn: self.conn.lock(),
            in_transaction: false,
        })
    }
}

/// One run's exclusive use of the SQLite connection.
///
/// A transaction is opened lazily by the first write and closed by
/// `commit`/`rollback`. Dropping the session with a transaction open rolls
/// it back.
pub struct SqliteSession<'a> {
    conn: MutexGuard<'a, Connection>,
    in_transaction: bool,
}

impl SqliteSession<'_> {
    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl CatalogSession for SqliteSession<'_> {
    fn find(&mut self, id: &str) -> Result<Option<EventRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, title, start_date, end_date, min_price, max_price, is_online
                 FROM events WHERE id = ?1",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare lookup: {}", e)))?;

        stmt.query_row([id], |row| {
            Ok(EventRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                start_date: row.get::<_, DateTime<Utc>>(2)?,
                end_date: row.get::<_, DateTime<Utc>>(3)?,
                min_price: row.get(4)?,
                max_price: row.get(5)?,
                is_online: row.get(6)?,
            })
        })
        .optional()
        .map_err(|e| Error::Database(format!("Failed to look up event {}: {}", id, e)))
    }

    fn insert_all(&mut self, records: &[EventRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.begin()?;

        let now = Utc::now();
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO events
                    (id, title, start_date, end_date, min_price, max_price, is_online,
                     first_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare insert: {}", e)))?;

        for record in records {
            stmt.execute(params![
                record.id,
                record.title,
                record.start_date,
                record.end_date,
                record.min_price,
                record.max_price,
                record.is_online,
                now,
            ])
            .map_err(|e| Error::Database(format!("Failed to insert event {}: {}", record.id, e)))?;
        }

        Ok(records.len())
    }

    fn update_all(&mut self, records: &[EventRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.begin()?;

        let now = Utc::now();
        let mut stmt = self
            .conn
            .prepare_cached(
                "UPDATE events
                 SET start_date = ?2, end_date = ?3, min_price = ?4, max_price = ?5,
                     is_online = ?6, updated_at = ?7
                 WHERE id = ?1",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare update: {}", e)))?;

        for record in records {
            let changed = stmt
                .execute(params![
                    record.id,
                    record.start_date,
                    record.end_date,
                    record.min_price,
                    record.max_price,
                    record.is_online,
                    now,
                ])
                .map_err(|e| {
                    Error::Database(format!("Failed to update event {}: {}", record.id, e))
                })?;

            if changed == 0 {
                return Err(Error::Database(format!(
                    "Cannot update event {}: no stored record",
                    record.id
                )));
            }
        }

        Ok(records.len())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| Error::Database(format!("Failed to commit: {}", e)))?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(|e| Error::Database(format!("Failed to roll back: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if self.in_transaction
            && let Err(e) = self.conn.execute_batch("ROLLBACK")
        {
            warn!(error = %e, "Failed to roll back abandoned catalog session");
        }
        debug!("Catalog session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str, max_price: f64) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            title: format!("Event {}", id),
            start_date: Utc.with_ymd_and_hms(2021, 7, 31, 20, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2021, 7, 31, 21, 30, 0).unwrap(),
            min_price: 15.0,
            max_price,
            is_online: "offline".to_string(),
        }
    }

    #[test]
    fn test_insert_commit_find() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        {
            let mut session = catalog.session().unwrap();
            assert_eq!(session.insert_all(&[record("1", 30.0), record("2", 40.0)]).unwrap(), 2);
            session.commit().unwrap();
        }

        assert_eq!(catalog.count().unwrap(), 2);
        let mut session = catalog.session().unwrap();
        assert_eq!(session.find("1").unwrap(), Some(record("1", 30.0)));
        assert_eq!(session.find("missing").unwrap(), None);
    }

    #[test]
    fn test_timestamps_round_trip_exactly() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let mut original = record("ms", 10.0);
        original.start_date = Utc.timestamp_millis_opt(1_627_761_600_123).unwrap();

        let mut session = catalog.session().unwrap();
        session.insert_all(std::slice::from_ref(&original)).unwrap();
        session.commit().unwrap();

        assert_eq!(session.find("ms").unwrap(), Some(original));
    }

    #[test]
    fn test_update_keeps_title() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let mut session = catalog.session().unwrap();
        session.insert_all(&[record("7", 50.0)]).unwrap();
        session.commit().unwrap();

        let mut changed = record("7", 55.0);
        changed.title = "Ignored".to_string();
        session.update_all(&[changed]).unwrap();
        session.commit().unwrap();

        let stored = session.find("7").unwrap().unwrap();
        assert_eq!(stored.max_price, 55.0);
        assert_eq!(stored.title, "Event 7");
    }

    #[test]
    fn test_update_missing_row_fails() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let mut session = catalog.session().unwrap();
        let err = session.update_all(&[record("ghost", 1.0)]).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let mut session = catalog.session().unwrap();
        session.insert_all(&[record("1", 30.0)]).unwrap();
        session.commit().unwrap();

        assert!(matches!(
            session.insert_all(&[record("1", 30.0)]),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_rollback_discards_pending_writes() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let mut session = catalog.session().unwrap();
        session.insert_all(&[record("1", 30.0)]).unwrap();
        session.commit().unwrap();
        session.insert_all(&[record("2", 30.0)]).unwrap();
        session.rollback().unwrap();
        drop(session);

        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn test_drop_rolls_back_open_transaction() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        {
            let mut session = catalog.session().unwrap();
            session.insert_all(&[record("1", 30.0)]).unwrap();
        }

        assert_eq!(catalog.count().unwrap(), 0);
        // Connection is usable again after the abandoned session
        let mut session = catalog.session().unwrap();
        session.insert_all(&[record("1", 30.0)]).unwrap();
        session.commit().unwrap();
        drop(session);
        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn test_open_on_disk_persists_across_handles() {
        let dir = TempDir::new().unwrap();
        let config = SqliteCatalogConfig {
            db_path: dir.path().join("nested").join("events.db"),
        };

        {
            let catalog = SqliteCatalog::open(config.clone()).unwrap();
            let mut session = catalog.session().unwrap();
            session.insert_all(&[record("42", 12.5)]).unwrap();
            session.commit().unwrap();
        }

        let catalog = SqliteCatalog::open(config).unwrap();
        assert_eq!(catalog.count().unwrap(), 1);
        let mut session = catalog.session().unwrap();
        assert_eq!(session.find("42").unwrap(), Some(record("42", 12.5)));
    }
}
