//! SQLite persistence for Keygate.
//!
//! One connection behind a mutex, WAL mode, schema bootstrap on open.
//! The store owns the two transactions where ordering is load-bearing:
//! credit consumption (atomic compare-and-decrement with idempotency
//! lookup) and license activation claims (bound device count check and
//! insert in one step). Everything else is plain reads and writes.

mod error;
mod license;
mod schema;
mod trial;

pub use error::{StoreError, StoreResult};
pub use license::ClaimOutcome;
pub use trial::{ConsumeOutcome, GrantOutcome};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Handle to the Keygate database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        info!("opening keygate store at {}", path.display());
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Parses an RFC 3339 timestamp read back from the database.
pub(crate) fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

/// Parses an optional RFC 3339 timestamp column.
pub(crate) fn parse_ts_opt(s: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}
