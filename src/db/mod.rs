pub mod schema;
pub mod session;

use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Owned handle to the local database holding favorites and the session.
///
/// The connection is opened on first use and kept open for the rest of the
/// process. When a statement reports that the underlying file is gone or
/// unreadable the connection is dropped and the next call reopens it.
/// Cloning is cheap and shares the same connection.
#[derive(Clone)]
pub struct Database {
  inner: Arc<Inner>,
}

struct Inner {
  /// `None` means an in-memory database
  path: Option<PathBuf>,
  conn: Mutex<Option<Connection>>,
}

impl Database {
  /// Database stored at `path`. Nothing is opened until the first call.
  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self::with_path(Some(path.into()))
  }

  /// Private in-memory database, used by tests and `--ephemeral`.
  pub fn in_memory() -> Self {
    Self::with_path(None)
  }

  fn with_path(path: Option<PathBuf>) -> Self {
    Self {
      inner: Arc::new(Inner {
        path,
        conn: Mutex::new(None),
      }),
    }
  }

  /// Default location of the database inside the data directory
  pub fn default_path(data_dir: &Path) -> PathBuf {
    data_dir.join("storefront.db")
  }

  /// Run `f` against the connection, opening it first if needed.
  pub fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
  where
    F: FnOnce(&mut Connection) -> Result<T, StoreError>,
  {
    let mut guard = self
      .inner
      .conn
      .lock()
      .map_err(|e| StoreError::unavailable(format!("Lock poisoned: {}", e)))?;

    let conn = match guard.take() {
      Some(conn) => conn,
      None => self.connect()?,
    };
    let conn = guard.insert(conn);

    let result = f(conn);
    if let Err(StoreError::StorageUnavailable(reason)) = &result {
      // In-memory data would be lost by reopening
      if self.inner.path.is_some() {
        warn!(%reason, "Dropping database handle, will reopen on next use");
        guard.take();
      }
    }
    result
  }

  /// Async wrapper over [`Database::with_conn`] that runs on the blocking pool.
  pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
  where
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
  {
    let db = self.clone();
    tokio::task::spawn_blocking(move || db.with_conn(f))
      .await
      .map_err(|e| StoreError::transaction(format!("Storage task failed: {}", e)))?
  }

  fn connect(&self) -> Result<Connection, StoreError> {
    let conn = match &self.inner.path {
      Some(path) => {
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::unavailable(format!("Failed to create database directory: {}", e))
          })?;
        }
        Connection::open(path).map_err(|e| {
          StoreError::unavailable(format!(
            "Failed to open database at {}: {}",
            path.display(),
            e
          ))
        })?
      }
      None => Connection::open_in_memory()
        .map_err(|e| StoreError::unavailable(format!("Failed to open database: {}", e)))?,
    };

    let created = schema::migrate(&conn)
      .map_err(|e| StoreError::unavailable(format!("Failed to run migrations: {}", e)))?;
    debug!(created, "Database opened");

    Ok(conn)
  }
}

/// Map a SQLite error onto the store taxonomy.
pub fn sql_error(err: rusqlite::Error) -> StoreError {
  match err.sqlite_error_code() {
    Some(
      ErrorCode::CannotOpen
      | ErrorCode::NotADatabase
      | ErrorCode::DatabaseCorrupt
      | ErrorCode::SystemIoFailure,
    ) => StoreError::unavailable(err.to_string()),
    _ => StoreError::transaction(err.to_string()),
  }
}

/// Whether `err` is a UNIQUE / constraint failure.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
  err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}
