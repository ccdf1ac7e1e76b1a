//! Response storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::key::RequestKey;
use super::registry::{CacheRegistry, CacheRole};
use crate::http::HttpResponse;

/// A stored response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: HttpResponse,
  /// Generation the response was found in
  pub generation: String,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for response storage backends.
///
/// Storage is partitioned into named generations. Writing to a generation
/// creates it.
pub trait CacheStorage: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// Names of all stored generations, oldest first.
  fn generations(&self) -> Result<Vec<String>>;

  fn has_generation(&self, name: &str) -> Result<bool>;

  /// Delete a generation and its entries. Returns whether it existed.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Store one response, replacing any previous one for the key.
  fn put(&self, generation: &str, key: &RequestKey, response: &HttpResponse) -> Result<()>;

  /// Store all responses or none of them.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()>;

  /// Look up a key in one generation.
  fn match_in(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Look up a key across generations, oldest generation first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Number of entries in a generation.
  fn entry_count(&self, generation: &str) -> Result<usize>;

  /// Record the generations now serving requests.
  fn record_active(&self, registry: &CacheRegistry) -> Result<()>;

  /// Generations recorded by the last successful activation.
  fn active_registry(&self) -> Result<Option<CacheRegistry>>;
}

/// SQLite-based response storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the response store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open cache database: {}", e))?;
    Self::from_connection(conn)
  }

  /// Default location of the response store inside the data directory
  pub fn default_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("responses.db")
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for response tables.
const CACHE_SCHEMA: &str = r#"
-- Named cache generations, rowid gives creation order
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_hash ON cache_entries(request_hash);

-- Generation serving each role since the last activation
CREATE TABLE IF NOT EXISTS cache_active (
    role TEXT PRIMARY KEY,
    generation TEXT NOT NULL
);
"#;

fn insert_generation(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create cache generation {}: {}", name, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  response: &HttpResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (generation, request_hash, request, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        key.cache_hash(),
        key.description(),
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store response for {}: {}", key.description(), e))?;
  Ok(())
}

type EntryRow = (String, u16, String, Vec<u8>, String);

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_cached((generation, status, headers, body, cached_at): EntryRow) -> Result<CachedResponse> {
  let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  Ok(CachedResponse {
    response: HttpResponse {
      status,
      headers,
      body,
    },
    generation,
    cached_at: parse_datetime(&cached_at)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;
    insert_generation(&conn, name)
  }

  fn generations(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache generation: {}", e))?;

    Ok(names)
  }

  fn has_generation(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found = conn
      .query_row(
        "SELECT 1 FROM cache_generations WHERE name = ?",
        params![name],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache generation: {}", e))?;
    Ok(found.is_some())
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let deleted = tx
      .execute("DELETE FROM cache_generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &HttpResponse) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    insert_generation(&tx, generation)?;
    insert_entry(&tx, generation, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    insert_generation(&tx, generation)?;
    for (key, response) in entries {
      insert_entry(&tx, generation, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn match_in(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT generation, status, headers, body, cached_at FROM cache_entries
         WHERE generation = ? AND request_hash = ?",
        params![generation, key.cache_hash()],
        entry_from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cached response: {}", e))?;

    row.map(into_cached).transpose()
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT e.generation, e.status, e.headers, e.body, e.cached_at
         FROM cache_entries e
         INNER JOIN cache_generations g ON g.name = e.generation
         WHERE e.request_hash = ?
         ORDER BY g.rowid
         LIMIT 1",
        params![key.cache_hash()],
        entry_from_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cached response: {}", e))?;

    row.map(into_cached).transpose()
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count cached responses: {}", e))?;
    Ok(count as usize)
  }

  fn record_active(&self, registry: &CacheRegistry) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_active", [])
      .map_err(|e| eyre!("Failed to clear active generations: {}", e))?;
    for (role, name) in registry.roles() {
      tx.execute(
        "INSERT INTO cache_active (role, generation) VALUES (?, ?)",
        params![role.to_string(), name],
      )
      .map_err(|e| eyre!("Failed to record active {} generation: {}", role, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn active_registry(&self) -> Result<Option<CacheRegistry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT role, generation FROM cache_active")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
      .map_err(|e| eyre!("Failed to read active generations: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read active generation: {}", e))?;

    let find = |role: CacheRole| {
      rows
        .iter()
        .find(|(r, _)| *r == role.to_string())
        .map(|(_, name)| name.clone())
    };

    // A partial record means no activation completed
    Ok(match (find(CacheRole::Static), find(CacheRole::Api)) {
      (Some(static_name), Some(api_name)) => Some(CacheRegistry::new(static_name, api_name)),
      _ => None,
    })
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::HttpRequest;
  use url::Url;

  fn key(url: &str) -> RequestKey {
    RequestKey::for_request(&HttpRequest::get(Url::parse(url).unwrap()))
  }

  #[test]
  fn test_put_creates_generation_and_matches() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("https://shop.example/app.js");
    let mut response = HttpResponse::new(200, "console.log(1)");
    response
      .headers
      .insert("content-type".to_string(), "text/javascript".to_string());

    storage.put("v1", &k, &response).unwrap();

    assert!(storage.has_generation("v1").unwrap());
    let cached = storage.match_in("v1", &k).unwrap().unwrap();
    assert_eq!(cached.response, response);
    assert_eq!(cached.generation, "v1");
    assert!(storage.match_in("v2", &k).unwrap().is_none());
  }

  #[test]
  fn test_match_any_prefers_oldest_generation() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("https://shop.example/index.html");
    storage.put("v1", &k, &HttpResponse::new(200, "old")).unwrap();
    storage.put("v2", &k, &HttpResponse::new(200, "new")).unwrap();

    let cached = storage.match_any(&k).unwrap().unwrap();
    assert_eq!(cached.generation, "v1");
    assert_eq!(cached.response.body, b"old".to_vec());
  }

  #[test]
  fn test_delete_generation_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("https://shop.example/index.html");
    storage.put("v1", &k, &HttpResponse::new(200, "x")).unwrap();
    storage.open_generation("v2").unwrap();

    assert!(storage.delete_generation("v1").unwrap());
    assert!(!storage.delete_generation("v1").unwrap());
    assert_eq!(storage.generations().unwrap(), vec!["v2"]);
    assert!(storage.match_any(&k).unwrap().is_none());
    assert_eq!(storage.entry_count("v1").unwrap(), 0);
  }

  #[test]
  fn test_put_all_and_count() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![
      (key("https://shop.example/"), HttpResponse::new(200, "root")),
      (key("https://shop.example/main.css"), HttpResponse::new(200, "css")),
    ];
    storage.put_all("v1", &entries).unwrap();
    assert_eq!(storage.entry_count("v1").unwrap(), 2);
  }

  #[test]
  fn test_record_active_replaces_previous() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.active_registry().unwrap(), None);

    storage.record_active(&CacheRegistry::new("v1", "api-v1")).unwrap();
    storage.record_active(&CacheRegistry::new("v1", "api-v2")).unwrap();

    assert_eq!(
      storage.active_registry().unwrap(),
      Some(CacheRegistry::new("v1", "api-v2"))
    );
  }

  #[test]
  fn test_reopen_file_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = SqliteStorage::default_path(dir.path());
    let k = key("https://shop.example/index.html");

    SqliteStorage::open(&path)
      .unwrap()
      .put("v1", &k, &HttpResponse::new(200, "x"))
      .unwrap();

    let reopened = SqliteStorage::open(&path).unwrap();
    assert!(reopened.match_in("v1", &k).unwrap().is_some());
  }

  #[test]
  fn test_active_generations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = SqliteStorage::default_path(dir.path());

    SqliteStorage::open(&path)
      .unwrap()
      .record_active(&CacheRegistry::new("v1", "api-v1"))
      .unwrap();

    let reopened = SqliteStorage::open(&path).unwrap();
    assert_eq!(
      reopened.active_registry().unwrap(),
      Some(CacheRegistry::new("v1", "api-v1"))
    );
  }
}
