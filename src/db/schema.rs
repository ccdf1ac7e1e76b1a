//! Local database schema.
//!
//! Bumping [`SCHEMA_VERSION`] is the only migration path: when the stored
//! `user_version` is older the whole schema batch is applied again. Every
//! statement is `IF NOT EXISTS` so reapplying is harmless.

use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

pub const SCHEMA: &str = r#"
-- Locally saved favorite products
CREATE TABLE IF NOT EXISTS favorites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_favorites_product_id ON favorites(product_id);
CREATE INDEX IF NOT EXISTS idx_favorites_name ON favorites(name);
CREATE INDEX IF NOT EXISTS idx_favorites_created_at ON favorites(created_at);

-- Auth token and user info
CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Apply the schema if the database is older than [`SCHEMA_VERSION`].
///
/// Returns whether anything was applied.
pub fn migrate(conn: &Connection) -> rusqlite::Result<bool> {
  let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
  if version >= SCHEMA_VERSION {
    return Ok(false);
  }

  let tx = conn.unchecked_transaction()?;
  tx.execute_batch(SCHEMA)?;
  tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
  tx.commit()?;

  Ok(true)
}
