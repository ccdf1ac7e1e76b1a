//! Persisted login session (auth token and user identity).

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{sql_error, Database};
use crate::error::StoreError;

const TOKEN_KEY: &str = "auth_token";
const USER_KEY: &str = "user_info";

/// Identity returned by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
  pub user_id: String,
  pub name: String,
}

#[derive(Clone)]
pub struct SessionStore {
  db: Database,
}

impl SessionStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  pub async fn set_token(&self, token: &str) -> Result<(), StoreError> {
    self.put(TOKEN_KEY, token.to_string()).await
  }

  pub async fn token(&self) -> Result<Option<String>, StoreError> {
    self.get(TOKEN_KEY).await
  }

  pub async fn is_authenticated(&self) -> Result<bool, StoreError> {
    Ok(self.token().await?.is_some_and(|t| !t.is_empty()))
  }

  pub async fn set_user(&self, user: &UserInfo) -> Result<(), StoreError> {
    let value = serde_json::to_string(user)
      .map_err(|e| StoreError::transaction(format!("Failed to serialize user: {}", e)))?;
    self.put(USER_KEY, value).await
  }

  /// Stored user info. Unreadable JSON is treated as absent.
  pub async fn user(&self) -> Result<Option<UserInfo>, StoreError> {
    Ok(
      self
        .get(USER_KEY)
        .await?
        .and_then(|raw| serde_json::from_str(&raw).ok()),
    )
  }

  /// Forget both the token and the user info.
  pub async fn logout(&self) -> Result<(), StoreError> {
    self
      .db
      .run(|conn| {
        conn
          .execute(
            "DELETE FROM session WHERE key IN (?, ?)",
            params![TOKEN_KEY, USER_KEY],
          )
          .map_err(sql_error)?;
        Ok(())
      })
      .await
  }

  async fn put(&self, key: &'static str, value: String) -> Result<(), StoreError> {
    self
      .db
      .run(move |conn| {
        conn
          .execute(
            "INSERT OR REPLACE INTO session (key, value) VALUES (?, ?)",
            params![key, value],
          )
          .map_err(sql_error)?;
        Ok(())
      })
      .await
  }

  async fn get(&self, key: &'static str) -> Result<Option<String>, StoreError> {
    self
      .db
      .run(move |conn| {
        conn
          .query_row("SELECT value FROM session WHERE key = ?", params![key], |row| {
            row.get(0)
          })
          .optional()
          .map_err(sql_error)
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_token_roundtrip_and_logout() {
    let session = SessionStore::new(Database::in_memory());
    assert!(!session.is_authenticated().await.unwrap());

    session.set_token("abc").await.unwrap();
    session
      .set_user(&UserInfo {
        user_id: "user-1".to_string(),
        name: "Dina".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(session.token().await.unwrap().as_deref(), Some("abc"));
    assert!(session.is_authenticated().await.unwrap());
    assert_eq!(session.user().await.unwrap().unwrap().user_id, "user-1");

    session.logout().await.unwrap();
    assert_eq!(session.token().await.unwrap(), None);
    assert_eq!(session.user().await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_set_token_overwrites() {
    let session = SessionStore::new(Database::in_memory());
    session.set_token("first").await.unwrap();
    session.set_token("second").await.unwrap();
    assert_eq!(session.token().await.unwrap().as_deref(), Some("second"));
  }
}
