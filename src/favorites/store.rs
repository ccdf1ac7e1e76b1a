//! SQLite-backed favorites repository.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::cmp::Ordering;
use tracing::{debug, error, info};

use super::{FavoriteRecord, ProductInput, SortField, SortOrder};
use crate::db::{is_constraint_violation, sql_error, Database};
use crate::error::StoreError;

const SELECT_ALL: &str = "SELECT id, product_id, name, description, photo_url, created_at, synced
   FROM favorites ORDER BY id";

/// Favorites repository. Owns a [`Database`] handle.
///
/// Writes and existence checks surface storage errors. Listing, search and
/// sort log the error and return an empty list instead.
#[derive(Clone)]
pub struct FavoritesStore {
  db: Database,
}

impl FavoritesStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  /// Save a product as favorite and return the assigned id.
  pub async fn add(&self, product: &ProductInput) -> Result<i64, StoreError> {
    self.add_at(product, Utc::now()).await
  }

  pub(crate) async fn add_at(
    &self,
    product: &ProductInput,
    created_at: DateTime<Utc>,
  ) -> Result<i64, StoreError> {
    let product = product.clone();
    let created_at = created_at.to_rfc3339_opts(SecondsFormat::Millis, true);

    let id = self
      .db
      .run(move |conn| {
        conn
          .execute(
            "INSERT INTO favorites (product_id, name, description, photo_url, created_at, synced)
             VALUES (?, ?, ?, ?, ?, 0)",
            params![
              product.id,
              product.name,
              product.description,
              product.photo_url,
              created_at
            ],
          )
          .map_err(|e| {
            if is_constraint_violation(&e) {
              StoreError::ConstraintViolation {
                product_id: product.id.clone(),
              }
            } else {
              sql_error(e)
            }
          })?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    debug!(id, "Favorite added");
    Ok(id)
  }

  /// All favorites, ordered by id. Empty on storage failure.
  pub async fn get_all(&self) -> Vec<FavoriteRecord> {
    self.try_get_all().await.unwrap_or_else(|e| {
      error!(error = %e, "Failed to list favorites");
      Vec::new()
    })
  }

  pub(crate) async fn try_get_all(&self) -> Result<Vec<FavoriteRecord>, StoreError> {
    self
      .db
      .run(|conn| {
        let mut stmt = conn.prepare(SELECT_ALL).map_err(sql_error)?;
        let records = stmt
          .query_map([], record_from_row)
          .map_err(sql_error)?
          .collect::<rusqlite::Result<Vec<_>>>()
          .map_err(sql_error)?;
        Ok(records)
      })
      .await
  }

  /// Delete the favorite for `product_id`. Returns whether a record existed.
  pub async fn remove(&self, product_id: &str) -> Result<bool, StoreError> {
    let product_id = product_id.to_string();

    self
      .db
      .run(move |conn| {
        let tx = conn.transaction().map_err(sql_error)?;

        let id: Option<i64> = tx
          .query_row(
            "SELECT id FROM favorites WHERE product_id = ?",
            params![product_id],
            |row| row.get(0),
          )
          .optional()
          .map_err(sql_error)?;

        let Some(id) = id else {
          return Ok(false);
        };

        tx.execute("DELETE FROM favorites WHERE id = ?", params![id])
          .map_err(sql_error)?;
        tx.commit().map_err(sql_error)?;
        Ok(true)
      })
      .await
  }

  pub async fn is_favorite(&self, product_id: &str) -> Result<bool, StoreError> {
    let product_id = product_id.to_string();

    self
      .db
      .run(move |conn| {
        conn
          .query_row(
            "SELECT 1 FROM favorites WHERE product_id = ?",
            params![product_id],
            |_| Ok(()),
          )
          .optional()
          .map(|found| found.is_some())
          .map_err(sql_error)
      })
      .await
  }

  /// Favorites whose name or description contains `query`, ignoring case.
  ///
  /// An empty query matches every record.
  pub async fn search(&self, query: &str) -> Vec<FavoriteRecord> {
    let needle = query.to_lowercase();
    self
      .get_all()
      .await
      .into_iter()
      .filter(|f| f.matches(&needle))
      .collect()
  }

  /// All favorites sorted by `field`. Ties are broken by id, so the
  /// descending order is always the exact reverse of the ascending one.
  pub async fn sort(&self, field: SortField, order: SortOrder) -> Vec<FavoriteRecord> {
    let mut records = self.get_all().await;
    sort_records(&mut records, field, order);
    records
  }

  /// Flag the given records as synced in one transaction.
  pub(crate) async fn mark_synced(&self, ids: Vec<i64>) -> Result<usize, StoreError> {
    if ids.is_empty() {
      return Ok(0);
    }

    let updated = self
      .db
      .run(move |conn| {
        let tx = conn.transaction().map_err(sql_error)?;
        let mut updated = 0;
        {
          let mut stmt = tx
            .prepare("UPDATE favorites SET synced = 1 WHERE id = ?")
            .map_err(sql_error)?;
          for id in &ids {
            updated += stmt.execute(params![id]).map_err(sql_error)?;
          }
        }
        tx.commit().map_err(sql_error)?;
        Ok(updated)
      })
      .await?;

    info!(updated, "Marked favorites as synced");
    Ok(updated)
  }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FavoriteRecord> {
  Ok(FavoriteRecord {
    id: row.get(0)?,
    product_id: row.get(1)?,
    name: row.get(2)?,
    description: row.get(3)?,
    photo_url: row.get(4)?,
    created_at: row.get(5)?,
    synced: row.get(6)?,
  })
}

pub(crate) fn sort_records(records: &mut [FavoriteRecord], field: SortField, order: SortOrder) {
  records.sort_by(|a, b| {
    let ordering = compare(a, b, field);
    match order {
      SortOrder::Asc => ordering,
      SortOrder::Desc => ordering.reverse(),
    }
  });
}

fn compare(a: &FavoriteRecord, b: &FavoriteRecord, field: SortField) -> Ordering {
  let primary = match field {
    // Unparseable timestamps sort before every valid one
    SortField::CreatedAt => a.created_at_parsed().cmp(&b.created_at_parsed()),
    SortField::Name => a.name.cmp(&b.name),
  };
  primary.then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};
  use std::collections::BTreeSet;

  fn product(id: &str, name: &str, description: &str) -> ProductInput {
    ProductInput {
      id: id.to_string(),
      name: name.to_string(),
      description: description.to_string(),
      photo_url: format!("https://img.example/{}.jpg", id),
    }
  }

  fn store() -> FavoritesStore {
    FavoritesStore::new(Database::in_memory())
  }

  #[tokio::test]
  async fn test_get_all_returns_exactly_added_set() {
    let store = store();
    let products = [
      product("p1", "Kettle", "Steel kettle"),
      product("p2", "Lamp", "Desk lamp"),
      product("p3", "Mug", "Ceramic mug"),
    ];
    for p in &products {
      store.add(p).await.unwrap();
    }

    let stored: BTreeSet<String> = store
      .get_all()
      .await
      .into_iter()
      .map(|f| f.product_id)
      .collect();
    let expected: BTreeSet<String> = products.iter().map(|p| p.id.clone()).collect();
    assert_eq!(stored, expected);
  }

  #[tokio::test]
  async fn test_new_record_shape() {
    let store = store();
    let id = store.add(&product("p1", "Kettle", "Steel kettle")).await.unwrap();

    let all = store.get_all().await;
    let record = &all[0];
    assert_eq!(record.id, id);
    assert!(!record.synced);
    assert_eq!(record.photo_url, "https://img.example/p1.jpg");
    assert!(record.created_at.ends_with('Z'));
    assert!(record.created_at_parsed().is_some());
  }

  #[tokio::test]
  async fn test_ids_are_monotonic() {
    let store = store();
    let a = store.add(&product("p1", "A", "a")).await.unwrap();
    store.remove("p1").await.unwrap();
    let b = store.add(&product("p2", "B", "b")).await.unwrap();
    assert!(b > a);
  }

  #[tokio::test]
  async fn test_duplicate_product_is_constraint_violation() {
    let store = store();
    store.add(&product("p1", "Kettle", "Steel kettle")).await.unwrap();

    let err = store
      .add(&product("p1", "Kettle again", "Other"))
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation { ref product_id } if product_id == "p1"));

    let all = store.get_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Kettle");
  }

  #[tokio::test]
  async fn test_remove_present_and_absent() {
    let store = store();
    store.add(&product("p1", "Kettle", "Steel kettle")).await.unwrap();
    store.add(&product("p2", "Lamp", "Desk lamp")).await.unwrap();

    assert!(store.remove("p1").await.unwrap());
    assert!(!store.is_favorite("p1").await.unwrap());

    let before = store.get_all().await;
    assert!(!store.remove("missing").await.unwrap());
    assert_eq!(store.get_all().await, before);
  }

  #[tokio::test]
  async fn test_is_favorite() {
    let store = store();
    assert!(!store.is_favorite("p1").await.unwrap());
    store.add(&product("p1", "Kettle", "Steel kettle")).await.unwrap();
    assert!(store.is_favorite("p1").await.unwrap());
  }

  #[tokio::test]
  async fn test_search_matches_name_or_description_ignoring_case() {
    let store = store();
    store.add(&product("p1", "DESCant recorder", "Wooden")).await.unwrap();
    store.add(&product("p2", "Lamp", "Nice Description")).await.unwrap();
    store.add(&product("p3", "Mug", "Ceramic")).await.unwrap();

    let found: BTreeSet<String> = store
      .search("desc")
      .await
      .into_iter()
      .map(|f| f.product_id)
      .collect();
    assert_eq!(found, BTreeSet::from(["p1".to_string(), "p2".to_string()]));
  }

  #[tokio::test]
  async fn test_search_empty_query_matches_all() {
    let store = store();
    store.add(&product("p1", "Kettle", "Steel")).await.unwrap();
    store.add(&product("p2", "Lamp", "Desk")).await.unwrap();
    assert_eq!(store.search("").await.len(), 2);
  }

  #[tokio::test]
  async fn test_sort_by_created_at_desc_is_reverse_of_asc() {
    let store = store();
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    store
      .add_at(&product("p1", "B", "b"), base + Duration::minutes(2))
      .await
      .unwrap();
    store.add_at(&product("p2", "A", "a"), base).await.unwrap();
    // Same instant as p2: tie broken by id
    store.add_at(&product("p3", "C", "c"), base).await.unwrap();
    store
      .add_at(&product("p4", "D", "d"), base + Duration::minutes(1))
      .await
      .unwrap();

    let asc: Vec<String> = store
      .sort(SortField::CreatedAt, SortOrder::Asc)
      .await
      .into_iter()
      .map(|f| f.product_id)
      .collect();
    let mut desc: Vec<String> = store
      .sort(SortField::CreatedAt, SortOrder::Desc)
      .await
      .into_iter()
      .map(|f| f.product_id)
      .collect();

    assert_eq!(asc, vec!["p2", "p3", "p4", "p1"]);
    desc.reverse();
    assert_eq!(asc, desc);
  }

  #[tokio::test]
  async fn test_sort_by_name() {
    let store = store();
    store.add(&product("p1", "banana", "")).await.unwrap();
    store.add(&product("p2", "Apple", "")).await.unwrap();
    store.add(&product("p3", "cherry", "")).await.unwrap();

    let names: Vec<String> = store
      .sort(SortField::Name, SortOrder::Asc)
      .await
      .into_iter()
      .map(|f| f.name)
      .collect();
    // Lexicographic: uppercase sorts first
    assert_eq!(names, vec!["Apple", "banana", "cherry"]);
  }

  #[tokio::test]
  async fn test_unparseable_created_at_sorts_first() {
    let mut records = vec![
      FavoriteRecord {
        id: 1,
        product_id: "p1".to_string(),
        name: "a".to_string(),
        description: String::new(),
        photo_url: String::new(),
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
        synced: false,
      },
      FavoriteRecord {
        id: 2,
        product_id: "p2".to_string(),
        name: "b".to_string(),
        description: String::new(),
        photo_url: String::new(),
        created_at: "yesterday".to_string(),
        synced: false,
      },
    ];
    sort_records(&mut records, SortField::CreatedAt, SortOrder::Asc);
    assert_eq!(records[0].product_id, "p2");
  }

  #[tokio::test]
  async fn test_read_paths_degrade_when_storage_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let store = FavoritesStore::new(Database::at(dir.path()));

    assert!(store.get_all().await.is_empty());
    assert!(store.search("x").await.is_empty());
    assert!(store
      .sort(SortField::Name, SortOrder::Asc)
      .await
      .is_empty());
  }

  #[tokio::test]
  async fn test_write_paths_surface_storage_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let store = FavoritesStore::new(Database::at(dir.path()));

    let err = store.add(&product("p1", "A", "a")).await.unwrap_err();
    assert!(matches!(err, StoreError::StorageUnavailable(_)));
    assert!(matches!(
      store.remove("p1").await.unwrap_err(),
      StoreError::StorageUnavailable(_)
    ));
    assert!(matches!(
      store.is_favorite("p1").await.unwrap_err(),
      StoreError::StorageUnavailable(_)
    ));
  }

  #[tokio::test]
  async fn test_mark_synced() {
    let store = store();
    let a = store.add(&product("p1", "A", "a")).await.unwrap();
    store.add(&product("p2", "B", "b")).await.unwrap();

    assert_eq!(store.mark_synced(vec![a]).await.unwrap(), 1);
    let synced: Vec<bool> = store.get_all().await.into_iter().map(|f| f.synced).collect();
    assert_eq!(synced, vec![true, false]);
  }
}
