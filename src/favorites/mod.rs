//! Local favorites: products saved on this device, available offline.
//!
//! - One record per remote product (unique `product_id` index)
//! - Content is a snapshot taken when the product was favorited
//! - `synced` starts `false` and is flipped by reconciliation

mod store;
mod sync;

pub(crate) use store::sort_records;
pub use store::FavoritesStore;
pub use sync::{
  Connectivity, FavoritesSync, FixedConnectivity, HttpConnectivity, LocalOnlyPublisher,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally saved favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
  pub id: i64,
  pub product_id: String,
  pub name: String,
  pub description: String,
  pub photo_url: String,
  /// ISO-8601 UTC, millisecond precision
  pub created_at: String,
  pub synced: bool,
}

impl FavoriteRecord {
  pub fn created_at_parsed(&self) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&self.created_at)
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
  }

  fn matches(&self, needle_lower: &str) -> bool {
    self.name.to_lowercase().contains(needle_lower)
      || self.description.to_lowercase().contains(needle_lower)
  }
}

/// Product display data captured when favoriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
  pub id: String,
  pub name: String,
  pub description: String,
  pub photo_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortField {
  #[default]
  CreatedAt,
  Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}
