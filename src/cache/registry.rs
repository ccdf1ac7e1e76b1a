//! Versioned cache generation names.

use color_eyre::Result;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use super::storage::CacheStorage;

/// Logical role of a cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheRole {
  /// Static assets, populated at install and on cache-first misses
  Static,
  /// API responses, populated by network-first fetches
  Api,
}

impl fmt::Display for CacheRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Static => write!(f, "static"),
      Self::Api => write!(f, "api"),
    }
  }
}

/// Maps each [`CacheRole`] to its current generation name.
///
/// Changing a name is a version bump. The previous generation stays on disk
/// until [`CacheRegistry::supersede`] runs at activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRegistry {
  names: BTreeMap<CacheRole, String>,
}

impl CacheRegistry {
  pub fn new(static_name: impl Into<String>, api_name: impl Into<String>) -> Self {
    Self {
      names: BTreeMap::from([
        (CacheRole::Static, static_name.into()),
        (CacheRole::Api, api_name.into()),
      ]),
    }
  }

  /// `{prefix}-{static_version}` and `{prefix}-api-{api_version}`
  pub fn versioned(prefix: &str, static_version: &str, api_version: &str) -> Self {
    Self::new(
      format!("{}-{}", prefix, static_version),
      format!("{}-api-{}", prefix, api_version),
    )
  }

  pub fn name(&self, role: CacheRole) -> &str {
    self.names.get(&role).map(String::as_str).unwrap_or_default()
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.names.values().any(|n| n == name)
  }

  pub fn roles(&self) -> impl Iterator<Item = (CacheRole, &str)> {
    self.names.iter().map(|(role, name)| (*role, name.as_str()))
  }

  /// Delete every stored generation that is not current.
  ///
  /// Returns the deleted names.
  pub fn supersede<S: CacheStorage + ?Sized>(&self, storage: &S) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in storage.generations()? {
      if self.is_current(&name) {
        continue;
      }
      if storage.delete_generation(&name)? {
        info!(generation = %name, "Deleted stale cache generation");
        deleted.push(name);
      }
    }
    Ok(deleted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;

  #[test]
  fn test_versioned_names() {
    let registry = CacheRegistry::versioned("ecommerce", "v1.2.0", "v1.1.0");
    assert_eq!(registry.name(CacheRole::Static), "ecommerce-v1.2.0");
    assert_eq!(registry.name(CacheRole::Api), "ecommerce-api-v1.1.0");
  }

  #[test]
  fn test_supersede_keeps_only_current() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    for name in ["v1", "api-v1", "v2", "api-v2", "unrelated"] {
      storage.open_generation(name).unwrap();
    }

    let registry = CacheRegistry::new("v2", "api-v2");
    let mut deleted = registry.supersede(&storage).unwrap();
    deleted.sort();

    assert_eq!(deleted, vec!["api-v1", "unrelated", "v1"]);
    assert_eq!(storage.generations().unwrap(), vec!["v2", "api-v2"]);
  }
}
