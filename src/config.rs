use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheRegistry, CoordinatorSettings};
use crate::push::DEFAULT_TITLE;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub app: AppConfig,
  pub cache: CacheConfig,
  pub storage: StorageConfig,
  /// Fallback log filter when STOREFRONT_LOG is unset (e.g., "info", "storefront=debug")
  pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Requests whose path contains this are API requests (network-first)
  pub path_pattern: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://story-api.dicoding.dev/v1".to_string(),
      path_pattern: "/stories".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Origin the app is served from; same-origin requests are cache-first
  pub origin: String,
  /// Notification title when a push payload has none
  pub name: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      name: DEFAULT_TITLE.to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub prefix: String,
  pub static_version: String,
  pub api_version: String,
  /// Assets fetched at install, as paths on the origin or absolute URLs
  pub static_assets: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "ecommerce".to_string(),
      static_version: "v1.2.0".to_string(),
      api_version: "v1.1.0".to_string(),
      static_assets: [
        "/",
        "/index.html",
        "/manifest.json",
        "/icons/icon-72x72.png",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Directory for the databases and log file (defaults to $XDG_DATA_HOME/storefront)
  pub data_dir: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storefront.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-default config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.storage.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .map(|d| d.join("storefront"))
      .ok_or_else(|| eyre!("Could not determine data directory; set storage.data_dir"))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn registry(&self) -> CacheRegistry {
    CacheRegistry::versioned(
      &self.cache.prefix,
      &self.cache.static_version,
      &self.cache.api_version,
    )
  }

  pub fn coordinator_settings(&self) -> Result<CoordinatorSettings> {
    CoordinatorSettings::new(
      &self.app.origin,
      &self.api.path_pattern,
      &self.cache.static_assets,
    )
  }

  /// Get an API token from the environment.
  ///
  /// Checks STOREFRONT_API_TOKEN. The stored session is used otherwise.
  pub fn get_api_token() -> Option<String> {
    std::env::var("STOREFRONT_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheRole;

  #[test]
  fn test_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.base_url, "https://story-api.dicoding.dev/v1");
    assert_eq!(config.api.path_pattern, "/stories");
    assert_eq!(config.app.name, "E-Commerce App");

    let registry = config.registry();
    assert_eq!(registry.name(CacheRole::Static), "ecommerce-v1.2.0");
    assert_eq!(registry.name(CacheRole::Api), "ecommerce-api-v1.1.0");
  }

  #[test]
  fn test_partial_file_keeps_other_defaults() {
    let yaml = r#"
app:
  origin: https://shop.example
cache:
  static_version: v2
  static_assets:
    - /
    - https://cdn.example/app.css
storage:
  data_dir: /tmp/storefront-test
log_level: debug
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.app.origin, "https://shop.example");
    assert_eq!(config.app.name, "E-Commerce App");
    assert_eq!(config.cache.prefix, "ecommerce");
    assert_eq!(config.registry().name(CacheRole::Static), "ecommerce-v2");
    assert_eq!(config.log_level.as_deref(), Some("debug"));
    assert_eq!(
      config.data_dir().unwrap(),
      PathBuf::from("/tmp/storefront-test")
    );

    let settings = config.coordinator_settings().unwrap();
    let manifest: Vec<&str> = settings.manifest.iter().map(|u| u.as_str()).collect();
    assert_eq!(
      manifest,
      vec!["https://shop.example/", "https://cdn.example/app.css"]
    );
  }

  #[test]
  fn test_load_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storefront.yaml");
    std::fs::write(&path, "api:\n  timeout_secs: 5\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.timeout(), Duration::from_secs(5));

    let missing = dir.path().join("missing.yaml");
    assert!(Config::load(Some(&missing)).is_err());
  }

  #[test]
  fn test_invalid_yaml_is_an_error() {
    assert!(Config::parse("api: [not, a, map]").is_err());
  }
}
