//! Cache layer that applies caching strategies around network fetches.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::RequestKey;
use super::result::CacheResult;
use super::storage::CacheStorage;
use crate::error::FetchError;
use crate::http::HttpResponse;

/// Only complete 200 responses are stored.
fn is_storable(response: &HttpResponse) -> bool {
  response.status == 200
}

/// Cache layer that manages caching strategies and network fetching.
///
/// Storage failures never fail a request here: reads degrade to a miss and
/// writes are logged and skipped.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  fn store(&self, generation: &str, key: &RequestKey, response: &HttpResponse) {
    if let Err(e) = self.storage.put(generation, key, response) {
      warn!(request = %key.description(), error = %e, "Failed to store response");
    }
  }

  /// Network-first.
  ///
  /// 1. Fetch from network; store a copy of a 200 response and return it
  /// 2. On network failure, return the stored copy for this exact key
  /// 3. With nothing stored, return `placeholder()`
  ///
  /// Never fails.
  pub async fn network_first<F, Fut, P>(
    &self,
    generation: &str,
    key: &RequestKey,
    fetcher: F,
    placeholder: P,
  ) -> CacheResult<HttpResponse>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HttpResponse, FetchError>>,
    P: FnOnce() -> HttpResponse,
  {
    match fetcher().await {
      Ok(response) => {
        if is_storable(&response) {
          self.store(generation, key, &response);
        }
        CacheResult::from_network(response)
      }
      Err(err) => {
        debug!(request = %key.description(), error = %err, "Network failed, trying cache");
        match self.storage.match_in(generation, key) {
          Ok(Some(cached)) => CacheResult::offline(cached.response, cached.cached_at),
          Ok(None) => CacheResult::placeholder(placeholder()),
          Err(e) => {
            warn!(request = %key.description(), error = %e, "Cache lookup failed");
            CacheResult::placeholder(placeholder())
          }
        }
      }
    }
  }

  /// Cache-first.
  ///
  /// 1. Return a stored copy from any generation, without fetching
  /// 2. Otherwise fetch; store a copy of a 200 response in `generation`
  /// 3. A failed fetch with nothing stored is returned as the error
  pub async fn cache_first<F, Fut>(
    &self,
    generation: &str,
    key: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<HttpResponse>, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<HttpResponse, FetchError>>,
  {
    match self.storage.match_any(key) {
      Ok(Some(cached)) => {
        debug!(request = %key.description(), generation = %cached.generation, "Cache hit");
        return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
      }
      Ok(None) => {}
      Err(e) => warn!(request = %key.description(), error = %e, "Cache lookup failed"),
    }

    let response = fetcher().await?;
    if is_storable(&response) {
      self.store(generation, key, &response);
    }
    Ok(CacheResult::from_network(response))
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
