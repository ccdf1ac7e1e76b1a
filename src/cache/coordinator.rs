//! Offline cache coordinator: the fetch interceptor between callers and the
//! network.
//!
//! Lifecycle: `Installing -> Installed -> Activating -> Active`, or
//! `Redundant` when install fails. Activation is recorded in storage. Until
//! this version activates, the last activated version keeps intercepting
//! requests; with no activation on record they go straight to the network.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use super::key::RequestKey;
use super::layer::CacheLayer;
use super::registry::{CacheRegistry, CacheRole};
use super::result::CacheResult;
use super::storage::CacheStorage;
use crate::error::FetchError;
use crate::http::{HttpRequest, HttpResponse, Transport};

pub const OFFLINE_MESSAGE: &str = "You are offline. Please check your connection.";

/// Tag of the background sync event that triggers favorites reconciliation.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Response returned for API requests when offline with nothing stored.
pub fn offline_placeholder() -> HttpResponse {
  HttpResponse::json_value(
    200,
    &serde_json::json!({
      "error": true,
      "message": OFFLINE_MESSAGE,
      "listStory": []
    }),
  )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Nothing installed yet
  New,
  Installing,
  /// Installed, waiting for activation
  Installed,
  Activating,
  Active,
  /// Install failed; this version never activates, the previous one serves
  Redundant,
}

/// How a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Story/product API: network-first
  Api,
  /// Same-origin asset: cache-first
  StaticAsset,
  /// Anything else: straight to the network
  Passthrough,
}

/// Work run on a background sync event.
#[async_trait]
pub trait BackgroundSync: Send + Sync {
  async fn run(&self) -> Result<()>;
}

/// Where requests are classified and what install fetches.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
  /// The application's own origin
  pub origin: Url,
  /// Path fragment identifying API requests
  pub api_path_pattern: String,
  /// Static assets fetched at install
  pub manifest: Vec<Url>,
}

impl CoordinatorSettings {
  /// Resolve manifest entries: absolute URLs are kept, paths are joined onto
  /// `origin`.
  pub fn new(origin: &str, api_path_pattern: &str, assets: &[String]) -> Result<Self> {
    let origin = Url::parse(origin).map_err(|e| eyre!("Invalid origin {}: {}", origin, e))?;
    let manifest = assets
      .iter()
      .map(|asset| {
        Url::parse(asset)
          .or_else(|_| origin.join(asset))
          .map_err(|e| eyre!("Invalid static asset {}: {}", asset, e))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      origin,
      api_path_pattern: api_path_pattern.to_string(),
      manifest,
    })
  }
}

/// Summary of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Stale generations that were deleted
  pub deleted: Vec<String>,
}

pub struct CacheCoordinator<S: CacheStorage> {
  network: Arc<dyn Transport>,
  layer: CacheLayer<S>,
  registry: CacheRegistry,
  settings: CoordinatorSettings,
  state: Mutex<WorkerState>,
  /// Generations requests are served from, if any version is active
  serving: Mutex<Option<CacheRegistry>>,
  background_sync: Option<Arc<dyn BackgroundSync>>,
}

impl<S: CacheStorage> CacheCoordinator<S> {
  pub fn new(
    network: Arc<dyn Transport>,
    storage: S,
    registry: CacheRegistry,
    settings: CoordinatorSettings,
  ) -> Self {
    Self {
      network,
      layer: CacheLayer::new(storage),
      registry,
      settings,
      state: Mutex::new(WorkerState::New),
      serving: Mutex::new(None),
      background_sync: None,
    }
  }

  pub fn with_background_sync(mut self, task: Arc<dyn BackgroundSync>) -> Self {
    self.background_sync = Some(task);
    self
  }

  pub fn registry(&self) -> &CacheRegistry {
    &self.registry
  }

  pub fn storage(&self) -> &S {
    self.layer.storage()
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  fn set_state(&self, state: WorkerState) {
    if let Ok(mut current) = self.state.lock() {
      debug!(from = ?*current, to = ?state, "Coordinator state change");
      *current = state;
    }
  }

  fn serving(&self) -> Option<CacheRegistry> {
    self.serving.lock().ok().and_then(|s| s.clone())
  }

  fn serve(&self, registry: CacheRegistry) {
    if let Ok(mut serving) = self.serving.lock() {
      *serving = Some(registry);
    }
  }

  pub fn classify(&self, url: &Url) -> RequestClass {
    if url.path().contains(&self.settings.api_path_pattern) {
      RequestClass::Api
    } else if url.origin() == self.settings.origin.origin() && !url.as_str().contains("/api/") {
      RequestClass::StaticAsset
    } else {
      RequestClass::Passthrough
    }
  }

  /// Fetch every manifest asset and store them in the static generation.
  ///
  /// All or nothing: a single failed or non-OK fetch stores nothing and
  /// leaves the coordinator `Redundant`.
  pub async fn install(&self) -> Result<usize> {
    self.set_state(WorkerState::Installing);
    let generation = self.registry.name(CacheRole::Static);

    let fetches = self.settings.manifest.iter().map(|url| async move {
      let request = HttpRequest::get(url.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;
      if !response.is_ok() {
        return Err(eyre!("Failed to fetch {}: status {}", url, response.status));
      }
      Ok::<_, color_eyre::Report>((RequestKey::for_request(&request), response))
    });

    let result = futures::future::try_join_all(fetches)
      .await
      .and_then(|entries| {
        self.storage().put_all(generation, &entries)?;
        Ok(entries.len())
      });

    match result {
      Ok(count) => {
        info!(generation, count, "Installed static assets");
        self.set_state(WorkerState::Installed);
        Ok(count)
      }
      Err(e) => {
        warn!(generation, error = %e, "Install failed");
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  /// Take over request handling and garbage-collect stale generations.
  pub fn activate(&self) -> Result<ActivationReport> {
    let state = self.state();
    if state != WorkerState::Installed {
      return Err(eyre!("Cannot activate from state {:?}", state));
    }
    self.set_state(WorkerState::Activating);

    let claimed = self
      .registry
      .roles()
      .try_for_each(|(_, name)| self.storage().open_generation(name))
      .and_then(|_| self.storage().record_active(&self.registry));
    if let Err(e) = claimed {
      self.set_state(WorkerState::Installed);
      return Err(e);
    }

    // Claim all clients: interception moves to this version now
    self.serve(self.registry.clone());
    self.set_state(WorkerState::Active);

    // Anything left behind here is collected on the next resume
    let deleted = self.registry.supersede(self.storage()).unwrap_or_else(|e| {
      warn!(error = %e, "Failed to delete stale cache generations");
      Vec::new()
    });
    info!(deleted = deleted.len(), "Cache coordinator active");
    Ok(ActivationReport { deleted })
  }

  /// Install then activate without waiting.
  pub async fn start(&self) -> Result<ActivationReport> {
    self.install().await?;
    self.activate()
  }

  /// Pick up the activation recorded by an earlier run.
  ///
  /// Returns `true` when this version is the recorded one and its static
  /// generation is still stored; stale generations are collected. Otherwise
  /// the recorded version, if any, keeps serving until this one activates.
  pub fn resume(&self) -> Result<bool> {
    let Some(recorded) = self.storage().active_registry()? else {
      return Ok(false);
    };

    if recorded == self.registry
      && self
        .storage()
        .has_generation(self.registry.name(CacheRole::Static))?
    {
      let deleted = self.registry.supersede(self.storage())?;
      if !deleted.is_empty() {
        info!(deleted = deleted.len(), "Collected stale generations on resume");
      }
      self.serve(recorded);
      self.set_state(WorkerState::Active);
      return Ok(true);
    }

    debug!(
      static_generation = recorded.name(CacheRole::Static),
      api_generation = recorded.name(CacheRole::Api),
      "Previous cache version serves until activation"
    );
    self.serve(recorded);
    Ok(false)
  }

  /// Intercept one request.
  pub async fn handle(&self, request: &HttpRequest) -> Result<CacheResult<HttpResponse>, FetchError> {
    let Some(serving) = self.serving() else {
      return self.passthrough(request).await;
    };

    match self.classify(&request.url) {
      RequestClass::Api => Ok(self.network_first(&serving, request).await),
      RequestClass::StaticAsset => self.cache_first(&serving, request).await,
      RequestClass::Passthrough => self.passthrough(request).await,
    }
  }

  async fn network_first(
    &self,
    serving: &CacheRegistry,
    request: &HttpRequest,
  ) -> CacheResult<HttpResponse> {
    // Only GET responses are stored or looked up
    if !request.is_get() {
      return match self.network.fetch(request).await {
        Ok(response) => CacheResult::from_network(response),
        Err(e) => {
          debug!(url = %request.url, error = %e, "Network failed for non-GET API request");
          CacheResult::placeholder(offline_placeholder())
        }
      };
    }

    let key = RequestKey::for_request(request);
    self
      .layer
      .network_first(
        serving.name(CacheRole::Api),
        &key,
        || self.network.fetch(request),
        offline_placeholder,
      )
      .await
  }

  async fn cache_first(
    &self,
    serving: &CacheRegistry,
    request: &HttpRequest,
  ) -> Result<CacheResult<HttpResponse>, FetchError> {
    if !request.is_get() {
      return self.passthrough(request).await;
    }

    let key = RequestKey::for_request(request);
    self
      .layer
      .cache_first(serving.name(CacheRole::Static), &key, || {
        self.network.fetch(request)
      })
      .await
  }

  async fn passthrough(
    &self,
    request: &HttpRequest,
  ) -> Result<CacheResult<HttpResponse>, FetchError> {
    let response = self.network.fetch(request).await?;
    Ok(CacheResult::passthrough(response))
  }

  /// Handle a background sync event. Returns whether work ran.
  pub async fn on_sync(&self, tag: &str) -> Result<bool> {
    if tag != BACKGROUND_SYNC_TAG {
      debug!(tag, "Ignoring sync event");
      return Ok(false);
    }

    match &self.background_sync {
      Some(task) => {
        info!("Background sync triggered");
        task.run().await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }
}

#[async_trait]
impl<S: CacheStorage + 'static> Transport for CacheCoordinator<S> {
  async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
    self.handle(request).await.map(|result| result.data)
  }
}
