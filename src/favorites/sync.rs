//! Reconciliation of unsynced favorites with a remote system.
//!
//! The remote side is a capability: a [`FavoritePublisher`] decides what
//! "publishing a favorite" means. [`LocalOnlyPublisher`] transmits nothing and
//! accepts every record, which only flips the local flag.

use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::{FavoriteRecord, FavoritesStore};
use crate::cache::BackgroundSync;
use crate::error::StoreError;
use crate::http::{HttpRequest, Method, Transport};

/// Publish one local favorite to a remote system of record.
#[async_trait]
pub trait FavoritePublisher: Send + Sync {
  async fn publish(&self, favorite: &FavoriteRecord) -> Result<()>;
}

/// Publisher used while no remote favorites endpoint exists.
pub struct LocalOnlyPublisher;

#[async_trait]
impl FavoritePublisher for LocalOnlyPublisher {
  async fn publish(&self, _favorite: &FavoriteRecord) -> Result<()> {
    Ok(())
  }
}

/// Whether the remote side is currently reachable.
#[async_trait]
pub trait Connectivity: Send + Sync {
  async fn is_online(&self) -> bool;
}

/// Constant answer, used for `--offline` and in tests.
pub struct FixedConnectivity(pub bool);

#[async_trait]
impl Connectivity for FixedConnectivity {
  async fn is_online(&self) -> bool {
    self.0
  }
}

/// Online when a HEAD request to `probe_url` gets any HTTP answer.
pub struct HttpConnectivity {
  transport: Arc<dyn Transport>,
  probe_url: Url,
}

impl HttpConnectivity {
  pub fn new(transport: Arc<dyn Transport>, probe_url: Url) -> Self {
    Self {
      transport,
      probe_url,
    }
  }
}

#[async_trait]
impl Connectivity for HttpConnectivity {
  async fn is_online(&self) -> bool {
    let request = HttpRequest::new(Method::HEAD, self.probe_url.clone());
    self.transport.fetch(&request).await.is_ok()
  }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Unsynced records found
  pub pending: usize,
  /// Records now flagged as synced
  pub synced: usize,
  /// Records the publisher rejected
  pub failed: usize,
  /// Nothing was attempted because the network is down
  pub offline: bool,
}

/// Reconciliation job: store + connectivity check + publisher.
#[derive(Clone)]
pub struct FavoritesSync {
  store: FavoritesStore,
  connectivity: Arc<dyn Connectivity>,
  publisher: Arc<dyn FavoritePublisher>,
}

impl FavoritesSync {
  pub fn new(
    store: FavoritesStore,
    connectivity: Arc<dyn Connectivity>,
    publisher: Arc<dyn FavoritePublisher>,
  ) -> Self {
    Self {
      store,
      connectivity,
      publisher,
    }
  }

  /// Publish every unsynced favorite and flag the accepted ones.
  ///
  /// Offline, nothing is touched. A rejected record stays unsynced for the
  /// next pass. Storage failures are returned to the caller.
  pub async fn reconcile(&self) -> Result<SyncReport, StoreError> {
    let pending: Vec<FavoriteRecord> = self
      .store
      .try_get_all()
      .await?
      .into_iter()
      .filter(|f| !f.synced)
      .collect();

    let mut report = SyncReport {
      pending: pending.len(),
      ..SyncReport::default()
    };
    if pending.is_empty() {
      return Ok(report);
    }

    if !self.connectivity.is_online().await {
      info!(pending = report.pending, "Offline, favorites sync skipped");
      report.offline = true;
      return Ok(report);
    }

    let mut accepted = Vec::with_capacity(pending.len());
    for favorite in &pending {
      match self.publisher.publish(favorite).await {
        Ok(()) => accepted.push(favorite.id),
        Err(e) => {
          warn!(product_id = %favorite.product_id, error = %e, "Failed to publish favorite");
          report.failed += 1;
        }
      }
    }

    report.synced = self.store.mark_synced(accepted).await?;
    info!(synced = report.synced, failed = report.failed, "Synced favorites");
    Ok(report)
  }
}

#[async_trait]
impl BackgroundSync for FavoritesSync {
  async fn run(&self) -> Result<()> {
    self.reconcile().await?;
    Ok(())
  }
}
