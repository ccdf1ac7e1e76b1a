use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::cache::{
  CacheCoordinator, CacheRole, CacheSource, CacheStorage, SqliteStorage, WorkerState,
};
use crate::config::Config;
use crate::db::session::{SessionStore, UserInfo};
use crate::db::Database;
use crate::error::{ApiError, StoreError};
use crate::favorites::{
  sort_records, Connectivity, FavoritesStore, FavoritesSync, FixedConnectivity, HttpConnectivity,
  LocalOnlyPublisher, ProductInput,
};
use crate::http::api_types::{NewStory, Story};
use crate::http::client::StoryApiClient;
use crate::http::{HttpRequest, ReqwestTransport, Transport};
use crate::push::{
  handle_notification_click, notification_from_push, ClickOutcome, ConsoleNotifications,
  NotificationCenter, WindowList,
};
use crate::{CacheCommand, Command, FavoritesCommand};

/// Runtime switches that do not live in the config file.
#[derive(Debug, Clone)]
pub struct Options {
  pub data_dir: PathBuf,
  /// Report the network as unreachable to favorites sync
  pub offline: bool,
  /// Use in-memory databases
  pub ephemeral: bool,
}

/// Wires the stores, cache coordinator and API client together and runs one
/// command against them.
pub struct App {
  config: Config,
  favorites: FavoritesStore,
  session: SessionStore,
  coordinator: Arc<CacheCoordinator<SqliteStorage>>,
  api: StoryApiClient,
  sync: FavoritesSync,
}

impl App {
  pub fn new(config: Config, options: Options) -> Result<Self> {
    let network: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.timeout())?);

    let (db, storage) = if options.ephemeral {
      (Database::in_memory(), SqliteStorage::open_in_memory()?)
    } else {
      (
        Database::at(Database::default_path(&options.data_dir)),
        SqliteStorage::open(&SqliteStorage::default_path(&options.data_dir))?,
      )
    };

    let connectivity: Arc<dyn Connectivity> = if options.offline {
      Arc::new(FixedConnectivity(false))
    } else {
      let probe = Url::parse(&config.api.base_url)
        .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;
      Arc::new(HttpConnectivity::new(network.clone(), probe))
    };

    Self::assemble(config, db, storage, network, connectivity)
  }

  fn assemble(
    config: Config,
    db: Database,
    storage: SqliteStorage,
    network: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
  ) -> Result<Self> {
    let favorites = FavoritesStore::new(db.clone());
    let session = SessionStore::new(db);
    let sync = FavoritesSync::new(
      favorites.clone(),
      connectivity,
      Arc::new(LocalOnlyPublisher),
    );

    let coordinator = Arc::new(
      CacheCoordinator::new(
        network,
        storage,
        config.registry(),
        config.coordinator_settings()?,
      )
      .with_background_sync(Arc::new(sync.clone())),
    );
    let api = StoryApiClient::new(&config.api.base_url, coordinator.clone())?;

    Ok(Self {
      config,
      favorites,
      session,
      coordinator,
      api,
      sync,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Favorites(cmd) => self.run_favorites(cmd).await,
      Command::Login { email, password } => self.login(&email, &password).await,
      Command::Register {
        name,
        email,
        password,
      } => {
        let reply = self.api.register(&name, &email, &password).await?;
        println!("{}", reply.message);
        Ok(())
      }
      Command::Logout => {
        self.session.logout().await?;
        println!("Logged out");
        Ok(())
      }
      Command::Whoami => {
        println!("{}", self.whoami().await?);
        Ok(())
      }
      Command::Stories { location } => self.list_stories(location).await,
      Command::AddStory {
        description,
        photo,
        lat,
        lon,
      } => self.add_story(description, &photo, lat, lon).await,
      Command::Cache(cmd) => self.run_cache(cmd).await,
      Command::Push {
        payload,
        click,
        windows,
      } => self.push(payload.as_deref(), click, windows).await,
    }
  }

  // ==========================================================================
  // Favorites
  // ==========================================================================

  async fn run_favorites(&self, command: FavoritesCommand) -> Result<()> {
    match command {
      FavoritesCommand::Add {
        product_id,
        name,
        description,
        photo_url,
      } => {
        let product = match name {
          Some(name) => ProductInput {
            id: product_id,
            name,
            description,
            photo_url,
          },
          None => self.product_from_catalog(&product_id).await?,
        };
        match self.favorites.add(&product).await {
          Ok(id) => println!("Added {} to favorites (#{})", product.name, id),
          Err(StoreError::ConstraintViolation { product_id }) => {
            println!("{} is already a favorite", product_id)
          }
          Err(e) => return Err(e.into()),
        }
      }
      FavoritesCommand::List {
        search,
        sort,
        order,
      } => {
        let records = match search.as_deref() {
          Some(query) => {
            let mut found = self.favorites.search(query).await;
            sort_records(&mut found, sort, order);
            found
          }
          None => self.favorites.sort(sort, order).await,
        };
        if records.is_empty() {
          println!("No favorites");
        }
        for f in records {
          let flag = if f.synced { " " } else { "*" };
          println!("{}{:<24} {:<32} {}", flag, f.product_id, f.name, f.created_at);
        }
      }
      FavoritesCommand::Remove { product_id } => {
        if self.favorites.remove(&product_id).await? {
          println!("Removed {}", product_id);
        } else {
          println!("{} is not a favorite", product_id);
        }
      }
      FavoritesCommand::Check { product_id } => {
        println!("{}", self.favorites.is_favorite(&product_id).await?);
      }
      FavoritesCommand::Sync => {
        let report = self.sync.reconcile().await?;
        if report.offline {
          println!("Offline: {} favorites waiting to sync", report.pending);
        } else {
          println!(
            "Synced {} of {} favorites ({} failed)",
            report.synced, report.pending, report.failed
          );
        }
      }
    }
    Ok(())
  }

  /// Snapshot a product's display data from the (possibly cached) catalog.
  async fn product_from_catalog(&self, product_id: &str) -> Result<ProductInput> {
    let stories = self.stories(false).await?;
    stories
      .iter()
      .find(|s| s.id == product_id)
      .map(ProductInput::from)
      .ok_or_else(|| eyre!("Product {} not found in catalog; pass --name to add it anyway", product_id))
  }

  // ==========================================================================
  // Story API
  // ==========================================================================

  async fn token(&self) -> Result<String, ApiError> {
    if let Some(token) = Config::get_api_token() {
      return Ok(token);
    }
    match self.session.token().await {
      Ok(Some(token)) => Ok(token),
      Ok(None) => Err(ApiError::Unauthenticated),
      Err(e) => {
        warn!(error = %e, "Failed to read session");
        Err(ApiError::Unauthenticated)
      }
    }
  }

  async fn stories(&self, with_location: bool) -> Result<Vec<Story>> {
    self.ensure_active().await;
    let token = self.token().await?;
    let response = self.api.get_stories(&token, with_location).await?;
    if response.error {
      // Offline placeholder or an API-level failure
      println!("{}", response.message);
    }
    Ok(response.list_story)
  }

  async fn list_stories(&self, with_location: bool) -> Result<()> {
    for story in self.stories(with_location).await? {
      let location = match (story.lat, story.lon) {
        (Some(lat), Some(lon)) => format!(" ({:.4}, {:.4})", lat, lon),
        _ => String::new(),
      };
      println!("{:<24} {}{}", story.id, story.name, location);
      if !story.description.is_empty() {
        println!("  {}", story.description);
      }
    }
    Ok(())
  }

  async fn add_story(
    &self,
    description: String,
    photo: &Path,
    lat: Option<f64>,
    lon: Option<f64>,
  ) -> Result<()> {
    let bytes = tokio::fs::read(photo)
      .await
      .map_err(|e| eyre!("Failed to read {}: {}", photo.display(), e))?;
    let story = NewStory {
      description,
      photo_filename: photo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string()),
      photo_mime: image_mime(photo).to_string(),
      photo: bytes,
      lat,
      lon,
    };

    self.ensure_active().await;
    let token = self.token().await?;
    let reply = self.api.add_story(&token, &story).await?;
    println!("{}", reply.message);
    Ok(())
  }

  async fn login(&self, email: &str, password: &str) -> Result<()> {
    let result = self.api.login(email, password).await?;
    self.session.set_token(&result.token).await?;
    self
      .session
      .set_user(&UserInfo {
        user_id: result.user_id,
        name: result.name.clone(),
      })
      .await?;
    info!(user = %result.name, "Logged in");
    println!("Logged in as {}", result.name);
    Ok(())
  }

  async fn whoami(&self) -> Result<String> {
    if !self.session.is_authenticated().await? {
      return Ok("Not logged in".to_string());
    }
    Ok(match self.session.user().await? {
      Some(user) => format!("{} ({})", user.name, user.user_id),
      None => "Logged in".to_string(),
    })
  }

  // ==========================================================================
  // Cache
  // ==========================================================================

  /// Make sure this version intercepts requests: resume its recorded
  /// activation or install and activate now. On failure the previously
  /// activated version, if any, keeps serving.
  async fn ensure_active(&self) {
    match self.coordinator.resume() {
      Ok(true) => return,
      Ok(false) => {}
      Err(e) => warn!(error = %e, "Failed to resume cache"),
    }
    if let Err(e) = self.coordinator.start().await {
      warn!(error = %e, "Cache upgrade failed; previous version keeps serving");
    }
  }

  async fn run_cache(&self, command: CacheCommand) -> Result<()> {
    match command {
      CacheCommand::Install => {
        let count = self.coordinator.install().await?;
        println!(
          "Installed {} assets into {}",
          count,
          self.coordinator.registry().name(CacheRole::Static)
        );
      }
      CacheCommand::Activate => {
        if self.coordinator.state() != WorkerState::Installed {
          self.coordinator.install().await?;
        }
        let report = self.coordinator.activate()?;
        if report.deleted.is_empty() {
          println!("Activated; no stale generations");
        } else {
          println!("Activated; deleted {}", report.deleted.join(", "));
        }
      }
      CacheCommand::Status => self.cache_status()?,
      CacheCommand::Fetch { url } => {
        let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
        self.ensure_active().await;
        let result = self.coordinator.handle(&HttpRequest::get(url)).await?;
        let age = match (result.source, result.cached_at) {
          (CacheSource::Cache | CacheSource::Offline, Some(at)) => format!(" cached {}", at),
          _ => String::new(),
        };
        let content_type = result.data.content_type().unwrap_or("unknown type");
        println!(
          "{} {} via {:?}{}",
          result.data.status, content_type, result.source, age
        );
        println!("{}", result.data.text());
      }
      CacheCommand::Sync { tag } => {
        self.ensure_active().await;
        if !self.coordinator.on_sync(&tag).await? {
          println!("Nothing registered for sync tag {}", tag);
        }
      }
    }
    Ok(())
  }

  /// Report what is stored. Read-only: the coordinator is not resumed.
  fn cache_status(&self) -> Result<()> {
    let storage = self.coordinator.storage();
    let registry = self.coordinator.registry();
    println!("state: {:?}", self.coordinator.state());

    let active = storage.active_registry()?;
    match &active {
      Some(a) if a == registry => println!("active: this version"),
      Some(a) => println!(
        "active: {} and {} (previous version)",
        a.name(CacheRole::Static),
        a.name(CacheRole::Api)
      ),
      None => println!("active: none"),
    }

    for (role, name) in registry.roles() {
      let entries = if storage.has_generation(name)? {
        storage.entry_count(name)?.to_string()
      } else {
        "not stored".to_string()
      };
      println!("{:<7} {:<28} {}", role.to_string(), name, entries);
    }
    for name in storage.generations()? {
      if registry.is_current(&name) {
        continue;
      }
      let label = match &active {
        Some(a) if a.is_current(&name) => "serving",
        _ => "stale",
      };
      println!("{:<7} {:<28} {}", label, name, storage.entry_count(&name)?);
    }
    Ok(())
  }

  // ==========================================================================
  // Push
  // ==========================================================================

  async fn push(&self, payload: Option<&str>, click: bool, windows: Vec<String>) -> Result<()> {
    let Some(notification) =
      notification_from_push(payload.map(str::as_bytes), &self.config.app.name)
    else {
      println!("Push carried no data; nothing shown");
      return Ok(());
    };

    let center = ConsoleNotifications;
    center.show(&notification).await?;

    if click {
      let windows = WindowList::new(windows);
      match handle_notification_click(&notification, &self.config.app.origin, &center, &windows)
        .await?
      {
        ClickOutcome::Focused(w) => println!("Focused window {}", w.url),
        ClickOutcome::Opened(w) => println!("Opened window {}", w.url),
      }
    }
    Ok(())
  }
}

fn image_mime(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .map(|e| e.to_string_lossy().to_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "jpg" | "jpeg" => "image/jpeg",
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    _ => "application/octet-stream",
  }
}
