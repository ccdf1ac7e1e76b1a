mod app;
mod cache;
mod config;
mod db;
mod error;
mod favorites;
mod http;
mod logging;
mod push;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use crate::favorites::{SortField, SortOrder};

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Offline-first storefront client: favorites, cached catalog, push")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Directory for databases and logs (overrides storage.data_dir)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Treat the network as unreachable when syncing favorites
  #[arg(long, global = true)]
  offline: bool,

  /// Keep favorites, session and cache in memory for this run only
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Also write logs to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Manage locally saved favorites
  #[command(subcommand)]
  Favorites(FavoritesCommand),

  /// Log in and store the session token
  Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },

  /// Create an account
  Register {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },

  /// Forget the stored session
  Logout,

  /// Show the logged-in user
  Whoami,

  /// List products (served from cache when offline)
  Stories {
    /// Only products with a location
    #[arg(long)]
    location: bool,
  },

  /// Publish a new product story
  AddStory {
    #[arg(long)]
    description: String,
    /// Image file to upload
    #[arg(long)]
    photo: PathBuf,
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
  },

  /// Inspect and drive the offline cache
  #[command(subcommand)]
  Cache(CacheCommand),

  /// Show the notification for a push payload
  Push {
    /// Raw payload, normally a JSON object
    payload: Option<String>,
    /// Simulate clicking the notification
    #[arg(long)]
    click: bool,
    /// URL of an open window (repeatable)
    #[arg(long = "window")]
    windows: Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
  /// Save a product; details are looked up from the catalog unless given
  Add {
    product_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "")]
    photo_url: String,
  },
  /// List favorites
  List {
    /// Case-insensitive match on name or description
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t)]
    sort: SortField,
    #[arg(long, value_enum, default_value_t)]
    order: SortOrder,
  },
  Remove {
    product_id: String,
  },
  /// Print whether a product is a favorite
  Check {
    product_id: String,
  },
  /// Reconcile unsynced favorites
  Sync,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Fetch and store the static asset manifest
  Install,
  /// Install (if needed) and activate, removing stale generations
  Activate,
  /// Show coordinator state and stored generations
  Status,
  /// Fetch a URL through the coordinator
  Fetch { url: String },
  /// Deliver a background sync event
  Sync {
    #[arg(default_value = cache::BACKGROUND_SYNC_TAG)]
    tag: String,
  },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override data directory if specified on command line
  if let Some(dir) = args.data_dir {
    config.storage.data_dir = Some(dir);
  }

  let data_dir = config.data_dir()?;
  let _guard = logging::init(&data_dir, config.log_level.as_deref(), args.verbose)?;

  let options = app::Options {
    data_dir,
    offline: args.offline,
    ephemeral: args.ephemeral,
  };

  let app = app::App::new(config, options)?;
  app.run(args.command).await
}
