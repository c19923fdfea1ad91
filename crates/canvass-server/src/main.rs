//! canvass server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the JSON API over HTTP. Evidence
//! files go to a local directory; the external document registry is
//! enabled by setting `registry_url`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use canvass_api::AppState;
use canvass_core::{Engine, LifecyclePolicy};
use canvass_server::{
  ServerConfig, artifact::FsArtifactStore, registry::HttpRegistry,
};
use canvass_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Canvass verification-pipeline server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CANVASS"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open the SQLite store; it also serves as the code-table lookup.
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let artifacts = FsArtifactStore::open(
    expand_tilde(&server_cfg.artifact_dir),
    server_cfg.artifact_base_url.clone(),
  )
  .await
  .context("failed to open artifact directory")?;

  let registry = match &server_cfg.registry_url {
    Some(url) => {
      tracing::info!(url = %url, "external document registry enabled");
      Some(Arc::new(
        HttpRegistry::new(url.clone()).context("failed to build registry client")?,
      ))
    }
    None => None,
  };

  let policy = LifecyclePolicy {
    confirm_from_pending: server_cfg.confirm_from_pending.unwrap_or(true),
  };

  let state = AppState {
    engine:    Engine::with_policy(store.clone(), policy),
    artifacts: Arc::new(artifacts),
    tables:    Arc::new(store),
    registry,
  };

  let app = axum::Router::new()
    .nest("/api", canvass_api::api_router(state))
    .layer(TraceLayer::new_for_http());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!("listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
