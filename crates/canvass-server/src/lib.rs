//! Runtime wiring for the Canvass server.
//!
//! Holds the deployment-facing pieces the core deliberately abstracts
//! over: the TOML/env configuration, the filesystem evidence store, and
//! the HTTP client for the optional external document registry.

pub mod artifact;
pub mod registry;

use std::path::PathBuf;

use serde::Deserialize;

/// Runtime server configuration, deserialised from `config.toml` with
/// `CANVASS_`-prefixed environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  /// Directory evidence files are written into.
  pub artifact_dir:      PathBuf,
  /// Public URL prefix under which `artifact_dir` is served.
  pub artifact_base_url: String,
  /// Base URL of the external document registry; absent disables it.
  pub registry_url:      Option<String>,
  /// Allow confirming straight from `pending_data`. Defaults to on.
  pub confirm_from_pending: Option<bool>,
}
