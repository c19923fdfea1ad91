//! JSON REST API for Canvass.
//!
//! Exposes an axum [`Router`] backed by any [`canvass_core::store::PersonStore`]
//! plus the artifact, code-table and registry collaborators. TLS and
//! transport concerns are the caller's responsibility; the acting operator
//! arrives pre-authenticated as an `x-actor-id` header and is resolved
//! against the store.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", canvass_api::api_router(state))
//! ```

pub mod error;
pub mod imports;
pub mod incidents;
pub mod persons;

use std::sync::Arc;

use axum::{
  Router,
  http::HeaderMap,
  routing::{get, post},
};
use canvass_core::{
  Engine,
  actor::Actor,
  artifact::ArtifactStore,
  lookup::CodeTables,
  registry::{DocumentRegistry, NullRegistry},
  store::PersonStore,
};
use uuid::Uuid;

pub use error::ApiError;

/// Everything a handler needs: the engine and its collaborators.
pub struct AppState<S, A, T, R = NullRegistry> {
  pub engine:    Engine<S>,
  pub artifacts: Arc<A>,
  pub tables:    Arc<T>,
  /// `None` when the external registry feature is not configured.
  pub registry:  Option<Arc<R>>,
}

impl<S: Clone, A, T, R> Clone for AppState<S, A, T, R> {
  fn clone(&self) -> Self {
    Self {
      engine:    self.engine.clone(),
      artifacts: Arc::clone(&self.artifacts),
      tables:    Arc::clone(&self.tables),
      registry:  self.registry.as_ref().map(Arc::clone),
    }
  }
}

/// Resolve the acting operator from the `x-actor-id` header.
pub(crate) async fn resolve_actor<S: PersonStore>(
  engine: &Engine<S>,
  headers: &HeaderMap,
) -> Result<Actor, ApiError> {
  let raw = headers
    .get("x-actor-id")
    .ok_or(ApiError::Unauthorized("missing x-actor-id header"))?;
  let id = raw
    .to_str()
    .ok()
    .and_then(|s| Uuid::parse_str(s).ok())
    .ok_or(ApiError::Unauthorized("malformed x-actor-id header"))?;

  engine
    .store()
    .get_actor(id)
    .await
    .map_err(|e| ApiError::Core(e.into()))?
    .ok_or(ApiError::Unauthorized("unknown actor"))
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router
/// regardless of its own state type.
pub fn api_router<S, A, T, R>(state: AppState<S, A, T, R>) -> Router<()>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  Router::new()
    // Persons and lifecycle
    .route(
      "/persons",
      get(persons::list::<S, A, T, R>).post(persons::register::<S, A, T, R>),
    )
    .route("/persons/{id}", get(persons::get_one::<S, A, T, R>))
    .route("/persons/{id}/verify", post(persons::verify::<S, A, T, R>))
    .route(
      "/persons/{id}/confirm-state",
      post(persons::confirm_state::<S, A, T, R>),
    )
    .route("/persons/{id}/reverse", post(persons::reverse::<S, A, T, R>))
    // Evidence confirmation
    .route(
      "/persons/{id}/confirmations",
      get(persons::confirmations::<S, A, T, R>),
    )
    .route(
      "/persons/{id}/confirmation",
      post(persons::confirm::<S, A, T, R>),
    )
    // Incidents
    .route(
      "/persons/{id}/incidents",
      get(incidents::list::<S, A, T, R>).post(incidents::raise::<S, A, T, R>),
    )
    .route(
      "/incidents/{id}/resolve",
      post(incidents::resolve::<S, A, T, R>),
    )
    // Reconciliation
    .route("/imports", post(imports::reconcile::<S, A, T, R>))
    .route("/imports/{id}", get(imports::get_one::<S, A, T, R>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
