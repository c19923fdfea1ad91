//! Handlers for bulk reconciliation endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/imports` | Run a reconciliation batch |
//! | `GET`  | `/imports/{id}` | Audit view of a past batch |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use canvass_core::{
  artifact::ArtifactStore,
  import::{CandidateRow, ImportBatch},
  lookup::CodeTables,
  reconcile::ReconcileInput,
  registry::DocumentRegistry,
  store::PersonStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, resolve_actor};

#[derive(Debug, Deserialize)]
pub struct ReconcileBody {
  pub file_name:    String,
  /// Owning leader for inserted rows; defaults to the acting actor.
  pub owner_leader: Option<Uuid>,
  pub attribution:  Option<String>,
  pub rows:         Vec<CandidateRow>,
}

/// `POST /imports`
pub async fn reconcile<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Json(body): Json<ReconcileBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let input = ReconcileInput {
    file_name:    body.file_name,
    owner_leader: body.owner_leader.unwrap_or(actor.actor_id),
    attribution:  body.attribution,
    rows:         body.rows,
  };

  let batch = state
    .engine
    .reconcile(
      &actor,
      input,
      state.tables.as_ref(),
      state.registry.as_deref(),
    )
    .await?;
  Ok((StatusCode::CREATED, Json(batch)))
}

/// `GET /imports/{id}`
pub async fn get_one<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<ImportBatch>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let batch = state.engine.batch(&actor, id).await?;
  Ok(Json(batch))
}
