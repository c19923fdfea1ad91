//! Handlers for incident endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/persons/{id}/incidents` | Body: `{"observation":"…"}` |
//! | `GET`  | `/persons/{id}/incidents` | History, most recent first |
//! | `POST` | `/incidents/{id}/resolve` | Restores the parked state |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use canvass_core::{
  artifact::ArtifactStore, incident::Incident, lookup::CodeTables,
  registry::DocumentRegistry, store::PersonStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, resolve_actor};

#[derive(Debug, Deserialize)]
pub struct RaiseBody {
  pub observation: String,
}

/// `POST /persons/{id}/incidents`
pub async fn raise<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(person_id): Path<Uuid>,
  Json(body): Json<RaiseBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let incident = state
    .engine
    .raise_incident(&actor, person_id, body.observation)
    .await?;
  Ok((StatusCode::CREATED, Json(incident)))
}

/// `GET /persons/{id}/incidents`
pub async fn list<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(person_id): Path<Uuid>,
) -> Result<Json<Vec<Incident>>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let incidents = state.engine.incidents(&actor, person_id).await?;
  Ok(Json(incidents))
}

/// `POST /incidents/{id}/resolve`
pub async fn resolve<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(incident_id): Path<Uuid>,
) -> Result<Json<Incident>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let incident = state.engine.resolve_incident(&actor, incident_id).await?;
  Ok(Json(incident))
}
