//! Handlers for `/persons` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/persons` | Everything inside the actor's scope |
//! | `POST` | `/persons` | Register; `registered_by` defaults to the actor |
//! | `GET`  | `/persons/{id}` | 404 outside scope |
//! | `POST` | `/persons/{id}/verify` | `pending_data → verified` |
//! | `POST` | `/persons/{id}/confirm-state` | `→ confirmed` |
//! | `POST` | `/persons/{id}/reverse` | One step down |
//! | `GET`  | `/persons/{id}/confirmations` | Full history, reversed included |
//! | `POST` | `/persons/{id}/confirmation` | Raw evidence bytes; completes |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use bytes::Bytes;
use canvass_core::{
  artifact::{ArtifactStore, EvidenceFile},
  confirmation::Confirmation,
  lookup::CodeTables,
  person::{Document, DocumentKind, NewPerson, Person},
  registry::DocumentRegistry,
  store::PersonStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, resolve_actor};

// ─── List / register ─────────────────────────────────────────────────────────

/// `GET /persons`
pub async fn list<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
) -> Result<Json<Vec<Person>>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let persons = state.engine.list_persons(&actor).await?;
  Ok(Json(persons))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub full_name:       String,
  pub document_kind:   DocumentKind,
  pub document_number: String,
  /// Owning leader; defaults to the acting actor.
  pub registered_by:   Option<Uuid>,
  pub location_id:     Option<Uuid>,
  pub station_id:      Option<Uuid>,
  pub table_number:    Option<u32>,
}

/// `POST /persons`
pub async fn register<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let input = NewPerson {
    full_name:       body.full_name,
    document:        Document {
      kind:   body.document_kind,
      number: body.document_number,
    },
    registered_by:   body.registered_by.unwrap_or(actor.actor_id),
    location_id:     body.location_id,
    station_id:      body.station_id,
    table_number:    body.table_number,
    imported:        false,
    import_batch_id: None,
  };
  let person = state.engine.register(&actor, input).await?;
  Ok((StatusCode::CREATED, Json(person)))
}

// ─── Single-person reads ─────────────────────────────────────────────────────

/// `GET /persons/{id}`
pub async fn get_one<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<Person>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let person = state.engine.person(&actor, id).await?;
  Ok(Json(person))
}

/// `GET /persons/{id}/confirmations`
pub async fn confirmations<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Confirmation>>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let rows = state.engine.confirmations(&actor, id).await?;
  Ok(Json(rows))
}

// ─── Lifecycle transitions ───────────────────────────────────────────────────

/// `POST /persons/{id}/verify`
pub async fn verify<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<Person>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let person = state.engine.verify(&actor, id).await?;
  Ok(Json(person))
}

/// `POST /persons/{id}/confirm-state`
pub async fn confirm_state<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<Person>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let person = state.engine.confirm_state(&actor, id).await?;
  Ok(Json(person))
}

/// `POST /persons/{id}/reverse`
pub async fn reverse<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
) -> Result<Json<Person>, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;
  let person = state.engine.reverse(&actor, id).await?;
  Ok(Json(person))
}

// ─── Evidence confirmation ───────────────────────────────────────────────────

/// `POST /persons/{id}/confirmation`
///
/// The body is the raw evidence bytes; the original filename travels in
/// the `x-file-name` header when the client has one.
pub async fn confirm<S, A, T, R>(
  State(state): State<AppState<S, A, T, R>>,
  headers: HeaderMap,
  Path(id): Path<Uuid>,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
  S: PersonStore + Clone + 'static,
  A: ArtifactStore + 'static,
  T: CodeTables + 'static,
  R: DocumentRegistry + 'static,
{
  let actor = resolve_actor(&state.engine, &headers).await?;

  let file_name = headers
    .get("x-file-name")
    .and_then(|v| v.to_str().ok())
    .unwrap_or("evidence.bin")
    .to_owned();
  let file = EvidenceFile { file_name, bytes: body.to_vec() };

  let confirmation = state
    .engine
    .confirm(&actor, id, file, state.artifacts.as_ref())
    .await?;
  Ok((StatusCode::CREATED, Json(confirmation)))
}
