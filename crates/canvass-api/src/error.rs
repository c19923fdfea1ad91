//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! The engine's error taxonomy maps onto status codes here, in one
//! place: authorization → 403, absence (and out-of-scope records) → 404,
//! illegal transitions → 422, uniqueness conflicts → 409, malformed
//! input → 400, collaborator failures → 502.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use canvass_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized: {0}")]
  Unauthorized(&'static str),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

fn core_status(e: &CoreError) -> StatusCode {
  match e {
    CoreError::Forbidden => StatusCode::FORBIDDEN,
    CoreError::PersonNotFound(_)
    | CoreError::IncidentNotFound(_)
    | CoreError::ActorNotFound(_)
    | CoreError::BatchNotFound(_) => StatusCode::NOT_FOUND,
    CoreError::InvalidTransition { .. }
    | CoreError::AlreadyResolved(_) => StatusCode::UNPROCESSABLE_ENTITY,
    CoreError::OpenIncidentExists(_)
    | CoreError::ActiveConfirmationExists(_)
    | CoreError::DuplicateDocument(_) => StatusCode::CONFLICT,
    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
    CoreError::Dependency(_) => StatusCode::BAD_GATEWAY,
    CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => core_status(e),
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
