//! Error type for `canvass-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] canvass_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("column decode error: {0}")]
  Decode(String),

  /// Unique `persons.document_number` constraint hit on insert.
  #[error("document number already registered: {0}")]
  DuplicateDocument(String),

  /// Partial unique index on unresolved incidents hit on insert.
  #[error("person {0} already has an unresolved incident")]
  DuplicateOpenIncident(Uuid),

  /// Partial unique index on active confirmations hit on insert.
  #[error("person {0} already has an active confirmation")]
  DuplicateActiveConfirmation(Uuid),
}

/// Collapse into the engine's taxonomy: constraint violations become the
/// corresponding conflict-class errors, everything else is a collaborator
/// failure.
impl From<Error> for canvass_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      Error::DuplicateDocument(number) => Self::DuplicateDocument(number),
      Error::DuplicateOpenIncident(id) => Self::OpenIncidentExists(id),
      Error::DuplicateActiveConfirmation(id) => Self::ActiveConfirmationExists(id),
      other => Self::Dependency(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
