//! Error types for `canvass-core`.
//!
//! The variants group into the five caller-visible classes: authorization
//! failure, missing-or-invisible records, illegal state transitions,
//! uniqueness conflicts, input validation, and collaborator failures.
//! A record outside the actor's scope surfaces as the same not-found error
//! as a record that does not exist, so scope boundaries leak nothing.

use thiserror::Error;
use uuid::Uuid;

use crate::person::PersonState;

#[derive(Debug, Error)]
pub enum Error {
  #[error("operation not permitted for this actor")]
  Forbidden,

  #[error("person not found: {0}")]
  PersonNotFound(Uuid),

  #[error("incident not found: {0}")]
  IncidentNotFound(Uuid),

  #[error("actor not found: {0}")]
  ActorNotFound(Uuid),

  #[error("import batch not found: {0}")]
  BatchNotFound(Uuid),

  #[error("cannot {action} a person in state {from}")]
  InvalidTransition {
    action: &'static str,
    from:   PersonState,
  },

  #[error("incident {0} is already resolved")]
  AlreadyResolved(Uuid),

  #[error("person {0} already has an unresolved incident")]
  OpenIncidentExists(Uuid),

  #[error("person {0} already has an active confirmation")]
  ActiveConfirmationExists(Uuid),

  #[error("document number already registered: {0}")]
  DuplicateDocument(String),

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("collaborator failure: {0}")]
  Dependency(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
