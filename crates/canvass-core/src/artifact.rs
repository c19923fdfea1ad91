//! Evidence artifact storage — the external file/object store collaborator.
//!
//! Used exclusively by the confirm operation. A storage failure is fatal
//! to that operation; a database failure after a successful store triggers
//! a compensating delete so no orphaned object remains.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// An evidence file as received from the caller.
#[derive(Debug, Clone)]
pub struct EvidenceFile {
  pub file_name: String,
  pub bytes:     Vec<u8>,
}

/// The handle returned by the artifact store after a successful write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
  /// Publicly servable URL for the artifact.
  pub url:          String,
  /// Backend path, passed back verbatim to [`ArtifactStore::delete`].
  pub path:         String,
  /// SHA-256 hex digest of the stored bytes.
  pub content_hash: String,
}

/// Abstraction over the evidence file store.
pub trait ArtifactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist `file` and return its handle.
  fn store<'a>(
    &'a self,
    file: &'a EvidenceFile,
  ) -> impl Future<Output = Result<StoredArtifact, Self::Error>> + Send + 'a;

  /// Remove a previously stored artifact. Used as the compensating action
  /// when the confirmation write fails after storage succeeded.
  fn delete<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
