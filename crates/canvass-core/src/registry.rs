//! External document registry — the optional cross-deployment collaborator.
//!
//! All calls are advisory. A lookup failure degrades to "unknown"; a
//! register/remove failure is logged and ignored. Implementations must
//! bound their calls with a short timeout so the primary operation is
//! never blocked indefinitely.

use std::convert::Infallible;
use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who, according to the registry, already claims a document number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryAttribution {
  pub label: String,
}

/// Abstraction over the external document registry.
pub trait DocumentRegistry: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether the document number is already known elsewhere.
  fn lookup<'a>(
    &'a self,
    document_number: &'a str,
  ) -> impl Future<Output = Result<Option<RegistryAttribution>, Self::Error>> + Send + 'a;

  /// Best-effort, fire-and-forget claim of a document number.
  fn register<'a>(
    &'a self,
    document_number: &'a str,
    attribution: &'a str,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Best-effort release of a document number.
  fn remove<'a>(
    &'a self,
    document_number: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// The disabled registry: every document is unknown, every write succeeds.
/// Used when the registry feature is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRegistry;

impl DocumentRegistry for NullRegistry {
  type Error = Infallible;

  async fn lookup(&self, _document_number: &str) -> Result<Option<RegistryAttribution>, Infallible> {
    Ok(None)
  }

  async fn register(
    &self,
    _document_number: &str,
    _attribution: &str,
    _owner_id: Uuid,
  ) -> Result<(), Infallible> {
    Ok(())
  }

  async fn remove(&self, _document_number: &str) -> Result<(), Infallible> {
    Ok(())
  }
}
