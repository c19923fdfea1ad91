//! HTTP client for the external document registry.
//!
//! The registry is advisory, so every call carries a short timeout; the
//! engine treats failures as "unknown" and moves on.

use std::time::Duration;

use canvass_core::registry::{DocumentRegistry, RegistryAttribution};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("registry request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("registry returned {0}")]
  Status(StatusCode),
}

/// Client for a remote registry speaking a small JSON protocol:
/// `GET /documents/{number}`, `POST /documents`, `DELETE /documents/{number}`.
#[derive(Clone)]
pub struct HttpRegistry {
  client:   Client,
  base_url: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
  attribution: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
  document_number: &'a str,
  attribution:     &'a str,
  owner_id:        Uuid,
}

impl HttpRegistry {
  pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
    let client = Client::builder()
      .timeout(Duration::from_secs(5))
      .build()?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
    })
  }

  fn url(&self, path: &str) -> String { format!("{}{path}", self.base_url) }
}

impl DocumentRegistry for HttpRegistry {
  type Error = Error;

  async fn lookup(&self, number: &str) -> Result<Option<RegistryAttribution>, Error> {
    let resp = self
      .client
      .get(self.url(&format!("/documents/{number}")))
      .send()
      .await?;

    match resp.status() {
      StatusCode::NOT_FOUND => Ok(None),
      s if s.is_success() => {
        let body: LookupResponse = resp.json().await?;
        Ok(Some(RegistryAttribution { label: body.attribution }))
      }
      s => Err(Error::Status(s)),
    }
  }

  async fn register(
    &self,
    number: &str,
    attribution: &str,
    owner_id: Uuid,
  ) -> Result<(), Error> {
    let resp = self
      .client
      .post(self.url("/documents"))
      .json(&RegisterRequest { document_number: number, attribution, owner_id })
      .send()
      .await?;

    if resp.status().is_success() {
      Ok(())
    } else {
      Err(Error::Status(resp.status()))
    }
  }

  async fn remove(&self, number: &str) -> Result<(), Error> {
    let resp = self
      .client
      .delete(self.url(&format!("/documents/{number}")))
      .send()
      .await?;

    // Already gone is fine; release is best-effort anyway.
    if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
      Ok(())
    } else {
      Err(Error::Status(resp.status()))
    }
  }
}
