//! Filesystem-backed evidence artifact store.
//!
//! Files land in a flat directory under a generated name, so a stored
//! path never escapes the root and a compensating delete only ever sees
//! names this store produced.

use std::path::{Path, PathBuf};

use canvass_core::artifact::{ArtifactStore, EvidenceFile, StoredArtifact};
use sha2::{Digest as _, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("artifact io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("refusing artifact path {0:?}")]
  BadPath(String),
}

/// Evidence files on local disk, served by a fronting web server.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
  root:     PathBuf,
  base_url: String,
}

impl FsArtifactStore {
  /// Create the store, making sure the root directory exists.
  pub async fn open(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self, Error> {
    let root = root.into();
    tokio::fs::create_dir_all(&root).await?;
    Ok(Self { root, base_url: base_url.into() })
  }

  fn file_name(original: &str) -> String {
    // Keep the extension for content-type sniffing; drop the rest.
    let ext = Path::new(original)
      .extension()
      .and_then(|e| e.to_str())
      .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
      Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
      None => Uuid::new_v4().to_string(),
    }
  }
}

impl ArtifactStore for FsArtifactStore {
  type Error = Error;

  async fn store(&self, file: &EvidenceFile) -> Result<StoredArtifact, Error> {
    let name = Self::file_name(&file.file_name);
    let hash = hex::encode(Sha256::digest(&file.bytes));

    tokio::fs::write(self.root.join(&name), &file.bytes).await?;

    Ok(StoredArtifact {
      url:          format!("{}/{name}", self.base_url.trim_end_matches('/')),
      path:         name,
      content_hash: hash,
    })
  }

  async fn delete(&self, path: &str) -> Result<(), Error> {
    // Only names produced by `store` are legal here.
    if path.contains('/') || path.contains("..") {
      return Err(Error::BadPath(path.to_owned()));
    }
    tokio::fs::remove_file(self.root.join(path)).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn temp_store() -> FsArtifactStore {
    let root = std::env::temp_dir().join(format!("canvass-artifacts-{}", Uuid::new_v4()));
    FsArtifactStore::open(root, "http://files.local/evidence")
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn store_writes_and_hashes() {
    let s = temp_store().await;
    let file = EvidenceFile { file_name: "receipt.jpg".into(), bytes: b"abc".to_vec() };

    let stored = s.store(&file).await.unwrap();
    assert!(stored.path.ends_with(".jpg"));
    assert!(stored.url.starts_with("http://files.local/evidence/"));
    // sha256("abc")
    assert_eq!(
      stored.content_hash,
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    let on_disk = tokio::fs::read(s.root.join(&stored.path)).await.unwrap();
    assert_eq!(on_disk, b"abc");
  }

  #[tokio::test]
  async fn delete_removes_the_file() {
    let s = temp_store().await;
    let file = EvidenceFile { file_name: "receipt.jpg".into(), bytes: vec![1] };
    let stored = s.store(&file).await.unwrap();

    s.delete(&stored.path).await.unwrap();
    assert!(!s.root.join(&stored.path).exists());
  }

  #[tokio::test]
  async fn delete_rejects_traversal() {
    let s = temp_store().await;
    assert!(matches!(
      s.delete("../etc/passwd").await,
      Err(Error::BadPath(_))
    ));
  }

  #[tokio::test]
  async fn odd_filenames_get_a_plain_name() {
    let s = temp_store().await;
    let file = EvidenceFile { file_name: "../../x/y.j pg".into(), bytes: vec![1] };
    let stored = s.store(&file).await.unwrap();
    assert!(!stored.path.contains('/'));
    assert!(!stored.path.contains(".."));
  }
}
