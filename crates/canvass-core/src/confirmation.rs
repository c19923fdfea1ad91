//! Confirmation — the evidence-backed record that completes a lifecycle.
//!
//! A confirmation is created only by the `confirm` operation, which also
//! stores the evidence artifact and moves the person to `Completed`.
//! Reversal never deletes a confirmation; it marks the row reversed, so a
//! person accumulates history across reverse/re-confirm cycles. At most
//! one row per person is active (non-reversed) at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::StoredArtifact;

/// Completion evidence for a person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
  pub confirmation_id: Uuid,
  pub person_id:       Uuid,
  pub evidence:        StoredArtifact,
  pub confirmed_by:    Uuid,
  pub confirmed_at:    DateTime<Utc>,
  pub reversed:        bool,
  pub reversed_by:     Option<Uuid>,
  pub reversed_at:     Option<DateTime<Utc>>,
}

impl Confirmation {
  /// Build a fresh active confirmation.
  pub fn active(person_id: Uuid, evidence: StoredArtifact, confirmed_by: Uuid) -> Self {
    Self {
      confirmation_id: Uuid::new_v4(),
      person_id,
      evidence,
      confirmed_by,
      confirmed_at: Utc::now(),
      reversed: false,
      reversed_by: None,
      reversed_at: None,
    }
  }
}

/// The active confirmation: the most recent non-reversed row by
/// confirmation timestamp. Historical reversed rows are never active.
pub fn active_confirmation(rows: &[Confirmation]) -> Option<&Confirmation> {
  rows
    .iter()
    .filter(|c| !c.reversed)
    .max_by_key(|c| c.confirmed_at)
}

/// The row to show in audit views: the active one if present, otherwise
/// the most recent reversed row. The fallback is display-only and must
/// never be treated as active.
pub fn display_confirmation(rows: &[Confirmation]) -> Option<&Confirmation> {
  active_confirmation(rows)
    .or_else(|| rows.iter().filter(|c| c.reversed).max_by_key(|c| c.confirmed_at))
}
