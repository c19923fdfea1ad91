//! Person — the tracked individual, and the lifecycle transition tables.
//!
//! The legal-transition set lives here, in one place, so every caller
//! (engine, store, tests) consults the same table. Forward motion is
//! escalation-only with two deliberate shortcuts; reversal is a single
//! downward step per call; the incident branch is entered from any
//! non-terminal state and leaves via `prior_state` restoration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── State ───────────────────────────────────────────────────────────────────

/// The five lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonState {
  PendingData,
  Verified,
  Confirmed,
  Completed,
  /// Suspended by an open incident; the pre-suspension state is kept in
  /// the person's `prior_state` and restored on resolution.
  Incident,
}

impl PersonState {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::PendingData => "pending_data",
      Self::Verified => "verified",
      Self::Confirmed => "confirmed",
      Self::Completed => "completed",
      Self::Incident => "incident",
    }
  }

  /// Whether `verify` may be applied from this state.
  pub fn allows_verify(self) -> bool { matches!(self, Self::PendingData) }

  /// Whether `confirm_state` may be applied from this state.
  /// Entry directly from `PendingData` is a privileged shortcut gated by
  /// [`crate::engine::LifecyclePolicy::confirm_from_pending`].
  pub fn allows_confirm_state(self, from_pending: bool) -> bool {
    match self {
      Self::Verified => true,
      Self::PendingData => from_pending,
      _ => false,
    }
  }

  /// Whether the evidence-backed `confirm` (the sole path to `Completed`)
  /// may be applied from this state.
  pub fn allows_complete(self) -> bool {
    matches!(self, Self::PendingData | Self::Verified | Self::Confirmed)
  }

  /// The fixed reversal table: one downward step, or `None` when reversal
  /// is not legal from this state. Reversing [`Self::Incident`] is only
  /// legal once no unresolved incident remains; that check is the
  /// caller's.
  pub fn reversal_target(self) -> Option<PersonState> {
    match self {
      Self::Completed => Some(Self::Confirmed),
      Self::Confirmed => Some(Self::Verified),
      Self::Verified => Some(Self::PendingData),
      Self::Incident => Some(Self::PendingData),
      Self::PendingData => None,
    }
  }
}

impl std::fmt::Display for PersonState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// The kind of identity document a person is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
  NationalId,
  ForeignId,
  Passport,
}

impl DocumentKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::NationalId => "national_id",
      Self::ForeignId => "foreign_id",
      Self::Passport => "passport",
    }
  }
}

/// An identity document reference. The number is unique system-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub kind:   DocumentKind,
  pub number: String,
}

// ─── Person ──────────────────────────────────────────────────────────────────

/// The tracked individual moving through the lifecycle.
///
/// `prior_state` is non-null only while an open incident suspends the
/// lifecycle, or as rollback bookkeeping immediately after a reversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
  pub person_id:       Uuid,
  pub full_name:       String,
  pub document:        Document,
  pub state:           PersonState,
  pub prior_state:     Option<PersonState>,
  /// The leader that owns this record for write purposes.
  pub registered_by:   Uuid,
  pub location_id:     Option<Uuid>,
  pub station_id:      Option<Uuid>,
  pub table_number:    Option<u32>,
  pub imported:        bool,
  pub import_batch_id: Option<Uuid>,
  pub verified_by:     Option<Uuid>,
  pub verified_at:     Option<DateTime<Utc>>,
  pub confirmed_by:    Option<Uuid>,
  pub confirmed_at:    Option<DateTime<Utc>>,
  pub created_at:      DateTime<Utc>,
}

/// Input to [`crate::store::PersonStore::add_person`].
/// `person_id`, `created_at` and the initial `PendingData` state are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPerson {
  pub full_name:       String,
  pub document:        Document,
  pub registered_by:   Uuid,
  pub location_id:     Option<Uuid>,
  pub station_id:      Option<Uuid>,
  pub table_number:    Option<u32>,
  pub imported:        bool,
  pub import_batch_id: Option<Uuid>,
}

impl NewPerson {
  /// Convenience constructor for the single-record registration path.
  pub fn new(full_name: impl Into<String>, document: Document, registered_by: Uuid) -> Self {
    Self {
      full_name: full_name.into(),
      document,
      registered_by,
      location_id: None,
      station_id: None,
      table_number: None,
      imported: false,
      import_batch_id: None,
    }
  }
}
