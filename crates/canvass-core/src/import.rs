//! Import batches — the audit record of one bulk reconciliation run.
//!
//! A batch is created when an ingestion call starts and its aggregate
//! counters and error list are persisted when the run completes. Each
//! applied row is its own atomic unit, so an interrupted run can simply
//! be re-submitted: already-applied rows classify as existing on the next
//! pass and defer to the update/skip path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::person::DocumentKind;

// ─── Input rows ──────────────────────────────────────────────────────────────

/// One externally sourced candidate row, as decoded from a spreadsheet or
/// upload. Row numbering in reports is 1-based, matching the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
  pub full_name:       String,
  pub document_kind:   DocumentKind,
  pub document_number: String,
  pub location_code:   Option<String>,
  pub station_code:    Option<String>,
  pub table_number:    Option<u32>,
}

// ─── Per-row outcomes ────────────────────────────────────────────────────────

/// Why a row was rejected. A row fails at the first disqualifying stage
/// only; later stages never re-report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowFailure {
  /// Malformed fields (schema validation).
  Invalid { message: String },
  /// Same document number appeared earlier in this batch.
  DuplicateInBatch { first_row: usize },
  /// Document number exists locally under a leader outside the actor's
  /// scope; another leader's data is not overwritable.
  ForeignOwner,
  /// The external registry attributes this document number elsewhere.
  KnownElsewhere { attribution: String },
  /// Location code missing from the lookup tables.
  UnknownLocation { code: String },
  /// Voting-station code missing from the lookup tables.
  UnknownStation { code: String },
  /// The row survived classification but its write was rejected, e.g. a
  /// concurrent insert claimed the document number first.
  Apply { message: String },
}

impl std::fmt::Display for RowFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Invalid { message } => write!(f, "invalid row: {message}"),
      Self::DuplicateInBatch { first_row } => {
        write!(f, "duplicate of row {first_row} in this batch")
      }
      Self::ForeignOwner => {
        write!(f, "document belongs to a person outside your scope")
      }
      Self::KnownElsewhere { attribution } => {
        write!(f, "document already registered by {attribution}")
      }
      Self::UnknownLocation { code } => write!(f, "unknown location code {code:?}"),
      Self::UnknownStation { code } => write!(f, "unknown station code {code:?}"),
      Self::Apply { message } => write!(f, "row could not be applied: {message}"),
    }
  }
}

/// A rejected row, indexed into the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
  pub row:     usize,
  pub failure: RowFailure,
}

/// A row skipped because the matching person already has an active
/// confirmation. Reported separately from errors: the row was well-formed,
/// but completed work is never clobbered by a re-import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmittedRow {
  pub row:             usize,
  pub document_number: String,
}

// ─── Batch ───────────────────────────────────────────────────────────────────

/// The persisted outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
  pub batch_id:   Uuid,
  pub file_name:  String,
  pub created_by: Uuid,
  pub created_at: DateTime<Utc>,
  pub total:      u32,
  pub inserted:   u32,
  pub updated:    u32,
  pub failed:     u32,
  pub omitted:    Vec<OmittedRow>,
  pub errors:     Vec<RowError>,
}

impl ImportBatch {
  /// A fresh, empty batch for a run over `total` rows.
  pub fn begin(file_name: String, created_by: Uuid, total: u32) -> Self {
    Self {
      batch_id: Uuid::new_v4(),
      file_name,
      created_by,
      created_at: Utc::now(),
      total,
      inserted: 0,
      updated: 0,
      failed: 0,
      omitted: Vec::new(),
      errors: Vec::new(),
    }
  }

  pub fn omitted_count(&self) -> u32 { self.omitted.len() as u32 }

  pub fn push_error(&mut self, row: usize, failure: RowFailure) {
    self.failed += 1;
    self.errors.push(RowError { row, failure });
  }
}
