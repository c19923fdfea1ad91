//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated
//! lowercase strings, enums as their snake_case discriminants, and batch
//! error/omitted lists as compact JSON.

use canvass_core::{
  actor::{Actor, Role},
  artifact::StoredArtifact,
  confirmation::Confirmation,
  import::{ImportBatch, OmittedRow, RowError},
  incident::Incident,
  person::{Document, DocumentKind, Person, PersonState},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_opt_uuid(id: Option<Uuid>) -> Option<String> {
  id.map(encode_uuid)
}

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "admin" => Ok(Role::Admin),
    "coordinator" => Ok(Role::Coordinator),
    "leader" => Ok(Role::Leader),
    "validator" => Ok(Role::Validator),
    "confirmer" => Ok(Role::Confirmer),
    "auditor" => Ok(Role::Auditor),
    other => Err(Error::Decode(format!("unknown role: {other:?}"))),
  }
}

pub fn decode_state(s: &str) -> Result<PersonState> {
  match s {
    "pending_data" => Ok(PersonState::PendingData),
    "verified" => Ok(PersonState::Verified),
    "confirmed" => Ok(PersonState::Confirmed),
    "completed" => Ok(PersonState::Completed),
    "incident" => Ok(PersonState::Incident),
    other => Err(Error::Decode(format!("unknown person state: {other:?}"))),
  }
}

pub fn decode_document_kind(s: &str) -> Result<DocumentKind> {
  match s {
    "national_id" => Ok(DocumentKind::NationalId),
    "foreign_id" => Ok(DocumentKind::ForeignId),
    "passport" => Ok(DocumentKind::Passport),
    other => Err(Error::Decode(format!("unknown document kind: {other:?}"))),
  }
}

// ─── Person rows ─────────────────────────────────────────────────────────────

/// Column list shared by every person SELECT.
pub const PERSON_COLUMNS: &str =
  "person_id, full_name, document_kind, document_number, state, prior_state,
   registered_by, location_id, station_id, table_number, imported,
   import_batch_id, verified_by, verified_at, confirmed_by, confirmed_at,
   created_at";

/// Owned, encoded image of a person row, safe to move into a
/// `tokio_rusqlite` closure.
pub struct PersonRow {
  pub person_id:       String,
  pub full_name:       String,
  pub document_kind:   String,
  pub document_number: String,
  pub state:           String,
  pub prior_state:     Option<String>,
  pub registered_by:   String,
  pub location_id:     Option<String>,
  pub station_id:      Option<String>,
  pub table_number:    Option<i64>,
  pub imported:        bool,
  pub import_batch_id: Option<String>,
  pub verified_by:     Option<String>,
  pub verified_at:     Option<String>,
  pub confirmed_by:    Option<String>,
  pub confirmed_at:    Option<String>,
  pub created_at:      String,
}

impl PersonRow {
  pub fn encode(p: &Person) -> Self {
    Self {
      person_id:       encode_uuid(p.person_id),
      full_name:       p.full_name.clone(),
      document_kind:   p.document.kind.as_str().to_owned(),
      document_number: p.document.number.clone(),
      state:           p.state.as_str().to_owned(),
      prior_state:     p.prior_state.map(|s| s.as_str().to_owned()),
      registered_by:   encode_uuid(p.registered_by),
      location_id:     encode_opt_uuid(p.location_id),
      station_id:      encode_opt_uuid(p.station_id),
      table_number:    p.table_number.map(i64::from),
      imported:        p.imported,
      import_batch_id: encode_opt_uuid(p.import_batch_id),
      verified_by:     encode_opt_uuid(p.verified_by),
      verified_at:     p.verified_at.map(encode_dt),
      confirmed_by:    encode_opt_uuid(p.confirmed_by),
      confirmed_at:    p.confirmed_at.map(encode_dt),
      created_at:      encode_dt(p.created_at),
    }
  }

  pub fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO persons (
         person_id, full_name, document_kind, document_number, state,
         prior_state, registered_by, location_id, station_id, table_number,
         imported, import_batch_id, verified_by, verified_at,
         confirmed_by, confirmed_at, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                 ?14, ?15, ?16, ?17)",
      rusqlite::params![
        self.person_id,
        self.full_name,
        self.document_kind,
        self.document_number,
        self.state,
        self.prior_state,
        self.registered_by,
        self.location_id,
        self.station_id,
        self.table_number,
        self.imported,
        self.import_batch_id,
        self.verified_by,
        self.verified_at,
        self.confirmed_by,
        self.confirmed_at,
        self.created_at,
      ],
    )?;
    Ok(())
  }

  /// Full-row update; identity columns are rewritten with their current
  /// values, the caller never changes them.
  pub fn update(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      "UPDATE persons SET
         full_name = ?2, document_kind = ?3, document_number = ?4,
         state = ?5, prior_state = ?6, registered_by = ?7, location_id = ?8,
         station_id = ?9, table_number = ?10, imported = ?11,
         import_batch_id = ?12, verified_by = ?13, verified_at = ?14,
         confirmed_by = ?15, confirmed_at = ?16
       WHERE person_id = ?1",
      rusqlite::params![
        self.person_id,
        self.full_name,
        self.document_kind,
        self.document_number,
        self.state,
        self.prior_state,
        self.registered_by,
        self.location_id,
        self.station_id,
        self.table_number,
        self.imported,
        self.import_batch_id,
        self.verified_by,
        self.verified_at,
        self.confirmed_by,
        self.confirmed_at,
      ],
    )?;
    Ok(())
  }
}

/// Raw strings read directly from a `persons` row.
pub struct RawPerson {
  pub person_id:       String,
  pub full_name:       String,
  pub document_kind:   String,
  pub document_number: String,
  pub state:           String,
  pub prior_state:     Option<String>,
  pub registered_by:   String,
  pub location_id:     Option<String>,
  pub station_id:      Option<String>,
  pub table_number:    Option<i64>,
  pub imported:        bool,
  pub import_batch_id: Option<String>,
  pub verified_by:     Option<String>,
  pub verified_at:     Option<String>,
  pub confirmed_by:    Option<String>,
  pub confirmed_at:    Option<String>,
  pub created_at:      String,
}

impl RawPerson {
  /// Read from a row selected with [`PERSON_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:       row.get(0)?,
      full_name:       row.get(1)?,
      document_kind:   row.get(2)?,
      document_number: row.get(3)?,
      state:           row.get(4)?,
      prior_state:     row.get(5)?,
      registered_by:   row.get(6)?,
      location_id:     row.get(7)?,
      station_id:      row.get(8)?,
      table_number:    row.get(9)?,
      imported:        row.get(10)?,
      import_batch_id: row.get(11)?,
      verified_by:     row.get(12)?,
      verified_at:     row.get(13)?,
      confirmed_by:    row.get(14)?,
      confirmed_at:    row.get(15)?,
      created_at:      row.get(16)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    let prior_state = self.prior_state.as_deref().map(decode_state).transpose()?;
    Ok(Person {
      person_id:       decode_uuid(&self.person_id)?,
      full_name:       self.full_name,
      document:        Document {
        kind:   decode_document_kind(&self.document_kind)?,
        number: self.document_number,
      },
      state:           decode_state(&self.state)?,
      prior_state,
      registered_by:   decode_uuid(&self.registered_by)?,
      location_id:     decode_opt_uuid(self.location_id.as_deref())?,
      station_id:      decode_opt_uuid(self.station_id.as_deref())?,
      table_number:    self.table_number.map(|n| n as u32),
      imported:        self.imported,
      import_batch_id: decode_opt_uuid(self.import_batch_id.as_deref())?,
      verified_by:     decode_opt_uuid(self.verified_by.as_deref())?,
      verified_at:     decode_opt_dt(self.verified_at.as_deref())?,
      confirmed_by:    decode_opt_uuid(self.confirmed_by.as_deref())?,
      confirmed_at:    decode_opt_dt(self.confirmed_at.as_deref())?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

// ─── Actor rows ──────────────────────────────────────────────────────────────

/// Raw strings read directly from an `actors` row, with the assignment
/// set joined in separately.
pub struct RawActor {
  pub actor_id:       String,
  pub display_name:   String,
  pub role:           String,
  pub coordinator_id: Option<String>,
  pub created_at:     String,
  pub assigned:       Vec<String>,
}

impl RawActor {
  pub fn into_actor(self) -> Result<Actor> {
    Ok(Actor {
      actor_id:            decode_uuid(&self.actor_id)?,
      display_name:        self.display_name,
      role:                decode_role(&self.role)?,
      coordinator_id:      decode_opt_uuid(self.coordinator_id.as_deref())?,
      assigned_leader_ids: self
        .assigned
        .iter()
        .map(|s| decode_uuid(s))
        .collect::<Result<_>>()?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

// ─── Incident rows ───────────────────────────────────────────────────────────

pub const INCIDENT_COLUMNS: &str =
  "incident_id, person_id, observation, resolved, raised_by, raised_at,
   resolved_by, resolved_at";

pub struct RawIncident {
  pub incident_id: String,
  pub person_id:   String,
  pub observation: String,
  pub resolved:    bool,
  pub raised_by:   String,
  pub raised_at:   String,
  pub resolved_by: Option<String>,
  pub resolved_at: Option<String>,
}

impl RawIncident {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      incident_id: row.get(0)?,
      person_id:   row.get(1)?,
      observation: row.get(2)?,
      resolved:    row.get(3)?,
      raised_by:   row.get(4)?,
      raised_at:   row.get(5)?,
      resolved_by: row.get(6)?,
      resolved_at: row.get(7)?,
    })
  }

  pub fn into_incident(self) -> Result<Incident> {
    Ok(Incident {
      incident_id: decode_uuid(&self.incident_id)?,
      person_id:   decode_uuid(&self.person_id)?,
      observation: self.observation,
      resolved:    self.resolved,
      raised_by:   decode_uuid(&self.raised_by)?,
      raised_at:   decode_dt(&self.raised_at)?,
      resolved_by: decode_opt_uuid(self.resolved_by.as_deref())?,
      resolved_at: decode_opt_dt(self.resolved_at.as_deref())?,
    })
  }
}

// ─── Confirmation rows ───────────────────────────────────────────────────────

pub const CONFIRMATION_COLUMNS: &str =
  "confirmation_id, person_id, evidence_url, evidence_path, evidence_hash,
   confirmed_by, confirmed_at, reversed, reversed_by, reversed_at";

pub struct RawConfirmation {
  pub confirmation_id: String,
  pub person_id:       String,
  pub evidence_url:    String,
  pub evidence_path:   String,
  pub evidence_hash:   String,
  pub confirmed_by:    String,
  pub confirmed_at:    String,
  pub reversed:        bool,
  pub reversed_by:     Option<String>,
  pub reversed_at:     Option<String>,
}

impl RawConfirmation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      confirmation_id: row.get(0)?,
      person_id:       row.get(1)?,
      evidence_url:    row.get(2)?,
      evidence_path:   row.get(3)?,
      evidence_hash:   row.get(4)?,
      confirmed_by:    row.get(5)?,
      confirmed_at:    row.get(6)?,
      reversed:        row.get(7)?,
      reversed_by:     row.get(8)?,
      reversed_at:     row.get(9)?,
    })
  }

  pub fn into_confirmation(self) -> Result<Confirmation> {
    Ok(Confirmation {
      confirmation_id: decode_uuid(&self.confirmation_id)?,
      person_id:       decode_uuid(&self.person_id)?,
      evidence:        StoredArtifact {
        url:          self.evidence_url,
        path:         self.evidence_path,
        content_hash: self.evidence_hash,
      },
      confirmed_by:    decode_uuid(&self.confirmed_by)?,
      confirmed_at:    decode_dt(&self.confirmed_at)?,
      reversed:        self.reversed,
      reversed_by:     decode_opt_uuid(self.reversed_by.as_deref())?,
      reversed_at:     decode_opt_dt(self.reversed_at.as_deref())?,
    })
  }
}

// ─── Batch rows ──────────────────────────────────────────────────────────────

pub struct RawBatch {
  pub batch_id:   String,
  pub file_name:  String,
  pub created_by: String,
  pub created_at: String,
  pub total:      i64,
  pub inserted:   i64,
  pub updated:    i64,
  pub failed:     i64,
  pub omitted:    String,
  pub errors:     String,
}

impl RawBatch {
  pub fn into_batch(self) -> Result<ImportBatch> {
    let omitted: Vec<OmittedRow> = serde_json::from_str(&self.omitted)?;
    let errors: Vec<RowError> = serde_json::from_str(&self.errors)?;
    Ok(ImportBatch {
      batch_id:   decode_uuid(&self.batch_id)?,
      file_name:  self.file_name,
      created_by: decode_uuid(&self.created_by)?,
      created_at: decode_dt(&self.created_at)?,
      total:      self.total as u32,
      inserted:   self.inserted as u32,
      updated:    self.updated as u32,
      failed:     self.failed as u32,
      omitted,
      errors,
    })
  }
}
