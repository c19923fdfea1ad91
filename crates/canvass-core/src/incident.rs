//! Incident — a strict interrupt on a person's lifecycle.
//!
//! Raising an incident parks the person in [`PersonState::Incident`] and
//! saves the prior state; resolving it restores exactly that state. At
//! most one unresolved incident exists per person at any time, so the
//! restoration target is never ambiguous.
//!
//! [`PersonState::Incident`]: crate::person::PersonState::Incident

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An interruption on a person's lifecycle. `OPEN → RESOLVED`, terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
  pub incident_id: Uuid,
  pub person_id:   Uuid,
  /// Free-text description of what interrupted the pipeline.
  pub observation: String,
  pub resolved:    bool,
  pub raised_by:   Uuid,
  pub raised_at:   DateTime<Utc>,
  pub resolved_by: Option<Uuid>,
  pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
  /// Build a fresh open incident.
  pub fn open(person_id: Uuid, observation: String, raised_by: Uuid) -> Self {
    Self {
      incident_id: Uuid::new_v4(),
      person_id,
      observation,
      resolved: false,
      raised_by,
      raised_at: Utc::now(),
      resolved_by: None,
      resolved_at: None,
    }
  }
}
