//! Actor — the human operators of the pipeline, and their ownership links.
//!
//! Actors are created and mutated by administrative operations; the engine
//! only reads role and ownership links when evaluating authorization. The
//! ownership graph is: confirmer/validator → assigned leaders, and
//! leader → its coordinator. Persons hang off leaders via `registered_by`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of operator roles. The authorization guard matches on
/// this exhaustively, so a newly added role will not compile without an
/// explicit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Coordinator,
  Leader,
  Validator,
  Confirmer,
  /// Read-only: may view any record, may mutate nothing.
  Auditor,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Admin => "admin",
      Self::Coordinator => "coordinator",
      Self::Leader => "leader",
      Self::Validator => "validator",
      Self::Confirmer => "confirmer",
      Self::Auditor => "auditor",
    }
  }
}

/// An operator with its resolved role and ownership fields. Callers of the
/// engine supply an already-authenticated `Actor`; no credential checking
/// happens in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
  pub actor_id:            Uuid,
  pub display_name:        String,
  pub role:                Role,
  /// For leaders: the coordinator that owns them.
  pub coordinator_id:      Option<Uuid>,
  /// For validators/confirmers: the leaders whose persons they may act on.
  /// Populated out-of-band by the assignment collaborator.
  pub assigned_leader_ids: Vec<Uuid>,
  pub created_at:          DateTime<Utc>,
}

impl Actor {
  /// Whether `leader_id` falls inside this actor's ownership scope.
  ///
  /// This is the flat part of scope resolution; the coordinator's
  /// multi-hop rule (leader's `coordinator_id` equals the coordinator)
  /// additionally needs the leader record and lives in
  /// [`crate::authz::scoped_to_leader`].
  pub fn owns_leader(&self, leader_id: Uuid) -> bool {
    match self.role {
      Role::Admin => true,
      Role::Coordinator | Role::Leader => self.actor_id == leader_id,
      Role::Validator | Role::Confirmer => {
        self.assigned_leader_ids.contains(&leader_id)
      }
      Role::Auditor => false,
    }
  }
}

/// Input to [`crate::store::PersonStore::add_actor`].
/// `actor_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewActor {
  pub display_name:   String,
  pub role:           Role,
  pub coordinator_id: Option<Uuid>,
}
