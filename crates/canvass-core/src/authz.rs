//! Authorization guard — pure predicates over the ownership graph.
//!
//! Every predicate follows the same evaluation order: admin passes
//! unconditionally, then the role-specific ownership rule is applied, then
//! default deny. The predicates are referentially transparent: they read
//! only their arguments, never the clock or any global state. Callers
//! resolve the registering leader's actor record up front and pass it in,
//! so the coordinator's multi-hop rule needs no store access here.

use uuid::Uuid;

use crate::{
  actor::{Actor, Role},
  incident::Incident,
  person::Person,
};

/// The shared ownership rule: is the person's registering leader inside
/// `actor`'s scope? `leader` is the registering leader's actor record,
/// `None` if it no longer exists.
pub fn scoped_to_leader(
  actor: &Actor,
  registered_by: Uuid,
  leader: Option<&Actor>,
) -> bool {
  match actor.role {
    Role::Admin => true,
    // A coordinator reaches its own registrations plus every leader that
    // reports to it.
    Role::Coordinator => {
      registered_by == actor.actor_id
        || leader.is_some_and(|l| l.coordinator_id == Some(actor.actor_id))
    }
    Role::Leader => registered_by == actor.actor_id,
    Role::Validator | Role::Confirmer => {
      actor.assigned_leader_ids.contains(&registered_by)
    }
    Role::Auditor => false,
  }
}

/// Visibility: may `actor` see this person at all? Auditors see
/// everything; everyone else sees exactly their write scope.
pub fn can_access_person(actor: &Actor, person: &Person, leader: Option<&Actor>) -> bool {
  match actor.role {
    Role::Auditor => true,
    _ => scoped_to_leader(actor, person.registered_by, leader),
  }
}

/// May `actor` raise an incident against this person?
pub fn can_create_incident(actor: &Actor, person: &Person, leader: Option<&Actor>) -> bool {
  scoped_to_leader(actor, person.registered_by, leader)
}

/// May `actor` resolve this incident? Scope is evaluated against the
/// flagged person, not the incident's creator.
pub fn can_resolve_incident(
  actor: &Actor,
  _incident: &Incident,
  person: &Person,
  leader: Option<&Actor>,
) -> bool {
  scoped_to_leader(actor, person.registered_by, leader)
}

/// May `actor` step this person's lifecycle backwards?
pub fn can_reverse_state(actor: &Actor, person: &Person, leader: Option<&Actor>) -> bool {
  scoped_to_leader(actor, person.registered_by, leader)
}

/// May `actor` attach completion evidence to this person?
pub fn can_confirm(actor: &Actor, person: &Person, leader: Option<&Actor>) -> bool {
  scoped_to_leader(actor, person.registered_by, leader)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::person::{Document, DocumentKind, PersonState};
  use chrono::Utc;

  fn actor(role: Role) -> Actor {
    Actor {
      actor_id:            Uuid::new_v4(),
      display_name:        role.as_str().to_owned(),
      role,
      coordinator_id:      None,
      assigned_leader_ids: Vec::new(),
      created_at:          Utc::now(),
    }
  }

  fn person_of(leader_id: Uuid) -> Person {
    Person {
      person_id:       Uuid::new_v4(),
      full_name:       "Test Person".into(),
      document:        Document {
        kind:   DocumentKind::NationalId,
        number: "123456".into(),
      },
      state:           PersonState::PendingData,
      prior_state:     None,
      registered_by:   leader_id,
      location_id:     None,
      station_id:      None,
      table_number:    None,
      imported:        false,
      import_batch_id: None,
      verified_by:     None,
      verified_at:     None,
      confirmed_by:    None,
      confirmed_at:    None,
      created_at:      Utc::now(),
    }
  }

  #[test]
  fn admin_passes_everything() {
    let admin = actor(Role::Admin);
    let p = person_of(Uuid::new_v4());
    assert!(can_access_person(&admin, &p, None));
    assert!(can_create_incident(&admin, &p, None));
    assert!(can_reverse_state(&admin, &p, None));
    assert!(can_confirm(&admin, &p, None));
  }

  #[test]
  fn leader_only_reaches_own_persons() {
    let leader = actor(Role::Leader);
    let own = person_of(leader.actor_id);
    let other = person_of(Uuid::new_v4());
    assert!(can_access_person(&leader, &own, None));
    assert!(!can_access_person(&leader, &other, None));
  }

  #[test]
  fn coordinator_reaches_its_leaders_via_ownership_link() {
    let coordinator = actor(Role::Coordinator);
    let mut leader = actor(Role::Leader);
    leader.coordinator_id = Some(coordinator.actor_id);
    let p = person_of(leader.actor_id);

    assert!(can_access_person(&coordinator, &p, Some(&leader)));

    // Re-pointing the leader at another coordinator flips the answer.
    leader.coordinator_id = Some(Uuid::new_v4());
    assert!(!can_access_person(&coordinator, &p, Some(&leader)));
  }

  #[test]
  fn coordinator_reaches_its_own_registrations() {
    let coordinator = actor(Role::Coordinator);
    let p = person_of(coordinator.actor_id);
    assert!(can_access_person(&coordinator, &p, None));
  }

  #[test]
  fn validator_scope_follows_assignment_set() {
    let leader_1 = Uuid::new_v4();
    let leader_2 = Uuid::new_v4();
    let mut validator = actor(Role::Validator);
    validator.assigned_leader_ids = vec![leader_1];

    assert!(can_access_person(&validator, &person_of(leader_1), None));
    assert!(!can_access_person(&validator, &person_of(leader_2), None));

    // Mutating the assignment link changes the answer.
    validator.assigned_leader_ids = vec![leader_2];
    assert!(can_access_person(&validator, &person_of(leader_2), None));
  }

  #[test]
  fn auditor_sees_but_never_mutates() {
    let auditor = actor(Role::Auditor);
    let p = person_of(Uuid::new_v4());
    assert!(can_access_person(&auditor, &p, None));
    assert!(!can_create_incident(&auditor, &p, None));
    assert!(!can_reverse_state(&auditor, &p, None));
    assert!(!can_confirm(&auditor, &p, None));
  }

  #[test]
  fn confirmer_scope_matches_validator_rule() {
    let leader_id = Uuid::new_v4();
    let mut confirmer = actor(Role::Confirmer);
    confirmer.assigned_leader_ids = vec![leader_id];
    assert!(can_confirm(&confirmer, &person_of(leader_id), None));
    assert!(!can_confirm(&confirmer, &person_of(Uuid::new_v4()), None));
  }
}
