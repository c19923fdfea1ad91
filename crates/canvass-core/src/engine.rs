//! The operation layer: scoped reads, lifecycle transitions, incidents
//! and evidence confirmation, all generic over a [`PersonStore`].
//!
//! Every operation receives the acting [`Actor`] explicitly; there is no
//! ambient "current user". Authorization failures on visibility surface
//! as not-found errors so callers cannot probe for records outside their
//! scope; failures on a mutation a visible record does not permit surface
//! as [`Error::Forbidden`].

use tracing::warn;
use uuid::Uuid;

use crate::{
  Error, Result,
  actor::{Actor, Role},
  artifact::{ArtifactStore, EvidenceFile},
  authz,
  confirmation::{Confirmation, active_confirmation},
  import::ImportBatch,
  incident::Incident,
  person::{NewPerson, Person, PersonState},
  store::PersonStore,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Tunable lifecycle behavior.
#[derive(Debug, Clone, Copy)]
pub struct LifecyclePolicy {
  /// Allow `confirm_state` to enter `Confirmed` directly from
  /// `PendingData`, bypassing `Verified`. The observed behavior of the
  /// system this replaces; kept as a flag rather than silently "fixed".
  pub confirm_from_pending: bool,
}

impl Default for LifecyclePolicy {
  fn default() -> Self { Self { confirm_from_pending: true } }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The operation layer over a store backend.
///
/// Cloning is cheap when `S` clones cheaply (the SQLite backend is
/// reference-counted).
#[derive(Clone)]
pub struct Engine<S> {
  store:  S,
  policy: LifecyclePolicy,
}

impl<S: PersonStore> Engine<S> {
  pub fn new(store: S) -> Self {
    Self { store, policy: LifecyclePolicy::default() }
  }

  pub fn with_policy(store: S, policy: LifecyclePolicy) -> Self {
    Self { store, policy }
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Scope helpers ─────────────────────────────────────────────────────

  /// The registering leader's actor record, for the guard's multi-hop
  /// coordinator rule. A dangling link resolves to `None`.
  async fn leader_of(&self, person: &Person) -> Result<Option<Actor>> {
    self
      .store
      .get_actor(person.registered_by)
      .await
      .map_err(Into::into)
  }

  /// Load a person and enforce visibility: a person outside the actor's
  /// scope is indistinguishable from one that does not exist.
  async fn load_scoped(&self, actor: &Actor, id: Uuid) -> Result<(Person, Option<Actor>)> {
    let person = self
      .store
      .get_person(id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::PersonNotFound(id))?;

    let leader = self.leader_of(&person).await?;
    if !authz::can_access_person(actor, &person, leader.as_ref()) {
      return Err(Error::PersonNotFound(id));
    }
    Ok((person, leader))
  }

  /// Resolve the actor's ownership scope to a leader-id list; `None`
  /// means universal.
  pub(crate) async fn scope_leaders(&self, actor: &Actor) -> Result<Option<Vec<Uuid>>> {
    match actor.role {
      Role::Admin | Role::Auditor => Ok(None),
      Role::Leader => Ok(Some(vec![actor.actor_id])),
      Role::Coordinator => {
        let mut leaders = self
          .store
          .leaders_for_coordinator(actor.actor_id)
          .await
          .map_err(Into::into)?;
        leaders.push(actor.actor_id);
        Ok(Some(leaders))
      }
      Role::Validator | Role::Confirmer => {
        Ok(Some(actor.assigned_leader_ids.clone()))
      }
    }
  }

  // ── Registration and reads ────────────────────────────────────────────

  /// Register a new person under `input.registered_by`, which must be
  /// inside the actor's scope.
  pub async fn register(&self, actor: &Actor, input: NewPerson) -> Result<Person> {
    if input.full_name.trim().is_empty() {
      return Err(Error::Validation("full_name must not be empty".into()));
    }
    if input.document.number.trim().is_empty() {
      return Err(Error::Validation("document_number must not be empty".into()));
    }

    let owner = self
      .store
      .get_actor(input.registered_by)
      .await
      .map_err(Into::into)?;
    if !authz::scoped_to_leader(actor, input.registered_by, owner.as_ref()) {
      return Err(Error::Forbidden);
    }

    self.store.add_person(input).await.map_err(Into::into)
  }

  /// Scoped single-person read.
  pub async fn person(&self, actor: &Actor, id: Uuid) -> Result<Person> {
    let (person, _) = self.load_scoped(actor, id).await?;
    Ok(person)
  }

  /// All persons inside the actor's scope.
  pub async fn list_persons(&self, actor: &Actor) -> Result<Vec<Person>> {
    let scope = self.scope_leaders(actor).await?;
    self
      .store
      .list_persons(scope.as_deref())
      .await
      .map_err(Into::into)
  }

  /// Incident history for a visible person, most recent first.
  pub async fn incidents(&self, actor: &Actor, person_id: Uuid) -> Result<Vec<Incident>> {
    self.load_scoped(actor, person_id).await?;
    self
      .store
      .incidents_for(person_id)
      .await
      .map_err(Into::into)
  }

  /// Confirmation history for a visible person, including reversed rows.
  pub async fn confirmations(
    &self,
    actor: &Actor,
    person_id: Uuid,
  ) -> Result<Vec<Confirmation>> {
    self.load_scoped(actor, person_id).await?;
    self
      .store
      .confirmations_for(person_id)
      .await
      .map_err(Into::into)
  }

  /// A persisted import batch. Visible to admins, auditors, and the
  /// actor that ran it.
  pub async fn batch(&self, actor: &Actor, id: Uuid) -> Result<ImportBatch> {
    let batch = self
      .store
      .get_batch(id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::BatchNotFound(id))?;

    let visible = matches!(actor.role, Role::Admin | Role::Auditor)
      || batch.created_by == actor.actor_id;
    if !visible {
      return Err(Error::BatchNotFound(id));
    }
    Ok(batch)
  }

  // ── Forward transitions ───────────────────────────────────────────────

  /// `PendingData → Verified`, recording verifier identity and timestamp.
  pub async fn verify(&self, actor: &Actor, id: Uuid) -> Result<Person> {
    let (mut person, leader) = self.load_scoped(actor, id).await?;
    if !authz::scoped_to_leader(actor, person.registered_by, leader.as_ref()) {
      return Err(Error::Forbidden);
    }
    if !person.state.allows_verify() {
      return Err(Error::InvalidTransition { action: "verify", from: person.state });
    }

    person.state = PersonState::Verified;
    person.verified_by = Some(actor.actor_id);
    person.verified_at = Some(chrono::Utc::now());

    self.store.save_person(&person).await.map_err(Into::into)?;
    Ok(person)
  }

  /// `Verified → Confirmed` (or `PendingData → Confirmed` when the
  /// policy shortcut is enabled), recording confirming-actor identity.
  pub async fn confirm_state(&self, actor: &Actor, id: Uuid) -> Result<Person> {
    let (mut person, leader) = self.load_scoped(actor, id).await?;
    if !authz::scoped_to_leader(actor, person.registered_by, leader.as_ref()) {
      return Err(Error::Forbidden);
    }
    if !person.state.allows_confirm_state(self.policy.confirm_from_pending) {
      return Err(Error::InvalidTransition {
        action: "confirm the state of",
        from:   person.state,
      });
    }

    person.state = PersonState::Confirmed;
    person.confirmed_by = Some(actor.actor_id);
    person.confirmed_at = Some(chrono::Utc::now());

    self.store.save_person(&person).await.map_err(Into::into)?;
    Ok(person)
  }

  // ── Reversal ──────────────────────────────────────────────────────────

  /// One downward step through the reversal table. Reversing out of
  /// `Completed` also marks the active confirmation reversed, in the same
  /// transaction. Bookkeeping attribution is cleared when the state that
  /// recorded it is left behind.
  pub async fn reverse(&self, actor: &Actor, id: Uuid) -> Result<Person> {
    let (mut person, leader) = self.load_scoped(actor, id).await?;
    if !authz::can_reverse_state(actor, &person, leader.as_ref()) {
      return Err(Error::Forbidden);
    }

    let from = person.state;
    let Some(target) = from.reversal_target() else {
      return Err(Error::InvalidTransition { action: "reverse", from });
    };

    // The incident must be resolved before the lifecycle moves again.
    if from == PersonState::Incident
      && self
        .store
        .unresolved_incident(id)
        .await
        .map_err(Into::into)?
        .is_some()
    {
      return Err(Error::InvalidTransition { action: "reverse", from });
    }

    // Audit bookkeeping: the pre-reversal state. Restoration via
    // `prior_state` is exclusive to incident resolution.
    person.prior_state = Some(from);
    person.state = target;

    match from {
      PersonState::Completed => {
        let rows = self
          .store
          .confirmations_for(id)
          .await
          .map_err(Into::into)?;
        let Some(active) = active_confirmation(&rows) else {
          return Err(Error::Dependency(format!(
            "person {id} is completed but has no active confirmation"
          )));
        };

        let mut confirmation = active.clone();
        confirmation.reversed = true;
        confirmation.reversed_by = Some(actor.actor_id);
        confirmation.reversed_at = Some(chrono::Utc::now());

        self
          .store
          .reverse_confirmation(&confirmation, &person)
          .await
          .map_err(Into::into)?;
      }
      PersonState::Confirmed => {
        person.confirmed_by = None;
        person.confirmed_at = None;
        self.store.save_person(&person).await.map_err(Into::into)?;
      }
      PersonState::Verified => {
        person.verified_by = None;
        person.verified_at = None;
        self.store.save_person(&person).await.map_err(Into::into)?;
      }
      PersonState::Incident => {
        person.verified_by = None;
        person.verified_at = None;
        person.confirmed_by = None;
        person.confirmed_at = None;
        self.store.save_person(&person).await.map_err(Into::into)?;
      }
      PersonState::PendingData => unreachable!("no reversal target"),
    }

    Ok(person)
  }

  // ── Incidents ─────────────────────────────────────────────────────────

  /// Flag a person: save the current state and park the lifecycle in
  /// `Incident`. One atomic unit with the incident insert.
  pub async fn raise_incident(
    &self,
    actor: &Actor,
    person_id: Uuid,
    observation: String,
  ) -> Result<Incident> {
    if observation.trim().is_empty() {
      return Err(Error::Validation("observation must not be empty".into()));
    }

    let (mut person, leader) = self.load_scoped(actor, person_id).await?;
    if !authz::can_create_incident(actor, &person, leader.as_ref()) {
      return Err(Error::Forbidden);
    }
    if !matches!(
      person.state,
      PersonState::PendingData | PersonState::Verified | PersonState::Confirmed
    ) {
      return Err(Error::InvalidTransition { action: "flag", from: person.state });
    }
    if self
      .store
      .unresolved_incident(person_id)
      .await
      .map_err(Into::into)?
      .is_some()
    {
      return Err(Error::OpenIncidentExists(person_id));
    }

    let incident = Incident::open(person_id, observation, actor.actor_id);

    person.prior_state = Some(person.state);
    person.state = PersonState::Incident;

    self
      .store
      .open_incident(&incident, &person)
      .await
      .map_err(Into::into)?;
    Ok(incident)
  }

  /// Lift a flag: restore exactly the state saved when the incident was
  /// raised. One atomic unit with the incident update.
  pub async fn resolve_incident(&self, actor: &Actor, incident_id: Uuid) -> Result<Incident> {
    let mut incident = self
      .store
      .get_incident(incident_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::IncidentNotFound(incident_id))?;

    let person_id = incident.person_id;
    let mut person = self
      .store
      .get_person(person_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::PersonNotFound(person_id))?;

    let leader = self.leader_of(&person).await?;
    if !authz::can_access_person(actor, &person, leader.as_ref()) {
      return Err(Error::IncidentNotFound(incident_id));
    }
    if !authz::can_resolve_incident(actor, &incident, &person, leader.as_ref()) {
      return Err(Error::Forbidden);
    }
    if incident.resolved {
      return Err(Error::AlreadyResolved(incident_id));
    }

    incident.resolved = true;
    incident.resolved_by = Some(actor.actor_id);
    incident.resolved_at = Some(chrono::Utc::now());

    // Symmetric restore: exactly what raise saved comes back.
    person.state = person.prior_state.take().unwrap_or(PersonState::PendingData);

    self
      .store
      .close_incident(&incident, &person)
      .await
      .map_err(Into::into)?;
    Ok(incident)
  }

  // ── Evidence confirmation ─────────────────────────────────────────────

  /// The sole path to `Completed`: store the evidence artifact, then
  /// insert the confirmation and complete the person in one transaction.
  /// If that transaction fails the stored artifact is deleted again.
  pub async fn confirm<A: ArtifactStore>(
    &self,
    actor: &Actor,
    person_id: Uuid,
    file: EvidenceFile,
    artifacts: &A,
  ) -> Result<Confirmation> {
    if file.bytes.is_empty() {
      return Err(Error::Validation("evidence file is empty".into()));
    }

    let (mut person, leader) = self.load_scoped(actor, person_id).await?;
    if !authz::can_confirm(actor, &person, leader.as_ref()) {
      return Err(Error::Forbidden);
    }
    if !person.state.allows_complete() {
      return Err(Error::InvalidTransition { action: "confirm", from: person.state });
    }
    if self
      .store
      .unresolved_incident(person_id)
      .await
      .map_err(Into::into)?
      .is_some()
    {
      return Err(Error::OpenIncidentExists(person_id));
    }
    let rows = self
      .store
      .confirmations_for(person_id)
      .await
      .map_err(Into::into)?;
    if active_confirmation(&rows).is_some() {
      return Err(Error::ActiveConfirmationExists(person_id));
    }

    let stored = artifacts
      .store(&file)
      .await
      .map_err(|e| Error::Dependency(format!("artifact storage failed: {e}")))?;

    let confirmation = Confirmation::active(person_id, stored, actor.actor_id);

    person.prior_state = Some(person.state);
    person.state = PersonState::Completed;

    if let Err(e) = self.store.add_confirmation(&confirmation, &person).await {
      // Compensate: never leave an orphaned artifact behind.
      if let Err(del) = artifacts.delete(&confirmation.evidence.path).await {
        warn!(
          path = %confirmation.evidence.path,
          error = %del,
          "failed to delete orphaned evidence artifact"
        );
      }
      return Err(e.into());
    }

    Ok(confirmation)
  }
}
