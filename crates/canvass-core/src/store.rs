//! The `PersonStore` trait — the record repository collaborator.
//!
//! Implemented by storage backends (e.g. `canvass-store-sqlite`). The
//! engine depends on this abstraction, never on a concrete backend.
//!
//! Every method named `open_*`/`close_*`/`add_confirmation`/
//! `reverse_confirmation` is a documented atomic unit: the incident or
//! confirmation row and the person row must be written inside one
//! transaction, or not at all. Uniqueness invariants (one open incident
//! per person, one active confirmation per person, one person per
//! document number) are the backend's to enforce with constrained
//! inserts; violations must surface as errors convertible to the
//! `Conflict` class of [`crate::Error`].

use std::future::Future;

use uuid::Uuid;

use crate::{
  actor::{Actor, NewActor},
  confirmation::Confirmation,
  import::ImportBatch,
  incident::Incident,
  person::{NewPerson, Person},
};

/// Abstraction over a Canvass record store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PersonStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  // ── Actors ────────────────────────────────────────────────────────────

  /// Create and persist an actor. Administrative; the engine itself only
  /// reads actors.
  fn add_actor(
    &self,
    input: NewActor,
  ) -> impl Future<Output = Result<Actor, Self::Error>> + Send + '_;

  /// Retrieve an actor with its assignment set resolved. Returns `None`
  /// if not found.
  fn get_actor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Actor>, Self::Error>> + Send + '_;

  /// Grant a validator/confirmer access to a leader's persons.
  /// Idempotent. Administrative, populated out-of-band.
  fn assign_leader(
    &self,
    actor_id: Uuid,
    leader_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Revoke a previously granted assignment.
  fn unassign_leader(
    &self,
    actor_id: Uuid,
    leader_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The leaders whose `coordinator_id` equals `coordinator_id`.
  fn leaders_for_coordinator(
    &self,
    coordinator_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Persons ───────────────────────────────────────────────────────────

  /// Insert a fresh person in `PendingData`. Fails with a conflict-class
  /// error if the document number is already taken.
  fn add_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// Look a person up by its system-wide-unique document number.
  fn find_by_document<'a>(
    &'a self,
    number: &'a str,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + 'a;

  /// List persons registered by any of `leaders`, or all persons when
  /// `None` (universal scope).
  fn list_persons<'a>(
    &'a self,
    leaders: Option<&'a [Uuid]>,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + 'a;

  /// Persist a single-row update of `person`. Used by transitions that
  /// touch no other table (verify, confirm_state, plain reversals) and by
  /// the reconciliation update path.
  fn save_person<'a>(
    &'a self,
    person: &'a Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Incidents ─────────────────────────────────────────────────────────

  fn get_incident(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// The person's unresolved incident, if one exists. There is at most
  /// one.
  fn unresolved_incident(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// Full incident history for a person, most recent first.
  fn incidents_for(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Incident>, Self::Error>> + Send + '_;

  /// Atomic unit: insert the open incident and save the suspended person
  /// row in one transaction.
  fn open_incident<'a>(
    &'a self,
    incident: &'a Incident,
    person: &'a Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Atomic unit: mark the incident resolved and save the restored person
  /// row in one transaction.
  fn close_incident<'a>(
    &'a self,
    incident: &'a Incident,
    person: &'a Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Confirmations ─────────────────────────────────────────────────────

  /// All confirmation rows for a person, including reversed history.
  fn confirmations_for(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Confirmation>, Self::Error>> + Send + '_;

  /// Atomic unit: insert the active confirmation and save the completed
  /// person row in one transaction. Fails with a conflict-class error if
  /// an active confirmation already exists for the person.
  fn add_confirmation<'a>(
    &'a self,
    confirmation: &'a Confirmation,
    person: &'a Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Atomic unit: mark the confirmation reversed and save the downgraded
  /// person row in one transaction.
  fn reverse_confirmation<'a>(
    &'a self,
    confirmation: &'a Confirmation,
    person: &'a Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Import batches ────────────────────────────────────────────────────

  fn add_batch<'a>(
    &'a self,
    batch: &'a ImportBatch,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Update the aggregate counters and error list of an existing batch.
  fn save_batch<'a>(
    &'a self,
    batch: &'a ImportBatch,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_batch(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ImportBatch>, Self::Error>> + Send + '_;
}
