//! Integration tests for `SqliteStore` against an in-memory database,
//! plus engine-level tests that exercise the full lifecycle, incident,
//! confirmation and reconciliation paths over the real backend.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

use canvass_core::{
  Engine, Error as CoreError, LifecyclePolicy,
  actor::{Actor, NewActor, Role},
  artifact::{ArtifactStore, EvidenceFile, StoredArtifact},
  confirmation::Confirmation,
  import::{CandidateRow, RowFailure},
  incident::Incident,
  lookup::{CodeTables, StaticTables},
  person::{Document, DocumentKind, NewPerson, PersonState},
  reconcile::ReconcileInput,
  registry::{DocumentRegistry, NullRegistry, RegistryAttribution},
  store::PersonStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn actor(s: &SqliteStore, name: &str, role: Role) -> Actor {
  s.add_actor(NewActor {
    display_name:   name.into(),
    role,
    coordinator_id: None,
  })
  .await
  .unwrap()
}

async fn leader_under(s: &SqliteStore, name: &str, coordinator: &Actor) -> Actor {
  s.add_actor(NewActor {
    display_name:   name.into(),
    role:           Role::Leader,
    coordinator_id: Some(coordinator.actor_id),
  })
  .await
  .unwrap()
}

fn doc(number: &str) -> Document {
  Document { kind: DocumentKind::NationalId, number: number.into() }
}

fn evidence() -> EvidenceFile {
  EvidenceFile { file_name: "receipt.jpg".into(), bytes: vec![1, 2, 3, 4] }
}

// ─── Test collaborators ──────────────────────────────────────────────────────

/// In-memory artifact store that records deletions, so compensation can
/// be asserted on.
#[derive(Default)]
struct MemArtifacts {
  deleted: Mutex<Vec<String>>,
}

impl ArtifactStore for MemArtifacts {
  type Error = Infallible;

  async fn store(&self, file: &EvidenceFile) -> Result<StoredArtifact, Infallible> {
    Ok(StoredArtifact {
      url:          format!("mem://evidence/{}", file.file_name),
      path:         format!("evidence/{}", file.file_name),
      content_hash: format!("{:08x}", file.bytes.len()),
    })
  }

  async fn delete(&self, path: &str) -> Result<(), Infallible> {
    self.deleted.lock().unwrap().push(path.to_owned());
    Ok(())
  }
}

/// Registry stub with a fixed set of known document numbers; records the
/// claims made against it.
#[derive(Default)]
struct StubRegistry {
  known:  HashMap<String, String>,
  claims: Mutex<Vec<String>>,
}

impl DocumentRegistry for StubRegistry {
  type Error = Infallible;

  async fn lookup(&self, number: &str) -> Result<Option<RegistryAttribution>, Infallible> {
    Ok(
      self
        .known
        .get(number)
        .map(|label| RegistryAttribution { label: label.clone() }),
    )
  }

  async fn register(
    &self,
    number: &str,
    _attribution: &str,
    _owner_id: Uuid,
  ) -> Result<(), Infallible> {
    self.claims.lock().unwrap().push(number.to_owned());
    Ok(())
  }

  async fn remove(&self, _number: &str) -> Result<(), Infallible> { Ok(()) }
}

/// Registry whose every call fails, for the degradation path.
struct DownRegistry;

impl DocumentRegistry for DownRegistry {
  type Error = std::io::Error;

  async fn lookup(&self, _number: &str) -> Result<Option<RegistryAttribution>, std::io::Error> {
    Err(std::io::Error::other("registry down"))
  }

  async fn register(
    &self,
    _number: &str,
    _attribution: &str,
    _owner_id: Uuid,
  ) -> Result<(), std::io::Error> {
    Err(std::io::Error::other("registry down"))
  }

  async fn remove(&self, _number: &str) -> Result<(), std::io::Error> {
    Err(std::io::Error::other("registry down"))
  }
}

// ─── Actors ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_actor() {
  let s = store().await;

  let coordinator = actor(&s, "Carla", Role::Coordinator).await;
  let leader = leader_under(&s, "Luis", &coordinator).await;

  let fetched = s.get_actor(leader.actor_id).await.unwrap().unwrap();
  assert_eq!(fetched.display_name, "Luis");
  assert_eq!(fetched.role, Role::Leader);
  assert_eq!(fetched.coordinator_id, Some(coordinator.actor_id));
  assert!(fetched.assigned_leader_ids.is_empty());
}

#[tokio::test]
async fn get_actor_missing_returns_none() {
  let s = store().await;
  assert!(s.get_actor(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn leader_assignments_roundtrip() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let validator = actor(&s, "Vera", Role::Validator).await;

  s.assign_leader(validator.actor_id, leader.actor_id).await.unwrap();
  // Idempotent.
  s.assign_leader(validator.actor_id, leader.actor_id).await.unwrap();

  let fetched = s.get_actor(validator.actor_id).await.unwrap().unwrap();
  assert_eq!(fetched.assigned_leader_ids, vec![leader.actor_id]);

  s.unassign_leader(validator.actor_id, leader.actor_id).await.unwrap();
  let fetched = s.get_actor(validator.actor_id).await.unwrap().unwrap();
  assert!(fetched.assigned_leader_ids.is_empty());
}

#[tokio::test]
async fn leaders_for_coordinator_filters_by_role_and_link() {
  let s = store().await;
  let coordinator = actor(&s, "Carla", Role::Coordinator).await;
  let l1 = leader_under(&s, "Luis", &coordinator).await;
  let l2 = leader_under(&s, "Lena", &coordinator).await;
  // Other coordinator's leader, and a validator under this coordinator,
  // must not appear.
  let other = actor(&s, "Oscar", Role::Coordinator).await;
  leader_under(&s, "Leo", &other).await;
  s.add_actor(NewActor {
    display_name:   "Vera".into(),
    role:           Role::Validator,
    coordinator_id: Some(coordinator.actor_id),
  })
  .await
  .unwrap();

  let mut leaders = s.leaders_for_coordinator(coordinator.actor_id).await.unwrap();
  leaders.sort();
  let mut expected = vec![l1.actor_id, l2.actor_id];
  expected.sort();
  assert_eq!(leaders, expected);
}

// ─── Persons ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_person_starts_pending() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;

  let person = s
    .add_person(NewPerson::new("Ana Díaz", doc("10000001"), leader.actor_id))
    .await
    .unwrap();
  assert_eq!(person.state, PersonState::PendingData);
  assert!(person.prior_state.is_none());
  assert!(!person.imported);

  let fetched = s.get_person(person.person_id).await.unwrap().unwrap();
  assert_eq!(fetched.full_name, "Ana Díaz");
  assert_eq!(fetched.document, doc("10000001"));
  assert_eq!(fetched.registered_by, leader.actor_id);
}

#[tokio::test]
async fn duplicate_document_number_is_a_conflict() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;

  s.add_person(NewPerson::new("Ana", doc("10000001"), leader.actor_id))
    .await
    .unwrap();
  let err = s
    .add_person(NewPerson::new("Another Ana", doc("10000001"), leader.actor_id))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateDocument(ref n) if n == "10000001"));
}

#[tokio::test]
async fn find_by_document() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let person = s
    .add_person(NewPerson::new("Ana", doc("10000001"), leader.actor_id))
    .await
    .unwrap();

  let found = s.find_by_document("10000001").await.unwrap().unwrap();
  assert_eq!(found.person_id, person.person_id);
  assert!(s.find_by_document("99999999").await.unwrap().is_none());
}

#[tokio::test]
async fn list_persons_scoping() {
  let s = store().await;
  let l1 = actor(&s, "Luis", Role::Leader).await;
  let l2 = actor(&s, "Lena", Role::Leader).await;
  s.add_person(NewPerson::new("Ana", doc("1"), l1.actor_id)).await.unwrap();
  s.add_person(NewPerson::new("Bea", doc("2"), l1.actor_id)).await.unwrap();
  s.add_person(NewPerson::new("Cleo", doc("3"), l2.actor_id)).await.unwrap();

  assert_eq!(s.list_persons(None).await.unwrap().len(), 3);
  let mine = s.list_persons(Some(&[l1.actor_id])).await.unwrap();
  assert_eq!(mine.len(), 2);
  assert!(mine.iter().all(|p| p.registered_by == l1.actor_id));
  assert!(s.list_persons(Some(&[])).await.unwrap().is_empty());
}

#[tokio::test]
async fn save_person_persists_all_mutable_fields() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let mut person = s
    .add_person(NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  person.state = PersonState::Verified;
  person.prior_state = Some(PersonState::PendingData);
  person.verified_by = Some(leader.actor_id);
  person.verified_at = Some(chrono::Utc::now());
  person.location_id = Some(Uuid::new_v4());
  person.table_number = Some(7);
  s.save_person(&person).await.unwrap();

  let fetched = s.get_person(person.person_id).await.unwrap().unwrap();
  assert_eq!(fetched.state, PersonState::Verified);
  assert_eq!(fetched.prior_state, Some(PersonState::PendingData));
  assert_eq!(fetched.verified_by, Some(leader.actor_id));
  assert_eq!(fetched.location_id, person.location_id);
  assert_eq!(fetched.table_number, Some(7));
}

// ─── Incident rows ───────────────────────────────────────────────────────────

#[tokio::test]
async fn open_incident_writes_both_rows() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let mut person = s
    .add_person(NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  let incident = Incident::open(person.person_id, "missing signature".into(), leader.actor_id);
  person.prior_state = Some(person.state);
  person.state = PersonState::Incident;
  s.open_incident(&incident, &person).await.unwrap();

  let open = s.unresolved_incident(person.person_id).await.unwrap().unwrap();
  assert_eq!(open.incident_id, incident.incident_id);
  assert_eq!(open.observation, "missing signature");
  assert!(!open.resolved);

  let fetched = s.get_person(person.person_id).await.unwrap().unwrap();
  assert_eq!(fetched.state, PersonState::Incident);
  assert_eq!(fetched.prior_state, Some(PersonState::PendingData));
}

#[tokio::test]
async fn second_open_incident_is_a_conflict() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let person = s
    .add_person(NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  let first = Incident::open(person.person_id, "one".into(), leader.actor_id);
  s.open_incident(&first, &person).await.unwrap();

  let second = Incident::open(person.person_id, "two".into(), leader.actor_id);
  let err = s.open_incident(&second, &person).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateOpenIncident(id) if id == person.person_id));
}

#[tokio::test]
async fn close_incident_resolves_and_restores() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let mut person = s
    .add_person(NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  let mut incident = Incident::open(person.person_id, "check".into(), leader.actor_id);
  person.prior_state = Some(person.state);
  person.state = PersonState::Incident;
  s.open_incident(&incident, &person).await.unwrap();

  incident.resolved = true;
  incident.resolved_by = Some(leader.actor_id);
  incident.resolved_at = Some(chrono::Utc::now());
  person.state = person.prior_state.take().unwrap();
  s.close_incident(&incident, &person).await.unwrap();

  assert!(s.unresolved_incident(person.person_id).await.unwrap().is_none());
  let history = s.incidents_for(person.person_id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert!(history[0].resolved);
  assert_eq!(history[0].resolved_by, Some(leader.actor_id));

  let fetched = s.get_person(person.person_id).await.unwrap().unwrap();
  assert_eq!(fetched.state, PersonState::PendingData);
  assert!(fetched.prior_state.is_none());
}

// ─── Confirmation rows ───────────────────────────────────────────────────────

fn stored(path: &str) -> StoredArtifact {
  StoredArtifact {
    url:          format!("mem://{path}"),
    path:         path.into(),
    content_hash: "abc123".into(),
  }
}

#[tokio::test]
async fn second_active_confirmation_is_a_conflict() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let mut person = s
    .add_person(NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  person.state = PersonState::Completed;

  let first = Confirmation::active(person.person_id, stored("a.jpg"), leader.actor_id);
  s.add_confirmation(&first, &person).await.unwrap();

  let second = Confirmation::active(person.person_id, stored("b.jpg"), leader.actor_id);
  let err = s.add_confirmation(&second, &person).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateActiveConfirmation(id) if id == person.person_id));
}

#[tokio::test]
async fn reverse_then_reconfirm_accumulates_history() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let mut person = s
    .add_person(NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  person.state = PersonState::Completed;

  let mut first = Confirmation::active(person.person_id, stored("a.jpg"), leader.actor_id);
  s.add_confirmation(&first, &person).await.unwrap();

  first.reversed = true;
  first.reversed_by = Some(leader.actor_id);
  first.reversed_at = Some(chrono::Utc::now());
  person.state = PersonState::Confirmed;
  s.reverse_confirmation(&first, &person).await.unwrap();

  // The partial index no longer blocks a new active row.
  person.state = PersonState::Completed;
  let second = Confirmation::active(person.person_id, stored("b.jpg"), leader.actor_id);
  s.add_confirmation(&second, &person).await.unwrap();

  let rows = s.confirmations_for(person.person_id).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows.iter().filter(|c| !c.reversed).count(), 1);
}

// ─── Import batch rows ───────────────────────────────────────────────────────

#[tokio::test]
async fn batch_roundtrip_preserves_errors_and_omissions() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;

  let mut batch =
    canvass_core::import::ImportBatch::begin("padron.xlsx".into(), leader.actor_id, 3);
  s.add_batch(&batch).await.unwrap();

  batch.inserted = 1;
  batch.push_error(2, RowFailure::Invalid { message: "bad".into() });
  batch.omitted.push(canvass_core::import::OmittedRow {
    row:             3,
    document_number: "10000001".into(),
  });
  s.save_batch(&batch).await.unwrap();

  let fetched = s.get_batch(batch.batch_id).await.unwrap().unwrap();
  assert_eq!(fetched.file_name, "padron.xlsx");
  assert_eq!(fetched.total, 3);
  assert_eq!(fetched.inserted, 1);
  assert_eq!(fetched.failed, 1);
  assert_eq!(fetched.errors.len(), 1);
  assert_eq!(fetched.errors[0].row, 2);
  assert_eq!(fetched.omitted_count(), 1);
  assert_eq!(fetched.omitted[0].document_number, "10000001");
}

// ─── Code tables ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn seeded_code_tables_resolve() {
  let s = store().await;
  let loc = Uuid::new_v4();
  s.seed_location("L01", loc).await.unwrap();
  let st = Uuid::new_v4();
  s.seed_station("M105", st).await.unwrap();

  assert_eq!(s.resolve_location("L01").await.unwrap(), Some(loc));
  assert_eq!(s.resolve_location("L99").await.unwrap(), None);
  assert_eq!(s.resolve_station("M105").await.unwrap(), Some(st));
}

// ─── Engine: forward lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn full_forward_path_ends_completed() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let artifacts = MemArtifacts::default();

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  let person = engine.verify(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Verified);
  assert_eq!(person.verified_by, Some(leader.actor_id));
  assert!(person.verified_at.is_some());

  let person = engine.confirm_state(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Confirmed);
  assert_eq!(person.confirmed_by, Some(leader.actor_id));

  let confirmation = engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap();
  assert!(!confirmation.reversed);

  let person = engine.person(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Completed);
}

#[tokio::test]
async fn verify_is_only_legal_from_pending() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine.verify(&leader, person.person_id).await.unwrap();

  let err = engine.verify(&leader, person.person_id).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::Verified, .. }
  ));
}

#[tokio::test]
async fn confirm_state_shortcut_follows_policy() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;

  // Default policy: straight from pending.
  let engine = Engine::new(s.clone());
  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  let person = engine.confirm_state(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Confirmed);

  // Strict policy: Verified is required first.
  let strict = Engine::with_policy(
    s.clone(),
    LifecyclePolicy { confirm_from_pending: false },
  );
  let other = strict
    .register(&leader, NewPerson::new("Bea", doc("2"), leader.actor_id))
    .await
    .unwrap();
  let err = strict.confirm_state(&leader, other.person_id).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::PendingData, .. }
  ));
}

#[tokio::test]
async fn registration_validates_input() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;

  let err = engine
    .register(&leader, NewPerson::new("  ", doc("1"), leader.actor_id))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));

  let err = engine
    .register(&leader, NewPerson::new("Ana", doc(""), leader.actor_id))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
}

// ─── Engine: reversal ────────────────────────────────────────────────────────

#[tokio::test]
async fn reversal_steps_down_one_state_at_a_time() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let artifacts = MemArtifacts::default();

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine.verify(&leader, person.person_id).await.unwrap();
  engine.confirm_state(&leader, person.person_id).await.unwrap();
  engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap();

  // Completed → Confirmed; the confirmation row flips to reversed.
  let person = engine.reverse(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Confirmed);
  assert_eq!(person.prior_state, Some(PersonState::Completed));
  let rows = engine.confirmations(&leader, person.person_id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert!(rows[0].reversed);
  assert_eq!(rows[0].reversed_by, Some(leader.actor_id));

  // Confirmed → Verified; confirmation attribution cleared.
  let person = engine.reverse(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Verified);
  assert!(person.confirmed_by.is_none());
  assert!(person.confirmed_at.is_none());

  // Verified → PendingData; verification attribution cleared.
  let person = engine.reverse(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::PendingData);
  assert!(person.verified_by.is_none());
  assert!(person.verified_at.is_none());

  // Nothing below PendingData.
  let err = engine.reverse(&leader, person.person_id).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::PendingData, .. }
  ));
}

#[tokio::test]
async fn reversed_completion_can_be_reconfirmed() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let artifacts = MemArtifacts::default();

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine.verify(&leader, person.person_id).await.unwrap();
  engine.confirm_state(&leader, person.person_id).await.unwrap();
  engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap();
  engine.reverse(&leader, person.person_id).await.unwrap();

  // A second confirmation is legal once the first is reversed.
  engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap();

  let rows = engine.confirmations(&leader, person.person_id).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!(rows.iter().filter(|c| !c.reversed).count(), 1);
}

// ─── Engine: incidents ───────────────────────────────────────────────────────

#[tokio::test]
async fn incident_parks_and_resolution_restores() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine.verify(&leader, person.person_id).await.unwrap();

  let incident = engine
    .raise_incident(&leader, person.person_id, "address mismatch".into())
    .await
    .unwrap();

  let parked = engine.person(&leader, person.person_id).await.unwrap();
  assert_eq!(parked.state, PersonState::Incident);
  assert_eq!(parked.prior_state, Some(PersonState::Verified));

  let resolved = engine
    .resolve_incident(&leader, incident.incident_id)
    .await
    .unwrap();
  assert!(resolved.resolved);
  assert_eq!(resolved.resolved_by, Some(leader.actor_id));

  // The exact pre-incident state comes back, attribution intact.
  let restored = engine.person(&leader, person.person_id).await.unwrap();
  assert_eq!(restored.state, PersonState::Verified);
  assert!(restored.prior_state.is_none());
  assert_eq!(restored.verified_by, Some(leader.actor_id));
}

#[tokio::test]
async fn one_open_incident_per_person() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine
    .raise_incident(&leader, person.person_id, "one".into())
    .await
    .unwrap();

  let err = engine
    .raise_incident(&leader, person.person_id, "two".into())
    .await
    .unwrap_err();
  // Parked persons reject further flags before the open-incident check.
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::Incident, .. }
  ));
}

#[tokio::test]
async fn completed_person_cannot_be_flagged() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let artifacts = MemArtifacts::default();

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap();

  let err = engine
    .raise_incident(&leader, person.person_id, "too late".into())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::Completed, .. }
  ));
}

#[tokio::test]
async fn incident_requires_observation() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  let err = engine
    .raise_incident(&leader, person.person_id, "   ".into())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn resolving_twice_is_rejected() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  let incident = engine
    .raise_incident(&leader, person.person_id, "check".into())
    .await
    .unwrap();
  engine
    .resolve_incident(&leader, incident.incident_id)
    .await
    .unwrap();

  let err = engine
    .resolve_incident(&leader, incident.incident_id)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::AlreadyResolved(id) if id == incident.incident_id));
}

#[tokio::test]
async fn parked_person_cannot_reverse_or_confirm() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let artifacts = MemArtifacts::default();

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine.verify(&leader, person.person_id).await.unwrap();
  engine
    .raise_incident(&leader, person.person_id, "hold".into())
    .await
    .unwrap();

  let err = engine.reverse(&leader, person.person_id).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::Incident, .. }
  ));

  let err = engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidTransition { from: PersonState::Incident, .. }
  ));
}

// ─── Engine: scoping ─────────────────────────────────────────────────────────

#[tokio::test]
async fn leaders_cannot_see_each_other() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let l1 = actor(&s, "Luis", Role::Leader).await;
  let l2 = actor(&s, "Lena", Role::Leader).await;

  let person = engine
    .register(&l1, NewPerson::new("Ana", doc("1"), l1.actor_id))
    .await
    .unwrap();

  // Indistinguishable from a missing record.
  let err = engine.person(&l2, person.person_id).await.unwrap_err();
  assert!(matches!(err, CoreError::PersonNotFound(id) if id == person.person_id));
  assert!(engine.list_persons(&l2).await.unwrap().is_empty());
}

#[tokio::test]
async fn coordinator_scope_covers_its_leaders() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let coordinator = actor(&s, "Carla", Role::Coordinator).await;
  let leader = leader_under(&s, "Luis", &coordinator).await;
  let foreign = actor(&s, "Lena", Role::Leader).await;

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine
    .register(&foreign, NewPerson::new("Bea", doc("2"), foreign.actor_id))
    .await
    .unwrap();

  // Sees and may mutate the subordinate leader's person.
  let verified = engine.verify(&coordinator, person.person_id).await.unwrap();
  assert_eq!(verified.state, PersonState::Verified);

  // But only that leader's.
  let visible = engine.list_persons(&coordinator).await.unwrap();
  assert_eq!(visible.len(), 1);
  assert_eq!(visible[0].person_id, person.person_id);
}

#[tokio::test]
async fn validator_scope_is_the_assignment_set() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let other = actor(&s, "Lena", Role::Leader).await;
  let validator = actor(&s, "Vera", Role::Validator).await;
  s.assign_leader(validator.actor_id, leader.actor_id).await.unwrap();
  let validator = s.get_actor(validator.actor_id).await.unwrap().unwrap();

  let visible = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  let hidden = engine
    .register(&other, NewPerson::new("Bea", doc("2"), other.actor_id))
    .await
    .unwrap();

  engine.verify(&validator, visible.person_id).await.unwrap();
  let err = engine.person(&validator, hidden.person_id).await.unwrap_err();
  assert!(matches!(err, CoreError::PersonNotFound(_)));
}

#[tokio::test]
async fn auditor_reads_everything_mutates_nothing() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let auditor = actor(&s, "Abel", Role::Auditor).await;

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();

  assert_eq!(engine.list_persons(&auditor).await.unwrap().len(), 1);
  engine.person(&auditor, person.person_id).await.unwrap();

  let err = engine.verify(&auditor, person.person_id).await.unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
  let err = engine
    .raise_incident(&auditor, person.person_id, "note".into())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn registering_under_a_foreign_leader_is_forbidden() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let l1 = actor(&s, "Luis", Role::Leader).await;
  let l2 = actor(&s, "Lena", Role::Leader).await;

  let err = engine
    .register(&l1, NewPerson::new("Ana", doc("1"), l2.actor_id))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

// ─── Engine: confirmation compensation ───────────────────────────────────────

/// Delegating wrapper that fails the confirmation write, to exercise the
/// compensating artifact delete.
#[derive(Clone)]
struct FailingStore {
  inner: SqliteStore,
}

impl PersonStore for FailingStore {
  type Error = Error;

  async fn add_actor(&self, input: NewActor) -> Result<Actor, Error> {
    self.inner.add_actor(input).await
  }
  async fn get_actor(&self, id: Uuid) -> Result<Option<Actor>, Error> {
    self.inner.get_actor(id).await
  }
  async fn assign_leader(&self, actor_id: Uuid, leader_id: Uuid) -> Result<(), Error> {
    self.inner.assign_leader(actor_id, leader_id).await
  }
  async fn unassign_leader(&self, actor_id: Uuid, leader_id: Uuid) -> Result<(), Error> {
    self.inner.unassign_leader(actor_id, leader_id).await
  }
  async fn leaders_for_coordinator(&self, coordinator_id: Uuid) -> Result<Vec<Uuid>, Error> {
    self.inner.leaders_for_coordinator(coordinator_id).await
  }
  async fn add_person(
    &self,
    input: NewPerson,
  ) -> Result<canvass_core::person::Person, Error> {
    self.inner.add_person(input).await
  }
  async fn get_person(
    &self,
    id: Uuid,
  ) -> Result<Option<canvass_core::person::Person>, Error> {
    self.inner.get_person(id).await
  }
  async fn find_by_document(
    &self,
    number: &str,
  ) -> Result<Option<canvass_core::person::Person>, Error> {
    self.inner.find_by_document(number).await
  }
  async fn list_persons(
    &self,
    leaders: Option<&[Uuid]>,
  ) -> Result<Vec<canvass_core::person::Person>, Error> {
    self.inner.list_persons(leaders).await
  }
  async fn save_person(&self, person: &canvass_core::person::Person) -> Result<(), Error> {
    self.inner.save_person(person).await
  }
  async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, Error> {
    self.inner.get_incident(id).await
  }
  async fn unresolved_incident(&self, person_id: Uuid) -> Result<Option<Incident>, Error> {
    self.inner.unresolved_incident(person_id).await
  }
  async fn incidents_for(&self, person_id: Uuid) -> Result<Vec<Incident>, Error> {
    self.inner.incidents_for(person_id).await
  }
  async fn open_incident(
    &self,
    incident: &Incident,
    person: &canvass_core::person::Person,
  ) -> Result<(), Error> {
    self.inner.open_incident(incident, person).await
  }
  async fn close_incident(
    &self,
    incident: &Incident,
    person: &canvass_core::person::Person,
  ) -> Result<(), Error> {
    self.inner.close_incident(incident, person).await
  }
  async fn confirmations_for(&self, person_id: Uuid) -> Result<Vec<Confirmation>, Error> {
    self.inner.confirmations_for(person_id).await
  }
  async fn add_confirmation(
    &self,
    _confirmation: &Confirmation,
    _person: &canvass_core::person::Person,
  ) -> Result<(), Error> {
    Err(Error::Decode("injected confirmation failure".into()))
  }
  async fn reverse_confirmation(
    &self,
    confirmation: &Confirmation,
    person: &canvass_core::person::Person,
  ) -> Result<(), Error> {
    self.inner.reverse_confirmation(confirmation, person).await
  }
  async fn add_batch(&self, batch: &canvass_core::import::ImportBatch) -> Result<(), Error> {
    self.inner.add_batch(batch).await
  }
  async fn save_batch(&self, batch: &canvass_core::import::ImportBatch) -> Result<(), Error> {
    self.inner.save_batch(batch).await
  }
  async fn get_batch(
    &self,
    id: Uuid,
  ) -> Result<Option<canvass_core::import::ImportBatch>, Error> {
    self.inner.get_batch(id).await
  }
}

#[tokio::test]
async fn failed_confirmation_write_deletes_the_artifact() {
  let s = store().await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let artifacts = MemArtifacts::default();

  let real = Engine::new(s.clone());
  let person = real
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  real.verify(&leader, person.person_id).await.unwrap();

  let failing = Engine::new(FailingStore { inner: s.clone() });
  let err = failing
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Dependency(_)));

  // Compensation ran: the stored artifact was deleted again.
  let deleted = artifacts.deleted.lock().unwrap().clone();
  assert_eq!(deleted, vec!["evidence/receipt.jpg".to_owned()]);

  // And the person never moved.
  let person = real.person(&leader, person.person_id).await.unwrap();
  assert_eq!(person.state, PersonState::Verified);
  assert!(
    real
      .confirmations(&leader, person.person_id)
      .await
      .unwrap()
      .is_empty()
  );
}

// ─── Engine: reconciliation ──────────────────────────────────────────────────

fn candidate(name: &str, number: &str) -> CandidateRow {
  CandidateRow {
    full_name:       name.into(),
    document_kind:   DocumentKind::NationalId,
    document_number: number.into(),
    location_code:   None,
    station_code:    None,
    table_number:    None,
  }
}

fn reconcile_input(owner: &Actor, rows: Vec<CandidateRow>) -> ReconcileInput {
  ReconcileInput {
    file_name:    "padron.xlsx".into(),
    owner_leader: owner.actor_id,
    attribution:  None,
    rows,
  }
}

#[tokio::test]
async fn reconcile_inserts_new_rows_pending() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default();

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![candidate("Ana", "1"), candidate("Bea", "2")]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();

  assert_eq!(batch.total, 2);
  assert_eq!(batch.inserted, 2);
  assert_eq!(batch.failed, 0);

  let persons = engine.list_persons(&leader).await.unwrap();
  assert_eq!(persons.len(), 2);
  for p in &persons {
    assert_eq!(p.state, PersonState::PendingData);
    assert!(p.imported);
    assert_eq!(p.import_batch_id, Some(batch.batch_id));
    assert_eq!(p.registered_by, leader.actor_id);
  }
}

#[tokio::test]
async fn reconcile_classifies_bad_rows() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default();

  let rows = vec![
    candidate("Ana", "1"),
    candidate("", "2"),          // invalid: empty name
    candidate("Cleo", "1"),      // duplicate of row 1
    candidate("Dina", "12-34"),  // invalid: non-alphanumeric
  ];
  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, rows),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();

  assert_eq!(batch.inserted, 1);
  assert_eq!(batch.failed, 3);
  assert_eq!(batch.errors.len(), 3);
  assert!(matches!(batch.errors[0].failure, RowFailure::Invalid { .. }));
  assert_eq!(batch.errors[0].row, 2);
  assert!(matches!(
    batch.errors[1].failure,
    RowFailure::DuplicateInBatch { first_row: 1 }
  ));
  assert!(matches!(batch.errors[2].failure, RowFailure::Invalid { .. }));
}

#[tokio::test]
async fn reconcile_updates_refresh_logistics_only() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let location = Uuid::new_v4();
  let tables = StaticTables::default().with_location("L01", location);

  let person = engine
    .register(&leader, NewPerson::new("Ana Díaz", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine.verify(&leader, person.person_id).await.unwrap();

  let mut row = candidate("Different Name", "1");
  row.location_code = Some("L01".into());
  row.table_number = Some(4);

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![row]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();
  assert_eq!(batch.updated, 1);
  assert_eq!(batch.inserted, 0);

  let refreshed = engine.person(&leader, person.person_id).await.unwrap();
  // Logistics move; identity and lifecycle stay.
  assert_eq!(refreshed.location_id, Some(location));
  assert_eq!(refreshed.table_number, Some(4));
  assert_eq!(refreshed.full_name, "Ana Díaz");
  assert_eq!(refreshed.state, PersonState::Verified);
}

#[tokio::test]
async fn reconcile_rejects_foreign_owner_rows() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let l1 = actor(&s, "Luis", Role::Leader).await;
  let l2 = actor(&s, "Lena", Role::Leader).await;
  let tables = StaticTables::default();

  engine
    .register(&l2, NewPerson::new("Ana", doc("1"), l2.actor_id))
    .await
    .unwrap();

  let batch = engine
    .reconcile(
      &l1,
      reconcile_input(&l1, vec![candidate("Ana", "1")]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();
  assert_eq!(batch.failed, 1);
  assert!(matches!(batch.errors[0].failure, RowFailure::ForeignOwner));
}

#[tokio::test]
async fn reconcile_omits_confirmed_persons() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default();
  let artifacts = MemArtifacts::default();

  let person = engine
    .register(&leader, NewPerson::new("Ana", doc("1"), leader.actor_id))
    .await
    .unwrap();
  engine
    .confirm(&leader, person.person_id, evidence(), &artifacts)
    .await
    .unwrap();

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![candidate("Ana", "1")]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();

  // Not an error: the row was fine, the work is just already done.
  assert_eq!(batch.failed, 0);
  assert_eq!(batch.updated, 0);
  assert_eq!(batch.omitted_count(), 1);
  assert_eq!(batch.omitted[0].document_number, "1");
}

#[tokio::test]
async fn reconcile_drops_rows_with_unknown_codes() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default().with_location("L01", Uuid::new_v4());

  let mut row = candidate("Ana", "1");
  row.location_code = Some("L99".into());

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![row]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();
  assert_eq!(batch.inserted, 0);
  assert!(matches!(
    batch.errors[0].failure,
    RowFailure::UnknownLocation { ref code } if code == "L99"
  ));
}

#[tokio::test]
async fn reconcile_consults_the_registry_for_new_rows() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default();

  let mut registry = StubRegistry::default();
  registry.known.insert("2".into(), "North Zone".into());

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![candidate("Ana", "1"), candidate("Bea", "2")]),
      &tables,
      Some(&registry),
    )
    .await
    .unwrap();

  assert_eq!(batch.inserted, 1);
  assert_eq!(batch.failed, 1);
  assert!(matches!(
    batch.errors[0].failure,
    RowFailure::KnownElsewhere { ref attribution } if attribution == "North Zone"
  ));
  // The inserted row was claimed.
  assert_eq!(registry.claims.lock().unwrap().clone(), vec!["1".to_owned()]);
}

#[tokio::test]
async fn registry_outage_never_blocks_the_batch() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default();

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![candidate("Ana", "1")]),
      &tables,
      Some(&DownRegistry),
    )
    .await
    .unwrap();

  // Lookup and claim both failed; the row went through anyway.
  assert_eq!(batch.inserted, 1);
  assert_eq!(batch.failed, 0);
}

#[tokio::test]
async fn auditors_cannot_reconcile() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let auditor = actor(&s, "Abel", Role::Auditor).await;
  let leader = actor(&s, "Luis", Role::Leader).await;
  let tables = StaticTables::default();

  let err = engine
    .reconcile(
      &auditor,
      reconcile_input(&leader, vec![candidate("Ana", "1")]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Forbidden));
}

#[tokio::test]
async fn batch_visibility_is_creator_admin_auditor() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let other = actor(&s, "Lena", Role::Leader).await;
  let admin = actor(&s, "Ada", Role::Admin).await;
  let auditor = actor(&s, "Abel", Role::Auditor).await;
  let tables = StaticTables::default();

  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![candidate("Ana", "1")]),
      &tables,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();

  engine.batch(&leader, batch.batch_id).await.unwrap();
  engine.batch(&admin, batch.batch_id).await.unwrap();
  engine.batch(&auditor, batch.batch_id).await.unwrap();

  let err = engine.batch(&other, batch.batch_id).await.unwrap_err();
  assert!(matches!(err, CoreError::BatchNotFound(_)));
}

#[tokio::test]
async fn reconcile_resolves_codes_from_the_store_tables() {
  let s = store().await;
  let engine = Engine::new(s.clone());
  let leader = actor(&s, "Luis", Role::Leader).await;
  let location = Uuid::new_v4();
  s.seed_location("L01", location).await.unwrap();

  let mut row = candidate("Ana", "1");
  row.location_code = Some("L01".into());

  // The store itself serves as the code-table collaborator.
  let batch = engine
    .reconcile(
      &leader,
      reconcile_input(&leader, vec![row]),
      &s,
      None::<&NullRegistry>,
    )
    .await
    .unwrap();
  assert_eq!(batch.inserted, 1);

  let persons = engine.list_persons(&leader).await.unwrap();
  assert_eq!(persons[0].location_id, Some(location));
}
