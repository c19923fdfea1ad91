//! Bulk reconciliation — merging externally sourced rows into live state.
//!
//! The pipeline runs per row, in a fixed order; the first disqualifying
//! stage wins and later stages never re-report the row:
//!
//! 1. schema validation
//! 2. in-batch duplicate detection (first occurrence survives)
//! 3. cross-store duplicate detection (foreign owner → error, own scope
//!    → update path)
//! 4. external-registry check for genuinely new rows
//! 5. location/station code resolution
//! 6. confirmation guard on updates (already-confirmed persons are
//!    omitted, never overwritten)
//! 7. apply (insert new rows in `PendingData`; updates refresh logistic
//!    fields only)
//!
//! Row failures are local to the row. Each applied row is its own atomic
//! unit, so a batch can be interrupted and re-submitted safely.

use std::collections::HashMap;

use tracing::warn;

use crate::{
  Error, Result,
  actor::{Actor, Role},
  authz,
  confirmation::active_confirmation,
  engine::Engine,
  import::{CandidateRow, ImportBatch, OmittedRow, RowFailure},
  lookup::CodeTables,
  person::{Document, NewPerson},
  registry::DocumentRegistry,
  store::PersonStore,
};
use uuid::Uuid;

// ─── Input ───────────────────────────────────────────────────────────────────

/// One ingestion call.
#[derive(Debug, Clone)]
pub struct ReconcileInput {
  /// Originating filename, recorded on the batch for audit display.
  pub file_name:    String,
  /// The leader that will own every person inserted by this run. Must be
  /// inside the acting actor's scope.
  pub owner_leader: Uuid,
  /// Label reported to the external registry when claiming new document
  /// numbers. Falls back to the actor's display name.
  pub attribution:  Option<String>,
  pub rows:         Vec<CandidateRow>,
}

// ─── Row validation ──────────────────────────────────────────────────────────

const MAX_DOCUMENT_LEN: usize = 20;

/// Schema validation for one candidate row.
pub fn validate_row(row: &CandidateRow) -> Result<(), String> {
  if row.full_name.trim().is_empty() {
    return Err("full_name must not be empty".into());
  }
  let number = row.document_number.trim();
  if number.is_empty() {
    return Err("document_number must not be empty".into());
  }
  if number.len() > MAX_DOCUMENT_LEN {
    return Err(format!(
      "document_number longer than {MAX_DOCUMENT_LEN} characters"
    ));
  }
  if !number.chars().all(|c| c.is_ascii_alphanumeric()) {
    return Err("document_number must be alphanumeric".into());
  }
  Ok(())
}

struct ResolvedCodes {
  location: Option<Uuid>,
  station:  Option<Uuid>,
}

// ─── Engine entry point ──────────────────────────────────────────────────────

impl<S: PersonStore> Engine<S> {
  /// Run one reconciliation batch. Returns the persisted [`ImportBatch`]
  /// with aggregate counters, the omitted list and the structured per-row
  /// error list.
  pub async fn reconcile<T, R>(
    &self,
    actor: &Actor,
    input: ReconcileInput,
    tables: &T,
    registry: Option<&R>,
  ) -> Result<ImportBatch>
  where
    T: CodeTables,
    R: DocumentRegistry,
  {
    if actor.role == Role::Auditor {
      return Err(Error::Forbidden);
    }
    let owner = self
      .store()
      .get_actor(input.owner_leader)
      .await
      .map_err(Into::into)?;
    if !authz::scoped_to_leader(actor, input.owner_leader, owner.as_ref()) {
      return Err(Error::Forbidden);
    }

    let attribution = input
      .attribution
      .clone()
      .unwrap_or_else(|| actor.display_name.clone());

    let mut batch =
      ImportBatch::begin(input.file_name.clone(), actor.actor_id, input.rows.len() as u32);
    self.store().add_batch(&batch).await.map_err(Into::into)?;

    // Stage 2 bookkeeping: document number → first row that carried it.
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, row) in input.rows.iter().enumerate() {
      let row_no = index + 1;

      // Stage 1: schema validation.
      if let Err(message) = validate_row(row) {
        batch.push_error(row_no, RowFailure::Invalid { message });
        continue;
      }
      let number = row.document_number.trim().to_owned();

      // Stage 2: in-batch duplicates.
      if let Some(&first_row) = seen.get(&number) {
        batch.push_error(row_no, RowFailure::DuplicateInBatch { first_row });
        continue;
      }
      seen.insert(number.clone(), row_no);

      // Stage 3: cross-store duplicates.
      let existing = self
        .store()
        .find_by_document(&number)
        .await
        .map_err(Into::into)?;

      match existing {
        Some(person) => {
          let leader = self
            .store()
            .get_actor(person.registered_by)
            .await
            .map_err(Into::into)?;
          if !authz::scoped_to_leader(actor, person.registered_by, leader.as_ref()) {
            batch.push_error(row_no, RowFailure::ForeignOwner);
            continue;
          }

          // Stage 5: code resolution.
          let codes = match self.resolve_codes(tables, row).await? {
            Ok(codes) => codes,
            Err(failure) => {
              batch.push_error(row_no, failure);
              continue;
            }
          };

          // Stage 6: completed work is never clobbered.
          let confirmations = self
            .store()
            .confirmations_for(person.person_id)
            .await
            .map_err(Into::into)?;
          if active_confirmation(&confirmations).is_some() {
            batch.omitted.push(OmittedRow { row: row_no, document_number: number });
            continue;
          }

          // Stage 7: refresh logistic fields only. Identity and lifecycle
          // state are never touched by an update.
          let mut updated = person;
          if let Some(location) = codes.location {
            updated.location_id = Some(location);
          }
          if let Some(station) = codes.station {
            updated.station_id = Some(station);
          }
          if let Some(table) = row.table_number {
            updated.table_number = Some(table);
          }

          match self.store().save_person(&updated).await {
            Ok(()) => batch.updated += 1,
            Err(e) => {
              let e: Error = e.into();
              batch.push_error(row_no, RowFailure::Apply { message: e.to_string() });
            }
          }
        }

        None => {
          // Stage 4: registry check for genuinely new rows. Unavailability
          // degrades to "unknown" — it never blocks the batch.
          if let Some(registry) = registry {
            match registry.lookup(&number).await {
              Ok(Some(claimed)) => {
                batch.push_error(
                  row_no,
                  RowFailure::KnownElsewhere { attribution: claimed.label },
                );
                continue;
              }
              Ok(None) => {}
              Err(e) => {
                warn!(document = %number, error = %e, "registry lookup failed; treating document as unknown");
              }
            }
          }

          // Stage 5: code resolution.
          let codes = match self.resolve_codes(tables, row).await? {
            Ok(codes) => codes,
            Err(failure) => {
              batch.push_error(row_no, failure);
              continue;
            }
          };

          // Stage 7: fresh person, pending, tagged with this batch.
          let new_person = NewPerson {
            full_name:       row.full_name.trim().to_owned(),
            document:        Document { kind: row.document_kind, number: number.clone() },
            registered_by:   input.owner_leader,
            location_id:     codes.location,
            station_id:      codes.station,
            table_number:    row.table_number,
            imported:        true,
            import_batch_id: Some(batch.batch_id),
          };

          match self.store().add_person(new_person).await {
            Ok(person) => {
              batch.inserted += 1;
              // Best-effort claim, after the row's own commit; failures
              // are logged and never fail the row.
              if let Some(registry) = registry
                && let Err(e) = registry
                  .register(&number, &attribution, person.person_id)
                  .await
              {
                warn!(document = %number, error = %e, "registry claim failed");
              }
            }
            Err(e) => {
              let e: Error = e.into();
              batch.push_error(row_no, RowFailure::Apply { message: e.to_string() });
            }
          }
        }
      }
    }

    self.store().save_batch(&batch).await.map_err(Into::into)?;
    Ok(batch)
  }

  async fn resolve_codes<T: CodeTables>(
    &self,
    tables: &T,
    row: &CandidateRow,
  ) -> Result<Result<ResolvedCodes, RowFailure>> {
    let mut codes = ResolvedCodes { location: None, station: None };

    if let Some(code) = row.location_code.as_deref() {
      match tables
        .resolve_location(code)
        .await
        .map_err(|e| Error::Dependency(format!("location lookup failed: {e}")))?
      {
        Some(id) => codes.location = Some(id),
        None => {
          return Ok(Err(RowFailure::UnknownLocation { code: code.to_owned() }));
        }
      }
    }
    if let Some(code) = row.station_code.as_deref() {
      match tables
        .resolve_station(code)
        .await
        .map_err(|e| Error::Dependency(format!("station lookup failed: {e}")))?
      {
        Some(id) => codes.station = Some(id),
        None => {
          return Ok(Err(RowFailure::UnknownStation { code: code.to_owned() }));
        }
      }
    }

    Ok(Ok(codes))
  }
}
