//! [`SqliteStore`] — the SQLite implementation of [`PersonStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use canvass_core::{
  actor::{Actor, NewActor},
  confirmation::Confirmation,
  import::ImportBatch,
  incident::Incident,
  lookup::CodeTables,
  person::{NewPerson, Person, PersonState},
  store::PersonStore,
};

use crate::{
  Error, Result,
  encode::{
    CONFIRMATION_COLUMNS, INCIDENT_COLUMNS, PERSON_COLUMNS, PersonRow,
    RawActor, RawBatch, RawConfirmation, RawIncident, RawPerson, encode_dt,
    encode_opt_uuid, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Canvass record store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Whether `e` is a UNIQUE violation whose message names `needle`.
///
/// SQLite reports every UNIQUE failure as `UNIQUE constraint failed:
/// <table>.<column>`, including partial-index violations, so needles are
/// always in `table.column` form.
fn unique_violation(e: &tokio_rusqlite::Error, needle: &str) -> bool {
  if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, Some(msg))) = e {
    code.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains(needle)
  } else {
    false
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Code-table seeding (administrative) ───────────────────────────────

  pub async fn seed_location(&self, code: &str, location_id: Uuid) -> Result<()> {
    let code = code.to_owned();
    let id_str = encode_uuid(location_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO locations (code, location_id) VALUES (?1, ?2)",
          rusqlite::params![code, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn seed_station(&self, code: &str, station_id: Uuid) -> Result<()> {
    let code = code.to_owned();
    let id_str = encode_uuid(station_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO stations (code, station_id) VALUES (?1, ?2)",
          rusqlite::params![code, id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── PersonStore impl ────────────────────────────────────────────────────────

impl PersonStore for SqliteStore {
  type Error = Error;

  // ── Actors ────────────────────────────────────────────────────────────

  async fn add_actor(&self, input: NewActor) -> Result<Actor> {
    let actor = Actor {
      actor_id:            Uuid::new_v4(),
      display_name:        input.display_name,
      role:                input.role,
      coordinator_id:      input.coordinator_id,
      assigned_leader_ids: Vec::new(),
      created_at:          Utc::now(),
    };

    let id_str   = encode_uuid(actor.actor_id);
    let name     = actor.display_name.clone();
    let role_str = actor.role.as_str().to_owned();
    let coord    = encode_opt_uuid(actor.coordinator_id);
    let at_str   = encode_dt(actor.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO actors (actor_id, display_name, role, coordinator_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, name, role_str, coord, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(actor)
  }

  async fn get_actor(&self, id: Uuid) -> Result<Option<Actor>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawActor> = self
      .conn
      .call(move |conn| {
        let head = conn
          .query_row(
            "SELECT actor_id, display_name, role, coordinator_id, created_at
             FROM actors WHERE actor_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
              ))
            },
          )
          .optional()?;

        let Some((actor_id, display_name, role, coordinator_id, created_at)) = head
        else {
          return Ok(None);
        };

        let mut stmt = conn
          .prepare("SELECT leader_id FROM leader_assignments WHERE actor_id = ?1")?;
        let assigned = stmt
          .query_map(rusqlite::params![actor_id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Some(RawActor {
          actor_id,
          display_name,
          role,
          coordinator_id,
          created_at,
          assigned,
        }))
      })
      .await?;

    raw.map(RawActor::into_actor).transpose()
  }

  async fn assign_leader(&self, actor_id: Uuid, leader_id: Uuid) -> Result<()> {
    let actor_str  = encode_uuid(actor_id);
    let leader_str = encode_uuid(leader_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO leader_assignments (actor_id, leader_id)
           VALUES (?1, ?2)",
          rusqlite::params![actor_str, leader_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn unassign_leader(&self, actor_id: Uuid, leader_id: Uuid) -> Result<()> {
    let actor_str  = encode_uuid(actor_id);
    let leader_str = encode_uuid(leader_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM leader_assignments WHERE actor_id = ?1 AND leader_id = ?2",
          rusqlite::params![actor_str, leader_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn leaders_for_coordinator(&self, coordinator_id: Uuid) -> Result<Vec<Uuid>> {
    let coord_str = encode_uuid(coordinator_id);

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT actor_id FROM actors
           WHERE coordinator_id = ?1 AND role = 'leader'",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![coord_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    ids
      .iter()
      .map(|s| crate::encode::decode_uuid(s))
      .collect()
  }

  // ── Persons ───────────────────────────────────────────────────────────

  async fn add_person(&self, input: NewPerson) -> Result<Person> {
    let person = Person {
      person_id:       Uuid::new_v4(),
      full_name:       input.full_name,
      document:        input.document,
      state:           PersonState::PendingData,
      prior_state:     None,
      registered_by:   input.registered_by,
      location_id:     input.location_id,
      station_id:      input.station_id,
      table_number:    input.table_number,
      imported:        input.imported,
      import_batch_id: input.import_batch_id,
      verified_by:     None,
      verified_at:     None,
      confirmed_by:    None,
      confirmed_at:    None,
      created_at:      Utc::now(),
    };

    let row = PersonRow::encode(&person);
    let res = self
      .conn
      .call(move |conn| {
        row.insert(conn)?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => Ok(person),
      Err(e) if unique_violation(&e, "persons.document_number") => {
        Err(Error::DuplicateDocument(person.document.number))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn get_person(&self, id: Uuid) -> Result<Option<Person>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE person_id = ?1"),
              rusqlite::params![id_str],
              RawPerson::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn find_by_document(&self, number: &str) -> Result<Option<Person>> {
    let number = number.to_owned();

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PERSON_COLUMNS} FROM persons WHERE document_number = ?1"
              ),
              rusqlite::params![number],
              RawPerson::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn list_persons(&self, leaders: Option<&[Uuid]>) -> Result<Vec<Person>> {
    let leader_strs: Option<Vec<String>> =
      leaders.map(|ids| ids.iter().copied().map(encode_uuid).collect());

    if let Some(ids) = &leader_strs
      && ids.is_empty()
    {
      return Ok(Vec::new());
    }

    let raws: Vec<RawPerson> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(ids) = leader_strs {
          let placeholders =
            (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
          let sql = format!(
            "SELECT {PERSON_COLUMNS} FROM persons
             WHERE registered_by IN ({placeholders})
             ORDER BY created_at"
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params_from_iter(ids), RawPerson::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn
            .prepare(&format!("SELECT {PERSON_COLUMNS} FROM persons ORDER BY created_at"))?;
          stmt
            .query_map([], RawPerson::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPerson::into_person).collect()
  }

  async fn save_person(&self, person: &Person) -> Result<()> {
    let row = PersonRow::encode(person);
    self
      .conn
      .call(move |conn| {
        row.update(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Incidents ─────────────────────────────────────────────────────────

  async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawIncident> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE incident_id = ?1"),
              rusqlite::params![id_str],
              RawIncident::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIncident::into_incident).transpose()
  }

  async fn unresolved_incident(&self, person_id: Uuid) -> Result<Option<Incident>> {
    let id_str = encode_uuid(person_id);

    let raw: Option<RawIncident> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents
                 WHERE person_id = ?1 AND resolved = 0"
              ),
              rusqlite::params![id_str],
              RawIncident::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIncident::into_incident).transpose()
  }

  async fn incidents_for(&self, person_id: Uuid) -> Result<Vec<Incident>> {
    let id_str = encode_uuid(person_id);

    let raws: Vec<RawIncident> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INCIDENT_COLUMNS} FROM incidents
           WHERE person_id = ?1 ORDER BY raised_at DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawIncident::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIncident::into_incident).collect()
  }

  async fn open_incident(&self, incident: &Incident, person: &Person) -> Result<()> {
    let person_id    = person.person_id;
    let inc_id_str   = encode_uuid(incident.incident_id);
    let pers_id_str  = encode_uuid(incident.person_id);
    let observation  = incident.observation.clone();
    let raised_by    = encode_uuid(incident.raised_by);
    let raised_at    = encode_dt(incident.raised_at);
    let person_row   = PersonRow::encode(person);

    let res = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO incidents (incident_id, person_id, observation, resolved,
                                  raised_by, raised_at)
           VALUES (?1, ?2, ?3, 0, ?4, ?5)",
          rusqlite::params![inc_id_str, pers_id_str, observation, raised_by, raised_at],
        )?;
        person_row.update(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => Ok(()),
      Err(e) if unique_violation(&e, "incidents.person_id") => {
        Err(Error::DuplicateOpenIncident(person_id))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn close_incident(&self, incident: &Incident, person: &Person) -> Result<()> {
    let inc_id_str  = encode_uuid(incident.incident_id);
    let resolved_by = encode_opt_uuid(incident.resolved_by);
    let resolved_at = incident.resolved_at.map(encode_dt);
    let person_row  = PersonRow::encode(person);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE incidents SET resolved = 1, resolved_by = ?2, resolved_at = ?3
           WHERE incident_id = ?1",
          rusqlite::params![inc_id_str, resolved_by, resolved_at],
        )?;
        person_row.update(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Confirmations ─────────────────────────────────────────────────────

  async fn confirmations_for(&self, person_id: Uuid) -> Result<Vec<Confirmation>> {
    let id_str = encode_uuid(person_id);

    let raws: Vec<RawConfirmation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONFIRMATION_COLUMNS} FROM confirmations
           WHERE person_id = ?1 ORDER BY confirmed_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawConfirmation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawConfirmation::into_confirmation)
      .collect()
  }

  async fn add_confirmation(
    &self,
    confirmation: &Confirmation,
    person: &Person,
  ) -> Result<()> {
    let person_id    = person.person_id;
    let conf_id_str  = encode_uuid(confirmation.confirmation_id);
    let pers_id_str  = encode_uuid(confirmation.person_id);
    let url          = confirmation.evidence.url.clone();
    let path         = confirmation.evidence.path.clone();
    let hash         = confirmation.evidence.content_hash.clone();
    let confirmed_by = encode_uuid(confirmation.confirmed_by);
    let confirmed_at = encode_dt(confirmation.confirmed_at);
    let person_row   = PersonRow::encode(person);

    let res = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO confirmations (confirmation_id, person_id, evidence_url,
                                      evidence_path, evidence_hash,
                                      confirmed_by, confirmed_at, reversed)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
          rusqlite::params![
            conf_id_str,
            pers_id_str,
            url,
            path,
            hash,
            confirmed_by,
            confirmed_at,
          ],
        )?;
        person_row.update(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await;

    match res {
      Ok(()) => Ok(()),
      Err(e) if unique_violation(&e, "confirmations.person_id") => {
        Err(Error::DuplicateActiveConfirmation(person_id))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn reverse_confirmation(
    &self,
    confirmation: &Confirmation,
    person: &Person,
  ) -> Result<()> {
    let conf_id_str = encode_uuid(confirmation.confirmation_id);
    let reversed_by = encode_opt_uuid(confirmation.reversed_by);
    let reversed_at = confirmation.reversed_at.map(encode_dt);
    let person_row  = PersonRow::encode(person);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE confirmations SET reversed = 1, reversed_by = ?2, reversed_at = ?3
           WHERE confirmation_id = ?1",
          rusqlite::params![conf_id_str, reversed_by, reversed_at],
        )?;
        person_row.update(&tx)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Import batches ────────────────────────────────────────────────────

  async fn add_batch(&self, batch: &ImportBatch) -> Result<()> {
    let id_str     = encode_uuid(batch.batch_id);
    let file_name  = batch.file_name.clone();
    let created_by = encode_uuid(batch.created_by);
    let created_at = encode_dt(batch.created_at);
    let total      = batch.total as i64;
    let inserted   = batch.inserted as i64;
    let updated    = batch.updated as i64;
    let failed     = batch.failed as i64;
    let omitted    = serde_json::to_string(&batch.omitted)?;
    let errors     = serde_json::to_string(&batch.errors)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO import_batches (batch_id, file_name, created_by, created_at,
                                       total, inserted, updated, failed, omitted, errors)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str, file_name, created_by, created_at, total, inserted, updated,
            failed, omitted, errors,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_batch(&self, batch: &ImportBatch) -> Result<()> {
    let id_str   = encode_uuid(batch.batch_id);
    let total    = batch.total as i64;
    let inserted = batch.inserted as i64;
    let updated  = batch.updated as i64;
    let failed   = batch.failed as i64;
    let omitted  = serde_json::to_string(&batch.omitted)?;
    let errors   = serde_json::to_string(&batch.errors)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE import_batches SET total = ?2, inserted = ?3, updated = ?4,
                                     failed = ?5, omitted = ?6, errors = ?7
           WHERE batch_id = ?1",
          rusqlite::params![id_str, total, inserted, updated, failed, omitted, errors],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_batch(&self, id: Uuid) -> Result<Option<ImportBatch>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBatch> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT batch_id, file_name, created_by, created_at, total,
                      inserted, updated, failed, omitted, errors
               FROM import_batches WHERE batch_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawBatch {
                  batch_id:   row.get(0)?,
                  file_name:  row.get(1)?,
                  created_by: row.get(2)?,
                  created_at: row.get(3)?,
                  total:      row.get(4)?,
                  inserted:   row.get(5)?,
                  updated:    row.get(6)?,
                  failed:     row.get(7)?,
                  omitted:    row.get(8)?,
                  errors:     row.get(9)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawBatch::into_batch).transpose()
  }
}

// ─── CodeTables impl ─────────────────────────────────────────────────────────

impl CodeTables for SqliteStore {
  type Error = Error;

  async fn resolve_location(&self, code: &str) -> Result<Option<Uuid>> {
    let code = code.to_owned();
    let id: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT location_id FROM locations WHERE code = ?1",
              rusqlite::params![code],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    id.as_deref().map(crate::encode::decode_uuid).transpose()
  }

  async fn resolve_station(&self, code: &str) -> Result<Option<Uuid>> {
    let code = code.to_owned();
    let id: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT station_id FROM stations WHERE code = ?1",
              rusqlite::params![code],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    id.as_deref().map(crate::encode::decode_uuid).transpose()
  }
}
