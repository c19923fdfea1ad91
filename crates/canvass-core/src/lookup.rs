//! Code lookup tables — locations and voting stations.
//!
//! Externally sourced rows carry human-entered codes; the reconciliation
//! engine resolves them to internal identifiers through this read-only
//! collaborator. An unresolvable code drops the row.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;

use uuid::Uuid;

/// Abstraction over the location/station code tables.
pub trait CodeTables: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn resolve_location<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + 'a;

  fn resolve_station<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + 'a;
}

/// In-memory code tables backed by two hash maps. Useful for tests and
/// for deployments that ship their tables as flat files.
#[derive(Debug, Clone, Default)]
pub struct StaticTables {
  locations: HashMap<String, Uuid>,
  stations:  HashMap<String, Uuid>,
}

impl StaticTables {
  pub fn new(
    locations: HashMap<String, Uuid>,
    stations: HashMap<String, Uuid>,
  ) -> Self {
    Self { locations, stations }
  }

  pub fn with_location(mut self, code: impl Into<String>, id: Uuid) -> Self {
    self.locations.insert(code.into(), id);
    self
  }

  pub fn with_station(mut self, code: impl Into<String>, id: Uuid) -> Self {
    self.stations.insert(code.into(), id);
    self
  }
}

impl CodeTables for StaticTables {
  type Error = Infallible;

  async fn resolve_location(&self, code: &str) -> Result<Option<Uuid>, Infallible> {
    Ok(self.locations.get(code).copied())
  }

  async fn resolve_station(&self, code: &str) -> Result<Option<Uuid>, Infallible> {
    Ok(self.stations.get(code).copied())
  }
}
