//! StateStore — redb-backed persistence for cluster state.
//!
//! Provides typed CRUD operations over capacity units, workload units and
//! placement-failure events. All values are JSON-serialized into redb's
//! `&[u8]` value columns, keyed by name. An in-memory backend serves tests
//! and daemons started without a data directory.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// `map_err` closure wrapping a redb/serde error into the named variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Cluster state over redb. Cheap to clone.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open the database file at `path`, creating it when absent.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "cluster database opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory cluster database opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(UNITS).map_err(map_err!(Storage))?;
        txn.open_table(WORKLOAD).map_err(map_err!(Storage))?;
        txn.open_table(EVENTS).map_err(map_err!(Storage))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON table access ──────────────────────────────────

    /// Insert or replace a batch of records in a single transaction.
    fn put_all<'a, T, I>(&self, table: JsonTable, records: I) -> StateResult<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a str, &'a T)>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut written = 0;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Storage))?;
            for (key, record) in records {
                let value = serde_json::to_vec(record).map_err(map_err!(Codec))?;
                t.insert(key, value.as_slice()).map_err(map_err!(Storage))?;
                written += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(written)
    }

    fn get<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Storage))?;
        match t.get(key).map_err(map_err!(Storage))? {
            Some(guard) => {
                let record = serde_json::from_slice(guard.value()).map_err(map_err!(Codec))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Codec))?);
        }
        Ok(results)
    }

    /// Delete a record by key. Returns true if it existed.
    fn remove(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Storage))?;
            existed = t.remove(key).map_err(map_err!(Storage))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Capacity units ─────────────────────────────────────────────

    /// Insert or update a capacity unit.
    pub fn put_unit(&self, unit: &CapacityUnit) -> StateResult<()> {
        self.put_all(UNITS, [(unit.name.as_str(), unit)])?;
        debug!(unit = %unit.name, "unit stored");
        Ok(())
    }

    /// Insert or update several capacity units atomically.
    pub fn put_units(&self, units: &[CapacityUnit]) -> StateResult<usize> {
        self.put_all(UNITS, units.iter().map(|u| (u.name.as_str(), u)))
    }

    pub fn get_unit(&self, name: &str) -> StateResult<Option<CapacityUnit>> {
        self.get(UNITS, name)
    }

    /// List all capacity units, ordered by name.
    pub fn list_units(&self) -> StateResult<Vec<CapacityUnit>> {
        self.list(UNITS)
    }

    /// Delete a capacity unit. Returns true if it existed.
    pub fn delete_unit(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove(UNITS, name)?;
        debug!(unit = %name, existed, "unit deleted");
        Ok(existed)
    }

    // ── Workload ───────────────────────────────────────────────────

    /// Insert or update a workload unit.
    pub fn put_workload(&self, workload: &WorkloadUnit) -> StateResult<()> {
        self.put_all(WORKLOAD, [(workload.name.as_str(), workload)])?;
        Ok(())
    }

    /// Insert or update several workload units atomically.
    pub fn put_workloads(&self, workload: &[WorkloadUnit]) -> StateResult<usize> {
        self.put_all(WORKLOAD, workload.iter().map(|w| (w.name.as_str(), w)))
    }

    pub fn get_workload(&self, name: &str) -> StateResult<Option<WorkloadUnit>> {
        self.get(WORKLOAD, name)
    }

    /// List all workload units, ordered by name.
    pub fn list_workload(&self) -> StateResult<Vec<WorkloadUnit>> {
        self.list(WORKLOAD)
    }

    /// List workload units assigned to the given capacity unit.
    pub fn list_workload_on(&self, unit: &str) -> StateResult<Vec<WorkloadUnit>> {
        Ok(self
            .list_workload()?
            .into_iter()
            .filter(|w| w.node_name.as_deref() == Some(unit))
            .collect())
    }

    /// Delete a workload unit. Returns true if it existed.
    pub fn delete_workload(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove(WORKLOAD, name)?;
        debug!(workload = %name, existed, "workload deleted");
        Ok(existed)
    }

    // ── Placement-failure events ───────────────────────────────────

    /// Record (or overwrite) the latest placement-failure events.
    pub fn put_events(&self, events: &[PlacementFailureEvent]) -> StateResult<usize> {
        self.put_all(EVENTS, events.iter().map(|e| (e.workload.as_str(), e)))
    }

    /// List the latest placement-failure event per workload.
    pub fn list_events(&self) -> StateResult<Vec<PlacementFailureEvent>> {
        self.list(EVENTS)
    }
}
