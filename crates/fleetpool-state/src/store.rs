//! StateStore — redb-backed desired-size persistence.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// pool_name → JSON-serialized `DesiredSizeRecord`.
const DESIRED_SIZES: TableDefinition<&str, &[u8]> = TableDefinition::new("desired_sizes");

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Persisted desired size for one pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesiredSizeRecord {
    pub pool_name: String,
    pub desired_size: u64,
    /// Unix timestamp (seconds) of the last change.
    pub updated_at: u64,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create the table if it doesn't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DESIRED_SIZES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Record a pool's desired size.
    pub fn save_desired_size(&self, pool_name: &str, desired_size: u64) -> StateResult<()> {
        let record = DesiredSizeRecord {
            pool_name: pool_name.to_string(),
            desired_size,
            updated_at: epoch_secs(),
        };
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DESIRED_SIZES).map_err(map_err!(Table))?;
            table
                .insert(pool_name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool_name, desired_size, "desired size saved");
        Ok(())
    }

    /// Load a pool's desired size, if one was ever recorded.
    pub fn load_desired_size(&self, pool_name: &str) -> StateResult<Option<u64>> {
        Ok(self.load_record(pool_name)?.map(|r| r.desired_size))
    }

    /// Load the full record for a pool.
    pub fn load_record(&self, pool_name: &str) -> StateResult<Option<DesiredSizeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DESIRED_SIZES).map_err(map_err!(Table))?;
        match table.get(pool_name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DesiredSizeRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pool_loads_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.load_desired_size("webservers").unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = StateStore::open_in_memory().unwrap();
        store.save_desired_size("webservers", 5).unwrap();
        assert_eq!(store.load_desired_size("webservers").unwrap(), Some(5));

        let record = store.load_record("webservers").unwrap().unwrap();
        assert_eq!(record.pool_name, "webservers");
        assert_eq!(record.desired_size, 5);
        assert!(record.updated_at > 0);
    }

    #[test]
    fn save_overwrites_previous_value() {
        let store = StateStore::open_in_memory().unwrap();
        store.save_desired_size("webservers", 5).unwrap();
        store.save_desired_size("webservers", 2).unwrap();
        assert_eq!(store.load_desired_size("webservers").unwrap(), Some(2));
    }

    #[test]
    fn pools_are_independent() {
        let store = StateStore::open_in_memory().unwrap();
        store.save_desired_size("webservers", 5).unwrap();
        store.save_desired_size("workers", 9).unwrap();
        assert_eq!(store.load_desired_size("webservers").unwrap(), Some(5));
        assert_eq!(store.load_desired_size("workers").unwrap(), Some(9));
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.redb");

        {
            let store = StateStore::open(&path).unwrap();
            store.save_desired_size("webservers", 7).unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.load_desired_size("webservers").unwrap(), Some(7));
    }
}
