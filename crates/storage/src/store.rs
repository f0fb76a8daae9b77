//! Local store: a thin façade over the embedded redb engine.
//!
//! All coordinated traffic goes through the versioned path (`get`,
//! `put`, `delete`), which wraps every value in the codec header from
//! [`crate::record`]. Deletes overwrite the value with a tombstone so
//! that replicas which missed the delete can still lose the
//! timestamp comparison later; nothing is physically erased.
//!
//! The raw path (`raw_get`, `raw_upsert`, `raw_remove`) talks to the
//! engine directly, without the header. It exists for administrative
//! access only and must not share a keyspace region with codec-managed
//! keys: a raw value has no header and would decode as corrupt.

use crate::record::{encode_value, now_ms, TruncatedRecord, VersionedRecord};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open database: {0}")]
    Open(#[from] redb::DatabaseError),
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("engine error: {0}")]
    Engine(#[from] redb::StorageError),
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("corrupt stored record: {0}")]
    Corrupt(#[from] TruncatedRecord),
}

/// Handle to this node's persistent key-value state.
///
/// redb provides per-key atomicity for a single put/delete via its
/// transaction commit; concurrent readers never observe a partial
/// header write. The handle is shared read/write across all in-flight
/// requests.
pub struct LocalStore {
    db: Database,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open or create the store under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::create(data_dir.join("replikv.redb"))?;

        // Make sure the table exists so later read transactions
        // cannot fail on a fresh database.
        let tx = db.begin_write()?;
        tx.open_table(ENTRIES)?;
        tx.commit()?;

        tracing::info!(path = %data_dir.display(), "local store opened");
        Ok(Self { db })
    }

    /// Decode the stored record for a key. Missing keys are `Absent`,
    /// never an error; truncated stored bytes are corruption.
    pub fn get(&self, key: &[u8]) -> Result<VersionedRecord, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(ENTRIES)?;
        match table.get(key)? {
            Some(value) => Ok(VersionedRecord::from_wire_bytes(value.value())?),
            None => Ok(VersionedRecord::Absent),
        }
    }

    /// Write a live record with a fresh local timestamp.
    pub fn put(&self, key: &[u8], payload: &[u8]) -> Result<(), StoreError> {
        self.write_encoded(key, encode_value(payload, true, now_ms()))
    }

    /// Write a tombstone with a fresh local timestamp.
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.write_encoded(key, encode_value(&[], false, now_ms()))
    }

    fn write_encoded(&self, key: &[u8], encoded: Vec<u8>) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(ENTRIES)?;
            table.insert(key, encoded.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw path: direct engine access, no codec header
    // -----------------------------------------------------------------------

    pub fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(ENTRIES)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    pub fn raw_upsert(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(ENTRIES)?;
            table.insert(key, value)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn raw_remove(&self, key: &[u8]) -> Result<(), StoreError> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(ENTRIES)?;
            table.remove(key)?;
        }
        tx.commit()?;
        Ok(())
    }
}
