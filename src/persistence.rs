//! Database persistence layer for TraceChain
//!
//! The ledger sees storage as named buckets of key/value pairs accessed through
//! transactions: `view` runs a read-only transaction, `update` a read-write one
//! that commits atomically or not at all.

use crate::error::{ChainError, Result};
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// Transaction chain blocks.
    Transactions,
    Products,
    Organisations,
    /// UTXO index.
    ChainState,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Transactions,
        Bucket::Products,
        Bucket::Organisations,
        Bucket::ChainState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Bucket::Transactions => "blocks",
            Bucket::Products => "products",
            Bucket::Organisations => "organisations",
            Bucket::ChainState => "chainstate",
        }
    }
}

pub trait ReadTx {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All pairs of `bucket`, ordered by key.
    fn entries(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

pub trait WriteTx: ReadTx {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<()>;
    fn clear(&mut self, bucket: Bucket) -> Result<()>;
}

/// Abstraction for persistence backends. `update_tx` must apply every write made
/// by the closure atomically, and none of them if the closure fails.
pub trait Persistence: Send + Sync {
    fn view_tx(&self, f: &mut dyn FnMut(&dyn ReadTx) -> Result<()>) -> Result<()>;
    fn update_tx(&self, f: &mut dyn FnMut(&mut dyn WriteTx) -> Result<()>) -> Result<()>;
}

/// Runs `f` in a read-only transaction and returns its value.
pub fn view<T>(store: &dyn Persistence, f: impl FnOnce(&dyn ReadTx) -> Result<T>) -> Result<T> {
    let mut f = Some(f);
    let mut out = None;
    store.view_tx(&mut |tx| {
        if let Some(f) = f.take() {
            out = Some(f(tx)?);
        }
        Ok(())
    })?;
    out.ok_or_else(|| ChainError::DatabaseError("Read transaction did not run".to_string()))
}

/// Runs `f` in a read-write transaction and returns its value.
pub fn update<T>(
    store: &dyn Persistence,
    f: impl FnOnce(&mut dyn WriteTx) -> Result<T>,
) -> Result<T> {
    let mut f = Some(f);
    let mut out = None;
    store.update_tx(&mut |tx| {
        if let Some(f) = f.take() {
            out = Some(f(tx)?);
        }
        Ok(())
    })?;
    out.ok_or_else(|| ChainError::DatabaseError("Write transaction did not run".to_string()))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                bucket TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (bucket, key)
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create kv table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl ReadTx for SqliteTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT value FROM kv WHERE bucket = ?1 AND key = ?2",
                params![bucket.name(), key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to read {}: {}", bucket.name(), e)))
    }

    fn entries(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv WHERE bucket = ?1 ORDER BY key")
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![bucket.name()], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to scan {}: {}", bucket.name(), e)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to read row: {}", e)))?,
            );
        }
        Ok(entries)
    }
}

impl WriteTx for SqliteTx<'_> {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (bucket, key, value) VALUES (?1, ?2, ?3)",
                params![bucket.name(), key, value],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to write {}: {}", bucket.name(), e)))?;
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM kv WHERE bucket = ?1 AND key = ?2",
                params![bucket.name(), key],
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to delete from {}: {}", bucket.name(), e)))?;
        Ok(())
    }

    fn clear(&mut self, bucket: Bucket) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE bucket = ?1", params![bucket.name()])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to clear {}: {}", bucket.name(), e)))?;
        Ok(())
    }
}

impl Persistence for Database {
    fn view_tx(&self, f: &mut dyn FnMut(&dyn ReadTx) -> Result<()>) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to start transaction: {}", e)))?;

        f(&SqliteTx { conn: &tx })?;

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to close read transaction: {}", e)))
    }

    fn update_tx(&self, f: &mut dyn FnMut(&mut dyn WriteTx) -> Result<()>) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to start transaction: {}", e)))?;

        // Dropping `tx` on error rolls everything back.
        f(&mut SqliteTx { conn: &tx })?;

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }
}

type Buckets = HashMap<Bucket, BTreeMap<Vec<u8>, Vec<u8>>>;

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
/// Writes go to a copy of the buckets that replaces the live state on success.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    buckets: Arc<RwLock<Buckets>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemReadTx<'a>(&'a Buckets);

struct MemWriteTx<'a>(&'a mut Buckets);

fn mem_get(buckets: &Buckets, bucket: Bucket, key: &[u8]) -> Option<Vec<u8>> {
    buckets.get(&bucket).and_then(|b| b.get(key)).cloned()
}

fn mem_entries(buckets: &Buckets, bucket: Bucket) -> Vec<(Vec<u8>, Vec<u8>)> {
    buckets
        .get(&bucket)
        .map(|b| b.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

impl ReadTx for MemReadTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(mem_get(self.0, bucket, key))
    }

    fn entries(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(mem_entries(self.0, bucket))
    }
}

impl ReadTx for MemWriteTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(mem_get(self.0, bucket, key))
    }

    fn entries(&self, bucket: Bucket) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(mem_entries(self.0, bucket))
    }
}

impl WriteTx for MemWriteTx<'_> {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()> {
        self.0
            .entry(bucket)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<()> {
        if let Some(b) = self.0.get_mut(&bucket) {
            b.remove(key);
        }
        Ok(())
    }

    fn clear(&mut self, bucket: Bucket) -> Result<()> {
        self.0.remove(&bucket);
        Ok(())
    }
}

impl Persistence for InMemoryPersistence {
    fn view_tx(&self, f: &mut dyn FnMut(&dyn ReadTx) -> Result<()>) -> Result<()> {
        let buckets = self.buckets.read();
        f(&MemReadTx(&buckets))
    }

    fn update_tx(&self, f: &mut dyn FnMut(&mut dyn WriteTx) -> Result<()>) -> Result<()> {
        let mut live = self.buckets.write();
        let mut staged = live.clone();
        f(&mut MemWriteTx(&mut staged))?;
        *live = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<Box<dyn Persistence>> {
        vec![
            Box::new(InMemoryPersistence::new()),
            Box::new(Database::open_in_memory().unwrap()),
        ]
    }

    #[test]
    fn test_put_get_delete() {
        for store in backends() {
            update(store.as_ref(), |tx| tx.put(Bucket::Products, b"k", b"v")).unwrap();
            let got = view(store.as_ref(), |tx| tx.get(Bucket::Products, b"k")).unwrap();
            assert_eq!(got, Some(b"v".to_vec()));

            // Buckets are independent namespaces.
            let other = view(store.as_ref(), |tx| tx.get(Bucket::Transactions, b"k")).unwrap();
            assert_eq!(other, None);

            update(store.as_ref(), |tx| tx.delete(Bucket::Products, b"k")).unwrap();
            let gone = view(store.as_ref(), |tx| tx.get(Bucket::Products, b"k")).unwrap();
            assert_eq!(gone, None);
        }
    }

    #[test]
    fn test_failed_update_rolls_back() {
        for store in backends() {
            update(store.as_ref(), |tx| tx.put(Bucket::ChainState, b"a", b"1")).unwrap();

            let result: Result<()> = update(store.as_ref(), |tx| {
                tx.put(Bucket::ChainState, b"b", b"2")?;
                tx.delete(Bucket::ChainState, b"a")?;
                Err(ChainError::DatabaseError("boom".to_string()))
            });
            assert!(result.is_err());

            let entries = view(store.as_ref(), |tx| tx.entries(Bucket::ChainState)).unwrap();
            assert_eq!(entries, vec![(b"a".to_vec(), b"1".to_vec())]);
        }
    }

    #[test]
    fn test_clear_and_ordered_entries() {
        for store in backends() {
            update(store.as_ref(), |tx| {
                tx.put(Bucket::ChainState, b"b", b"2")?;
                tx.put(Bucket::ChainState, b"a", b"1")?;
                tx.put(Bucket::Products, b"p", b"x")
            })
            .unwrap();

            let keys: Vec<Vec<u8>> = view(store.as_ref(), |tx| tx.entries(Bucket::ChainState))
                .unwrap()
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

            update(store.as_ref(), |tx| tx.clear(Bucket::ChainState)).unwrap();
            assert!(view(store.as_ref(), |tx| tx.entries(Bucket::ChainState))
                .unwrap()
                .is_empty());
            assert_eq!(
                view(store.as_ref(), |tx| tx.get(Bucket::Products, b"p")).unwrap(),
                Some(b"x".to_vec())
            );
        }
    }

    #[test]
    fn test_database_file_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let db = Database::open(&path).unwrap();
            update(&db, |tx| tx.put(Bucket::Organisations, b"l", b"tip")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(
            view(&db, |tx| tx.get(Bucket::Organisations, b"l")).unwrap(),
            Some(b"tip".to_vec())
        );
    }
}
