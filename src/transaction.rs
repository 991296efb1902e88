//! All-or-nothing scopes that managed commands run inside.
//!
//! Lifecycle of a scope:
//! ```text
//! begin ──commit──> changes visible
//!   │
//!   └──rollback──> changes discarded
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("write conflict: store changed from version {expected} to {found} during the transaction")]
    Conflict { expected: u64, found: u64 },

    #[error("transaction backend error: {0}")]
    Backend(String),
}

/// A storage layer able to open, commit and discard transactions.
pub trait TransactionManager {
    /// Handle passed to the user logic while the scope is open.
    type Tx;

    fn begin(&mut self) -> Result<Self::Tx, TransactionError>;

    fn commit(&mut self, tx: Self::Tx) -> Result<(), TransactionError>;

    fn rollback(&mut self, tx: Self::Tx) -> Result<(), TransactionError>;
}

/// Scope for logic that has no transactional state of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransaction;

impl TransactionManager for NoTransaction {
    type Tx = ();

    fn begin(&mut self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&mut self, _tx: ()) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(&mut self, _tx: ()) -> Result<(), TransactionError> {
        Ok(())
    }
}

/// In-memory JSON document store with snapshot transactions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: BTreeMap<String, Value>,
    version: u64,
}

/// Private working copy of a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoreTransaction {
    data: BTreeMap<String, Value>,
    base_version: u64,
}

impl StoreTransaction {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of committed transactions.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl TransactionManager for MemoryStore {
    type Tx = StoreTransaction;

    fn begin(&mut self) -> Result<StoreTransaction, TransactionError> {
        Ok(StoreTransaction {
            data: self.data.clone(),
            base_version: self.version,
        })
    }

    fn commit(&mut self, tx: StoreTransaction) -> Result<(), TransactionError> {
        if tx.base_version != self.version {
            return Err(TransactionError::Conflict {
                expected: tx.base_version,
                found: self.version,
            });
        }
        self.data = tx.data;
        self.version += 1;
        Ok(())
    }

    fn rollback(&mut self, _tx: StoreTransaction) -> Result<(), TransactionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_commit_makes_changes_visible() {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.set("users", json!(3));
        assert!(store.get("users").is_none());

        store.commit(tx).unwrap();
        assert_eq!(store.get("users"), Some(&json!(3)));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_rollback_discards_changes() {
        let mut store = MemoryStore::new();
        let mut seed = store.begin().unwrap();
        seed.set("a", 1);
        store.commit(seed).unwrap();

        let mut tx = store.begin().unwrap();
        tx.set("b", 2);
        tx.remove("a");
        store.rollback(tx).unwrap();

        assert_eq!(store.get("a"), Some(&json!(1)));
        assert!(store.get("b").is_none());
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_concurrent_commit_conflicts() {
        let mut store = MemoryStore::new();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.set("k", "first");
        second.set("k", "second");

        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert_eq!(
            err,
            TransactionError::Conflict {
                expected: 0,
                found: 1
            }
        );
        assert_eq!(store.get("k"), Some(&json!("first")));
    }

    #[test]
    fn test_transaction_reads_snapshot() {
        let mut store = MemoryStore::new();
        let mut seed = store.begin().unwrap();
        seed.set("count", 10);
        store.commit(seed).unwrap();

        let tx = store.begin().unwrap();
        assert_eq!(tx.get("count"), Some(&json!(10)));
        assert_eq!(tx.len(), 1);
    }

    #[test]
    fn test_no_transaction_is_noop() {
        let mut scope = NoTransaction;
        let tx = scope.begin().unwrap();
        scope.commit(tx).unwrap();
        let tx = scope.begin().unwrap();
        scope.rollback(tx).unwrap();
    }
}
