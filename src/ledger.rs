//! Execution ledger: an append-only store of [`CommandExecution`] records.
//!
//! Records are never updated or deleted. Retrieval is newest first.

use crate::storage::{CommandExecution, NewExecution};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Default number of records returned by [`Ledger::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("ledger lock poisoned: {0}")]
    Lock(String),
}

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Storage interface for execution records.
pub trait Ledger: Send + Sync {
    /// Insert a new record and return it as stored.
    fn append(&self, entry: NewExecution) -> Result<CommandExecution>;

    /// Most recently inserted record for `command_name`.
    fn latest(&self, command_name: &str) -> Result<Option<CommandExecution>>;

    /// Up to `limit` records for `command_name`, newest first.
    fn history(&self, command_name: &str, limit: usize) -> Result<Vec<CommandExecution>>;

    /// Every record, newest first.
    fn all(&self) -> Result<Vec<CommandExecution>>;
}

/// Whether a command may run given its ledger history.
///
/// Only a most recent record that is both `run_once` and successful blocks
/// the next run. A failed one-shot command may retry.
pub fn should_run<L: Ledger + ?Sized>(ledger: &L, command_name: &str) -> Result<bool> {
    let blocked = ledger
        .latest(command_name)?
        .map(|last| last.run_once && last.success)
        .unwrap_or(false);
    Ok(!blocked)
}

/// In-memory table shared by the ledger implementations.
///
/// Rows are kept in insertion order with a per-name index. `executed_at` is
/// clamped so it never goes backwards, which keeps insertion order and
/// timestamp order the same.
#[derive(Debug, Default)]
pub(crate) struct Table {
    rows: Vec<CommandExecution>,
    by_name: HashMap<String, Vec<usize>>,
}

impl Table {
    pub(crate) fn from_rows(rows: Vec<CommandExecution>) -> Self {
        let mut table = Table::default();
        for row in rows {
            table.push(row);
        }
        table
    }

    fn push(&mut self, row: CommandExecution) {
        self.by_name
            .entry(row.command_name.clone())
            .or_default()
            .push(self.rows.len());
        self.rows.push(row);
    }

    /// Build the record that the next insert would store.
    pub(crate) fn next_record(&self, entry: NewExecution, now: DateTime<Utc>) -> CommandExecution {
        let (id, executed_at) = match self.rows.last() {
            Some(last) => (last.id + 1, now.max(last.executed_at)),
            None => (1, now),
        };
        entry.into_record(id, executed_at)
    }

    pub(crate) fn insert(&mut self, entry: NewExecution, now: DateTime<Utc>) -> CommandExecution {
        let record = self.next_record(entry, now);
        self.push(record.clone());
        record
    }

    pub(crate) fn latest(&self, command_name: &str) -> Option<&CommandExecution> {
        self.by_name
            .get(command_name)
            .and_then(|idx| idx.last())
            .map(|&i| &self.rows[i])
    }

    pub(crate) fn history(&self, command_name: &str, limit: usize) -> Vec<CommandExecution> {
        self.by_name
            .get(command_name)
            .map(|idx| {
                idx.iter()
                    .rev()
                    .take(limit)
                    .map(|&i| self.rows[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn newest_first(&self) -> Vec<CommandExecution> {
        self.rows.iter().rev().cloned().collect()
    }
}

/// Ledger kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    table: Mutex<Table>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().rows.len(), |t| t.rows.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn append(&self, entry: NewExecution) -> Result<CommandExecution> {
        let mut table = self.table.lock()?;
        Ok(table.insert(entry, Utc::now()))
    }

    fn latest(&self, command_name: &str) -> Result<Option<CommandExecution>> {
        let table = self.table.lock()?;
        Ok(table.latest(command_name).cloned())
    }

    fn history(&self, command_name: &str, limit: usize) -> Result<Vec<CommandExecution>> {
        let table = self.table.lock()?;
        Ok(table.history(command_name, limit))
    }

    fn all(&self) -> Result<Vec<CommandExecution>> {
        let table = self.table.lock()?;
        Ok(table.newest_first())
    }
}
