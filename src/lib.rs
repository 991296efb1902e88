//! Execution tracking for administrative commands.
//!
//! Every invocation of a [`ManagedCommand`] runs inside a transaction and is
//! recorded in a [`Ledger`]. Commands flagged as run-once are skipped after
//! their first recorded success. [`Scaffolder`] generates new command and
//! test files, and [`admin`] renders the ledger for inspection.

pub mod admin;
pub mod config;
pub mod executor;
pub mod fuzzy_matcher;
pub mod i18n;
pub mod ledger;
pub mod managed;
pub mod scaffold;
pub mod storage;
pub mod store_manager;
pub mod transaction;

pub use admin::ExecutionFilter;
pub use config::Config;
pub use executor::CommandExecutor;
pub use i18n::I18n;
pub use ledger::{should_run, Ledger, LedgerError, MemoryLedger, DEFAULT_HISTORY_LIMIT};
pub use managed::{
    derive_command_name, CommandFailure, Failure, IntoOutput, Invocation, ManagedCommand, Outcome,
    RunError,
};
pub use scaffold::{GeneratedFiles, ScaffoldError, ScaffoldRequest, Scaffolder};
pub use storage::{CommandExecution, NewExecution};
pub use store_manager::StoreManager;
pub use transaction::{MemoryStore, NoTransaction, StoreTransaction, TransactionError, TransactionManager};
