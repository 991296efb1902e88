//! Guarded invocation of command logic.
//!
//! [`ManagedCommand`] wraps user logic with run-once gating, timing, a
//! transaction scope, dry-run rollback and ledger recording:
//!
//! ```text
//! gate ──skip──> Outcome::Skipped            (no record)
//!   │
//!   └─> begin ─> logic ──Ok──> commit | rollback (dry run) ─> record success
//!                  │
//!                  └──Err──> rollback ─> record failure ─> Err(original)
//! ```
//!
//! Dry runs never write a record. The ledger write happens after the
//! transaction is closed, so it survives a rollback.

use crate::i18n::I18n;
use crate::ledger::{should_run, Ledger, LedgerError};
use crate::storage::{CommandExecution, NewExecution};
use crate::transaction::{TransactionError, TransactionManager};
use colored::*;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::time::Instant;
use thiserror::Error;

/// Option keys that are never stored in a record's `parameters`.
pub const NON_SERIALIZABLE_OPTIONS: &[&str] = &[
    "stdout",
    "stderr",
    "no_color",
    "force_color",
    "verbosity",
    "traceback",
    "skip_checks",
    "settings",
    "search_path",
    "dry_run",
];

/// Last path segment of a type name, without generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A failure returned by command logic.
///
/// The kind is stored ahead of the message in `error_message`. By default it
/// is the failure's type name, so `impl Failure for MyError {}` is enough.
pub trait Failure: fmt::Display {
    fn kind(&self) -> Cow<'_, str>
    where
        Self: Sized,
    {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

/// `"<kind>: <message>"`, as stored in `error_message`.
pub fn describe_failure<E: Failure>(failure: &E) -> String {
    format!("{}: {}", failure.kind(), failure)
}

/// Failure with an explicit kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandFailure {
    pub kind: String,
    pub message: String,
}

impl CommandFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl Failure for CommandFailure {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.kind)
    }
}

impl Failure for std::io::Error {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{:?}", std::io::Error::kind(self)))
    }
}

impl Failure for TransactionError {}

impl Failure for anyhow::Error {
    fn kind(&self) -> Cow<'_, str> {
        Cow::Borrowed("Error")
    }
}

/// Conversion of a command's return value into the stored `output`.
///
/// Only `()`, `None` and JSON `null` give an empty output; `0` and `false`
/// are stored as `"0"` and `"false"` rather than treated as empty.
pub trait IntoOutput {
    fn to_output(&self) -> String;
}

impl IntoOutput for () {
    fn to_output(&self) -> String {
        String::new()
    }
}

impl IntoOutput for String {
    fn to_output(&self) -> String {
        self.clone()
    }
}

impl IntoOutput for &str {
    fn to_output(&self) -> String {
        (*self).to_string()
    }
}

impl IntoOutput for Value {
    fn to_output(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl<T: IntoOutput> IntoOutput for Option<T> {
    fn to_output(&self) -> String {
        self.as_ref().map(IntoOutput::to_output).unwrap_or_default()
    }
}

macro_rules! display_output {
    ($($t:ty),*) => {
        $(impl IntoOutput for $t {
            fn to_output(&self) -> String {
                self.to_string()
            }
        })*
    };
}

display_output!(bool, i32, i64, u32, u64, usize, f32, f64);

/// Arguments of one invocation: positional args plus named options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub options: Map<String, Value>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn dry_run(self, dry_run: bool) -> Self {
        self.option("dry_run", dry_run)
    }

    pub fn is_dry_run(&self) -> bool {
        self.options
            .get("dry_run")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Options with the [`NON_SERIALIZABLE_OPTIONS`] keys removed.
    pub fn serializable_options(&self) -> Map<String, Value> {
        self.options
            .iter()
            .filter(|(key, _)| !NON_SERIALIZABLE_OPTIONS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Result of a guarded invocation that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Gated out by run-once; the logic never ran.
    Skipped,
    Completed {
        value: T,
        duration: f64,
        /// `None` for dry runs.
        record: Option<CommandExecution>,
    },
}

impl<T> Outcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Completed { value, .. } => Some(value),
            Outcome::Skipped => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Completed { value, .. } => Some(value),
            Outcome::Skipped => None,
        }
    }

    pub fn record(&self) -> Option<&CommandExecution> {
        match self {
            Outcome::Completed { record, .. } => record.as_ref(),
            Outcome::Skipped => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError<E> {
    /// The logic failed; the original failure value, unchanged.
    #[error("{0}")]
    Command(E),

    #[error("transaction failed: {0}")]
    Transaction(#[source] TransactionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl<E> RunError<E> {
    pub fn command(&self) -> Option<&E> {
        match self {
            RunError::Command(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn into_command(self) -> Option<E> {
        match self {
            RunError::Command(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Derive a ledger name from a module path.
///
/// `jobs::management::commands::cleanup` becomes `jobs.cleanup`; paths not
/// shaped like that are returned unchanged.
pub fn derive_command_name(module_path: &str) -> String {
    let parts: Vec<&str> = module_path
        .split("::")
        .flat_map(|segment| segment.split('.'))
        .collect();
    let n = parts.len();
    if n >= 4 && parts[n - 3] == "management" && parts[n - 2] == "commands" {
        format!("{}.{}", parts[n - 4], parts[n - 1])
    } else {
        module_path.to_string()
    }
}

/// Static configuration of a managed command bound to a ledger.
pub struct ManagedCommand<'a, L: ?Sized> {
    ledger: &'a L,
    i18n: &'a I18n,
    module_path: String,
    command_name: Option<String>,
    run_once: bool,
}

impl<'a, L: Ledger + ?Sized> ManagedCommand<'a, L> {
    /// `module_path` is usually `module_path!()` of the command's module.
    pub fn new(ledger: &'a L, i18n: &'a I18n, module_path: impl Into<String>) -> Self {
        Self {
            ledger,
            i18n,
            module_path: module_path.into(),
            command_name: None,
            run_once: false,
        }
    }

    /// Record under `name` instead of the derived name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.command_name = Some(name.into());
        self
    }

    /// Allow at most one successful recorded run.
    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn is_run_once(&self) -> bool {
        self.run_once
    }

    pub fn command_name(&self) -> String {
        match &self.command_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => derive_command_name(&self.module_path),
        }
    }

    /// Run `logic` inside a transaction of `store`, recording the result.
    ///
    /// Status lines go to `out`. A failure of the logic is recorded (unless
    /// dry run) and handed back as [`RunError::Command`]. Ledger errors are
    /// not caught.
    pub fn handle<M, T, E, F>(
        &self,
        out: &mut dyn Write,
        store: &mut M,
        invocation: &Invocation,
        logic: F,
    ) -> Result<Outcome<T>, RunError<E>>
    where
        M: TransactionManager,
        T: IntoOutput,
        E: Failure,
        F: FnOnce(&mut M::Tx, &Invocation) -> Result<T, E>,
    {
        let cmd_name = self.command_name();
        let dry_run = invocation.is_dry_run();

        if self.run_once && !should_run(self.ledger, &cmd_name)? {
            tracing::info!(command = %cmd_name, "run_once command already succeeded, skipping");
            self.say(out, self.i18n.t_format("skip_run_once", &[&cmd_name]).yellow());
            return Ok(Outcome::Skipped);
        }

        if dry_run {
            self.say(out, self.i18n.t("dry_run_notice").yellow());
        }

        tracing::info!(command = %cmd_name, dry_run, run_once = self.run_once, "starting managed command");
        let start_time = Instant::now();
        let parameters = Value::Object(invocation.serializable_options());

        let mut tx = match store.begin() {
            Ok(tx) => tx,
            Err(err) => {
                let duration = start_time.elapsed().as_secs_f64();
                self.record_failure(out, &cmd_name, dry_run, parameters, duration, &describe_failure(&err))?;
                return Err(RunError::Transaction(err));
            }
        };

        match logic(&mut tx, invocation) {
            Ok(value) => {
                let closed = if dry_run {
                    store.rollback(tx)
                } else {
                    store.commit(tx)
                };
                let duration = start_time.elapsed().as_secs_f64();
                if let Err(err) = closed {
                    self.record_failure(out, &cmd_name, dry_run, parameters, duration, &describe_failure(&err))?;
                    return Err(RunError::Transaction(err));
                }

                let record = if dry_run {
                    None
                } else {
                    Some(
                        self.ledger.append(
                            NewExecution::new(cmd_name.as_str())
                                .success(true)
                                .parameters(parameters)
                                .output(value.to_output())
                                .duration(duration)
                                .run_once(self.run_once),
                        )?,
                    )
                };

                tracing::info!(command = %cmd_name, duration, "managed command completed");
                let mut message = self
                    .i18n
                    .t_format("command_succeeded", &[&cmd_name, &format!("{:.2}", duration)]);
                if dry_run {
                    message.push_str(&self.i18n.t("dry_run_suffix"));
                }
                self.say(out, message.green());

                Ok(Outcome::Completed {
                    value,
                    duration,
                    record,
                })
            }
            Err(failure) => {
                if let Err(err) = store.rollback(tx) {
                    tracing::warn!(command = %cmd_name, error = %err, "rollback after failure did not complete");
                }
                let duration = start_time.elapsed().as_secs_f64();
                self.record_failure(out, &cmd_name, dry_run, parameters, duration, &describe_failure(&failure))?;
                Err(RunError::Command(failure))
            }
        }
    }

    fn record_failure(
        &self,
        out: &mut dyn Write,
        cmd_name: &str,
        dry_run: bool,
        parameters: Value,
        duration: f64,
        error_message: &str,
    ) -> Result<(), LedgerError> {
        tracing::warn!(command = %cmd_name, error = %error_message, duration, "managed command failed");
        if !dry_run {
            self.ledger.append(
                NewExecution::new(cmd_name)
                    .success(false)
                    .parameters(parameters)
                    .error_message(error_message)
                    .duration(duration)
                    .run_once(self.run_once),
            )?;
        }
        self.say(
            out,
            self.i18n
                .t_format("command_failed", &[cmd_name, error_message])
                .red(),
        );
        Ok(())
    }

    fn say(&self, out: &mut dyn Write, line: ColoredString) {
        writeln!(out, "{}", line).ok();
    }
}
