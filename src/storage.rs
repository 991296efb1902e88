use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One immutable ledger entry: a single invocation attempt of a command.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommandExecution {
    pub id: u64,                    // Storage-assigned, increasing in insertion order
    pub command_name: String,       // Logical name of the invoked command
    pub executed_at: DateTime<Utc>, // Creation timestamp
    pub success: bool,              // False when the wrapped logic failed
    #[serde(default)]
    pub parameters: Option<Value>, // Options passed, minus the excluded keys
    #[serde(default)]
    pub output: String, // Stringified return value
    #[serde(default)]
    pub error_message: String, // "<Kind>: <message>" on failure
    #[serde(default)]
    pub duration: Option<f64>, // Wall-clock seconds
    #[serde(default)]
    pub run_once: bool, // Policy flag of the invoking command
}

impl CommandExecution {
    pub fn status_label(&self) -> &'static str {
        if self.success {
            "Success"
        } else {
            "Failed"
        }
    }
}

impl fmt::Display for CommandExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.command_name, self.status_label())
    }
}

/// Values for a record that has not been stored yet.
///
/// Defaults match a plain successful run: no parameters, empty output and
/// error message, unknown duration, `run_once` off.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    pub command_name: String,
    pub success: bool,
    pub parameters: Option<Value>,
    pub output: String,
    pub error_message: String,
    pub duration: Option<f64>,
    pub run_once: bool,
}

impl NewExecution {
    pub fn new(command_name: impl Into<String>) -> Self {
        Self {
            command_name: command_name.into(),
            success: true,
            parameters: None,
            output: String::new(),
            error_message: String::new(),
            duration: None,
            run_once: false,
        }
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub(crate) fn into_record(self, id: u64, executed_at: DateTime<Utc>) -> CommandExecution {
        CommandExecution {
            id,
            command_name: self.command_name,
            executed_at,
            success: self.success,
            parameters: self.parameters,
            output: self.output,
            error_message: self.error_message,
            duration: self.duration,
            run_once: self.run_once,
        }
    }
}
