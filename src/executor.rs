use crate::managed::CommandFailure;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

/// Number of trailing stderr lines kept in a failure message.
const STDERR_TAIL_LINES: usize = 5;

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a shell command as the logic of a managed command.
pub struct CommandExecutor;

impl CommandExecutor {
    /// Run `command` with `sh -c`, passing output through while capturing it.
    ///
    /// Non-zero exit becomes an `ExitStatus` failure; stdout is the result.
    pub fn run(command: &str, echo: bool, i18n: &crate::i18n::I18n) -> Result<String, CommandFailure> {
        let output = Self::execute(command, echo, i18n)?;
        if output.exit_code == 0 {
            return Ok(output.stdout);
        }

        let mut message = format!("exit code {}", output.exit_code);
        let tail = Self::tail(&output.stderr, STDERR_TAIL_LINES);
        if !tail.is_empty() {
            message.push_str(": ");
            message.push_str(&tail);
        }
        Err(CommandFailure::new("ExitStatus", message))
    }

    pub fn execute(command: &str, echo: bool, i18n: &crate::i18n::I18n) -> Result<ShellOutput, CommandFailure> {
        let spawn_failure = |err: io::Error| {
            CommandFailure::new(
                format!("{:?}", err.kind()),
                format!("{}: {}", i18n.t("error_execute_command"), err),
            )
        };

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_failure)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CommandFailure::new("BrokenPipe", i18n.t("error_read_stdout")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CommandFailure::new("BrokenPipe", i18n.t("error_read_stderr")))?;

        let stdout_handle = thread::spawn(move || pump(stdout, echo.then(io::stdout)));
        let stderr_handle = thread::spawn(move || pump(stderr, echo.then(io::stderr)));

        let status = child.wait().map_err(spawn_failure)?;

        let stdout_bytes = stdout_handle
            .join()
            .map_err(|_| CommandFailure::new("BrokenPipe", i18n.t("error_read_stdout")))?
            .map_err(spawn_failure)?;
        let stderr_bytes = stderr_handle
            .join()
            .map_err(|_| CommandFailure::new("BrokenPipe", i18n.t("error_read_stderr")))?
            .map_err(spawn_failure)?;

        Ok(ShellOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
            stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        })
    }

    fn tail(text: &str, lines: usize) -> String {
        let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Copy `reader` to the end while optionally echoing each chunk.
fn pump<R: Read, W: Write>(mut reader: R, mut echo: Option<W>) -> io::Result<Vec<u8>> {
    let mut buffer = [0u8; 4096];
    let mut collected = Vec::new();
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        collected.extend_from_slice(&buffer[..bytes_read]);
        if let Some(handle) = echo.as_mut() {
            handle.write_all(&buffer[..bytes_read])?;
            handle.flush()?;
        }
    }
    Ok(collected)
}
