use crate::ledger::{Ledger, Result, Table};
use crate::storage::{CommandExecution, NewExecution};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LEDGER_FILE: &str = "executions.jsonl";

/// File-backed ledger: one JSON record per line, in insertion order.
///
/// Every read reloads the file so records appended by other processes are
/// visible. Appends from this process are serialized by `write_lock`.
pub struct StoreManager {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl StoreManager {
    pub fn new_with_config(config: &crate::config::Config) -> Result<Self> {
        Self::open(config.ledger_dir())
    }

    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        tracing::debug!(dir = %base_dir.display(), "opened execution ledger");
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.base_dir.join(LEDGER_FILE)
    }

    fn load_table(&self) -> Result<Table> {
        Ok(Table::from_rows(Self::read_records(&self.ledger_path())?))
    }

    fn read_records(path: &Path) -> Result<Vec<CommandExecution>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CommandExecution>(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %err,
                        "skipping unreadable ledger line"
                    );
                }
            }
        }
        Ok(records)
    }

    /// Look up a record by id.
    pub fn find(&self, id: u64) -> Result<Option<CommandExecution>> {
        Ok(Self::read_records(&self.ledger_path())?
            .into_iter()
            .find(|record| record.id == id))
    }
}

impl Ledger for StoreManager {
    fn append(&self, entry: NewExecution) -> Result<CommandExecution> {
        let _guard = self.write_lock.lock()?;
        let table = self.load_table()?;
        let record = table.next_record(entry, Utc::now());

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.ledger_path())?;
        // A torn last line must not swallow the new record.
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                line.insert(0, '\n');
            }
        }
        file.write_all(line.as_bytes())?;
        file.flush()?;

        tracing::debug!(id = record.id, command = %record.command_name, "appended ledger record");
        Ok(record)
    }

    fn latest(&self, command_name: &str) -> Result<Option<CommandExecution>> {
        Ok(self.load_table()?.latest(command_name).cloned())
    }

    fn history(&self, command_name: &str, limit: usize) -> Result<Vec<CommandExecution>> {
        Ok(self.load_table()?.history(command_name, limit))
    }

    fn all(&self) -> Result<Vec<CommandExecution>> {
        Ok(self.load_table()?.newest_first())
    }
}
