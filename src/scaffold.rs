//! Generation of new managed commands from templates.
//!
//! A request produces two files inside a registered crate:
//! `src/management/commands/<identifier>.rs` and `tests/<identifier>.rs`.
//! Every check runs before the first write.

use crate::config::Config;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

const COMMAND_TEMPLATE: &str = include_str!("../templates/command.rs.tmpl");
const TEST_TEMPLATE: &str = include_str!("../templates/test.rs.tmpl");

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

#[derive(Error, Debug)]
pub enum ScaffoldError {
    #[error("namespace '{0}' is not registered; add it under [scaffold.namespaces] or run from its crate root")]
    UnknownNamespace(String),

    #[error("'{0}' is not a valid command identifier; use only letters, digits and underscores, do not start with a digit, and avoid Rust keywords")]
    InvalidIdentifier(String),

    #[error("{kind} file already exists: {}\nUse --force to overwrite.", .path.display())]
    AlreadyExists { kind: &'static str, path: PathBuf },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScaffoldError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldRequest {
    pub namespace: String,
    pub identifier: String,
    pub run_once: bool,
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub command_path: PathBuf,
    pub test_path: PathBuf,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

/// Bare-word token usable as a module name.
pub fn is_valid_identifier(identifier: &str) -> bool {
    identifier != "_"
        && identifier_pattern().is_match(identifier)
        && !RUST_KEYWORDS.contains(&identifier)
}

/// `my_command` -> `MyCommand`.
pub fn class_name(identifier: &str) -> String {
    let name: String = identifier
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", name)
    } else {
        name
    }
}

/// Replace every `{{key}}` placeholder.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

fn crate_ident(name: &str) -> String {
    name.replace('-', "_")
}

fn run_behavior_test(crate_name: &str, command_name: &str, run_once: bool) -> String {
    let ledger_name = format!("{}.{}", crate_name, command_name);
    if run_once {
        format!(
            r#"#[test]
fn test_run_once_prevents_reexecution() {{
    let ledger = MemoryLedger::new();
    run(&ledger, &mut Vec::new());
    let first = ledger.latest("{ledger_name}").unwrap().unwrap();
    assert!(first.success);

    let mut out = Vec::new();
    run(&ledger, &mut out);
    assert_eq!(ledger.len(), 1);
    assert!(String::from_utf8_lossy(&out).contains("Skipped"));
}}"#
        )
    } else {
        format!(
            r#"#[test]
fn test_can_run_multiple_times() {{
    let ledger = MemoryLedger::new();
    for _ in 0..3 {{
        run(&ledger, &mut Vec::new());
    }}
    assert_eq!(ledger.history("{ledger_name}", 10).unwrap().len(), 3);
}}"#
        )
    }
}

/// Writes managed command stubs into registered crates.
#[derive(Debug, Clone, Default)]
pub struct Scaffolder {
    namespaces: BTreeMap<String, PathBuf>,
}

impl Scaffolder {
    pub fn new(namespaces: BTreeMap<String, PathBuf>) -> Self {
        Self { namespaces }
    }

    /// Namespaces from the config plus the crate rooted at `cwd`, if any.
    pub fn from_config(config: &Config, cwd: &Path) -> Self {
        let mut scaffolder = Self::new(config.scaffold.namespaces.clone());
        if let Some(name) = package_name(cwd) {
            scaffolder.namespaces.entry(name).or_insert_with(|| cwd.to_path_buf());
        }
        scaffolder
    }

    pub fn with_namespace(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.namespaces.insert(name.into(), root.into());
        self
    }

    /// Crate root of `namespace`; `-` and `_` are interchangeable.
    pub fn resolve(&self, namespace: &str) -> Result<&Path> {
        let wanted = crate_ident(namespace);
        self.namespaces
            .iter()
            .find(|(name, _)| crate_ident(name) == wanted)
            .map(|(_, root)| root.as_path())
            .ok_or_else(|| ScaffoldError::UnknownNamespace(namespace.to_string()))
    }

    pub fn generate(&self, request: &ScaffoldRequest) -> Result<GeneratedFiles> {
        let root = self.resolve(&request.namespace)?;
        if !is_valid_identifier(&request.identifier) {
            return Err(ScaffoldError::InvalidIdentifier(request.identifier.clone()));
        }

        let management_dir = root.join("src").join("management");
        let commands_dir = management_dir.join("commands");
        let tests_dir = root.join("tests");
        let command_path = commands_dir.join(format!("{}.rs", request.identifier));
        let test_path = tests_dir.join(format!("{}.rs", request.identifier));

        if !request.overwrite {
            if command_path.exists() {
                return Err(ScaffoldError::AlreadyExists {
                    kind: "Command",
                    path: command_path,
                });
            }
            if test_path.exists() {
                return Err(ScaffoldError::AlreadyExists {
                    kind: "Test",
                    path: test_path,
                });
            }
        }

        let crate_name = crate_ident(&request.namespace);
        let class = class_name(&request.identifier);
        let run_once = request.run_once.to_string();
        let behavior = run_behavior_test(&crate_name, &request.identifier, request.run_once);
        let vars = [
            ("command_name", request.identifier.as_str()),
            ("namespace", request.namespace.as_str()),
            ("crate_name", crate_name.as_str()),
            ("class_name", class.as_str()),
            ("run_once", run_once.as_str()),
            ("run_behavior_test", behavior.as_str()),
        ];
        let command_content = render(COMMAND_TEMPLATE, &vars);
        let test_content = render(TEST_TEMPLATE, &vars);

        for dir in [&commands_dir, &tests_dir] {
            fs::create_dir_all(dir).map_err(|source| ScaffoldError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        ensure_module_declared(&management_dir.join("mod.rs"), "commands")?;
        ensure_module_declared(&commands_dir.join("mod.rs"), &request.identifier)?;

        write_atomic(&command_path, &command_content)?;
        write_atomic(&test_path, &test_content)?;

        tracing::info!(
            namespace = %request.namespace,
            command = %request.identifier,
            run_once = request.run_once,
            "generated managed command"
        );
        Ok(GeneratedFiles {
            command_path,
            test_path,
        })
    }
}

/// `[package].name` of the `Cargo.toml` in `dir`.
fn package_name(dir: &Path) -> Option<String> {
    let content = fs::read_to_string(dir.join("Cargo.toml")).ok()?;
    let manifest: toml::Table = toml::from_str(&content).ok()?;
    manifest
        .get("package")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Make sure `mod_file` declares `pub mod <module>;`.
fn ensure_module_declared(mod_file: &Path, module: &str) -> Result<()> {
    let io_err = |source: io::Error| ScaffoldError::Io {
        path: mod_file.to_path_buf(),
        source,
    };
    let declaration = format!("pub mod {};", module);

    let existing = match fs::read_to_string(mod_file) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(io_err(err)),
    };
    let declared = existing.lines().any(|line| {
        let line = line.trim();
        line == declaration || line == format!("mod {};", module)
    });
    if declared {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&declaration);
    updated.push('\n');
    write_atomic(mod_file, &updated)
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let io_err = |source: io::Error| ScaffoldError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.persist(path).map_err(|err| io_err(err.error))?;
    Ok(())
}
