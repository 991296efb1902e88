use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "MCMD_HOME";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub display: DisplayConfig,
    pub scaffold: ScaffoldConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    // Directory holding executions.jsonl; the data directory when unset
    pub ledger_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub max_history_shown: usize,
    pub language: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_history_shown: crate::ledger::DEFAULT_HISTORY_LIMIT,
            language: "auto".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScaffoldConfig {
    // Namespace name -> crate root directory
    pub namespaces: BTreeMap<String, PathBuf>,
}

impl Config {
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(config_dir) = config_path.parent() {
            fs::create_dir_all(config_dir)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;
        Ok(())
    }

    /// `$MCMD_HOME`, or `~/.managed-commands`.
    pub fn home_dir() -> PathBuf {
        match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".managed-commands"),
        }
    }

    fn get_config_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.storage
            .ledger_dir
            .clone()
            .unwrap_or_else(Self::home_dir)
    }

    pub fn get_effective_language(&self) -> String {
        if self.display.language == "auto" {
            // Try to get system language
            std::env::var("LANG")
                .unwrap_or_else(|_| "en_US".to_string())
                .split('.')
                .next()
                .unwrap_or("en")
                .to_string()
        } else {
            self.display.language.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.display.max_history_shown, 10);
        assert_eq!(config.display.language, "auto");
        assert!(config.storage.ledger_dir.is_none());
        assert!(config.scaffold.namespaces.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scaffold.namespaces]
            jobs = "/srv/jobs"
            "#,
        )
        .unwrap();
        assert_eq!(config.display.max_history_shown, 10);
        assert_eq!(
            config.scaffold.namespaces.get("jobs"),
            Some(&PathBuf::from("/srv/jobs"))
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let mut config = Config::default();
        config.storage.ledger_dir = Some(dir.path().join("ledger"));
        config.display.language = "zh".to_string();
        config
            .scaffold
            .namespaces
            .insert("jobs".to_string(), dir.path().join("jobs"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.ledger_dir(), dir.path().join("ledger"));
        assert_eq!(loaded.get_effective_language(), "zh");
        assert_eq!(loaded.scaffold.namespaces.len(), 1);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "display = 3").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
