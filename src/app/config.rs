//! Configuration for the scanner and for embedding applications

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::automaton::{compile, compile_default, Automaton};
use crate::error::CompileError;

/// Recognizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule file to compile instead of the bundled default rules
    pub rules_path: Option<PathBuf>,
    /// Bytes handed to the recognizer per `feed` call
    pub chunk_size: usize,
    /// Pending bytes tolerated before the recognizer is reset (0 = no cap)
    pub max_pending_bytes: usize,
    /// Unknown-sequence reports kept in the diagnostic log
    pub diagnostic_capacity: usize,
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules_path: None,
            chunk_size: 4096,
            max_pending_bytes: 64 * 1024,
            diagnostic_capacity: 100,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from the default location or return the default
    pub fn load_or_default() -> Self {
        // Try ~/.config/termproxy/config.json
        if let Some(config_dir) = dirs_config_path() {
            let config_path = config_dir.join("config.json");
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), error = %e, "ignoring unreadable config");
                    }
                }
            }
        }
        Self::default()
    }

    /// Compile the configured rule file, or the bundled rules when none is set
    pub fn build_automaton(&self) -> Result<Automaton, ConfigError> {
        match &self.rules_path {
            Some(path) => {
                let source = std::fs::read_to_string(path)?;
                Ok(compile(&source)?)
            }
            None => Ok(compile_default()?),
        }
    }
}

/// Get the configuration directory path
fn dirs_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("termproxy"))
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rule error: {0}")]
    Rules(#[from] CompileError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.diagnostic_capacity, 100);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            chunk_size: 1,
            log_filter: "termproxy=debug".to_string(),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let restored = Config::load(&path).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"chunk_size": 16}"#).unwrap();
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.max_pending_bytes, 64 * 1024);
    }

    #[test]
    fn test_config_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{ not json").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_build_automaton_from_rules_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"'a' => t_a\n").unwrap();

        let config = Config {
            rules_path: Some(file.path().to_path_buf()),
            ..Config::default()
        };
        let automaton = config.build_automaton().unwrap();
        assert_eq!(automaton.action_names().into_iter().collect::<Vec<_>>(), vec!["t_a"]);
    }

    #[test]
    fn test_build_automaton_reports_rule_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"'a' => \n").unwrap();

        let config = Config {
            rules_path: Some(file.path().to_path_buf()),
            ..Config::default()
        };
        assert!(matches!(
            config.build_automaton(),
            Err(ConfigError::Rules(CompileError::Syntax { .. }))
        ));
    }
}
