use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::error::{RankError, Result};
use crate::promotion::DEFAULT_HISTORY_LIMIT;
use crate::transition::DEFAULT_ACTOR;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Runtime settings shared by the CLI and the server.
///
/// Precedence: defaults < JSON file < environment < command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_actor")]
    pub default_actor: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("rank_ledger.db")
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_actor() -> String {
    DEFAULT_ACTOR.to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            history_limit: default_history_limit(),
            default_actor: default_actor(),
            bind_addr: default_bind_addr(),
            log_level: default_log_level(),
        }
    }
}

pub const ENV_DATABASE: &str = "RANK_LEDGER_DB";
pub const ENV_HISTORY_LIMIT: &str = "RANK_LEDGER_HISTORY_LIMIT";
pub const ENV_ACTOR: &str = "RANK_LEDGER_ACTOR";
pub const ENV_BIND: &str = "RANK_LEDGER_BIND";

impl LedgerConfig {
    /// Read a JSON config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: LedgerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the optional file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(raw) = lookup(ENV_HISTORY_LIMIT) {
            self.history_limit = raw.trim().parse().map_err(|_| {
                RankError::Config(format!("{} must be a positive integer, got '{}'", ENV_HISTORY_LIMIT, raw))
            })?;
        }
        if let Some(actor) = lookup(ENV_ACTOR) {
            self.default_actor = actor;
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind_addr = bind;
        }

        self.validate()?;
        Ok(self)
    }

    /// Log filter: `RUST_LOG` when set and valid, else `log_level`
    pub fn log_filter(&self) -> EnvFilter {
        self.log_filter_from(std::env::var("RUST_LOG").ok().as_deref())
    }

    pub fn log_filter_from(&self, rust_log: Option<&str>) -> EnvFilter {
        rust_log
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.log_level))
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(RankError::Config("history_limit must be at least 1".to_string()));
        }
        if self.default_actor.trim().is_empty() {
            return Err(RankError::Config("default_actor must not be empty".to_string()));
        }
        if let Err(e) = EnvFilter::try_new(&self.log_level) {
            return Err(RankError::Config(format!("invalid log_level '{}': {}", self.log_level, e)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.default_actor, "staff");
        assert_eq!(config.database_path, PathBuf::from("rank_ledger.db"));
    }

    #[test]
    fn test_file_with_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"history_limit": 25, "default_actor": "front_desk"}}"#).unwrap();

        let config = LedgerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.history_limit, 25);
        assert_eq!(config.default_actor, "front_desk");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_env_overrides() {
        let config = LedgerConfig::default()
            .with_env(env(&[(ENV_DATABASE, "/tmp/academy.db"), (ENV_HISTORY_LIMIT, "5")]))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/academy.db"));
        assert_eq!(config.history_limit, 5);
    }

    #[test]
    fn test_invalid_env_rejected() {
        let result = LedgerConfig::default().with_env(env(&[(ENV_HISTORY_LIMIT, "lots")]));
        assert!(matches!(result, Err(RankError::Config(_))));

        let result = LedgerConfig::default().with_env(env(&[(ENV_HISTORY_LIMIT, "0")]));
        assert!(matches!(result, Err(RankError::Config(_))));
    }

    #[test]
    fn test_log_filter_prefers_rust_log() {
        let config = LedgerConfig::default();

        assert_eq!(config.log_filter_from(Some("debug")).to_string(), "debug");
        assert_eq!(config.log_filter_from(None).to_string(), "info");
        // Unparseable RUST_LOG falls back to the configured level
        assert_eq!(config.log_filter_from(Some("rank_ledger=loud")).to_string(), "info");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = LedgerConfig {
            log_level: "rank_ledger=loud".to_string(),
            ..LedgerConfig::default()
        };
        assert!(matches!(config.validate(), Err(RankError::Config(_))));
    }
}
