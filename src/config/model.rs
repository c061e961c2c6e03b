//! Configuration data model: connections, replication pairs, and settings.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Mysql,
    Postgresql,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Mysql => write!(f, "mysql"),
            EngineKind::Postgresql => write!(f, "postgresql"),
        }
    }
}

/// A named database endpoint. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub engine: EngineKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// One replication stream: a source connection mirrored onto a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSpec {
    /// Unique pair name.
    pub name: String,
    /// Name of the source connection.
    pub source: String,
    /// Name of the target connection.
    pub target: String,
    #[serde(default = "default_true")]
    pub sync_schema: bool,
    #[serde(default = "default_true")]
    pub sync_data: bool,
    #[serde(default = "default_true")]
    pub sync_procedures: bool,
    #[serde(default = "default_true")]
    pub sync_triggers: bool,
    /// Whitelist; when non-empty only these tables are replicated.
    #[serde(default)]
    pub include_tables: Vec<String>,
    /// Blacklist, applied after the whitelist.
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Informational; updated by the pair worker after a mutating tick.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl PairSpec {
    /// Create a pair with all sync strata enabled and no table filters.
    pub fn new(name: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        PairSpec {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            sync_schema: true,
            sync_data: true,
            sync_procedures: true,
            sync_triggers: true,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            enabled: true,
            last_sync_at: None,
        }
    }

    /// Table filter: include whitelist first (when non-empty), then the
    /// exclude blacklist. Matching is exact and case-sensitive.
    pub fn selects_table(&self, table: &str) -> bool {
        if !self.include_tables.is_empty() && !self.include_tables.iter().any(|t| t == table) {
            return false;
        }
        !self.exclude_tables.iter().any(|t| t == table)
    }
}

/// Daemon-wide settings. Intervals are persisted in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Data-tick period.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Schema/routine-tick period.
    #[serde(default = "default_schema_interval")]
    pub schema_check_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Connect-validation retry bound.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between connect-validation retries, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_schema_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            poll_interval_secs: default_poll_interval(),
            schema_check_interval_secs: default_schema_interval(),
            log_level: default_log_level(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn schema_check_interval(&self) -> Duration {
        Duration::from_secs(self.schema_check_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Both intervals must be positive durations.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.poll_interval_secs == 0 {
            return Err(SyncError::ConfigurationInvalid(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.schema_check_interval_secs == 0 {
            return Err(SyncError::ConfigurationInvalid(
                "schema check interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial settings update; only the provided fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub poll_interval_secs: Option<u64>,
    pub schema_check_interval_secs: Option<u64>,
    pub log_level: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.poll_interval_secs.is_none()
            && self.schema_check_interval_secs.is_none()
            && self.log_level.is_none()
            && self.max_retries.is_none()
            && self.retry_delay_secs.is_none()
    }

    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(v) = self.poll_interval_secs {
            settings.poll_interval_secs = v;
        }
        if let Some(v) = self.schema_check_interval_secs {
            settings.schema_check_interval_secs = v;
        }
        if let Some(v) = &self.log_level {
            settings.log_level = v.clone();
        }
        if let Some(v) = self.max_retries {
            settings.max_retries = v;
        }
        if let Some(v) = self.retry_delay_secs {
            settings.retry_delay_secs = v;
        }
    }
}

/// Root persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionSpec>,
    #[serde(default)]
    pub pairs: Vec<PairSpec>,
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    pub fn get_connection(&self, name: &str) -> Option<&ConnectionSpec> {
        self.connections.get(name)
    }

    pub fn get_pair(&self, name: &str) -> Option<&PairSpec> {
        self.pairs.iter().find(|p| p.name == name)
    }

    /// True when any pair references the connection by name.
    pub fn connection_in_use(&self, name: &str) -> bool {
        self.pairs.iter().any(|p| p.source == name || p.target == name)
    }

    /// Structural checks: every pair resolves to two distinct, existing
    /// connections and the intervals are positive.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.settings.validate()?;
        for pair in &self.pairs {
            if !self.connections.contains_key(&pair.source) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "pair '{}' references unknown source connection '{}'",
                    pair.name, pair.source
                )));
            }
            if !self.connections.contains_key(&pair.target) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "pair '{}' references unknown target connection '{}'",
                    pair.name, pair.target
                )));
            }
            if pair.source == pair.target {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "pair '{}' uses the same connection for source and target",
                    pair.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_filter_include_then_exclude() {
        let mut pair = PairSpec::new("p", "a", "b");
        assert!(pair.selects_table("users"));

        pair.include_tables = vec!["users".to_string(), "orders".to_string()];
        assert!(pair.selects_table("users"));
        assert!(!pair.selects_table("audit"));

        pair.exclude_tables = vec!["orders".to_string()];
        assert!(pair.selects_table("users"));
        assert!(!pair.selects_table("orders"));
    }

    #[test]
    fn table_filter_is_case_sensitive() {
        let mut pair = PairSpec::new("p", "a", "b");
        pair.include_tables = vec!["Users".to_string()];
        assert!(pair.selects_table("Users"));
        assert!(!pair.selects_table("users"));
    }

    #[test]
    fn settings_reject_zero_intervals() {
        let mut settings = Settings::default();
        settings.poll_interval_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.schema_check_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn patch_only_touches_provided_fields() {
        let mut settings = Settings::default();
        let patch = SettingsPatch {
            poll_interval_secs: Some(30),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut settings);
        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.schema_check_interval_secs, 60);
    }

    #[test]
    fn config_validation_catches_dangling_pairs() {
        let mut config = Config::default();
        config.pairs.push(PairSpec::new("p", "missing", "also-missing"));
        assert!(config.validate().is_err());
    }
}
