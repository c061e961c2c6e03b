//! Persisted configuration store.
//!
//! The store holds the full [`Config`] document in memory behind a mutex and
//! persists it as JSON after every mutation. Persistence is atomic: the
//! document is written to a temp file in the same directory and renamed over
//! the live file, so readers never observe a torn write. A file that fails to
//! parse is surfaced as a load failure and the daemon refuses to start.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use crate::config::model::{Config, ConnectionSpec, PairSpec, Settings, SettingsPatch};
use crate::error::SyncError;

const CONFIG_FILE: &str = "config.json";

pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<Config>,
}

impl ConfigStore {
    /// Open the store under the given directory, loading `config.json` if it
    /// exists and starting from defaults otherwise.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SyncError> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE);
        let config = if path.exists() {
            Self::load(&path)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(ConfigStore {
            path,
            config: Mutex::new(config),
        })
    }

    /// Read and parse the config file.
    pub fn load(path: &Path) -> Result<Config, SyncError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigurationInvalid(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SyncError::ConfigurationInvalid(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Write the document to a temp file and rename it over the live file.
    fn persist(&self, config: &Config) -> Result<(), SyncError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| {
            SyncError::ConfigurationInvalid(format!("failed to create {}: {e}", dir.display()))
        })?;

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| SyncError::ConfigurationInvalid(format!("failed to serialize config: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| {
            SyncError::ConfigurationInvalid(format!("failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            SyncError::ConfigurationInvalid(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!("Persisted configuration to {}", self.path.display());
        Ok(())
    }

    fn with_config<T>(&self, f: impl FnOnce(&Config) -> T) -> T {
        let guard = self.config.lock().expect("config lock poisoned");
        f(&guard)
    }

    fn mutate(&self, f: impl FnOnce(&mut Config) -> Result<(), SyncError>) -> Result<(), SyncError> {
        let mut guard = self.config.lock().expect("config lock poisoned");
        f(&mut guard)?;
        self.persist(&guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Connections

    pub fn list_connections(&self) -> Vec<(String, ConnectionSpec)> {
        self.with_config(|c| {
            c.connections
                .iter()
                .map(|(name, spec)| (name.clone(), spec.clone()))
                .collect()
        })
    }

    pub fn get_connection(&self, name: &str) -> Result<ConnectionSpec, SyncError> {
        self.with_config(|c| c.get_connection(name).cloned())
            .ok_or_else(|| SyncError::ConfigurationInvalid(format!("unknown connection '{name}'")))
    }

    /// Add a connection; duplicate names are rejected.
    pub fn add_connection(&self, name: &str, spec: ConnectionSpec) -> Result<(), SyncError> {
        self.mutate(|c| {
            if c.connections.contains_key(name) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "connection '{name}' already exists"
                )));
            }
            c.connections.insert(name.to_string(), spec);
            Ok(())
        })
    }

    /// Remove a connection; rejected while any pair references it.
    pub fn remove_connection(&self, name: &str) -> Result<(), SyncError> {
        self.mutate(|c| {
            if !c.connections.contains_key(name) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "unknown connection '{name}'"
                )));
            }
            if c.connection_in_use(name) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "connection '{name}' is referenced by a sync pair"
                )));
            }
            c.connections.remove(name);
            Ok(())
        })
    }

    // Pairs

    pub fn list_pairs(&self) -> Vec<PairSpec> {
        self.with_config(|c| c.pairs.clone())
    }

    pub fn enabled_pairs(&self) -> Vec<PairSpec> {
        self.with_config(|c| c.pairs.iter().filter(|p| p.enabled).cloned().collect())
    }

    pub fn get_pair(&self, name: &str) -> Result<PairSpec, SyncError> {
        self.with_config(|c| c.get_pair(name).cloned())
            .ok_or_else(|| SyncError::ConfigurationInvalid(format!("unknown pair '{name}'")))
    }

    /// Add a pair; the name must be unique and both connections must exist
    /// and differ.
    pub fn add_pair(&self, pair: PairSpec) -> Result<(), SyncError> {
        self.mutate(|c| {
            if c.get_pair(&pair.name).is_some() {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "pair '{}' already exists",
                    pair.name
                )));
            }
            if !c.connections.contains_key(&pair.source) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "unknown source connection '{}'",
                    pair.source
                )));
            }
            if !c.connections.contains_key(&pair.target) {
                return Err(SyncError::ConfigurationInvalid(format!(
                    "unknown target connection '{}'",
                    pair.target
                )));
            }
            if pair.source == pair.target {
                return Err(SyncError::ConfigurationInvalid(
                    "source and target connections must differ".to_string(),
                ));
            }
            c.pairs.push(pair);
            Ok(())
        })
    }

    pub fn remove_pair(&self, name: &str) -> Result<(), SyncError> {
        self.mutate(|c| {
            let before = c.pairs.len();
            c.pairs.retain(|p| p.name != name);
            if c.pairs.len() == before {
                return Err(SyncError::ConfigurationInvalid(format!("unknown pair '{name}'")));
            }
            Ok(())
        })
    }

    pub fn set_pair_enabled(&self, name: &str, enabled: bool) -> Result<(), SyncError> {
        self.mutate(|c| {
            let pair = c
                .pairs
                .iter_mut()
                .find(|p| p.name == name)
                .ok_or_else(|| SyncError::ConfigurationInvalid(format!("unknown pair '{name}'")))?;
            pair.enabled = enabled;
            Ok(())
        })
    }

    /// Record "pair last synced at now". Called by workers after a mutating
    /// tick; the store mutex serializes concurrent writers.
    pub fn update_last_sync(&self, name: &str) -> Result<(), SyncError> {
        self.mutate(|c| {
            let pair = c
                .pairs
                .iter_mut()
                .find(|p| p.name == name)
                .ok_or_else(|| SyncError::ConfigurationInvalid(format!("unknown pair '{name}'")))?;
            pair.last_sync_at = Some(Utc::now());
            Ok(())
        })
    }

    // Settings

    pub fn settings(&self) -> Settings {
        self.with_config(|c| c.settings.clone())
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, SyncError> {
        self.mutate(|c| {
            let mut updated = c.settings.clone();
            patch.apply_to(&mut updated);
            updated.validate()?;
            c.settings = updated;
            Ok(())
        })?;
        Ok(self.settings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::EngineKind;

    fn spec(engine: EngineKind) -> ConnectionSpec {
        ConnectionSpec {
            engine,
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: "secret".to_string(),
            database: "app".to_string(),
        }
    }

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn duplicate_connection_rejected() {
        let (_dir, store) = store();
        store.add_connection("a", spec(EngineKind::Mysql)).unwrap();
        assert!(store.add_connection("a", spec(EngineKind::Mysql)).is_err());
    }

    #[test]
    fn connection_in_use_cannot_be_removed() {
        let (_dir, store) = store();
        store.add_connection("src", spec(EngineKind::Mysql)).unwrap();
        store.add_connection("dst", spec(EngineKind::Postgresql)).unwrap();
        store.add_pair(PairSpec::new("p", "src", "dst")).unwrap();

        assert!(store.remove_connection("src").is_err());
        store.remove_pair("p").unwrap();
        store.remove_connection("src").unwrap();
    }

    #[test]
    fn pair_requires_distinct_existing_connections() {
        let (_dir, store) = store();
        store.add_connection("a", spec(EngineKind::Mysql)).unwrap();

        assert!(store.add_pair(PairSpec::new("p", "a", "missing")).is_err());
        assert!(store.add_pair(PairSpec::new("p", "a", "a")).is_err());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ConfigStore::open(dir.path()).unwrap();
            store.add_connection("a", spec(EngineKind::Mysql)).unwrap();
            store.add_connection("b", spec(EngineKind::Postgresql)).unwrap();
            store.add_pair(PairSpec::new("p", "a", "b")).unwrap();
            store.update_last_sync("p").unwrap();
        }

        let store = ConfigStore::open(dir.path()).unwrap();
        assert_eq!(store.list_connections().len(), 2);
        let pair = store.get_pair("p").unwrap();
        assert!(pair.last_sync_at.is_some());
    }

    #[test]
    fn corrupted_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert!(ConfigStore::open(dir.path()).is_err());
    }

    #[test]
    fn settings_patch_roundtrip() {
        let (_dir, store) = store();
        let patch = SettingsPatch {
            poll_interval_secs: Some(17),
            ..Default::default()
        };
        let updated = store.update_settings(patch).unwrap();
        assert_eq!(updated.poll_interval_secs, 17);

        let bad = SettingsPatch {
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(store.update_settings(bad).is_err());
    }
}
