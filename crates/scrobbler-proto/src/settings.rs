use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// On-disk shape of the connector settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentSettings {
    /// Connector id → enabled. Connectors not listed are enabled.
    #[serde(default)]
    pub connectors: BTreeMap<String, bool>,
}

/// Persisted per-connector enabled flags.
pub struct ConnectorSettingsStore {
    state: Arc<RwLock<PersistentSettings>>,
    settings_file: PathBuf,
}

impl ConnectorSettingsStore {
    pub fn new(settings_file: PathBuf) -> Self {
        let persistent = Self::load_persistent(&settings_file);
        Self {
            state: Arc::new(RwLock::new(persistent)),
            settings_file,
        }
    }

    pub async fn is_enabled(&self, connector_id: &str) -> bool {
        self.state
            .read()
            .await
            .connectors
            .get(connector_id)
            .copied()
            .unwrap_or(true)
    }

    pub async fn set_enabled(&self, connector_id: &str, enabled: bool) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.connectors.insert(connector_id.to_string(), enabled);
        }
        self.save().await
    }

    pub async fn snapshot(&self) -> PersistentSettings {
        self.state.read().await.clone()
    }

    async fn save(&self) -> anyhow::Result<()> {
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)?
        };

        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.settings_file, json).await?;
        Ok(())
    }

    fn load_persistent(settings_file: &Path) -> PersistentSettings {
        let Ok(content) = std::fs::read_to_string(settings_file) else {
            return PersistentSettings::default();
        };
        match serde_json::from_str::<PersistentSettings>(&content) {
            Ok(persistent) => persistent,
            Err(e) => {
                warn!(
                    "Ignoring unreadable settings file {:?}: {}",
                    settings_file, e
                );
                PersistentSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_connector_defaults_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConnectorSettingsStore::new(dir.path().join("connectors.json"));
        assert!(store.is_enabled("youtube").await);
    }

    #[tokio::test]
    async fn test_flags_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("connectors.json");

        let store = ConnectorSettingsStore::new(path.clone());
        store.set_enabled("spotify", false).await.unwrap();
        assert!(!store.is_enabled("spotify").await);

        let reloaded = ConnectorSettingsStore::new(path);
        assert!(!reloaded.is_enabled("spotify").await);
        assert!(reloaded.is_enabled("youtube").await);
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connectors.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ConnectorSettingsStore::new(path);
        assert!(store.snapshot().await.connectors.is_empty());
    }
}
