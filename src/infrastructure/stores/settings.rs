#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::models::SettingKey;
use crate::domain::models::SettingsStore;

/// Small key-value settings persisted as a single YAML file next to the
/// session cache. Writes are serialized through a mutex so concurrent cycle
/// completions cannot interleave read-modify-write.
pub struct FilesystemSettings {
    pub file_path: path::PathBuf,
    write_lock: Mutex<()>,
}

impl Default for FilesystemSettings {
    fn default() -> FilesystemSettings {
        let file_path = dirs::cache_dir().unwrap().join("worksync/settings.yaml");

        return FilesystemSettings::new(file_path);
    }
}

impl FilesystemSettings {
    pub fn new(file_path: path::PathBuf) -> FilesystemSettings {
        return FilesystemSettings {
            file_path,
            write_lock: Mutex::new(()),
        };
    }

    async fn read_map(&self) -> BTreeMap<String, String> {
        if !self.file_path.exists() {
            return BTreeMap::new();
        }

        let payload = match fs::read_to_string(&self.file_path).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to read settings file");
                return BTreeMap::new();
            }
        };

        return serde_yaml::from_str(&payload).unwrap_or_else(|err| {
            tracing::warn!(error = ?err, "Failed to parse settings file, starting fresh");
            return BTreeMap::new();
        });
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_yaml::to_string(map)?;
        let mut file = fs::File::create(&self.file_path).await?;
        file.write_all(payload.as_bytes()).await?;

        return Ok(());
    }
}

#[async_trait]
impl SettingsStore for FilesystemSettings {
    async fn get(&self, key: SettingKey) -> Option<String> {
        return self.read_map().await.get(&key.to_string()).cloned();
    }

    async fn set(&self, key: SettingKey, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await;
        map.insert(key.to_string(), value.to_string());
        return self.write_map(&map).await;
    }

    async fn remove(&self, key: SettingKey) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.read_map().await;
        if map.remove(&key.to_string()).is_none() {
            return Ok(());
        }

        return self.write_map(&map).await;
    }
}
