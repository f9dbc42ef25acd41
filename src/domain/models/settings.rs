use anyhow::Result;
use async_trait::async_trait;
use strum::EnumIter;

/// Keys for the small persisted key-value settings store. These survive
/// process restarts; the cursor is advisory and recoverable if missing.
#[derive(Clone, Copy, Eq, PartialEq, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SettingKey {
    /// Opaque pagination token from the remote list endpoint.
    NextPageToken,
    /// RFC3339 timestamp of the last successful refresh.
    LastRefreshTime,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: SettingKey) -> Option<String>;

    async fn set(&self, key: SettingKey, value: &str) -> Result<()>;

    async fn remove(&self, key: SettingKey) -> Result<()>;
}
