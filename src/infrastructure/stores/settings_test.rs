use anyhow::Result;
use strum::IntoEnumIterator;

use super::FilesystemSettings;
use crate::domain::models::SettingKey;
use crate::domain::models::SettingsStore;

fn settings() -> (tempfile::TempDir, FilesystemSettings) {
    let dir = tempfile::tempdir().unwrap();
    let settings = FilesystemSettings::new(dir.path().join("settings.yaml"));
    return (dir, settings);
}

#[tokio::test]
async fn it_round_trips_values() -> Result<()> {
    let (_dir, settings) = settings();

    settings.set(SettingKey::NextPageToken, "page-2").await?;
    settings
        .set(SettingKey::LastRefreshTime, "2024-03-01T10:00:00Z")
        .await?;

    assert_eq!(
        settings.get(SettingKey::NextPageToken).await,
        Some("page-2".to_string())
    );
    assert_eq!(
        settings.get(SettingKey::LastRefreshTime).await,
        Some("2024-03-01T10:00:00Z".to_string())
    );
    return Ok(());
}

#[tokio::test]
async fn it_round_trips_every_key() -> Result<()> {
    let (_dir, settings) = settings();

    for key in SettingKey::iter() {
        let value = format!("value-for-{key}");
        settings.set(key, &value).await?;
        assert_eq!(settings.get(key).await, Some(value));

        settings.remove(key).await?;
        assert_eq!(settings.get(key).await, None);
    }

    return Ok(());
}

#[tokio::test]
async fn it_returns_none_for_missing_keys() {
    let (_dir, settings) = settings();

    assert_eq!(settings.get(SettingKey::NextPageToken).await, None);
}

#[tokio::test]
async fn it_overwrites_existing_values() -> Result<()> {
    let (_dir, settings) = settings();

    settings.set(SettingKey::NextPageToken, "page-2").await?;
    settings.set(SettingKey::NextPageToken, "page-3").await?;

    assert_eq!(
        settings.get(SettingKey::NextPageToken).await,
        Some("page-3".to_string())
    );
    return Ok(());
}

#[tokio::test]
async fn it_removes_values() -> Result<()> {
    let (_dir, settings) = settings();

    settings.set(SettingKey::NextPageToken, "page-2").await?;
    settings.remove(SettingKey::NextPageToken).await?;

    assert_eq!(settings.get(SettingKey::NextPageToken).await, None);

    // Removing an absent key stays quiet.
    settings.remove(SettingKey::NextPageToken).await?;
    return Ok(());
}

#[tokio::test]
async fn it_keeps_other_keys_intact_on_remove() -> Result<()> {
    let (_dir, settings) = settings();

    settings.set(SettingKey::NextPageToken, "page-2").await?;
    settings
        .set(SettingKey::LastRefreshTime, "2024-03-01T10:00:00Z")
        .await?;
    settings.remove(SettingKey::NextPageToken).await?;

    assert_eq!(
        settings.get(SettingKey::LastRefreshTime).await,
        Some("2024-03-01T10:00:00Z".to_string())
    );
    return Ok(());
}

#[tokio::test]
async fn it_recovers_from_a_corrupted_file() -> Result<()> {
    let (dir, settings) = settings();
    std::fs::write(dir.path().join("settings.yaml"), "{{{ not yaml").unwrap();

    assert_eq!(settings.get(SettingKey::NextPageToken).await, None);

    settings.set(SettingKey::NextPageToken, "page-2").await?;
    assert_eq!(
        settings.get(SettingKey::NextPageToken).await,
        Some("page-2".to_string())
    );
    return Ok(());
}
