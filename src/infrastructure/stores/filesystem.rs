#[cfg(test)]
#[path = "filesystem_test.rs"]
mod tests;

use std::cmp::Reverse;
use std::path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

use crate::domain::models::Session;
use crate::domain::models::SessionStore;
use crate::domain::models::StoreEvent;
use crate::domain::models::ValidationReport;

const ARTIFACT_SUFFIX: &str = ".diffs.yaml";

/// Durable session storage: one YAML document per session under a cache
/// directory, with large cached diff payloads split into sibling artifact
/// files so list scans stay cheap. Every write that could affect the
/// observed page emits a change event.
pub struct FilesystemStore {
    pub cache_dir: path::PathBuf,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for FilesystemStore {
    fn default() -> FilesystemStore {
        let cache_dir = dirs::cache_dir().unwrap().join("worksync/sessions");

        return FilesystemStore::new(cache_dir);
    }
}

impl FilesystemStore {
    pub fn new(cache_dir: path::PathBuf) -> FilesystemStore {
        let (events, _) = broadcast::channel(64);

        return FilesystemStore { cache_dir, events };
    }

    fn session_path(&self, id: &str) -> path::PathBuf {
        return self.cache_dir.join(format!("{id}.yaml"));
    }

    fn artifact_path(&self, id: &str) -> path::PathBuf {
        return self.cache_dir.join(format!("{id}{ARTIFACT_SUFFIX}"));
    }

    fn is_session_file(file_name: &str) -> bool {
        return file_name.ends_with(".yaml") && !file_name.ends_with(ARTIFACT_SUFFIX);
    }

    fn emit_page_changed(&self) {
        // No receivers is fine; the daemon may not have subscribed yet.
        let _ = self.events.send(StoreEvent::PageChanged);
    }

    async fn session_paths(&self) -> Result<Vec<path::PathBuf>> {
        let mut paths = vec![];
        if !self.cache_dir.exists() {
            return Ok(paths);
        }

        let mut dir = fs::read_dir(&self.cache_dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let file_name = file.file_name().to_string_lossy().to_string();
            if Self::is_session_file(&file_name) {
                paths.push(file.path());
            }
        }

        return Ok(paths);
    }

    fn sort_by_create_time_desc(sessions: &mut [Session]) {
        sessions.sort_by_key(|session| return Reverse(session.create_time));
    }
}

#[async_trait]
impl SessionStore for FilesystemStore {
    /// Writes the session row, splitting the large cached diff payload into
    /// a sibling artifact file so directory scans stay cheap. An unset diff
    /// payload leaves any existing artifact alone.
    async fn upsert(&self, session: &Session) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).await?;
        }

        let mut row = session.clone();
        if let Some(diffs) = row.cached_latest_diffs.take() {
            let mut artifact = fs::File::create(self.artifact_path(&session.id)).await?;
            artifact.write_all(diffs.as_bytes()).await?;
        }

        let payload = serde_yaml::to_string(&row)?;
        let mut file = fs::File::create(self.session_path(&session.id)).await?;
        file.write_all(payload.as_bytes()).await?;

        self.emit_page_changed();
        return Ok(());
    }

    async fn fetch_count(&self) -> Result<usize> {
        return Ok(self.session_paths().await?.len());
    }

    async fn fetch_page(&self, limit: usize) -> Result<Vec<Session>> {
        let mut sessions = self.fetch_all().await?;
        sessions.truncate(limit);
        return Ok(sessions);
    }

    /// Returns the complete record, rejoining the diff artifact when one
    /// exists.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Session>> {
        let file_path = self.session_path(id);
        if !file_path.exists() {
            return Ok(None);
        }

        let payload = fs::read_to_string(file_path).await?;
        let mut session: Session = serde_yaml::from_str(&payload)?;

        let artifact_path = self.artifact_path(id);
        if artifact_path.exists() {
            session.cached_latest_diffs = Some(fs::read_to_string(artifact_path).await?);
        }

        return Ok(Some(session));
    }

    /// Returns every row without rejoining diff artifacts, keeping full
    /// scans cheap for pagination and reconciliation.
    async fn fetch_all(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = vec![];

        for file_path in self.session_paths().await? {
            let payload = fs::read_to_string(file_path).await?;
            let session: Session = serde_yaml::from_str(&payload)?;
            sessions.push(session);
        }

        Self::sort_by_create_time_desc(&mut sessions);
        return Ok(sessions);
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let file_path = self.session_path(id);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        self.emit_page_changed();
        return Ok(());
    }

    async fn purge_artifacts(&self, id: &str) -> Result<()> {
        let file_path = self.artifact_path(id);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }

    /// Deletes rows that cannot be read back. Any deletion means local state
    /// no longer reflects the remote, so the report asks the caller for a
    /// forced remote refresh.
    async fn validate(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        for file_path in self.session_paths().await? {
            report.scanned += 1;

            let corrupted = match fs::read_to_string(&file_path).await {
                Ok(payload) => {
                    payload.trim().is_empty() || serde_yaml::from_str::<Session>(&payload).is_err()
                }
                Err(_) => true,
            };

            if corrupted {
                tracing::warn!(path = ?file_path, "Deleting corrupted session row");
                fs::remove_file(&file_path).await?;
                report.repaired += 1;
            }
        }

        report.needs_full_refresh = report.repaired > 0;

        if report.repaired > 0 {
            self.emit_page_changed();
        }

        return Ok(report);
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        return self.events.subscribe();
    }
}
