use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use super::Session;

/// Emitted whenever a write could affect the observed page. The store may
/// emit on writes that leave the page unchanged; consumers deduplicate by
/// value equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    PageChanged,
}

/// Outcome of the startup corruption scan.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    pub scanned: usize,
    /// Unreadable or undecodable rows that were deleted.
    pub repaired: usize,
    /// Set when any row had to be deleted; the caller should force a full
    /// remote refresh to restore the missing records.
    pub needs_full_refresh: bool,
}

/// Durable keyed storage for sessions. The sync controller is the single
/// writer; readers may query concurrently through their own handles.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upsert(&self, session: &Session) -> Result<()>;

    async fn fetch_count(&self) -> Result<usize>;

    /// The read view: up to `limit` sessions ordered by create time
    /// descending.
    async fn fetch_page(&self, limit: usize) -> Result<Vec<Session>>;

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn fetch_all(&self) -> Result<Vec<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Removes large cached artifacts (diff payloads) associated with a
    /// session, used when the session itself is deleted.
    async fn purge_artifacts(&self, id: &str) -> Result<()>;

    /// Scans for corrupted rows at startup, deleting what cannot be read.
    async fn validate(&self) -> Result<ValidationReport>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
