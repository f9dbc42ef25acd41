use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use super::Session;

/// Typed errors for the remote boundary. Everything else rides through
/// `anyhow`, but not-found has to stay matchable because single-session
/// fetches treat it as an authoritative deletion signal rather than a
/// failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session {0} was not found upstream")]
    NotFound(String),
    #[error("request failed with status {0}")]
    Status(u16),
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    return matches!(err.downcast_ref::<ApiError>(), Some(ApiError::NotFound(_)));
}

/// One page from the remote list endpoint. A missing `next_page_token` means
/// there are no further pages.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub next_page_token: Option<String>,
}

/// The remote collection of sessions. List responses intentionally omit
/// heavyweight per-session data such as activities; single-session fetches
/// return the complete record.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Used at startup to verify the backend is reachable before the polling
    /// cadence starts.
    async fn health_check(&self) -> Result<()>;

    async fn list_sessions(
        &self,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<SessionPage>;

    /// Fetches a single complete session. A missing record surfaces as
    /// [`ApiError::NotFound`].
    async fn fetch_session(&self, id: &str) -> Result<Session>;

    /// Pushes locally-edited fields upstream and returns the record as the
    /// remote now sees it.
    async fn update_session(&self, session: &Session) -> Result<Session>;
}
