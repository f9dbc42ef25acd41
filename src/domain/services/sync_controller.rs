#[cfg(test)]
#[path = "sync_controller_test.rs"]
mod tests;

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;

use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::time;

use super::PrioritySemaphore;
use super::RateLimiter;
use crate::domain::models::is_not_found;
use crate::domain::models::Session;
use crate::domain::models::SessionApi;
use crate::domain::models::SessionState;
use crate::domain::models::SessionStore;
use crate::domain::models::SettingKey;
use crate::domain::models::SettingsStore;
use crate::domain::models::SyncState;

/// Non-bypassed refreshes within this interval of the last successful one
/// are silent no-ops; the polling cadence is the retry mechanism.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const EMPTY_PAGE_RETRIES: usize = 3;
const EMPTY_PAGE_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Default)]
struct CycleFlags {
    refresh_in_flight: bool,
    pending_bypass_refresh: bool,
    pending_load_more: bool,
}

enum PendingWork {
    BypassRefresh,
    LoadMore,
}

/// Orchestrates refresh, load-more, and reconciliation cycles against the
/// store and the remote API. At most one refresh cycle is ever in flight;
/// overlapping callers coalesce into at most one pending bypass-refresh and
/// one pending load-more, drained when the in-flight cycle finishes.
pub struct SyncController {
    store: Arc<dyn SessionStore>,
    api: Arc<dyn SessionApi>,
    settings: Arc<dyn SettingsStore>,
    rate_limiter: Arc<RateLimiter>,
    semaphore: Arc<PrioritySemaphore>,
    page_size: usize,
    sync_state_tx: watch::Sender<SyncState>,
    limit_tx: watch::Sender<usize>,
    cycle: Mutex<CycleFlags>,
    cache_trust_spent: AtomicBool,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        api: Arc<dyn SessionApi>,
        settings: Arc<dyn SettingsStore>,
        rate_limiter: Arc<RateLimiter>,
        semaphore: Arc<PrioritySemaphore>,
        page_size: usize,
    ) -> SyncController {
        let (sync_state_tx, _) = watch::channel(SyncState::Idle);
        let (limit_tx, _) = watch::channel(page_size);

        return SyncController {
            store,
            api,
            settings,
            rate_limiter,
            semaphore,
            page_size,
            sync_state_tx,
            limit_tx,
            cycle: Mutex::new(CycleFlags::default()),
            cache_trust_spent: AtomicBool::new(false),
        };
    }

    /// The published sync state. Exactly one value at a time; receivers see
    /// deduplicated updates.
    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        return self.sync_state_tx.subscribe();
    }

    pub fn current_sync_state(&self) -> SyncState {
        return self.sync_state_tx.borrow().clone();
    }

    /// The number of rows the read view currently exposes from the store.
    pub fn limit(&self) -> watch::Receiver<usize> {
        return self.limit_tx.subscribe();
    }

    pub fn current_limit(&self) -> usize {
        return *self.limit_tx.borrow();
    }

    /// Refreshes the head page from the remote list endpoint. While another
    /// refresh is in flight, a bypassing call is recorded as pending instead
    /// of running concurrently; a non-bypassing call is dropped.
    pub async fn refresh(&self, bypass_rate_limit: bool) {
        {
            let mut cycle = self.cycle.lock().await;
            if cycle.refresh_in_flight {
                if bypass_rate_limit {
                    cycle.pending_bypass_refresh = true;
                }
                return;
            }
            cycle.refresh_in_flight = true;
        }

        self.run_refresh(bypass_rate_limit).await;
        self.drain_pending().await;
    }

    /// Explicit recovery path: bypasses the minimum-interval throttle, resets
    /// the pagination cursor, retries a transient empty first page, and
    /// reconciles local records against the incoming set — terminal records
    /// absent upstream are deleted (with their cached artifacts), active ones
    /// are force-transitioned to `CompletedUnknown`.
    pub async fn force_refresh_from_api(&self) {
        {
            let mut cycle = self.cycle.lock().await;
            if cycle.refresh_in_flight {
                cycle.pending_bypass_refresh = true;
                return;
            }
            cycle.refresh_in_flight = true;
        }

        self.run_force_refresh().await;
        self.drain_pending().await;
    }

    pub async fn load_more(&self) {
        self.load_more_async(false).await;
    }

    /// Reveals more rows to the read view, preferring rows already present
    /// in the store over a network round-trip. Only when the store is
    /// exhausted relative to the requested limit does this fetch a page.
    pub async fn load_more_async(&self, bypass_rate_limit: bool) {
        let current = self.current_limit();
        let requested = current + self.page_size;

        let count = match self.store.fetch_count().await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = ?err, "Failed to count local sessions");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        };

        if count >= requested {
            self.widen_limit(requested);
            return;
        }
        if count > current {
            self.widen_limit(count);
        }

        self.fetch_more_data(bypass_rate_limit).await;
    }

    /// Fetches the next page using the persisted cursor, recovering a missing
    /// cursor with a bypassed refresh before concluding there is nothing
    /// left. Shares the refresh mutual exclusion; while a refresh is in
    /// flight this records a pending load-more instead.
    pub async fn fetch_more_data(&self, bypass_rate_limit: bool) {
        {
            let mut cycle = self.cycle.lock().await;
            if cycle.refresh_in_flight {
                cycle.pending_load_more = true;
                return;
            }
            cycle.refresh_in_flight = true;
        }

        self.run_fetch_more(bypass_rate_limit).await;
        self.drain_pending().await;
    }

    /// Pushes locally-edited fields upstream under a priority slot so user
    /// actions are never starved by background polling, then merges the
    /// remote's view of the record back into the store.
    pub async fn update_session(&self, session: &Session) -> Result<Session> {
        self.semaphore.acquire(true).await;
        self.rate_limiter.record_request().await;
        let res = self.api.update_session(session).await;
        self.semaphore.release().await;

        let remote = res?;
        let merged = session.merge_remote(&remote);
        self.store.upsert(&merged).await?;

        return Ok(merged);
    }

    /// Reconciles locally-active sessions that have gone quiet for longer
    /// than their state's threshold against the remote source of truth.
    /// Returns the number of sessions repaired or removed; transport errors
    /// leave records untouched for the next cycle and are never propagated.
    pub async fn mark_stale_sessions(&self) -> usize {
        let sessions = match self.store.fetch_all().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::error!(error = ?err, "Failed to scan local sessions for staleness");
                return 0;
            }
        };

        let now = Utc::now();
        let mut processed = 0;

        for session in sessions.iter().filter(|session| return session.is_stale_at(now)) {
            self.semaphore.acquire(false).await;
            self.rate_limiter.record_request().await;
            let res = self.api.fetch_session(&session.id).await;
            self.semaphore.release().await;

            match res {
                Ok(remote) => {
                    let merged = session.merge_remote(&remote);
                    let state_changed = merged.state != session.state;
                    if let Err(err) = self.store.upsert(&merged).await {
                        tracing::error!(error = ?err, id = session.id, "Failed to persist reconciled session");
                        continue;
                    }
                    if state_changed {
                        tracing::info!(
                            id = session.id,
                            state = ?merged.state,
                            "Reconciled stale session"
                        );
                        processed += 1;
                    }
                }
                Err(err) if is_not_found(&err) => {
                    if let Err(err) = self.delete_with_artifacts(&session.id).await {
                        tracing::error!(error = ?err, id = session.id, "Failed to delete session missing upstream");
                        continue;
                    }
                    tracing::info!(id = session.id, "Removed session missing upstream");
                    processed += 1;
                }
                Err(err) => {
                    // Retried on the next reconciliation cycle.
                    tracing::warn!(error = ?err, id = session.id, "Stale session fetch failed");
                }
            }
        }

        return processed;
    }

    /// Backfills activities for completed sessions that never had a detail
    /// fetch. The list endpoint omits them to keep responses small, so a
    /// completed session would otherwise render without its history forever.
    /// Returns the number of sessions backfilled.
    pub async fn poll_completed_activities(&self) -> usize {
        let sessions = match self.store.fetch_all().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::error!(error = ?err, "Failed to scan local sessions for activity backfill");
                return 0;
            }
        };

        let mut fetched = 0;

        let candidates = sessions.iter().filter(|session| {
            return session.state == SessionState::Completed
                && session.activities.is_none()
                && session.last_activity_poll_time.is_none();
        });

        for session in candidates {
            self.semaphore.acquire(false).await;
            self.rate_limiter.record_request().await;
            let res = self.api.fetch_session(&session.id).await;
            self.semaphore.release().await;

            match res {
                Ok(remote) => {
                    let mut merged = session.merge_remote(&remote);
                    merged.last_activity_poll_time = Some(Utc::now());
                    if let Err(err) = self.store.upsert(&merged).await {
                        tracing::error!(error = ?err, id = session.id, "Failed to persist backfilled session");
                        continue;
                    }
                    fetched += 1;
                }
                Err(err) if is_not_found(&err) => {
                    // Deletion is the force-refresh path's call; just stop
                    // retrying the backfill.
                    let mut marked = session.clone();
                    marked.last_activity_poll_time = Some(Utc::now());
                    if let Err(err) = self.store.upsert(&marked).await {
                        tracing::error!(error = ?err, id = session.id, "Failed to mark session missing upstream");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, id = session.id, "Activity backfill fetch failed");
                }
            }
        }

        return fetched;
    }

    async fn drain_pending(&self) {
        loop {
            let pending = {
                let mut cycle = self.cycle.lock().await;
                if cycle.pending_bypass_refresh {
                    cycle.pending_bypass_refresh = false;
                    Some(PendingWork::BypassRefresh)
                } else if cycle.pending_load_more {
                    cycle.pending_load_more = false;
                    Some(PendingWork::LoadMore)
                } else {
                    cycle.refresh_in_flight = false;
                    None
                }
            };

            match pending {
                Some(PendingWork::BypassRefresh) => self.run_refresh(true).await,
                Some(PendingWork::LoadMore) => self.run_fetch_more(true).await,
                None => return,
            }
        }
    }

    async fn run_refresh(&self, bypass_rate_limit: bool) {
        if bypass_rate_limit {
            self.cache_trust_spent.store(true, Ordering::SeqCst);
        } else {
            // Cold start with local data: trust the cache once for an
            // instant first page instead of hitting the network.
            if !self.cache_trust_spent.swap(true, Ordering::SeqCst) {
                let count = self.store.fetch_count().await.unwrap_or(0);
                if count > 0 {
                    tracing::debug!(count, "Serving first refresh from the local cache");
                    self.set_state(SyncState::Idle);
                    return;
                }
            }

            if self.within_min_interval().await {
                tracing::debug!("Refresh skipped, last success was under the minimum interval");
                return;
            }

            let availability = self.rate_limiter.check_availability().await;
            if !availability.can_proceed {
                tracing::debug!(wait = ?availability.wait, "Refresh skipped by the rate limiter");
                return;
            }
            if self.rate_limiter.is_approaching_limit().await {
                tracing::warn!("Approaching the remote API rate limit");
            }
        }

        self.set_state(SyncState::Loading);
        self.rate_limiter.record_request().await;

        let page = match self.api.list_sessions(self.page_size, None).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(error = ?err, "Refresh failed");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        };

        for incoming in &page.sessions {
            if let Err(err) = self.merge_upsert(incoming).await {
                tracing::error!(error = ?err, id = incoming.id, "Failed to persist refreshed session");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        }

        self.record_success(&page.next_page_token).await;
    }

    async fn run_force_refresh(&self) {
        self.cache_trust_spent.store(true, Ordering::SeqCst);
        self.set_state(SyncState::Loading);

        if let Err(err) = self.settings.remove(SettingKey::NextPageToken).await {
            tracing::warn!(error = ?err, "Failed to reset the pagination cursor");
        }

        let mut fetched = None;
        for attempt in 1..=EMPTY_PAGE_RETRIES {
            self.rate_limiter.record_request().await;
            match self.api.list_sessions(self.page_size, None).await {
                Ok(page) => {
                    // A transient empty response must not wipe real data.
                    if page.sessions.is_empty() && attempt < EMPTY_PAGE_RETRIES {
                        tracing::warn!(attempt, "Remote returned an empty first page, retrying");
                        time::sleep(EMPTY_PAGE_BACKOFF).await;
                        continue;
                    }
                    fetched = Some(page);
                    break;
                }
                Err(err) => {
                    tracing::error!(error = ?err, "Force refresh failed");
                    self.set_state(SyncState::Error(err.to_string()));
                    return;
                }
            }
        }

        let page = match fetched {
            Some(page) => page,
            None => return,
        };

        let incoming_ids: HashSet<&str> = page
            .sessions
            .iter()
            .map(|session| return session.id.as_str())
            .collect();

        for incoming in &page.sessions {
            if let Err(err) = self.merge_upsert(incoming).await {
                tracing::error!(error = ?err, id = incoming.id, "Failed to persist refreshed session");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        }

        let existing = match self.store.fetch_all().await {
            Ok(existing) => existing,
            Err(err) => {
                tracing::error!(error = ?err, "Failed to scan local sessions for deletions");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        };

        for record in existing
            .iter()
            .filter(|record| return !incoming_ids.contains(record.id.as_str()))
        {
            if record.state.is_terminal() {
                if let Err(err) = self.delete_with_artifacts(&record.id).await {
                    tracing::error!(error = ?err, id = record.id, "Failed to delete session absent upstream");
                }
                continue;
            }

            // Still active locally but gone upstream. Deleting would lose
            // client-only history, so close it out instead.
            tracing::warn!(id = record.id, "Active session absent upstream, marking completed-unknown");
            let mut repaired = record.clone();
            repaired.state = SessionState::CompletedUnknown;
            if let Err(err) = self.store.upsert(&repaired).await {
                tracing::error!(error = ?err, id = record.id, "Failed to close out session absent upstream");
            }
        }

        self.record_success(&page.next_page_token).await;
    }

    async fn run_fetch_more(&self, bypass_rate_limit: bool) {
        let mut token = self.settings.get(SettingKey::NextPageToken).await;

        if token.is_none() {
            // The cursor can legitimately go missing while more pages exist
            // (bootstrap races); repopulate it before giving up.
            tracing::debug!("Pagination cursor missing, recovering with a bypassed refresh");
            self.run_refresh(true).await;

            token = self.settings.get(SettingKey::NextPageToken).await;
            if token.is_none() {
                self.set_state(SyncState::LoadedAll);
                return;
            }
        }

        if !bypass_rate_limit {
            let availability = self.rate_limiter.check_availability().await;
            if !availability.can_proceed {
                tracing::debug!(wait = ?availability.wait, "Load more skipped by the rate limiter");
                return;
            }
        }

        self.set_state(SyncState::Loading);
        self.rate_limiter.record_request().await;

        let page = match self.api.list_sessions(self.page_size, token).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(error = ?err, "Load more failed");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        };

        for incoming in &page.sessions {
            if let Err(err) = self.merge_upsert(incoming).await {
                tracing::error!(error = ?err, id = incoming.id, "Failed to persist fetched session");
                self.set_state(SyncState::Error(err.to_string()));
                return;
            }
        }

        self.persist_cursor(&page.next_page_token).await;

        // Newly fetched rows become visible immediately.
        match self.store.fetch_count().await {
            Ok(total) => self.widen_limit(total),
            Err(err) => {
                tracing::error!(error = ?err, "Failed to count local sessions after fetch");
            }
        }

        if page.next_page_token.is_none() {
            self.set_state(SyncState::LoadedAll);
        } else {
            self.set_state(SyncState::Idle);
        }
    }

    async fn merge_upsert(&self, incoming: &Session) -> Result<()> {
        let merged = match self.store.fetch_by_id(&incoming.id).await? {
            Some(existing) => existing.merge_remote(incoming),
            None => incoming.clone(),
        };

        self.store.upsert(&merged).await?;
        return Ok(());
    }

    async fn delete_with_artifacts(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        self.store.purge_artifacts(id).await?;
        return Ok(());
    }

    async fn persist_cursor(&self, token: &Option<String>) {
        let res = match token {
            Some(token) => self.settings.set(SettingKey::NextPageToken, token).await,
            None => self.settings.remove(SettingKey::NextPageToken).await,
        };

        if let Err(err) = res {
            tracing::warn!(error = ?err, "Failed to persist the pagination cursor");
        }
    }

    async fn record_success(&self, next_page_token: &Option<String>) {
        self.persist_cursor(next_page_token).await;

        let now = Utc::now().to_rfc3339();
        if let Err(err) = self.settings.set(SettingKey::LastRefreshTime, &now).await {
            tracing::warn!(error = ?err, "Failed to persist the last refresh time");
        }

        if next_page_token.is_none() {
            self.set_state(SyncState::LoadedAll);
        } else {
            self.set_state(SyncState::Idle);
        }
    }

    async fn within_min_interval(&self) -> bool {
        let last = match self.settings.get(SettingKey::LastRefreshTime).await {
            Some(last) => last,
            None => return false,
        };

        let last = match DateTime::parse_from_rfc3339(&last) {
            Ok(last) => last.with_timezone(&Utc),
            Err(_) => return false,
        };

        let elapsed = Utc::now() - last;
        return elapsed
            < chrono::Duration::from_std(MIN_REFRESH_INTERVAL).unwrap_or_else(|_| {
                return chrono::Duration::seconds(5);
            });
    }

    fn set_state(&self, next: SyncState) {
        self.sync_state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next.clone();
            return true;
        });
    }

    fn widen_limit(&self, target: usize) {
        self.limit_tx.send_if_modified(|limit| {
            if target <= *limit {
                return false;
            }
            *limit = target;
            return true;
        });
    }
}
