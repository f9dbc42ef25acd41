use std::path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::SessionApi;
use crate::domain::models::SessionStore;
use crate::domain::models::StoreEvent;
use crate::domain::services::PollingScheduler;
use crate::domain::services::PrioritySemaphore;
use crate::domain::services::RateLimiter;
use crate::domain::services::SyncController;
use crate::infrastructure::api::HttpSessionApi;
use crate::infrastructure::stores::FilesystemSettings;
use crate::infrastructure::stores::FilesystemStore;

/// Concurrent in-flight requests against the session service.
const API_CONCURRENCY: usize = 3;
/// One-time backfill fires once the daemon has settled.
const WARMUP_DELAY: Duration = Duration::from_secs(2);

fn settings_path(session_dir: &path::Path) -> path::PathBuf {
    return session_dir
        .parent()
        .unwrap_or(session_dir)
        .join("settings.yaml");
}

/// Logs page updates as rows change underneath the published limit. Store
/// events fire on every write, so consecutive identical pages are dropped.
async fn watch_page_changes(store: Arc<FilesystemStore>, controller: Arc<SyncController>) {
    let mut events = store.subscribe();
    let mut last_page = vec![];

    while let Ok(StoreEvent::PageChanged) = events.recv().await {
        let page = match store.fetch_page(controller.current_limit()).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(error = ?err, "Failed to read the session page");
                continue;
            }
        };

        if page == last_page {
            continue;
        }

        tracing::info!(count = page.len(), "Session page updated");
        last_page = page;
    }
}

pub async fn start() -> Result<()> {
    let session_dir = path::PathBuf::from(Config::get(ConfigKey::SessionDir));
    let store = Arc::new(FilesystemStore::new(session_dir.clone()));
    let settings = Arc::new(FilesystemSettings::new(settings_path(&session_dir)));
    let api = Arc::new(HttpSessionApi::default());

    if let Err(err) = api.health_check().await {
        tracing::warn!(error = ?err, "Session service is unreachable, starting from the local cache");
    }

    let controller = Arc::new(SyncController::new(
        store.clone(),
        api,
        settings,
        Arc::new(RateLimiter::default()),
        Arc::new(PrioritySemaphore::new(API_CONCURRENCY)),
        Config::get(ConfigKey::PageSize).parse::<usize>()?,
    ));

    let report = store.validate().await?;
    if report.repaired > 0 {
        tracing::warn!(
            scanned = report.scanned,
            repaired = report.repaired,
            "Repaired corrupted session rows"
        );
    }

    if report.needs_full_refresh {
        controller.force_refresh_from_api().await;
    } else {
        controller.refresh(false).await;
    }

    let poll_interval = Config::get(ConfigKey::PollInterval).parse::<u64>()?;
    let scheduler = PollingScheduler::new(
        controller.clone(),
        Duration::from_secs(poll_interval),
        WARMUP_DELAY,
    );
    scheduler.start_polling().await;

    let mut background_futures = task::JoinSet::new();
    background_futures.spawn(watch_page_changes(store, controller));

    tokio::select!(
        _ = background_futures.join_next() => {},
        _ = tokio::signal::ctrl_c() => {},
    );

    tracing::info!("Shutting down");
    scheduler.stop_polling().await;

    return Ok(());
}
