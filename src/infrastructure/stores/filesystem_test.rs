use anyhow::Result;
use chrono::TimeZone;
use chrono::Utc;
use test_utils::corrupt_session_fixture;
use test_utils::empty_session_fixture;
use test_utils::session_yaml_fixture;
use test_utils::session_yaml_with_activities_fixture;

use super::FilesystemStore;
use crate::domain::models::Session;
use crate::domain::models::SessionState;
use crate::domain::models::SessionStore;
use crate::domain::models::StoreEvent;

fn store() -> (tempfile::TempDir, FilesystemStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemStore::new(dir.path().to_path_buf());
    return (dir, store);
}

fn session(id: &str, created_mins_ago: i64) -> Session {
    return Session {
        id: id.to_string(),
        state: SessionState::InProgress,
        prompt: "prompt".to_string(),
        title: "title".to_string(),
        create_time: Some(Utc::now() - chrono::Duration::minutes(created_mins_ago)),
        update_time: Some(Utc::now()),
        ..Session::default()
    };
}

fn write_fixture(dir: &tempfile::TempDir, file_name: &str, payload: &str) {
    std::fs::write(dir.path().join(file_name), payload).unwrap();
}

#[tokio::test]
async fn it_round_trips_sessions() -> Result<()> {
    let (_dir, store) = store();
    let session = session("sess-1", 5);

    store.upsert(&session).await?;
    let fetched = store.fetch_by_id("sess-1").await?.unwrap();

    assert_eq!(fetched, session);
    assert_eq!(store.fetch_count().await?, 1);
    return Ok(());
}

#[tokio::test]
async fn it_splits_diff_payloads_into_artifact_files() -> Result<()> {
    let (dir, store) = store();
    let mut with_diffs = session("sess-1", 5);
    with_diffs.cached_latest_diffs = Some("diff --git a/uploader.rs".to_string());

    store.upsert(&with_diffs).await?;

    assert!(dir.path().join("sess-1.diffs.yaml").exists());

    // The row itself stays light; the full record rejoins the artifact.
    let row = std::fs::read_to_string(dir.path().join("sess-1.yaml"))?;
    assert!(!row.contains("diff --git"));

    let fetched = store.fetch_by_id("sess-1").await?.unwrap();
    assert_eq!(fetched.cached_latest_diffs, with_diffs.cached_latest_diffs);

    // Scans skip the artifact and never count it as a row.
    assert_eq!(store.fetch_count().await?, 1);
    let all = store.fetch_all().await?;
    assert_eq!(all[0].cached_latest_diffs, None);
    return Ok(());
}

#[tokio::test]
async fn it_keeps_artifacts_when_the_diff_field_is_unset() -> Result<()> {
    let (dir, store) = store();
    let mut with_diffs = session("sess-1", 5);
    with_diffs.cached_latest_diffs = Some("diff --git a/uploader.rs".to_string());
    store.upsert(&with_diffs).await?;

    // A list-endpoint merge writes the row back without the diff payload.
    let without_diffs = session("sess-1", 5);
    store.upsert(&without_diffs).await?;

    assert!(dir.path().join("sess-1.diffs.yaml").exists());
    return Ok(());
}

#[tokio::test]
async fn it_pages_by_create_time_descending() -> Result<()> {
    let (_dir, store) = store();
    store.upsert(&session("oldest", 30)).await?;
    store.upsert(&session("newest", 1)).await?;
    store.upsert(&session("middle", 10)).await?;

    let page = store.fetch_page(2).await?;

    let ids: Vec<&str> = page.iter().map(|session| return session.id.as_str()).collect();
    assert_eq!(ids, vec!["newest", "middle"]);
    return Ok(());
}

#[tokio::test]
async fn it_deletes_rows_and_purges_artifacts() -> Result<()> {
    let (dir, store) = store();
    let mut with_diffs = session("sess-1", 5);
    with_diffs.cached_latest_diffs = Some("diff".to_string());
    store.upsert(&with_diffs).await?;

    store.delete("sess-1").await?;
    store.purge_artifacts("sess-1").await?;

    assert!(!dir.path().join("sess-1.yaml").exists());
    assert!(!dir.path().join("sess-1.diffs.yaml").exists());
    assert_eq!(store.fetch_count().await?, 0);

    // Deleting something absent stays quiet.
    store.delete("sess-1").await?;
    store.purge_artifacts("sess-1").await?;
    return Ok(());
}

#[tokio::test]
async fn it_reads_persisted_fixture_rows() -> Result<()> {
    let (dir, store) = store();
    write_fixture(
        &dir,
        "fixture.yaml",
        &session_yaml_with_activities_fixture("fixture"),
    );

    let fetched = store.fetch_by_id("fixture").await?.unwrap();

    assert_eq!(fetched.state, SessionState::Completed);
    assert_eq!(fetched.activities.as_ref().unwrap().len(), 2);
    assert_eq!(
        fetched.create_time,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
    );
    return Ok(());
}

mod validate {
    use super::*;

    #[tokio::test]
    async fn it_repairs_corrupted_rows() -> Result<()> {
        let (dir, store) = store();
        write_fixture(
            &dir,
            "good.yaml",
            &session_yaml_fixture("good", "inProgress", "2024-03-01T10:00:00Z"),
        );
        write_fixture(&dir, "broken.yaml", corrupt_session_fixture());
        write_fixture(&dir, "empty.yaml", empty_session_fixture());

        let report = store.validate().await?;

        assert_eq!(report.scanned, 3);
        assert_eq!(report.repaired, 2);
        assert!(report.needs_full_refresh);
        assert_eq!(store.fetch_count().await?, 1);
        return Ok(());
    }

    #[tokio::test]
    async fn it_keeps_a_healthy_store_untouched() -> Result<()> {
        let (dir, store) = store();
        write_fixture(
            &dir,
            "a.yaml",
            &session_yaml_fixture("a", "queued", "2024-03-01T10:00:00Z"),
        );
        write_fixture(
            &dir,
            "b.yaml",
            &session_yaml_fixture("b", "completed", "2024-03-02T10:00:00Z"),
        );

        let report = store.validate().await?;

        assert_eq!(report.scanned, 2);
        assert_eq!(report.repaired, 0);
        assert!(!report.needs_full_refresh);
        return Ok(());
    }

    #[tokio::test]
    async fn it_asks_for_a_refresh_after_any_repair() -> Result<()> {
        let (dir, store) = store();
        write_fixture(
            &dir,
            "a.yaml",
            &session_yaml_fixture("a", "queued", "2024-03-01T10:00:00Z"),
        );
        write_fixture(
            &dir,
            "b.yaml",
            &session_yaml_fixture("b", "completed", "2024-03-02T10:00:00Z"),
        );
        write_fixture(&dir, "broken.yaml", corrupt_session_fixture());

        let report = store.validate().await?;

        // Even a single deleted row means local state no longer mirrors the
        // remote, so the caller must recover it with a forced refresh.
        assert_eq!(report.repaired, 1);
        assert!(report.needs_full_refresh);
        return Ok(());
    }

    #[tokio::test]
    async fn it_handles_an_empty_store() -> Result<()> {
        let (_dir, store) = store();

        let report = store.validate().await?;

        assert_eq!(report.scanned, 0);
        assert!(!report.needs_full_refresh);
        return Ok(());
    }
}

#[tokio::test]
async fn it_emits_page_changed_on_writes() -> Result<()> {
    let (_dir, store) = store();
    let mut events = store.subscribe();

    store.upsert(&session("sess-1", 5)).await?;
    assert_eq!(events.recv().await?, StoreEvent::PageChanged);

    store.delete("sess-1").await?;
    assert_eq!(events.recv().await?, StoreEvent::PageChanged);
    return Ok(());
}
