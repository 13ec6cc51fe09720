use mockito::Server;
use std::time::Duration;

use downpour::constants::REGISTRY_STORE_KEY;
use downpour::store::KeyValueStore;
use downpour::{
    DownloadError, DownloadRecord, DownloadStatus, NotificationKind, QualityTier, derived_id,
};

use crate::common::{self, TestContext, builders};

#[tokio::test]
async fn test_single_file_download_completes() {
    let mut server = Server::new_async().await;
    let body: Vec<u8> = (0..64 * 1024).map(|i| (i % 255) as u8).collect();
    let mock = server
        .mock("GET", "/media/550.mp4")
        .with_header("content-type", "video/mp4")
        .with_body(&body)
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let mut notifications = ctx.registry.notifications();

    let url = format!("{}/media/550.mp4", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &url,
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "movie_550");

    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(record.progress, 100.0);
    assert_eq!(record.downloaded_bytes, body.len() as u64);
    assert_eq!(record.total_bytes, body.len() as u64);
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.error.is_none());
    assert_eq!(std::fs::read(&record.file_path).unwrap(), body);

    // Lifecycle notifications: start (info), then complete (success)
    let started = notifications.recv().await.unwrap();
    assert_eq!(started.kind, NotificationKind::Info);
    assert_eq!(started.message, "Download started");
    let completed = notifications.recv().await.unwrap();
    assert_eq!(completed.kind, NotificationKind::Success);
    assert_eq!(completed.message, "Download complete");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_distinct_ids_yield_distinct_records() {
    let mut server = Server::new_async().await;
    for path in ["/a.mp4", "/b.mp4"] {
        server
            .mock("GET", path)
            .with_body(b"0123456789")
            .create_async()
            .await;
    }

    let ctx = TestContext::new().await;
    let movie_id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &format!("{}/a.mp4", server.url()),
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    let episode_id = ctx
        .registry
        .start_download(
            &builders::episode(1399, "Game of Thrones"),
            &format!("{}/b.mp4", server.url()),
            QualityTier::High,
            Some(1),
            Some(1),
            Some("Winter Is Coming".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(episode_id.as_str(), "tv_1399_s1_e1");
    common::wait_for_status(&ctx.registry, &movie_id, DownloadStatus::Completed).await;
    common::wait_for_status(&ctx.registry, &episode_id, DownloadStatus::Completed).await;

    assert_eq!(ctx.registry.get_all_downloads().await.len(), 2);
    assert!(
        ctx.registry
            .is_content_downloaded(1399, downpour::ContentKind::Episode, Some(1), Some(1))
            .await
    );
    assert!(
        ctx.registry
            .get_downloaded_content_path(550, downpour::ContentKind::Movie, None, None)
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_duplicate_start_rejected_while_downloading() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/slow.mp4")
        .with_chunked_body(builders::slow_body(20, 8 * 1024, 100))
        .expect(1)
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/slow.mp4", server.url());
    let content = builders::movie(550, "Fight Club");
    let id = ctx
        .registry
        .start_download(&content, &url, QualityTier::High, None, None, None)
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Downloading).await;

    let second = ctx
        .registry
        .start_download(&content, &url, QualityTier::High, None, None, None)
        .await;
    assert!(matches!(second, Err(DownloadError::AlreadyDownloading(_))));
    assert_eq!(ctx.registry.get_all_downloads().await.len(), 1);

    ctx.registry.cancel_download(&id).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_start_completed_content_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/done.mp4")
        .with_body(b"media bytes")
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/done.mp4", server.url());
    let content = builders::movie(550, "Fight Club");
    let id = ctx
        .registry
        .start_download(&content, &url, QualityTier::High, None, None, None)
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let again = ctx
        .registry
        .start_download(&content, &url, QualityTier::High, None, None, None)
        .await;
    assert!(matches!(again, Err(DownloadError::AlreadyCompleted(_))));
}

#[tokio::test]
async fn test_pause_and_resume_retain_progress() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/slow.mp4")
        .with_chunked_body(builders::slow_body(10, 8 * 1024, 100))
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/slow.mp4", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &url,
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Downloading).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    ctx.registry.pause_download(&id).await.unwrap();
    let paused = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(paused.status, DownloadStatus::Paused);
    let frozen_progress = paused.progress;

    // Progress does not move while paused
    tokio::time::sleep(Duration::from_millis(300)).await;
    let still_paused = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(still_paused.status, DownloadStatus::Paused);
    assert_eq!(still_paused.progress, frozen_progress);

    // Pausing a paused record is rejected without touching state
    let repause = ctx.registry.pause_download(&id).await;
    assert!(matches!(repause, Err(DownloadError::InvalidState(_))));

    ctx.registry.resume_download(&id).await.unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    assert!(record.progress >= frozen_progress);
    assert_eq!(record.progress, 100.0);

    let expected: Vec<u8> = (0..10)
        .flat_map(|i| vec![(i % 251) as u8; 8 * 1024])
        .collect();
    assert_eq!(std::fs::read(&record.file_path).unwrap(), expected);
}

#[tokio::test]
async fn test_progress_updates_are_monotone() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/slow.mp4")
        .with_chunked_body(builders::slow_body(8, 8 * 1024, 60))
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/slow.mp4", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &url,
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();

    let mut updates = ctx.registry.progress_updates(&id).await;
    let collector = tokio::spawn(async move {
        let mut values = vec![updates.borrow().progress];
        while updates.changed().await.is_ok() {
            values.push(updates.borrow().progress);
        }
        values
    });

    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let values = collector.await.unwrap();
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {values:?}"
    );
    assert_eq!(*values.last().unwrap(), 100.0);
}

#[tokio::test]
async fn test_cancel_leaves_no_destination_file() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/slow.mp4")
        .with_chunked_body(builders::slow_body(30, 8 * 1024, 100))
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/slow.mp4", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &url,
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Downloading).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    ctx.registry.cancel_download(&id).await.unwrap();

    let record = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(record.status, DownloadStatus::Cancelled);

    let path = record.file_path.clone();
    common::wait_until("partial file is removed", || !path.exists()).await;

    // Cancelling again is rejected: the record is terminal
    let again = ctx.registry.cancel_download(&id).await;
    assert!(matches!(again, Err(DownloadError::InvalidState(_))));
}

#[tokio::test]
async fn test_delete_completed_removes_every_file() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/media.mp4")
        .with_body(b"media bytes")
        .create_async()
        .await;
    server
        .mock("GET", "/poster.jpg")
        .with_header("content-type", "image/jpeg")
        .with_body(b"jpeg bytes")
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let mut content = builders::movie(550, "Fight Club");
    content.poster_path = Some(format!("{}/poster.jpg", server.url()));

    let url = format!("{}/media.mp4", server.url());
    let id = ctx
        .registry
        .start_download(&content, &url, QualityTier::High, None, None, None)
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    let thumbnail = record.thumbnail_path.clone().expect("thumbnail fetched");
    assert!(thumbnail.exists());
    assert!(!record.subtitle_paths.is_empty());
    let subtitle = record.subtitle_paths[0].clone();
    assert!(subtitle.exists());
    assert!(record.file_path.exists());

    ctx.registry.delete_download(&id).await.unwrap();

    assert!(!record.file_path.exists());
    assert!(!thumbnail.exists());
    assert!(!subtitle.exists());
    assert!(ctx.registry.get_download(&id).await.is_none());
    assert!(ctx.registry.get_all_downloads().await.is_empty());
}

#[tokio::test]
async fn test_records_survive_restart() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/media.mp4")
        .with_body(b"media bytes")
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/media.mp4", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &url,
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let restarted = ctx.restart().await;
    let record = restarted.get_download(&id).await.unwrap();
    assert_eq!(record.status, DownloadStatus::Completed);
    assert!(
        restarted
            .is_content_downloaded(550, downpour::ContentKind::Movie, None, None)
            .await
    );
}

#[tokio::test]
async fn test_interrupted_records_restore_as_paused() {
    let ctx = TestContext::new().await;

    let content = builders::movie(42, "Interrupted");
    let mut record = DownloadRecord::new(
        derived_id(42, downpour::ContentKind::Movie, None, None),
        &content,
        "https://cdn.example.com/media/42.mp4",
        QualityTier::High,
        None,
        None,
        None,
        ctx.download_dir.join("movie_42_high.mp4"),
    );
    record.status = DownloadStatus::Downloading;
    record.progress = 37.5;
    let raw = serde_json::to_string(&vec![record]).unwrap();
    ctx.store.set(REGISTRY_STORE_KEY, &raw).await.unwrap();

    let restarted = ctx.restart().await;
    let restored = restarted
        .get_download(&derived_id(42, downpour::ContentKind::Movie, None, None))
        .await
        .unwrap();
    // The snapshot said a transfer was live, but no task survives a restart
    assert_eq!(restored.status, DownloadStatus::Paused);
    assert_eq!(restored.progress, 37.5);
}

#[tokio::test]
async fn test_operations_on_unknown_id_fail() {
    let ctx = TestContext::new().await;
    let id = derived_id(999, downpour::ContentKind::Movie, None, None);

    assert!(matches!(
        ctx.registry.pause_download(&id).await,
        Err(DownloadError::DownloadNotFound(_))
    ));
    assert!(matches!(
        ctx.registry.resume_download(&id).await,
        Err(DownloadError::DownloadNotFound(_))
    ));
    assert!(matches!(
        ctx.registry.cancel_download(&id).await,
        Err(DownloadError::DownloadNotFound(_))
    ));
    assert!(matches!(
        ctx.registry.delete_download(&id).await,
        Err(DownloadError::DownloadNotFound(_))
    ));
}

#[tokio::test]
async fn test_resume_requires_paused() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/slow.mp4")
        .with_chunked_body(builders::slow_body(10, 8 * 1024, 100))
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/slow.mp4", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &url,
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Downloading).await;

    let resumed = ctx.registry.resume_download(&id).await;
    assert!(matches!(resumed, Err(DownloadError::NotPaused(_))));

    ctx.registry.cancel_download(&id).await.unwrap();
}

#[tokio::test]
async fn test_cleanup_failed_downloads() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/ok.mp4")
        .with_body(b"media bytes")
        .create_async()
        .await;
    server
        .mock("GET", "/missing.mp4")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/slow.mp4")
        .with_chunked_body(builders::slow_body(20, 8 * 1024, 100))
        .create_async()
        .await;

    let ctx = TestContext::new().await;

    let completed = ctx
        .registry
        .start_download(
            &builders::movie(1, "Completes"),
            &format!("{}/ok.mp4", server.url()),
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    let failed = ctx
        .registry
        .start_download(
            &builders::movie(2, "Fails"),
            &format!("{}/missing.mp4", server.url()),
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    let cancelled = ctx
        .registry
        .start_download(
            &builders::movie(3, "Gets cancelled"),
            &format!("{}/slow.mp4", server.url()),
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();

    common::wait_for_status(&ctx.registry, &completed, DownloadStatus::Completed).await;
    common::wait_for_status(&ctx.registry, &cancelled, DownloadStatus::Downloading).await;
    ctx.registry.cancel_download(&cancelled).await.unwrap();

    common::wait_for_record(&ctx.registry, &failed, "it fails", |r| {
        r.status == DownloadStatus::Failed
    })
    .await;

    let removed = ctx.registry.cleanup_failed_downloads().await.unwrap();
    assert_eq!(removed, 2);

    let remaining = ctx.registry.get_all_downloads().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, completed);
}

#[tokio::test]
async fn test_failed_download_carries_error_message() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/missing.mp4")
        .with_status(404)
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let mut notifications = ctx.registry.notifications();

    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &format!("{}/missing.mp4", server.url()),
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();

    common::wait_for_record(&ctx.registry, &id, "it fails", |r| {
        r.status == DownloadStatus::Failed
    })
    .await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    let error = record.error.expect("failed record carries its error");
    assert!(error.contains("404"), "unexpected error message: {error}");

    // start (info) then failure (error) with the underlying message
    let started = notifications.recv().await.unwrap();
    assert_eq!(started.kind, NotificationKind::Info);
    let failure = notifications.recv().await.unwrap();
    assert_eq!(failure.kind, NotificationKind::Error);
    assert!(failure.message.contains("404"));
}

#[tokio::test]
async fn test_storage_summary_counts_completed_bytes() {
    let mut server = Server::new_async().await;
    let body = vec![9u8; 2048];
    server
        .mock("GET", "/media.mp4")
        .with_body(&body)
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let id = ctx
        .registry
        .start_download(
            &builders::movie(550, "Fight Club"),
            &format!("{}/media.mp4", server.url()),
            QualityTier::High,
            None,
            None,
            None,
        )
        .await
        .unwrap();
    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;

    let summary = ctx.registry.storage_summary().await.unwrap();
    assert_eq!(summary.total_records, 1);
    assert_eq!(summary.completed_records, 1);
    assert_eq!(summary.completed_bytes, body.len() as u64);
    assert!(summary.free_bytes > 0);
}
