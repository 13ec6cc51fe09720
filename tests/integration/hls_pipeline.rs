use mockito::Server;

use downpour::{DownloadStatus, QualityTier};

use crate::common::{self, TestContext, builders};

#[tokio::test]
async fn test_hls_download_selects_best_variant_and_combines() {
    let mut server = Server::new_async().await;

    // Only the 2000000 variant's media playlist is mocked; picking the
    // 800000 entry would fail the download outright.
    let master = builders::master_playlist(&[
        (800_000, "low/playlist.m3u8"),
        (2_000_000, "high/playlist.m3u8"),
    ]);
    server
        .mock("GET", "/vod/master.m3u8")
        .with_header("content-type", "application/vnd.apple.mpegurl")
        .with_body(master)
        .create_async()
        .await;

    let media = builders::media_playlist(&[
        ("seg0.ts", 9.5),
        ("seg1.ts", 9.5),
        ("seg2.ts", 9.5),
        ("seg3.ts", 8.0),
    ]);
    let high_playlist = server
        .mock("GET", "/vod/high/playlist.m3u8")
        .with_header("content-type", "application/vnd.apple.mpegurl")
        .with_body(media)
        .create_async()
        .await;

    // Segment sizes 10, 20, 15, 5: combined output must be exactly 50
    // bytes in index order.
    let payloads: [Vec<u8>; 4] = [vec![0u8; 10], vec![1u8; 20], vec![2u8; 15], vec![3u8; 5]];
    for (i, payload) in payloads.iter().enumerate() {
        server
            .mock("GET", format!("/vod/high/seg{i}.ts").as_str())
            .with_body(payload)
            .create_async()
            .await;
    }

    let ctx = TestContext::new().await;
    let url = format!("{}/vod/master.m3u8", server.url());
    let id = ctx
        .registry
        .start_download(
            &builders::episode(1399, "Game of Thrones"),
            &url,
            QualityTier::High,
            Some(1),
            Some(1),
            Some("Winter Is Coming".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), "tv_1399_s1_e1");

    common::wait_for_status(&ctx.registry, &id, DownloadStatus::Completed).await;
    high_playlist.assert_async().await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(record.progress, 100.0);
    assert_eq!(record.total_bytes, 50);
    assert!(record.file_path.to_string_lossy().ends_with(".ts"));

    let combined = std::fs::read(&record.file_path).unwrap();
    assert_eq!(combined.len(), 50);
    assert_eq!(&combined[..10], &payloads[0][..]);
    assert_eq!(&combined[10..30], &payloads[1][..]);
    assert_eq!(&combined[30..45], &payloads[2][..]);
    assert_eq!(&combined[45..], &payloads[3][..]);

    // Scratch directory is cleaned up after combination
    let scratch = ctx.download_dir.join(".segments").join(id.as_str());
    assert!(!scratch.exists());
}

#[tokio::test]
async fn test_hls_segment_failure_cleans_up_everything() {
    let mut server = Server::new_async().await;

    let media = builders::media_playlist(&[
        ("seg0.ts", 4.0),
        ("seg1.ts", 4.0),
        ("seg2.ts", 4.0),
        ("seg3.ts", 4.0),
    ]);
    server
        .mock("GET", "/vod/playlist.m3u8")
        .with_body(media)
        .create_async()
        .await;

    server
        .mock("GET", "/vod/seg0.ts")
        .with_body(b"segment zero")
        .create_async()
        .await;
    server
        .mock("GET", "/vod/seg1.ts")
        .with_body(b"segment one")
        .create_async()
        .await;
    // Segment 2 breaks; 3 would succeed but must never be fetched
    server
        .mock("GET", "/vod/seg2.ts")
        .with_status(500)
        .create_async()
        .await;
    let last_segment = server
        .mock("GET", "/vod/seg3.ts")
        .with_body(b"segment three")
        .expect(0)
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/vod/playlist.m3u8", server.url());
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

    common::wait_for_record(&ctx.registry, &id, "it fails", |r| {
        r.status == DownloadStatus::Failed
    })
    .await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    let error = record.error.expect("failed record carries its error");
    assert!(error.contains("Segment 2"), "unexpected error: {error}");

    // No orphaned data: neither scratch directory nor partial output
    let scratch = ctx.download_dir.join(".segments").join(id.as_str());
    assert!(!scratch.exists());
    assert!(!record.file_path.exists());
    last_segment.assert_async().await;
}

#[tokio::test]
async fn test_hls_segment_uris_resolve_three_ways() {
    let mut server = Server::new_async().await;

    // Relative, leading-slash, and absolute segment URIs in one playlist
    let media = format!(
        "#EXTM3U\n\
         #EXT-X-TARGETDURATION:4\n\
         #EXTINF:4.0,\nrelative.ts\n\
         #EXTINF:4.0,\n/rooted/seg.ts\n\
         #EXTINF:4.0,\n{}/elsewhere/seg.ts\n\
         #EXT-X-ENDLIST\n",
        server.url()
    );
    server
        .mock("GET", "/vod/nested/playlist.m3u8")
        .with_body(media)
        .create_async()
        .await;

    server
        .mock("GET", "/vod/nested/relative.ts")
        .with_body(b"aaaa")
        .create_async()
        .await;
    server
        .mock("GET", "/rooted/seg.ts")
        .with_body(b"bbbb")
        .create_async()
        .await;
    server
        .mock("GET", "/elsewhere/seg.ts")
        .with_body(b"cccc")
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/vod/nested/playlist.m3u8", server.url());
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

    let record = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(std::fs::read(&record.file_path).unwrap(), b"aaaabbbbcccc");
}

#[tokio::test]
async fn test_unparseable_playlist_fails_with_parse_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/vod/playlist.m3u8")
        .with_body("this is not a playlist")
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/vod/playlist.m3u8", server.url());
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

    common::wait_for_record(&ctx.registry, &id, "it fails", |r| {
        r.status == DownloadStatus::Failed
    })
    .await;

    let record = ctx.registry.get_download(&id).await.unwrap();
    let error = record.error.expect("failed record carries its error");
    assert!(
        error.to_lowercase().contains("playlist"),
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn test_direct_media_playlist_skips_variant_selection() {
    let mut server = Server::new_async().await;

    let media = builders::media_playlist(&[("only.ts", 6.0)]);
    server
        .mock("GET", "/vod/playlist.m3u8")
        .with_body(media)
        .create_async()
        .await;
    server
        .mock("GET", "/vod/only.ts")
        .with_body(b"single segment")
        .create_async()
        .await;

    let ctx = TestContext::new().await;
    let url = format!("{}/vod/playlist.m3u8", server.url());
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

    let record = ctx.registry.get_download(&id).await.unwrap();
    assert_eq!(std::fs::read(&record.file_path).unwrap(), b"single segment");
    assert_eq!(record.total_bytes, "single segment".len() as u64);
}
