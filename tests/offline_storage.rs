mod common;

use common::{file_id, setup_engine, setup_engine_with, wait_until, MB};
use kingshare_offline::application::services::DownloadOptions;
use kingshare_offline::domain::entities::offline::{DownloadProgress, FileItem};
use kingshare_offline::domain::value_objects::offline::{
    DownloadStatus, FileSyncStatus, NetworkKind, NetworkState,
};
use kingshare_offline::shared::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn text_item(id: &str, size: u64) -> FileItem {
    FileItem::file(file_id(id), format!("{id}.txt"), size).with_mime_type("text/plain")
}

async fn download(env: &common::TestEngine, id: &str, body: Vec<u8>) {
    let size = body.len() as u64;
    env.remote.put_file(id, body).await;
    env.engine
        .manager()
        .download_for_offline(&text_item(id, size), DownloadOptions::default())
        .await
        .expect("download");
}

#[tokio::test]
async fn cleanup_never_evicts_modified_files() {
    let env = setup_engine().await;
    download(&env, "a", vec![b'a'; 100]).await;
    download(&env, "b", vec![b'b'; 200]).await;
    download(&env, "c", vec![b'c'; 300]).await;
    env.engine
        .editing()
        .save_document_offline(&file_id("b"), "local change", None)
        .await
        .unwrap();

    let report = env.engine.cache().cleanup(10_000).await.unwrap();

    assert!(!report.evicted.contains(&file_id("b")));
    assert_eq!(report.evicted.len(), 2);
    assert_eq!(report.freed_bytes, 400);
    let remaining = env.engine.cache().list().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].sync_status, FileSyncStatus::Modified);
    assert!(env.engine.cache().is_available(&file_id("b")).await.unwrap());
}

#[tokio::test]
async fn cleanup_stops_once_target_is_met() {
    let env = setup_engine().await;
    download(&env, "a", vec![b'a'; 100]).await;
    download(&env, "b", vec![b'b'; 200]).await;
    download(&env, "c", vec![b'c'; 300]).await;

    let report = env.engine.cache().cleanup(50).await.unwrap();

    assert_eq!(report.evicted.len(), 1);
    assert!(report.freed_bytes >= 50);
    assert_eq!(env.engine.cache().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn oversized_download_is_rejected_without_cache_entry() {
    let env = setup_engine_with(|config| {
        config.storage.max_storage_size = 5 * MB;
        config.storage.max_file_size = 5 * MB;
    })
    .await;
    let item = text_item("file-42", 10 * MB);

    let validation = env
        .engine
        .manager()
        .validate_storage_space(10 * MB)
        .await
        .unwrap();
    assert!(!validation.can_download);
    assert_eq!(
        validation.message.as_deref(),
        Some("Insufficient storage space. Need 10 MB, but only 5 MB available.")
    );

    let result = env
        .engine
        .manager()
        .download_for_offline(&item, DownloadOptions::default())
        .await;

    assert!(matches!(result, Err(AppError::ValidationError(_))));
    assert!(env.engine.cache().get(&item.id).await.unwrap().is_none());
    assert_eq!(env.remote.fetches(), 0);
}

#[tokio::test]
async fn downloads_require_network_and_respect_wifi_only() {
    let env = setup_engine().await;
    env.remote.put_file("doc-1", "body").await;
    let item = text_item("doc-1", 4);

    env.go_offline().await;
    let offline = env
        .engine
        .manager()
        .download_for_offline(&item, DownloadOptions::default())
        .await;
    assert!(matches!(offline, Err(AppError::Network(_))));

    env.network
        .set_state(NetworkState::online(NetworkKind::Cellular))
        .await;
    let metered = env
        .engine
        .manager()
        .download_for_offline(&item, DownloadOptions::default())
        .await;
    assert!(matches!(metered, Err(AppError::ValidationError(_))));

    let allowed = env
        .engine
        .manager()
        .download_for_offline(
            &item,
            DownloadOptions {
                allow_metered: true,
                ..DownloadOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(allowed.size, 4);
    assert_eq!(
        env.engine
            .editing()
            .get_offline_document_content(&item.id)
            .await
            .unwrap()
            .as_deref(),
        Some("body")
    );
}

#[tokio::test]
async fn cancelled_download_reports_cancelled_and_leaves_no_entry() {
    let env = setup_engine().await;
    env.remote.put_file("big", vec![0u8; 1024]).await;
    let events: Arc<Mutex<Vec<DownloadProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = env
        .engine
        .events()
        .on_download_progress(move |progress| sink.lock().unwrap().push(progress.clone()));
    let _gate = env.remote.hold().await;

    let manager = Arc::clone(env.engine.manager());
    let item = text_item("big", 1024);
    let task_item = item.clone();
    let handle = tokio::spawn(async move {
        manager
            .download_for_offline(&task_item, DownloadOptions::default())
            .await
    });
    let remote = &env.remote;
    assert!(wait_until(Duration::from_secs(5), || async move { remote.entered() >= 1 }).await);
    assert!(env.engine.manager().is_download_in_progress(&item.id));

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let statuses: Vec<DownloadStatus> = events
        .lock()
        .unwrap()
        .iter()
        .map(|progress| progress.status)
        .collect();
    assert_eq!(statuses.first(), Some(&DownloadStatus::Downloading));
    assert_eq!(statuses.last(), Some(&DownloadStatus::Cancelled));
    assert!(!env.engine.manager().is_download_in_progress(&item.id));
    assert!(env.engine.cache().get(&item.id).await.unwrap().is_none());
}

#[tokio::test]
async fn auto_download_fetches_small_starred_files() {
    let env = setup_engine().await;
    env.remote.put_file("small", "tiny").await;
    env.remote.put_file("huge", vec![0u8; 64]).await;
    env.remote
        .set_starred(vec![
            text_item("small", 4).starred(),
            text_item("huge", 20 * MB).starred(),
        ])
        .await;
    let mut download = env.engine.manager().config();
    download.auto_download_starred = true;
    env.engine.manager().update_config(download);

    let report = env.engine.manager().auto_download_starred().await.unwrap();

    assert_eq!(report.downloaded, vec![file_id("small")]);
    assert_eq!(report.skipped, vec![file_id("huge")]);
    let cached = env.engine.cache().get(&file_id("small")).await.unwrap().unwrap();
    assert!(cached.is_starred);
}

#[tokio::test]
async fn stats_and_usage_follow_cache_contents() {
    let env = setup_engine().await;
    download(&env, "notes", vec![b'n'; 2048]).await;
    env.remote.put_file("photo", vec![7u8; 1024]).await;
    let photo = FileItem::file(file_id("photo"), "photo.png", 1024).with_mime_type("image/png");
    env.engine
        .manager()
        .download_for_offline(&photo, DownloadOptions::default())
        .await
        .unwrap();

    let stats = env.engine.manager().storage_stats().await.unwrap();
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.used_size, 3072);
    assert_eq!(stats.available_size, stats.total_size - 3072);

    let usage = env.engine.manager().storage_usage_by_type().await.unwrap();
    assert_eq!(usage.values().map(|entry| entry.count).sum::<u64>(), 2);
    assert_eq!(usage.values().map(|entry| entry.size).sum::<u64>(), 3072);

    assert!(env.engine.manager().remove_from_offline(&file_id("photo")).await.unwrap());
    assert_eq!(env.engine.manager().clear_all_offline_files().await.unwrap(), 1);
    assert_eq!(env.engine.manager().storage_stats().await.unwrap().file_count, 0);
}
