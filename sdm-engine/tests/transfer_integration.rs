//! End-to-end transfer tests
//!
//! Drive the engine against a local byte server: segmented downloads,
//! single-stream fallback, mirrors, pause/resume, stop, and failures.

mod helpers;

use helpers::byte_server::ByteServer;
use helpers::test_server::TestServer;
use sdm_common::events::DlEvent;
use sdm_common::model::{SegmentStatus, TaskStatus};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

fn test_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn wait_for_state(rx: &mut Receiver<DlEvent>, task_id: i64, wanted: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(DlEvent::TaskStateChanged {
                    task_id: id,
                    status,
                    ..
                }) if id == task_id && status == wanted => break,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for task {} to reach {}", task_id, wanted));
}

async fn wait_for_progress(rx: &mut Receiver<DlEvent>, task_id: i64) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(DlEvent::TaskProgress { task_id: id, .. }) if id == task_id => break,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for progress");
}

#[tokio::test]
async fn test_segmented_download_completes() {
    let server = TestServer::start().await.unwrap();
    let source = ByteServer::start(test_payload(512 * 1024)).await;

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(&source.url("/file"), "payload.bin", vec![])
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_state(&mut rx, task.id, TaskStatus::Completed).await;

    let stored = server.engine.get(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.total_bytes, Some(512 * 1024));
    assert_eq!(stored.downloaded_bytes, 512 * 1024);

    let segments = server.engine.segments(task.id).await.unwrap();
    assert_eq!(segments.len(), 4);
    assert!(segments
        .iter()
        .all(|s| s.status == SegmentStatus::Completed));

    let final_path = server.data_dir.path().join("downloads").join("payload.bin");
    let bytes = tokio::fs::read(&final_path).await.unwrap();
    assert_eq!(bytes, source.payload);

    let part_path = server
        .data_dir
        .path()
        .join("downloads")
        .join("incomplete")
        .join("payload.bin.part");
    assert!(!part_path.exists());
}

#[tokio::test]
async fn test_unknown_size_uses_single_stream() {
    let server = TestServer::start().await.unwrap();
    let source = ByteServer::start(test_payload(100_000)).await;

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(&source.url("/stream"), "streamed.bin", vec![])
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_state(&mut rx, task.id, TaskStatus::Completed).await;

    let stored = server.engine.get(task.id).await.unwrap();
    // size only known once the stream ends
    assert_eq!(stored.total_bytes, Some(100_000));
    assert_eq!(stored.downloaded_bytes, 100_000);

    // single-stream tasks have no segment rows
    let segments = server.engine.segments(task.id).await.unwrap();
    assert!(segments.is_empty());

    let final_path = server
        .data_dir
        .path()
        .join("downloads")
        .join("streamed.bin");
    let bytes = tokio::fs::read(&final_path).await.unwrap();
    assert_eq!(bytes, source.payload);
}

#[tokio::test]
async fn test_mirrors_share_segments() {
    let server = TestServer::start().await.unwrap();
    let payload = test_payload(256 * 1024);
    let primary = ByteServer::start(payload.clone()).await;
    let mirror = ByteServer::start(payload).await;

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(
            &primary.url("/file"),
            "mirrored.bin",
            vec![mirror.url("/file")],
        )
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_state(&mut rx, task.id, TaskStatus::Completed).await;

    // 4 segments over 2 sources, round-robin by index
    assert!(primary.hits() >= 1, "primary source never used");
    assert!(mirror.hits() >= 1, "mirror source never used");

    let final_path = server
        .data_dir
        .path()
        .join("downloads")
        .join("mirrored.bin");
    let bytes = tokio::fs::read(&final_path).await.unwrap();
    assert_eq!(bytes, primary.payload);
}

#[tokio::test]
async fn test_pause_then_resume_completes() {
    let server = TestServer::start().await.unwrap();
    let source = ByteServer::start(test_payload(128 * 1024)).await;

    // slow the transfer down enough to pause it mid-flight
    server.engine.set_speed_limit(64 * 1024).await.unwrap();

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(&source.url("/file"), "paused.bin", vec![])
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_progress(&mut rx, task.id).await;

    server.engine.pause(task.id).await.unwrap();
    let stored = server.engine.get(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Paused);

    server.engine.clone().resume(task.id).await.unwrap();
    wait_for_state(&mut rx, task.id, TaskStatus::Completed).await;

    let final_path = server.data_dir.path().join("downloads").join("paused.bin");
    let bytes = tokio::fs::read(&final_path).await.unwrap();
    assert_eq!(bytes, source.payload);
}

#[tokio::test]
async fn test_stop_records_failed() {
    let server = TestServer::start().await.unwrap();
    let source = ByteServer::start(test_payload(256 * 1024)).await;

    // slow enough that the task cannot finish before it is stopped
    server.engine.set_speed_limit(16 * 1024).await.unwrap();

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(&source.url("/file"), "stopped.bin", vec![])
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_progress(&mut rx, task.id).await;

    server.engine.stop(task.id).await.unwrap();
    wait_for_state(&mut rx, task.id, TaskStatus::Failed).await;

    let stored = server.engine.get(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);

    let final_path = server
        .data_dir
        .path()
        .join("downloads")
        .join("stopped.bin");
    assert!(!final_path.exists());
}

#[tokio::test]
async fn test_missing_source_fails() {
    let server = TestServer::start().await.unwrap();
    let source = ByteServer::start(test_payload(1024)).await;

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(&source.url("/absent"), "missing.bin", vec![])
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_state(&mut rx, task.id, TaskStatus::Failed).await;

    let stored = server.engine.get(task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);

    // the statistics collector saw the terminal event
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.stats(), (0, 1));
}

#[tokio::test]
async fn test_start_is_idempotent_while_active() {
    let server = TestServer::start().await.unwrap();
    let source = ByteServer::start(test_payload(128 * 1024)).await;

    server.engine.set_speed_limit(64 * 1024).await.unwrap();

    let mut rx = server.subscribe();
    let task = server
        .engine
        .add(&source.url("/file"), "idem.bin", vec![])
        .await
        .unwrap();
    server.engine.clone().start(task.id).await.unwrap();
    // second start while the task is active is a no-op
    server.engine.clone().start(task.id).await.unwrap();

    wait_for_state(&mut rx, task.id, TaskStatus::Completed).await;

    let bytes = tokio::fs::read(server.data_dir.path().join("downloads").join("idem.bin"))
        .await
        .unwrap();
    assert_eq!(bytes, source.payload);
}
