//! Integration tests for fetched input staging
//!
//! These tests exercise the commit/abort/free lifecycle against real files
//! in a temporary directory, and the allocator's medium selection and memory
//! accounting.

mod common;

use common::*;
use stagecoach_common::{FetchError, ShuffleConfig};
use stagecoach_core::shuffle::{
    FetchedInput, FetchedInputAllocator, FetchedInputKind, FetchedInputState, temp_path_for,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_test::traced_test;

fn final_path(dir: &TempDir) -> PathBuf {
    dir.path().join("task_1_02_000007").join("input_4.out")
}

async fn write_all(input: &FetchedInput, data: &[u8]) {
    let mut sink = input.output_sink().await.unwrap();
    sink.write_all(data).await.unwrap();
    sink.shutdown().await.unwrap();
}

async fn read_all(input: &FetchedInput) -> Vec<u8> {
    let mut data = Vec::new();
    input
        .input_source()
        .await
        .unwrap()
        .read_to_end(&mut data)
        .await
        .unwrap();
    data
}

#[tokio::test]
#[traced_test]
async fn test_disk_input_commit_and_free() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(1000, input_attempt(4), final_path(&dir), callback.clone());
    let temp = temp_path_for(&final_path(&dir), input.id());
    assert_eq!(input.kind(), FetchedInputKind::Disk);
    assert_eq!(input.size(), 1000);

    let payload = vec![7u8; 1000];
    write_all(&input, &payload).await;
    assert!(temp.exists());
    assert!(!final_path(&dir).exists());

    input.commit().await.unwrap();
    assert_eq!(input.state().await, FetchedInputState::Committed);
    assert!(!temp.exists());
    assert!(final_path(&dir).exists());
    assert_eq!(read_all(&input).await, payload);

    input.free().await;
    assert_eq!(input.state().await, FetchedInputState::Freed);
    assert!(!final_path(&dir).exists());
    assert_eq!(
        callback.notifications(),
        vec![Notification::Complete(input.id()), Notification::Free(input.id())]
    );
}

#[tokio::test]
async fn test_second_commit_is_noop() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());
    write_all(&input, b"abc").await;

    input.commit().await.unwrap();
    input.commit().await.unwrap();
    input.abort().await.unwrap();

    assert_eq!(input.state().await, FetchedInputState::Committed);
    assert_eq!(read_all(&input).await, b"abc");
    assert_eq!(callback.notifications(), vec![Notification::Complete(input.id())]);
}

#[tokio::test]
#[should_panic(expected = "can only be freed after it is committed or aborted")]
async fn test_free_before_commit_panics() {
    let dir = TempDir::new().unwrap();
    let input = FetchedInput::new_disk(
        3,
        input_attempt(4),
        final_path(&dir),
        RecordingCallback::new(),
    );
    write_all(&input, b"abc").await;
    input.free().await;
}

#[tokio::test]
async fn test_free_twice_is_noop() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());
    write_all(&input, b"abc").await;
    input.commit().await.unwrap();

    input.free().await;
    input.free().await;

    assert_eq!(input.state().await, FetchedInputState::Freed);
    assert_eq!(
        callback.notifications(),
        vec![Notification::Complete(input.id()), Notification::Free(input.id())]
    );
}

#[tokio::test]
async fn test_free_when_final_file_already_missing() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());
    write_all(&input, b"abc").await;
    input.commit().await.unwrap();
    std::fs::remove_file(final_path(&dir)).unwrap();

    input.free().await;
    assert_eq!(input.state().await, FetchedInputState::Freed);
    assert_eq!(
        callback.notifications(),
        vec![Notification::Complete(input.id()), Notification::Free(input.id())]
    );
}

#[tokio::test]
async fn test_abort_deletes_temp_and_notifies_failure() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());
    let temp = temp_path_for(&final_path(&dir), input.id());
    write_all(&input, b"par").await;
    assert!(temp.exists());

    input.abort().await.unwrap();
    assert_eq!(input.state().await, FetchedInputState::Aborted);
    assert!(!temp.exists());
    assert!(!final_path(&dir).exists());

    // Aborted inputs free without touching storage or notifying.
    input.free().await;
    assert_eq!(input.state().await, FetchedInputState::Freed);
    assert_eq!(callback.notifications(), vec![Notification::Failed(input.id())]);
}

#[tokio::test]
async fn test_abort_without_any_bytes_written() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());

    input.abort().await.unwrap();
    assert_eq!(input.state().await, FetchedInputState::Aborted);
    assert_eq!(callback.notifications(), vec![Notification::Failed(input.id())]);
}

#[tokio::test]
async fn test_reading_before_commit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = FetchedInput::new_disk(
        3,
        input_attempt(4),
        final_path(&dir),
        RecordingCallback::new(),
    );
    write_all(&input, b"abc").await;

    let error = match input.input_source().await {
        Ok(_) => panic!("expected input_source to fail before commit"),
        Err(error) => error,
    };
    assert!(matches!(
        error,
        FetchError::InvalidState { state, operation: "open an input source", .. } if state == "PENDING"
    ));
}

#[tokio::test]
async fn test_writing_after_commit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = FetchedInput::new_disk(
        3,
        input_attempt(4),
        final_path(&dir),
        RecordingCallback::new(),
    );
    write_all(&input, b"abc").await;
    input.commit().await.unwrap();

    assert!(matches!(
        input.output_sink().await,
        Err(FetchError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_late_write_after_commit_is_rejected() {
    let dir = TempDir::new().unwrap();
    let disk = FetchedInput::new_disk(
        4,
        input_attempt(4),
        final_path(&dir),
        RecordingCallback::new(),
    );
    let memory = FetchedInput::new_memory(4, input_attempt(5), RecordingCallback::new());

    for input in [&disk, &memory] {
        let mut sink = input.output_sink().await.unwrap();
        sink.write_all(b"data").await.unwrap();
        sink.flush().await.unwrap();
        input.commit().await.unwrap();

        let error = sink.write_all(b"late").await.unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
        sink.shutdown().await.unwrap();
        assert_eq!(read_all(input).await, b"data");
    }
}

#[tokio::test]
async fn test_reopened_memory_sink_replaces_earlier_bytes() {
    let input = FetchedInput::new_memory(5, input_attempt(4), RecordingCallback::new());

    let mut first = input.output_sink().await.unwrap();
    first.write_all(b"sta").await.unwrap();
    let mut second = input.output_sink().await.unwrap();
    second.write_all(b"fre").await.unwrap();
    assert!(first.write_all(b"le").await.is_err());
    second.write_all(b"sh").await.unwrap();

    input.commit().await.unwrap();
    assert_eq!(read_all(&input).await, b"fresh");
}

#[tokio::test]
async fn test_memory_input_with_unbounded_declared_size() {
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_memory(u64::MAX, input_attempt(4), callback.clone());
    write_all(&input, b"abc").await;
    input.commit().await.unwrap();
    assert_eq!(read_all(&input).await, b"abc");

    input.free().await;
    assert_eq!(
        callback.notifications(),
        vec![Notification::Complete(input.id()), Notification::Free(input.id())]
    );
}

#[tokio::test]
async fn test_concurrent_fetches_of_same_source_use_distinct_temp_paths() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let first = FetchedInput::new_disk(1, input_attempt(4), final_path(&dir), callback.clone());
    let second = FetchedInput::new_disk(1, input_attempt(4), final_path(&dir), callback.clone());
    assert_ne!(first.id(), second.id());

    write_all(&first, b"1").await;
    write_all(&second, b"2").await;
    let first_temp = temp_path_for(&final_path(&dir), first.id());
    let second_temp = temp_path_for(&final_path(&dir), second.id());
    assert_ne!(first_temp, second_temp);
    assert_eq!(std::fs::read(&first_temp).unwrap(), b"1");
    assert_eq!(std::fs::read(&second_temp).unwrap(), b"2");

    first.commit().await.unwrap();
    second.abort().await.unwrap();
    assert_eq!(read_all(&first).await, b"1");
    assert!(!second_temp.exists());
}

#[tokio::test]
async fn test_failed_commit_stays_pending() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());
    write_all(&input, b"abc").await;
    std::fs::remove_file(temp_path_for(&final_path(&dir), input.id())).unwrap();

    let error = input.commit().await.unwrap_err();
    assert!(matches!(error, FetchError::Storage { path: Some(_), .. }));
    assert_eq!(input.state().await, FetchedInputState::Pending);
    assert!(callback.notifications().is_empty());

    // The caller can still resolve it.
    input.abort().await.unwrap();
    assert_eq!(input.state().await, FetchedInputState::Aborted);
}

#[tokio::test]
#[traced_test]
async fn test_free_tolerates_delete_failure() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = FetchedInput::new_disk(3, input_attempt(4), final_path(&dir), callback.clone());
    write_all(&input, b"abc").await;
    input.commit().await.unwrap();

    // A non-empty directory at the final path cannot be removed as a file.
    std::fs::remove_file(final_path(&dir)).unwrap();
    std::fs::create_dir(final_path(&dir)).unwrap();
    std::fs::write(final_path(&dir).join("blocker"), b"x").unwrap();

    input.free().await;
    assert_eq!(input.state().await, FetchedInputState::Freed);
    assert!(logs_contain("failed to remove fetched input"));
    assert_eq!(
        callback.notifications(),
        vec![Notification::Complete(input.id()), Notification::Free(input.id())]
    );
}

#[tokio::test]
async fn test_racing_commit_and_free_sweep() {
    let dir = TempDir::new().unwrap();
    let callback = RecordingCallback::new();
    let input = Arc::new(FetchedInput::new_disk(
        3,
        input_attempt(4),
        final_path(&dir),
        callback.clone(),
    ));
    write_all(&input, b"abc").await;

    let committer = {
        let input = Arc::clone(&input);
        tokio::spawn(async move { input.commit().await })
    };
    let aborter = {
        let input = Arc::clone(&input);
        tokio::spawn(async move { input.abort().await })
    };
    committer.await.unwrap().unwrap();
    aborter.await.unwrap().unwrap();

    input.free().await;
    input.free().await;
    assert_eq!(input.state().await, FetchedInputState::Freed);
    assert!(!final_path(&dir).exists());
    assert!(!temp_path_for(&final_path(&dir), input.id()).exists());

    let notifications = callback.notifications();
    assert!(
        notifications == vec![Notification::Complete(input.id()), Notification::Free(input.id())]
            || notifications == vec![Notification::Failed(input.id())],
        "unexpected notifications {:?}",
        notifications
    );
}

#[tokio::test]
async fn test_allocator_returns_memory_reservations() {
    let dir = TempDir::new().unwrap();
    let allocator = FetchedInputAllocator::new(ShuffleConfig {
        local_dirs: vec![dir.path().to_path_buf()],
        memory_limit_bytes: 1024,
        max_single_memory_fetch_bytes: 512,
    });

    let committed = allocator.allocate(500, input_attempt(0)).unwrap();
    let aborted = allocator.allocate(500, input_attempt(1)).unwrap();
    assert_eq!(committed.kind(), FetchedInputKind::Memory);
    assert_eq!(aborted.kind(), FetchedInputKind::Memory);
    assert_eq!(allocator.memory_used(), 1000);

    write_all(&committed, &[1u8; 500]).await;
    committed.commit().await.unwrap();
    aborted.abort().await.unwrap();
    assert_eq!(allocator.memory_used(), 500);
    assert_eq!(
        allocator
            .completed_inputs()
            .iter()
            .map(|header| header.id)
            .collect::<Vec<_>>(),
        vec![committed.id()]
    );

    assert_eq!(read_all(&committed).await, vec![1u8; 500]);
    committed.free().await;
    assert_eq!(allocator.memory_used(), 0);
    assert_eq!(allocator.stats().memory_inputs, 0);
    assert!(allocator.completed_inputs().is_empty());
    assert_eq!(allocator.stats().completed_inputs, 0);
}

#[tokio::test]
async fn test_allocator_stages_large_inputs_on_disk() {
    let dir = TempDir::new().unwrap();
    let allocator = FetchedInputAllocator::new(disk_only_config(dir.path()));

    let input = allocator.allocate(1000, input_attempt(4)).unwrap();
    assert_eq!(input.kind(), FetchedInputKind::Disk);
    write_all(&input, &[3u8; 1000]).await;
    input.commit().await.unwrap();

    let expected = dir.path().join("task_1_02_000007").join("input_4.out");
    assert_eq!(std::fs::read(&expected).unwrap().len(), 1000);
    assert_eq!(allocator.completed_inputs().len(), 1);
    assert_eq!(allocator.completed_inputs()[0].input_attempt, input_attempt(4));

    input.free().await;
    assert!(!expected.exists());
    assert_eq!(allocator.stats().disk_inputs, 0);
    assert!(allocator.completed_inputs().is_empty());
}
