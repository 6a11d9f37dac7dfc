use super::conformance;
use chrono::{Duration, Utc};
use tasker_queue::models::TaskRunnerStatus;
use tasker_queue::storage::memory::{InMemoryQueueStorage, InMemoryRunnerStatusStorage};
use tasker_queue::storage::{RunnerStatusStorageError, TaskRunnerStatusStorage};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_oldest_queued_item_per_idle_queue() {
    conformance::oldest_queued_item_per_idle_queue(&InMemoryQueueStorage::new()).await;
}

#[tokio::test]
async fn test_startable_heads_skip_delayed_queues() {
    conformance::startable_heads_skip_delayed_queues(&InMemoryQueueStorage::new()).await;
}

#[tokio::test]
async fn test_find_all_filters_sorts_and_pages() {
    conformance::find_all_filters_sorts_and_pages(&InMemoryQueueStorage::new()).await;
}

#[tokio::test]
async fn test_conditional_save_rejects_stale_items() {
    conformance::conditional_save_rejects_stale_items(&InMemoryQueueStorage::new()).await;
}

#[tokio::test]
async fn test_latest_by_type_respects_context() {
    conformance::latest_by_type_respects_context(&InMemoryQueueStorage::new()).await;
}

#[tokio::test]
async fn test_running_items_are_in_progress_only() {
    conformance::running_items_are_in_progress_only(&InMemoryQueueStorage::new()).await;
}

#[tokio::test]
async fn test_runner_status_defaults_to_null() {
    let storage = InMemoryRunnerStatusStorage::new();
    let status = assert_ok!(storage.get_status().await);
    assert!(status.is_null());
    assert!(status.is_expired(Utc::now(), Duration::seconds(60)));
}

#[tokio::test]
async fn test_only_one_of_two_racing_claims_wins() {
    let storage = InMemoryRunnerStatusStorage::new();
    let observed = storage.get_status().await.unwrap();
    let now = Utc::now();

    let first = storage
        .set_status(&observed, TaskRunnerStatus::new("runner-a", now))
        .await;
    let second = storage
        .set_status(&observed, TaskRunnerStatus::new("runner-b", now))
        .await;

    assert_ok!(first);
    assert!(matches!(
        second,
        Err(RunnerStatusStorageError::StatusChangeConflict { .. })
    ));
    assert_eq!(storage.get_status().await.unwrap().guid(), "runner-a");
}
