use chrono::Duration;
use tasker_queue::models::{QueueItem, QueueItemId, QueueItemRecord, TaskRunnerStatus};
use tasker_queue::orchestration::{QueueItemStarter, TaskRunnerStarter};
use tasker_queue::state_machine::QueueItemStatus;
use tasker_queue::storage::TaskQueueStorage;
use tasker_queue::test_helpers::{BarTask, FailingTask, FooTask, TestHarness};
use tasker_queue::Clock;

#[tokio::test]
async fn test_queue_item_starter_runs_task_to_completion() {
    let harness = TestHarness::new();
    let item = harness
        .enqueue("queue1", &FooTask::new("a").with_progress_steps(vec![10.12, 50.0]))
        .await;

    QueueItemStarter::new(item.id().unwrap())
        .run(&harness.services)
        .await;

    let stored = harness.reload(&item).await;
    assert_eq!(stored.status(), QueueItemStatus::Completed);
    assert_eq!(stored.progress_basis_points(), 10_000);
    assert_eq!(stored.finish_timestamp(), Some(harness.clock.now()));

    let task: FooTask = serde_json::from_str(stored.serialized_task()).unwrap();
    assert_eq!(task.executions, 1);
}

#[tokio::test]
async fn test_task_sees_its_item_context() {
    let harness = TestHarness::new();
    let item = harness
        .queue()
        .enqueue("queue1", &BarTask::default(), Some("tenant-9"))
        .await
        .unwrap();

    QueueItemStarter::new(item.id().unwrap())
        .run(&harness.services)
        .await;

    let stored = harness.reload(&item).await;
    let task: BarTask = serde_json::from_str(stored.serialized_task()).unwrap();
    assert_eq!(task.seen_context.as_deref(), Some("tenant-9"));
}

#[tokio::test]
async fn test_failed_execution_leaves_item_running_with_reported_progress() {
    let harness = TestHarness::new();
    let item = harness.enqueue("queue1", &FailingTask::new("remote unavailable")).await;

    QueueItemStarter::new(item.id().unwrap())
        .run(&harness.services)
        .await;

    let stored = harness.reload(&item).await;
    assert_eq!(stored.status(), QueueItemStatus::InProgress);
    assert_eq!(stored.progress_basis_points(), 2_500);
    assert_eq!(stored.retries(), 0);
}

#[tokio::test]
async fn test_missing_item_is_ignored() {
    let harness = TestHarness::new();
    QueueItemStarter::new(404).run(&harness.services).await;
    assert!(harness.queue_storage.inner().is_empty());
}

async fn save_unregistered_item(harness: &TestHarness, queue_name: &str) -> QueueItemId {
    let mut record = QueueItemRecord::new("UnknownTask", "{}", harness.clock.now());
    record.status = QueueItemStatus::Queued;
    record.queue_name = Some(queue_name.to_string());
    record.queue_timestamp = Some(harness.clock.now());
    harness
        .queue_storage
        .inner()
        .save(&QueueItem::from_record(record).unwrap(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unregistered_task_type_consumes_retries_until_failed() {
    let harness = TestHarness::new();
    let id = save_unregistered_item(&harness, "queue1").await;
    let max_retries = harness.queue().max_retries();

    QueueItemStarter::new(id).run(&harness.services).await;

    let stored = harness.queue().find(id).await.unwrap().unwrap();
    assert_eq!(stored.status(), QueueItemStatus::Queued);
    assert_eq!(stored.retries(), 1);
    assert!(stored.start_timestamp().is_none());
    assert!(stored.failure_description().contains("could not be deserialized"));

    for _ in 0..max_retries {
        QueueItemStarter::new(id).run(&harness.services).await;
    }

    let stored = harness.queue().find(id).await.unwrap().unwrap();
    assert_eq!(stored.status(), QueueItemStatus::Failed);
    assert_eq!(stored.retries(), max_retries + 1);
    assert_eq!(stored.fail_timestamp(), Some(harness.clock.now()));
}

#[tokio::test]
async fn test_unregistered_task_type_does_not_block_its_queue() {
    let harness = TestHarness::new();
    let poisoned = save_unregistered_item(&harness, "queue1").await;
    harness.clock.advance(Duration::seconds(1));
    let good = harness.enqueue("queue1", &FooTask::new("behind")).await;

    harness.pump(200).await;

    let stored = harness.queue().find(poisoned).await.unwrap().unwrap();
    assert_eq!(stored.status(), QueueItemStatus::Failed);
    assert_eq!(harness.reload(&good).await.status(), QueueItemStatus::Completed);
}

#[tokio::test]
async fn test_item_started_elsewhere_is_not_run_twice() {
    let harness = TestHarness::new();
    let mut item = harness.enqueue("queue1", &FooTask::new("a")).await;
    harness.queue().start(&mut item).await.unwrap();

    QueueItemStarter::new(item.id().unwrap())
        .run(&harness.services)
        .await;

    let stored = harness.reload(&item).await;
    assert_eq!(stored.status(), QueueItemStatus::InProgress);
    let task: FooTask = serde_json::from_str(stored.serialized_task()).unwrap();
    assert_eq!(task.executions, 0);
}

#[tokio::test]
async fn test_task_runner_starter_requires_the_active_guid() {
    let harness = TestHarness::new();
    harness
        .status_storage
        .force_status(TaskRunnerStatus::new("runner-a", harness.clock.now()))
        .await;

    assert!(TaskRunnerStarter::new("runner-b")
        .run(&harness.services)
        .await
        .is_none());
    assert!(harness.clock.sleeps().is_empty());

    let report = TaskRunnerStarter::new("runner-a")
        .run(&harness.services)
        .await;
    assert!(report.is_some());
}

#[tokio::test]
async fn test_task_runner_starter_rejects_expired_runner() {
    let harness = TestHarness::new();
    harness
        .status_storage
        .force_status(TaskRunnerStatus::new("runner-a", harness.clock.now()))
        .await;
    harness.clock.advance(Duration::seconds(61));

    assert!(TaskRunnerStarter::new("runner-a")
        .run(&harness.services)
        .await
        .is_none());
}

#[tokio::test]
async fn test_task_runner_starter_without_status_storage() {
    let harness = TestHarness::new();
    harness.status_storage.set_fail_reads(true);

    assert!(TaskRunnerStarter::new("runner-a")
        .run(&harness.services)
        .await
        .is_none());
}
