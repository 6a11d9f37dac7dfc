use chrono::Duration;
use tasker_queue::orchestration::{Runnable, TaskRunnerStarter};
use tasker_queue::state_machine::QueueItemStatus;
use tasker_queue::test_helpers::{FooTask, TestHarness};
use tasker_queue::{Clock, QueueError, QueueOperation};

#[tokio::test]
async fn test_enqueue_claims_runner_and_dispatches_it_once() {
    let harness = TestHarness::new();
    let enqueued_at = harness.clock.now();

    let first = harness.enqueue("queue1", &FooTask::new("a")).await;
    harness.clock.advance(Duration::seconds(1));
    harness.enqueue("queue1", &FooTask::new("b")).await;

    assert_eq!(first.status(), QueueItemStatus::Queued);
    assert_eq!(first.queue_timestamp(), Some(enqueued_at));
    assert_eq!(
        harness.process_starter.runnables(),
        vec![Runnable::TaskRunner(TaskRunnerStarter::new("runner-1"))]
    );
}

#[tokio::test]
async fn test_enqueue_storage_failure_is_reported_and_does_not_wake() {
    let harness = TestHarness::new();
    harness.queue_storage.set_fail_saves(true);

    let error = harness
        .queue()
        .enqueue("queue1", &FooTask::new("a"), None)
        .await
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "Unable to enqueue task. Queue storage failed to save item."
    );
    assert!(harness.process_starter.runnables().is_empty());
}

#[tokio::test]
async fn test_transition_storage_failures_name_the_operation() {
    let harness = TestHarness::new();
    let mut item = harness.enqueue("queue1", &FooTask::new("a")).await;
    harness.queue_storage.set_fail_saves(true);

    let error = harness.queue().start(&mut item).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        "Unable to start task. Queue storage failed to save item."
    );
    assert_eq!(item.status(), QueueItemStatus::Queued);

    harness.queue_storage.set_fail_saves(false);
    harness.queue().start(&mut item).await.unwrap();
    harness.queue_storage.set_fail_saves(true);

    let cases = [
        (
            harness.queue().keep_alive(&mut item).await,
            "Unable to keep task alive. Queue storage failed to save item.",
        ),
        (
            harness.queue().update_progress(&mut item, 100).await,
            "Unable to update task progress. Queue storage failed to save item.",
        ),
        (
            harness.queue().finish(&mut item).await,
            "Unable to finish task. Queue storage failed to save item.",
        ),
        (
            harness.queue().fail(&mut item, "boom").await,
            "Unable to fail task. Queue storage failed to save item.",
        ),
        (
            harness.queue().requeue(&mut item).await,
            "Unable to requeue task. Queue storage failed to save item.",
        ),
    ];
    for (result, message) in cases {
        assert_eq!(result.unwrap_err().to_string(), message);
    }
    assert_eq!(item.status(), QueueItemStatus::InProgress);
}

#[tokio::test]
async fn test_read_failures_are_reported() {
    let harness = TestHarness::new();
    harness.queue_storage.set_fail_reads(true);

    let error = harness.queue().find_running_items().await.unwrap_err();
    assert!(matches!(
        error,
        QueueError::StorageUnavailable {
            operation: QueueOperation::FindRunning,
            ..
        }
    ));
    assert_eq!(
        error.to_string(),
        "Unable to find running queue items. Queue storage failed to fetch items."
    );
}

#[tokio::test]
async fn test_reports_bump_last_update() {
    let harness = TestHarness::new();
    let mut item = harness.enqueue("queue1", &FooTask::new("a")).await;
    harness.queue().start(&mut item).await.unwrap();

    harness.clock.advance(Duration::seconds(10));
    harness.queue().update_progress(&mut item, 2_548).await.unwrap();
    assert_eq!(item.last_update_timestamp(), Some(harness.clock.now()));

    harness.clock.advance(Duration::seconds(10));
    harness.queue().keep_alive(&mut item).await.unwrap();

    let stored = harness.reload(&item).await;
    assert_eq!(stored.progress_basis_points(), 2_548);
    assert_eq!(stored.progress_formatted(), 25.48);
    assert_eq!(stored.last_update_timestamp(), Some(harness.clock.now()));
}

#[tokio::test]
async fn test_checkpoint_replaces_task_state() {
    let harness = TestHarness::new();
    let mut item = harness.enqueue("queue1", &FooTask::new("a")).await;
    harness.queue().start(&mut item).await.unwrap();

    let mut task = FooTask::new("a");
    task.executions = 3;
    harness
        .queue()
        .save_checkpoint(&mut item, "FooTask", serde_json::to_string(&task).unwrap())
        .await
        .unwrap();

    let stored = harness.reload(&item).await;
    let restored: FooTask = serde_json::from_str(stored.serialized_task()).unwrap();
    assert_eq!(restored.executions, 3);
}

#[tokio::test]
async fn test_fail_uses_configured_retries() {
    let harness = TestHarness::new();
    let mut item = harness.enqueue("queue1", &FooTask::new("a")).await;
    let max_retries = harness.queue().max_retries();

    for _ in 0..max_retries {
        harness.queue().start(&mut item).await.unwrap();
        harness.queue().fail(&mut item, "boom").await.unwrap();
        assert_eq!(item.status(), QueueItemStatus::Queued);
    }
    harness.queue().start(&mut item).await.unwrap();
    harness.queue().fail(&mut item, "boom").await.unwrap();

    let stored = harness.reload(&item).await;
    assert_eq!(stored.status(), QueueItemStatus::Failed);
    assert_eq!(stored.retries(), max_retries + 1);
    assert_eq!(stored.fail_timestamp(), Some(harness.clock.now()));
}

#[tokio::test]
async fn test_latest_by_type_through_the_queue() {
    let harness = TestHarness::new();
    harness
        .queue()
        .enqueue("queue1", &FooTask::new("a"), Some("tenant-1"))
        .await
        .unwrap();
    harness.clock.advance(Duration::seconds(1));
    let latest = harness.enqueue("queue2", &FooTask::new("b")).await;

    let found = harness
        .queue()
        .find_latest_by_type("FooTask", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), latest.id());

    let scoped = harness
        .queue()
        .find_latest_by_type("FooTask", Some("tenant-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scoped.context(), "tenant-1");
}
