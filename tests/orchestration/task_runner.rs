use chrono::Duration;
use tasker_queue::config::ExecutionConfig;
use tasker_queue::models::{QueueItem, TaskRunnerStatus};
use tasker_queue::orchestration::{RunnerActivity, WakeupOutcome};
use tasker_queue::state_machine::QueueItemStatus;
use tasker_queue::storage::{TaskQueueStorage, TaskRunnerStatusStorage};
use tasker_queue::test_helpers::{FooTask, TestHarness};
use tasker_queue::Clock;

const RUNNER: &str = "runner-1";

/// Enqueue on `queue_name` one second after the previous enqueue, leaving the
/// recorded runnables empty
async fn enqueue(harness: &TestHarness, queue_name: &str, label: &str) -> QueueItem {
    harness.clock.advance(Duration::seconds(1));
    let item = harness.enqueue(queue_name, &FooTask::new(label)).await;
    harness.process_starter.take_runnables();
    item
}

/// Make `RUNNER` the live runner as of now
async fn activate_runner(harness: &TestHarness) {
    harness
        .status_storage
        .force_status(TaskRunnerStatus::new(RUNNER, harness.clock.now()))
        .await;
}

async fn running_item(harness: &TestHarness, queue_name: &str, progress: u32) -> QueueItem {
    let mut item = enqueue(harness, queue_name, queue_name).await;
    harness.queue().start(&mut item).await.unwrap();
    if progress > 0 {
        harness.queue().update_progress(&mut item, progress).await.unwrap();
    }
    item
}

#[tokio::test]
async fn test_inactive_item_with_new_progress_is_requeued() {
    let harness = TestHarness::new();
    let item = running_item(&harness, "queue1", 1_000).await;

    harness.clock.advance(Duration::seconds(31));
    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.activity, RunnerActivity::Active);
    assert_eq!(report.requeued, vec![item.id().unwrap()]);
    assert!(report.failed.is_empty());

    let stored = harness.reload(&item).await;
    assert_eq!(stored.retries(), 0);
    assert_eq!(stored.last_execution_progress_basis_points(), 1_000);
    assert_eq!(stored.start_timestamp(), None);
    // Requeued items are eligible again in the same pass
    assert_eq!(report.dispatched, vec![item.id().unwrap()]);
}

#[tokio::test]
async fn test_oversized_inactivity_period_keeps_items_running() {
    let harness = TestHarness::with_config(ExecutionConfig {
        max_task_inactivity_period_seconds: u64::MAX,
        ..ExecutionConfig::default()
    });
    let item = running_item(&harness, "queue1", 0).await;

    harness.clock.advance(Duration::days(365));
    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.activity, RunnerActivity::Active);
    assert!(report.requeued.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(harness.reload(&item).await.status(), QueueItemStatus::InProgress);
}

#[tokio::test]
async fn test_item_inactive_for_exactly_the_limit_is_left_running() {
    let harness = TestHarness::new();
    let item = running_item(&harness, "queue1", 1_000).await;

    harness.clock.advance(Duration::seconds(30));
    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert!(report.requeued.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(harness.reload(&item).await.status(), QueueItemStatus::InProgress);
}

#[tokio::test]
async fn test_inactive_item_without_new_progress_is_failed_and_reconfigured() {
    let harness = TestHarness::new();
    let mut item = running_item(&harness, "queue1", 5_269).await;
    harness.queue().requeue(&mut item).await.unwrap();
    harness.queue().start(&mut item).await.unwrap();
    assert_eq!(item.progress_basis_points(), 5_269);
    assert_eq!(item.last_execution_progress_basis_points(), 5_269);

    harness.clock.advance(Duration::seconds(31));
    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    let id = item.id().unwrap();
    assert_eq!(report.failed, vec![id]);

    let stored = harness.reload(&item).await;
    assert_eq!(stored.retries(), 1);
    assert_eq!(
        stored.failure_description(),
        format!("Task {id} (FooTask) failed due to extended inactivity period.")
    );
    let task: FooTask = serde_json::from_str(stored.serialized_task()).unwrap();
    assert_eq!(task.reconfigured, 1);
}

#[tokio::test]
async fn test_item_without_last_update_is_reclaimed() {
    let harness = TestHarness::new();
    let item = running_item(&harness, "queue1", 0).await;
    let mut record = harness.reload(&item).await.into_record();
    record.last_update_timestamp = None;
    let stripped = QueueItem::from_record(record).unwrap();
    harness
        .queue_storage
        .inner()
        .save(&stripped, None)
        .await
        .unwrap();

    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.failed, vec![item.id().unwrap()]);
}

#[tokio::test]
async fn test_dispatch_respects_started_tasks_limit() {
    let harness = TestHarness::with_config(ExecutionConfig {
        max_started_tasks_limit: 2,
        ..ExecutionConfig::default()
    });
    running_item(&harness, "queue5", 100).await;
    let oldest = enqueue(&harness, "queue1", "a").await;
    enqueue(&harness, "queue2", "b").await;
    enqueue(&harness, "queue3", "c").await;

    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.dispatched, vec![oldest.id().unwrap()]);
    assert_eq!(harness.process_starter.queue_item_ids(), vec![oldest.id().unwrap()]);
}

#[tokio::test]
async fn test_no_dispatch_when_all_slots_are_taken() {
    let harness = TestHarness::with_config(ExecutionConfig {
        max_started_tasks_limit: 1,
        ..ExecutionConfig::default()
    });
    running_item(&harness, "queue5", 100).await;
    enqueue(&harness, "queue1", "a").await;

    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert!(report.dispatched.is_empty());
    assert!(harness.process_starter.queue_item_ids().is_empty());
}

#[tokio::test]
async fn test_delayed_items_wait_for_their_earliest_start() {
    let harness = TestHarness::new();
    let earliest_start = harness.clock.now() + Duration::hours(1);
    harness
        .queue()
        .enqueue_delayed("queue1", &FooTask::new("later"), None, earliest_start)
        .await
        .unwrap();
    harness.process_starter.take_runnables();

    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;
    assert!(report.dispatched.is_empty());

    harness.clock.set(earliest_start);
    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;
    assert_eq!(report.dispatched.len(), 1);
}

#[tokio::test]
async fn test_delayed_queue_head_does_not_take_the_last_free_slot() {
    let harness = TestHarness::with_config(ExecutionConfig {
        max_started_tasks_limit: 1,
        ..ExecutionConfig::default()
    });
    let earliest_start = harness.clock.now() + Duration::hours(1);
    harness
        .queue()
        .enqueue_delayed("delayed", &FooTask::new("later"), None, earliest_start)
        .await
        .unwrap();
    let ready = enqueue(&harness, "ready", "now").await;

    activate_runner(&harness).await;
    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.dispatched, vec![ready.id().unwrap()]);
    assert_eq!(harness.process_starter.queue_item_ids(), vec![ready.id().unwrap()]);
}

#[tokio::test]
async fn test_active_runner_deactivates_and_rearms() {
    let harness = TestHarness::new();
    enqueue(&harness, "queue1", "a").await;
    activate_runner(&harness).await;
    let started_at = harness.clock.now();

    let report = harness.services.task_runner().run(RUNNER).await;

    assert!(report.deactivated);
    assert_eq!(
        harness.clock.sleeps(),
        vec![std::time::Duration::from_secs(5)]
    );
    assert_eq!(harness.clock.now(), started_at + Duration::seconds(5));
    // The released status lets the wakeup claim a fresh runner
    assert_eq!(
        report.wakeup,
        Some(WakeupOutcome::Dispatched {
            guid: "runner-2".to_string()
        })
    );
    assert_eq!(
        harness.status_storage.get_status().await.unwrap().guid(),
        "runner-2"
    );
}

#[tokio::test]
async fn test_runner_that_lost_the_status_does_no_work_but_rearms() {
    let harness = TestHarness::new();
    let item = running_item(&harness, "queue1", 1_000).await;
    enqueue(&harness, "queue2", "b").await;
    harness.clock.advance(Duration::seconds(31));
    harness
        .status_storage
        .force_status(TaskRunnerStatus::new("someone-else", harness.clock.now()))
        .await;

    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.activity, RunnerActivity::NotActive);
    assert!(report.requeued.is_empty());
    assert!(report.dispatched.is_empty());
    assert!(!report.deactivated);
    assert_eq!(harness.reload(&item).await.status(), QueueItemStatus::InProgress);
    assert_eq!(harness.clock.sleeps().len(), 1);
    assert_eq!(
        report.wakeup,
        Some(WakeupOutcome::AlreadyRunning {
            guid: "someone-else".to_string()
        })
    );
}

#[tokio::test]
async fn test_expired_runner_does_no_work_but_releases_and_rearms() {
    let harness = TestHarness::new();
    enqueue(&harness, "queue1", "a").await;
    activate_runner(&harness).await;
    harness.clock.advance(Duration::seconds(61));

    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.activity, RunnerActivity::Expired);
    assert!(report.dispatched.is_empty());
    assert!(report.deactivated);
    assert!(matches!(report.wakeup, Some(WakeupOutcome::Dispatched { .. })));
}

#[tokio::test]
async fn test_unreadable_status_still_rearms() {
    let harness = TestHarness::new();
    harness.status_storage.set_fail_reads(true);

    let report = harness.services.task_runner().run(RUNNER).await;

    assert_eq!(report.activity, RunnerActivity::StatusUnavailable);
    assert_eq!(harness.clock.sleeps().len(), 1);
    assert_eq!(report.wakeup, Some(WakeupOutcome::StatusUnavailable));
}
