use chrono::Duration;
use std::sync::Arc;
use tasker_queue::orchestration::{
    ChannelProcessStarter, QueueItemStarter, Runnable, TaskExecutionServices,
};
use tasker_queue::models::TaskRunnerStatus;
use tasker_queue::state_machine::QueueItemStatus;
use tasker_queue::storage::memory::{InMemoryQueueStorage, InMemoryRunnerStatusStorage};
use tasker_queue::storage::{QueueItemFilter, QueueItemSort, QueueItemSortField};
use tasker_queue::test_helpers::{test_registry, FailingTask, FooTask, RecordingWakeup, TestHarness};
use tasker_queue::{AsyncProcessStarter, Clock};

#[tokio::test]
async fn test_queues_drain_in_order_through_repeated_runner_passes() {
    let harness = TestHarness::new();
    let mut queue1 = Vec::new();
    for label in ["first", "second", "third"] {
        queue1.push(harness.enqueue("queue1", &FooTask::new(label)).await);
        harness.clock.advance(Duration::seconds(1));
    }
    let queue2 = harness.enqueue("queue2", &FooTask::new("other")).await;

    let reports = harness.pump(40).await;

    for item in queue1.iter().chain(std::iter::once(&queue2)) {
        assert_eq!(harness.reload(item).await.status(), QueueItemStatus::Completed);
    }

    // One item per queue per pass: queue1 needs three passes
    let dispatching_passes = reports
        .iter()
        .filter(|report| !report.dispatched.is_empty())
        .count();
    assert_eq!(dispatching_passes, 3);
    assert_eq!(reports[0].dispatched.len(), 2);

    let started: Vec<_> = harness
        .queue()
        .find_all(
            &QueueItemFilter::new().with_queue_name("queue1"),
            Some(QueueItemSort::ascending(QueueItemSortField::StartTimestamp)),
            0,
            None,
        )
        .await
        .unwrap()
        .iter()
        .map(|item| item.id())
        .collect();
    let enqueued: Vec<_> = queue1.iter().map(|item| item.id()).collect();
    assert_eq!(started, enqueued);
}

#[tokio::test]
async fn test_failing_task_is_retried_until_it_fails_for_good() {
    let harness = TestHarness::new();
    let item = harness.enqueue("queue1", &FailingTask::new("always")).await;
    let id = item.id().unwrap();

    // Each round: a runner pass, then the dispatched attempt, then a stall
    // past the inactivity period
    for _ in 0..20 {
        harness
            .status_storage
            .force_status(TaskRunnerStatus::new("runner-main", harness.clock.now()))
            .await;
        harness.services.task_runner().run("runner-main").await;
        if harness.reload(&item).await.status() == QueueItemStatus::Failed {
            break;
        }

        for queue_item_id in harness.process_starter.queue_item_ids() {
            QueueItemStarter::new(queue_item_id)
                .run(&harness.services)
                .await;
        }
        harness.process_starter.take_runnables();
        harness.clock.advance(Duration::seconds(31));
    }

    let stored = harness.reload(&item).await;
    assert_eq!(stored.status(), QueueItemStatus::Failed);
    assert_eq!(stored.retries(), harness.queue().max_retries() + 1);
    assert_eq!(stored.progress_basis_points(), 2_500);
    assert_eq!(
        stored.failure_description(),
        format!("Task {id} (FailingTask) failed due to extended inactivity period.")
    );
}

#[tokio::test]
async fn test_channel_starter_executes_items_in_background() {
    let (starter, receiver) = ChannelProcessStarter::new();
    let starter = Arc::new(starter);
    let services = TaskExecutionServices::builder(
        Arc::new(InMemoryQueueStorage::new()),
        Arc::new(InMemoryRunnerStatusStorage::new()),
        starter.clone(),
    )
    .registry(test_registry())
    .wakeup(Arc::new(RecordingWakeup::new()))
    .build();
    tokio::spawn(receiver.serve(services.clone()));

    let item = services
        .queue()
        .enqueue("queue1", &FooTask::new("background"), None)
        .await
        .unwrap();
    let id = item.id().unwrap();
    starter
        .start(Runnable::QueueItem(QueueItemStarter::new(id)))
        .await
        .unwrap();

    let completed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            let stored = services.queue().find(id).await.unwrap().unwrap();
            if stored.status() == QueueItemStatus::Completed {
                return stored;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("item should complete");

    assert_eq!(completed.progress_basis_points(), 10_000);
}
