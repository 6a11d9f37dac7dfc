use chrono::Duration;
use tasker_queue::models::TaskRunnerStatus;
use tasker_queue::orchestration::{Runnable, TaskRunnerStarter, WakeupOutcome};
use tasker_queue::storage::TaskRunnerStatusStorage;
use tasker_queue::test_helpers::TestHarness;
use tasker_queue::Clock;

#[tokio::test]
async fn test_second_wakeup_sees_live_runner() {
    let harness = TestHarness::new();
    let wakeup = harness.services.wakeup();

    let first = wakeup.wakeup().await;
    let second = wakeup.wakeup().await;

    assert_eq!(first.dispatched_guid(), Some("runner-1"));
    assert_eq!(
        second,
        WakeupOutcome::AlreadyRunning {
            guid: "runner-1".to_string()
        }
    );
    assert_eq!(harness.process_starter.runnables().len(), 1);
}

#[tokio::test]
async fn test_expired_runner_is_replaced() {
    let harness = TestHarness::new();
    harness
        .status_storage
        .force_status(TaskRunnerStatus::new(
            "stale",
            harness.clock.now() - Duration::seconds(61),
        ))
        .await;

    let outcome = harness.services.wakeup().wakeup().await;

    assert_eq!(outcome.dispatched_guid(), Some("runner-1"));
    let status = harness.status_storage.get_status().await.unwrap();
    assert_eq!(status.guid(), "runner-1");
    assert_eq!(status.alive_since(), Some(harness.clock.now()));
}

#[tokio::test]
async fn test_runner_at_max_alive_time_is_still_live() {
    let harness = TestHarness::new();
    harness
        .status_storage
        .force_status(TaskRunnerStatus::new(
            "current",
            harness.clock.now() - Duration::seconds(60),
        ))
        .await;

    let outcome = harness.services.wakeup().wakeup().await;
    assert!(matches!(outcome, WakeupOutcome::AlreadyRunning { .. }));
}

#[tokio::test]
async fn test_lost_claim_does_not_dispatch() {
    let harness = TestHarness::new();
    harness.status_storage.set_conflict_writes(true);

    let outcome = harness.services.wakeup().wakeup().await;

    assert_eq!(outcome, WakeupOutcome::StatusConflict);
    assert!(harness.process_starter.runnables().is_empty());
}

#[tokio::test]
async fn test_storage_failures_do_not_dispatch() {
    let harness = TestHarness::new();

    harness.status_storage.set_fail_reads(true);
    assert_eq!(
        harness.services.wakeup().wakeup().await,
        WakeupOutcome::StatusUnavailable
    );

    harness.status_storage.set_fail_reads(false);
    harness.status_storage.set_fail_writes(true);
    assert_eq!(
        harness.services.wakeup().wakeup().await,
        WakeupOutcome::StatusUnavailable
    );

    assert!(harness.process_starter.runnables().is_empty());
}

#[tokio::test]
async fn test_failed_dispatch_releases_the_claim() {
    let harness = TestHarness::new();
    harness.process_starter.set_failing(true);

    let outcome = harness.services.wakeup().wakeup().await;
    assert!(matches!(outcome, WakeupOutcome::DispatchFailed { .. }));
    assert!(harness.status_storage.get_status().await.unwrap().is_null());

    harness.process_starter.set_failing(false);
    let outcome = harness.services.wakeup().wakeup().await;
    assert_eq!(outcome.dispatched_guid(), Some("runner-2"));
    assert_eq!(
        harness.process_starter.runnables(),
        vec![Runnable::TaskRunner(TaskRunnerStarter::new("runner-2"))]
    );
}
