use crate::common::*;
use chrono::Duration;
use tasker_queue::constants::MAX_RETRIES;
use tasker_queue::state_machine::{QueueItemStatus, StateMachineError};
use tasker_queue::test_helpers::FooTask;

#[test]
fn test_enqueue_only_from_created() {
    let now = base_time();
    for status in QueueItemStatus::ALL {
        let mut item = item_in_status(status);
        let result = item.enqueue("queue2", "ctx", now);
        if status == QueueItemStatus::Created {
            assert!(result.is_ok());
            assert_eq!(item.status(), QueueItemStatus::Queued);
            assert_eq!(item.queue_name(), Some("queue2"));
            assert_eq!(item.context(), "ctx");
            assert_eq!(item.queue_timestamp(), Some(now));
        } else {
            assert_eq!(
                result,
                Err(StateMachineError::IllegalTransition {
                    from: status,
                    to: QueueItemStatus::Queued
                })
            );
        }
    }
}

#[test]
fn test_start_only_from_queued() {
    for status in QueueItemStatus::ALL {
        let mut item = item_in_status(status);
        let result = item.start(base_time());
        if status == QueueItemStatus::Queued {
            assert!(result.is_ok());
        } else {
            assert_eq!(
                result.unwrap_err().to_string(),
                format!(
                    "Illegal queue item state transition from \"{}\" to \"in_progress\"",
                    status
                )
            );
        }
    }
}

#[test]
fn test_finish_requeue_and_fail_only_from_in_progress() {
    for status in QueueItemStatus::ALL {
        let legal = status == QueueItemStatus::InProgress;

        assert_eq!(item_in_status(status).finish(base_time()).is_ok(), legal);
        assert_eq!(item_in_status(status).requeue().is_ok(), legal);
        assert_eq!(
            item_in_status(status).fail("boom", MAX_RETRIES, base_time()).is_ok(),
            legal
        );
    }
}

#[test]
fn test_reports_require_a_running_item() {
    for status in QueueItemStatus::ALL {
        let mut item = item_in_status(status);
        let progress = item.report_progress(1_000, base_time());
        let alive = item.report_alive(base_time());

        if status == QueueItemStatus::InProgress {
            assert!(progress.is_ok());
            assert!(alive.is_ok());
        } else {
            assert_eq!(
                progress.unwrap_err().to_string(),
                "Progress reported for not started queue item."
            );
            assert!(matches!(alive, Err(StateMachineError::NotStarted { .. })));
        }
    }
}

#[test]
fn test_progress_is_bounded() {
    let mut item = item_in_status(QueueItemStatus::InProgress);
    assert_eq!(
        item.report_progress(10_001, base_time())
            .unwrap_err()
            .to_string(),
        "Progress percentage must be value between 0 and 100."
    );
    assert!(item.report_progress(10_000, base_time()).is_ok());
    assert_eq!(item.progress_formatted(), 100.0);
}

#[test]
fn test_finish_completes_progress() {
    let now = base_time();
    let mut item = item_in_status(QueueItemStatus::InProgress);
    item.report_progress(4_200, now).unwrap();

    item.finish(now + Duration::seconds(3)).unwrap();

    assert_eq!(item.status(), QueueItemStatus::Completed);
    assert_eq!(item.progress_basis_points(), 10_000);
    assert_eq!(item.finish_timestamp(), Some(now + Duration::seconds(3)));
}

#[test]
fn test_requeue_remembers_progress_without_counting_a_retry() {
    let now = base_time();
    let mut item = item_in_status(QueueItemStatus::InProgress);
    item.report_progress(3_300, now).unwrap();

    item.requeue().unwrap();

    assert_eq!(item.status(), QueueItemStatus::Queued);
    assert_eq!(item.retries(), 0);
    assert_eq!(item.last_execution_progress_basis_points(), 3_300);
    assert_eq!(item.progress_basis_points(), 3_300);
    assert_eq!(item.start_timestamp(), None);
}

#[test]
fn test_failures_requeue_until_retries_are_exhausted() {
    let mut now = base_time();
    let mut item = created_item();
    item.enqueue("queue1", "", now).unwrap();

    for attempt in 1..=MAX_RETRIES {
        item.start(now).unwrap();
        item.fail(format!("attempt {attempt}"), MAX_RETRIES, now)
            .unwrap();
        assert_eq!(item.status(), QueueItemStatus::Queued);
        assert_eq!(item.retries(), attempt);
        assert_eq!(item.fail_timestamp(), None);
        now += Duration::minutes(1);
    }

    item.start(now).unwrap();
    item.fail("final attempt", MAX_RETRIES, now).unwrap();

    assert_eq!(item.status(), QueueItemStatus::Failed);
    assert_eq!(item.retries(), MAX_RETRIES + 1);
    assert_eq!(item.failure_description(), "final attempt");
    assert_eq!(item.fail_timestamp(), Some(now));
}

#[test]
fn test_item_rebuilds_its_task() {
    let registry = tasker_queue::test_helpers::test_registry();
    let mut item = created_item();
    item.enqueue("queue1", "", base_time()).unwrap();

    let task = item.task(&registry).unwrap();
    assert_eq!(task.task_type(), "FooTask");
    assert_eq!(
        task.serialize_task().unwrap(),
        serde_json::to_string(&FooTask::new("created")).unwrap()
    );
}
