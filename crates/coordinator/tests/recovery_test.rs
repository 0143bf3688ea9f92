use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use edge_core::models::TaskState;
use edge_core::traits::TaskRepository;
use edge_coordinator::recovery::{TaskRecoveryService, INTERRUPTED_REASON};
use edge_infrastructure::InMemoryTaskRepository;
use edge_testing_utils::TaskBuilder;

#[tokio::test]
async fn test_recover_marks_running_tasks_interrupted() {
    let schedule_id = Uuid::new_v4();
    let running = TaskBuilder::new("stats")
        .with_schedule(schedule_id, "stats collector")
        .started_at(Utc::now() - Duration::minutes(5))
        .build();
    let finished = TaskBuilder::new("purge")
        .finished(0, Utc::now() - Duration::minutes(1))
        .build();
    let task_repo = Arc::new(InMemoryTaskRepository::with_tasks(vec![
        running.clone(),
        finished.clone(),
    ]));

    let recovery_service = TaskRecoveryService::new(task_repo.clone());
    let report = recovery_service.recover_interrupted_tasks().await.unwrap();

    assert_eq!(report.interrupted_tasks.len(), 1);
    assert_eq!(report.interrupted_tasks[0].task_id, running.task_id);

    let updated = task_repo.get_by_id(running.task_id).await.unwrap().unwrap();
    assert_eq!(updated.state, TaskState::Interrupted);
    assert_eq!(updated.reason.as_deref(), Some(INTERRUPTED_REASON));
    assert!(updated.end_time.is_some());
    assert_eq!(updated.exit_code, None);

    // 已结束的任务保持不变
    let untouched = task_repo.get_by_id(finished.task_id).await.unwrap().unwrap();
    assert_eq!(untouched, finished);
}

#[tokio::test]
async fn test_recover_with_no_running_tasks() {
    let task_repo = Arc::new(InMemoryTaskRepository::new());
    let recovery_service = TaskRecoveryService::new(task_repo);

    let report = recovery_service.recover_interrupted_tasks().await.unwrap();
    assert!(report.interrupted_tasks.is_empty());
}

#[tokio::test]
async fn test_recover_is_idempotent() {
    let task_repo = Arc::new(InMemoryTaskRepository::with_tasks(vec![
        TaskBuilder::new("stats").build(),
        TaskBuilder::new("north").build(),
    ]));
    let recovery_service = TaskRecoveryService::new(task_repo.clone());

    let first = recovery_service.recover_interrupted_tasks().await.unwrap();
    assert_eq!(first.interrupted_tasks.len(), 2);

    let second = recovery_service.recover_interrupted_tasks().await.unwrap();
    assert!(second.interrupted_tasks.is_empty());
    assert!(task_repo.get_running().await.unwrap().is_empty());
}
