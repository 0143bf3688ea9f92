use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use edge_control::app::Application;
use edge_core::models::{Schedule, ScheduledProcess, ServiceRegistration, TaskState};
use edge_core::{AppConfig, EdgeError};

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.scheduler.tick_interval_ms = 50;
    config.scheduler.shutdown_timeout_seconds = 2;
    config.transport.delivery_timeout_ms = 200;
    config
}

#[tokio::test]
async fn test_application_start_and_stop() {
    let app = Application::new(test_config()).await.unwrap();

    app.start().await.unwrap();
    assert!(app.scheduler().is_started().await);
    assert!(app.monitor().is_running().await);

    // 已启动时再次启动失败，且不影响运行中的组件
    assert!(app.start().await.is_err());
    assert!(app.monitor().is_running().await);

    app.stop().await.unwrap();
    assert!(!app.scheduler().is_started().await);
    assert!(!app.monitor().is_running().await);
}

#[tokio::test]
async fn test_run_in_spawned_task_until_shutdown() {
    let app = Application::new(test_config()).await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move { app.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("application should stop after shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn test_manual_schedule_runs_real_process() {
    let app = Application::new(test_config()).await.unwrap();
    app.start().await.unwrap();

    let scheduler = app.scheduler();
    scheduler
        .save_process(ScheduledProcess::new("exit3", &["sh", "-c", "exit 3"]))
        .await
        .unwrap();
    let schedule = scheduler
        .save_schedule(Schedule::manual("exit3 now", "exit3"))
        .await
        .unwrap();

    let task_id = scheduler
        .queue_task(schedule.schedule_id)
        .await
        .unwrap()
        .expect("task should start immediately");

    let mut finished = None;
    for _ in 0..100 {
        let task = scheduler.get_task(task_id).await.unwrap();
        if task.state != TaskState::Running {
            finished = Some(task);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let task = finished.expect("task should finish");
    assert_eq!(task.state, TaskState::Complete);
    assert_eq!(task.exit_code, Some(3));

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_configuration_change_with_unreachable_subscriber() {
    let app = Application::new(test_config()).await.unwrap();

    let default_value = json!({
        "port": {"description": "Listen port", "type": "integer", "default": "6683"}
    })
    .as_object()
    .cloned()
    .unwrap();
    app.configuration()
        .create_category("SOUTH", "South service", &default_value, false, None)
        .await
        .unwrap();

    // 管理端口上没有任何服务在监听
    let service_id = app
        .services()
        .register(ServiceRegistration::new("modbus", "Southbound", "127.0.0.1", None, 1))
        .await
        .unwrap();
    app.interests()
        .register_interest(service_id, "SOUTH")
        .await
        .unwrap();
    assert!(app.configuration().has_trigger("SOUTH").await);

    app.configuration()
        .set_category_item_value("SOUTH", "port", "7000")
        .await
        .unwrap();

    let stored = app
        .configuration()
        .create_category("SOUTH", "South service", &default_value, false, None)
        .await
        .unwrap();
    assert_eq!(stored.value["port"]["value"], json!("7000"));

    let missing = app
        .configuration()
        .set_category_item_value("NORTH", "port", "1")
        .await;
    assert!(matches!(missing, Err(EdgeError::CategoryNotFound { .. })));
}
