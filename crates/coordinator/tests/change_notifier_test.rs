use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use uuid::Uuid;

use edge_core::models::{CategoryValue, ServiceRegistration};
use edge_coordinator::{ChangeNotifier, DeliveryStatus};
use edge_infrastructure::{
    ConfigurationCache, ConfigurationManager, InMemoryCategoryRepository, InterestRegistry,
    ServiceRegistry,
};
use edge_testing_utils::FakeServiceTransport;

const CATEGORY: &str = "SCHEDULER";

struct Harness {
    manager: Arc<ConfigurationManager>,
    interests: Arc<InterestRegistry>,
    services: Arc<ServiceRegistry>,
    transport: Arc<FakeServiceTransport>,
    notifier: Arc<ChangeNotifier>,
}

fn scheduler_category() -> CategoryValue {
    json!({
        "max_running_tasks": {
            "description": "Maximum number of tasks that can be running at any given time",
            "type": "integer",
            "default": "20"
        },
        "max_completed_task_age_days": {
            "description": "Maximum age in days for completed tasks",
            "type": "integer",
            "default": "30"
        }
    })
    .as_object()
    .cloned()
    .unwrap()
}

async fn setup(delivery_timeout: Duration) -> Harness {
    let manager = Arc::new(ConfigurationManager::new(
        Arc::new(InMemoryCategoryRepository::new()),
        Arc::new(ConfigurationCache::new(30)),
    ));
    let interests = Arc::new(InterestRegistry::new(manager.clone()));
    let services = Arc::new(ServiceRegistry::new());
    let transport = Arc::new(FakeServiceTransport::new());
    let notifier = Arc::new(ChangeNotifier::new(
        interests.clone(),
        services.clone(),
        manager.clone(),
        transport.clone(),
        delivery_timeout,
    ));
    manager.set_change_listener(notifier.clone()).await;

    manager
        .create_category(CATEGORY, "Scheduler configuration", &scheduler_category(), false, None)
        .await
        .unwrap();

    Harness {
        manager,
        interests,
        services,
        transport,
        notifier,
    }
}

async fn subscribe(h: &Harness, name: &str, management_port: i64) -> Uuid {
    let id = h
        .services
        .register(ServiceRegistration::new(
            name,
            "Northbound",
            "localhost",
            None,
            management_port,
        ))
        .await
        .unwrap();
    h.interests.register_interest(id, CATEGORY).await.unwrap();
    id
}

#[tokio::test]
async fn test_item_change_is_delivered_to_subscribers() {
    let h = setup(Duration::from_millis(500)).await;
    subscribe(&h, "omf", 9101).await;
    subscribe(&h, "pi server", 9102).await;

    h.manager
        .set_category_item_value(CATEGORY, "max_running_tasks", "10")
        .await
        .unwrap();

    let notifications = h.transport.notifications().await;
    assert_eq!(notifications.len(), 2);
    let mut ports: Vec<u16> = notifications.iter().map(|(port, _)| *port).collect();
    ports.sort();
    assert_eq!(ports, vec![9101, 9102]);

    let (_, notification) = &notifications[0];
    assert_eq!(notification.category, CATEGORY);
    assert_eq!(notification.items["max_running_tasks"]["value"], json!("10"));
}

#[tokio::test]
async fn test_fan_out_survives_failing_subscribers() {
    let h = setup(Duration::from_millis(500)).await;
    let healthy = subscribe(&h, "omf", 9101).await;
    let rejecting = subscribe(&h, "pi server", 9102).await;
    let gone = Uuid::new_v4();
    h.interests.register_interest(gone, CATEGORY).await.unwrap();
    h.transport.fail_changes(9102).await;

    let report = h.notifier.notify(CATEGORY).await.unwrap();
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.delivered(), 1);

    let status_of = |id: Uuid| {
        report
            .outcomes
            .iter()
            .find(|o| o.microservice_uuid == id)
            .map(|o| o.status.clone())
            .unwrap()
    };
    assert_eq!(status_of(healthy), DeliveryStatus::Delivered);
    assert!(matches!(status_of(rejecting), DeliveryStatus::Failed(_)));
    assert_eq!(status_of(gone), DeliveryStatus::Unregistered);
}

#[tokio::test]
async fn test_slow_subscriber_does_not_delay_others() {
    let h = setup(Duration::from_millis(200)).await;
    let fast = subscribe(&h, "omf", 9101).await;
    let slow = subscribe(&h, "pi server", 9102).await;
    h.transport.delay_changes(9102, Duration::from_secs(5)).await;

    let started = Instant::now();
    let report = h.notifier.notify(CATEGORY).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    for outcome in &report.outcomes {
        if outcome.microservice_uuid == fast {
            assert_eq!(outcome.status, DeliveryStatus::Delivered);
        } else {
            assert_eq!(outcome.microservice_uuid, slow);
            assert!(matches!(outcome.status, DeliveryStatus::Failed(_)));
        }
    }
    assert_eq!(h.transport.notifications().await.len(), 1);
}

#[tokio::test]
async fn test_category_without_subscribers() {
    let h = setup(Duration::from_millis(500)).await;

    assert!(!h.manager.has_trigger(CATEGORY).await);
    h.manager
        .set_category_item_value(CATEGORY, "max_running_tasks", "5")
        .await
        .unwrap();
    assert!(h.transport.notifications().await.is_empty());

    let report = h.notifier.notify(CATEGORY).await.unwrap();
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn test_unregistering_last_interest_stops_notifications() {
    let h = setup(Duration::from_millis(500)).await;
    let id = subscribe(&h, "omf", 9101).await;
    assert!(h.manager.has_trigger(CATEGORY).await);

    let registration = h
        .interests
        .get(&edge_core::models::InterestFilter::by_microservice(id))
        .await
        .unwrap()
        .remove(0);
    h.interests
        .unregister_interest(registration.registration_id)
        .await
        .unwrap();
    assert!(!h.manager.has_trigger(CATEGORY).await);

    h.manager
        .set_category_item_value(CATEGORY, "max_running_tasks", "15")
        .await
        .unwrap();
    assert!(h.transport.notifications().await.is_empty());
}

#[tokio::test]
async fn test_unchanged_value_is_not_notified() {
    let h = setup(Duration::from_millis(500)).await;
    subscribe(&h, "omf", 9101).await;

    h.manager
        .set_category_item_value(CATEGORY, "max_running_tasks", "20")
        .await
        .unwrap();
    assert!(h.transport.notifications().await.is_empty());
}
