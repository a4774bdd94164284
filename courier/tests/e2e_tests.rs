//! End-to-end tests for courier
//!
//! Two fully wired instances share one SQLite database (queue, cache and
//! lock) and deliver to a mock provider.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{path::Path, time::Duration};

use courier::{Courier, Service};
use courier_delivery::DeliveryQueryService;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn instance(database: &Path, provider: &str) -> Service {
    let courier: Courier = ron::from_str(&format!(
        r#"Courier (
            delivery: (batch_size: 2, interval_secs: 1),
            lock: Some((ttl_secs: 5)),
            queue: (type: "Sqlite", path: "{}"),
            provider: (url: "{provider}/send", token: Some("secret"), timeout_secs: 5),
            control: (enabled: false),
        )"#,
        database.display()
    ))
    .expect("Invalid test config");

    courier.into_service().expect("Failed to wire service")
}

async fn wait_for_delivered(service: &Service, expected: usize, within: Duration) {
    tokio::time::timeout(within, async {
        while service.queue.delivered_messages().await.unwrap().len() < expected {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("Messages were not delivered in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_instances_deliver_each_message_once() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({ "message": "Accepted", "messageId": "mock-id" })),
        )
        .expect(6)
        .mount(&provider)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("courier.db");
    let first = instance(&database, &provider.uri());
    let second = instance(&database, &provider.uri());

    for n in 1..=6 {
        first
            .queue
            .enqueue(&format!("+9055500000{n}"), &format!("Test message {n}"))
            .await
            .unwrap();
    }

    assert!(first.scheduler.start());
    assert!(second.scheduler.start());

    wait_for_delivered(&second, 6, Duration::from_secs(30)).await;

    assert!(first.scheduler.stop().await);
    assert!(second.scheduler.stop().await);

    let sent = second.processor.sent_messages().await.unwrap();
    assert_eq!(sent.len(), 6);
    assert!(sent.iter().all(|s| s.message.delivered));
    assert!(
        sent.iter()
            .all(|s| s.message_id.as_deref() == Some("mock-id"))
    );
}

#[tokio::test]
async fn test_clear_empties_the_shared_queue() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({ "message": "Accepted", "messageId": "mock-id" })),
        )
        .mount(&provider)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("courier.db");
    let service = instance(&database, &provider.uri());
    for n in 1..=3 {
        service
            .queue
            .enqueue(&format!("+9055500000{n}"), &format!("Test message {n}"))
            .await
            .unwrap();
    }
    assert_eq!(service.scheduler.process_once().await.unwrap().delivered, 2);

    // Cleared from a separate handle, the way courierctl does it
    let admin = instance(&database, &provider.uri());
    assert_eq!(admin.queue.clear().await.unwrap(), 3);

    assert!(service.queue.delivered_messages().await.unwrap().is_empty());
    assert_eq!(service.scheduler.process_once().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn test_rejected_message_stays_pending() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid phone number"))
        .mount(&provider)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = instance(&dir.path().join("courier.db"), &provider.uri());
    service
        .queue
        .enqueue("+905550000001", "Never accepted")
        .await
        .unwrap();

    let outcome = service.scheduler.process_once().await.unwrap();
    assert_eq!(outcome.claimed, 1);
    assert_eq!(outcome.failed, 1);
    assert!(service.queue.delivered_messages().await.unwrap().is_empty());

    // Released, so the next cycle retries it
    let outcome = service.scheduler.process_once().await.unwrap();
    assert_eq!(outcome.claimed, 1);
}
