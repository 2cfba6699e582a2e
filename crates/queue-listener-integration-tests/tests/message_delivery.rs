//! Integration tests for message dispatch and acknowledgement
//!
//! These tests verify:
//! - Successfully processed messages are deleted
//! - Failed messages are redelivered after the visibility timeout
//! - Typed JSON processing through the reference processor
//! - Queues are consumed independently

mod common;

use common::{
    create_transport, fast_listener_config, message_counts, send, wait_for, wait_for_empty,
    RecordingProcessor,
};
use queue_listener_core::{
    JsonMessageProcessor, ProcessingError, QueueListenerManager, QueueManager,
};
use queue_runtime::APPROXIMATE_RECEIVE_COUNT;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Verify every processed message is deleted from the queue.
#[tokio::test]
async fn test_processed_messages_are_deleted() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("orders")
        .await
        .unwrap();
    let manager = QueueListenerManager::new(transport.clone(), fast_listener_config()).unwrap();
    let processor = RecordingProcessor::new();
    manager
        .register_processor(queue_url.as_str(), Arc::new(processor.clone()))
        .unwrap();
    manager.start_listening(queue_url.as_str()).unwrap();

    for body in ["first", "second", "third"] {
        send(&transport, &queue_url, body).await;
    }

    assert!(wait_for_empty(&transport, &queue_url, Duration::from_secs(3)).await);
    assert_eq!(processor.bodies(), vec!["first", "second", "third"]);

    manager.stop_listening(queue_url.as_str()).unwrap();
}

/// Verify a failed message is not deleted, comes back after the visibility
/// timeout under a new receipt handle, and is deleted once it succeeds.
#[tokio::test]
async fn test_failed_message_is_redelivered() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("flaky")
        .await
        .unwrap();
    let manager = QueueListenerManager::new(transport.clone(), fast_listener_config()).unwrap();
    let processor = RecordingProcessor::new();
    processor.fail_times("flaky-body", 1);
    manager
        .register_processor(queue_url.as_str(), Arc::new(processor.clone()))
        .unwrap();
    manager.start_listening(queue_url.as_str()).unwrap();

    send(&transport, &queue_url, "flaky-body").await;

    assert!(wait_for(Duration::from_secs(5), || processor.delivery_count() >= 2).await);
    assert!(wait_for_empty(&transport, &queue_url, Duration::from_secs(3)).await);

    let deliveries = processor.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].message_id, deliveries[1].message_id);
    assert_ne!(deliveries[0].receipt_handle, deliveries[1].receipt_handle);
    assert_eq!(deliveries[0].attribute(APPROXIMATE_RECEIVE_COUNT), Some("1"));
    assert_eq!(deliveries[1].attribute(APPROXIMATE_RECEIVE_COUNT), Some("2"));

    manager.stop_listening(queue_url.as_str()).unwrap();
}

/// Verify one failing message does not block the others in its batch.
#[tokio::test]
async fn test_failure_is_isolated_within_batch() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("mixed")
        .await
        .unwrap();

    // Queue both messages before listening so they arrive in one batch
    send(&transport, &queue_url, "poison").await;
    send(&transport, &queue_url, "healthy").await;

    let manager = QueueListenerManager::new(transport.clone(), fast_listener_config()).unwrap();
    let processor = RecordingProcessor::new();
    processor.fail_always("poison");
    manager
        .register_processor(queue_url.as_str(), Arc::new(processor.clone()))
        .unwrap();
    manager.start_listening(queue_url.as_str()).unwrap();

    assert!(wait_for(Duration::from_secs(2), || processor.delivery_count() >= 2).await);
    manager.stop_listening(queue_url.as_str()).unwrap();

    assert_eq!(processor.bodies()[..2], ["poison", "healthy"]);
    // Only the poison message remains, hidden or visible
    let (visible, in_flight) = message_counts(&transport, &queue_url).await;
    assert_eq!(visible + in_flight, 1);
}

#[derive(Debug, Deserialize, PartialEq)]
struct OrderPlaced {
    order_id: u64,
    amount_cents: u64,
}

/// Verify the JSON processor decodes payloads and leaves malformed ones on
/// the queue.
#[tokio::test]
async fn test_json_processor_end_to_end() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("json-orders")
        .await
        .unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let processor = JsonMessageProcessor::new(move |order: OrderPlaced| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(order);
            Ok::<(), ProcessingError>(())
        }
    });

    let manager = QueueListenerManager::new(transport.clone(), fast_listener_config()).unwrap();
    manager
        .register_processor(queue_url.as_str(), Arc::new(processor))
        .unwrap();
    manager.start_listening(queue_url.as_str()).unwrap();

    send(&transport, &queue_url, r#"{"order_id": 7, "amount_cents": 1250}"#).await;
    send(&transport, &queue_url, "not json").await;

    assert!(wait_for(Duration::from_secs(2), || received.lock().unwrap().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.stop_listening(queue_url.as_str()).unwrap();

    assert_eq!(
        received.lock().unwrap()[0],
        OrderPlaced {
            order_id: 7,
            amount_cents: 1250
        }
    );
    let (visible, in_flight) = message_counts(&transport, &queue_url).await;
    assert_eq!(visible + in_flight, 1);
}

/// Verify listeners on different queues consume only their own messages.
#[tokio::test]
async fn test_queues_are_independent() {
    let transport = create_transport();
    let queue_manager = QueueManager::new(transport.clone());
    let orders = queue_manager.create_queue("orders").await.unwrap();
    let invoices = queue_manager.create_queue("invoices").await.unwrap();

    let manager = QueueListenerManager::new(transport.clone(), fast_listener_config()).unwrap();
    let order_processor = RecordingProcessor::new();
    let invoice_processor = RecordingProcessor::new();
    manager
        .register_processor(orders.as_str(), Arc::new(order_processor.clone()))
        .unwrap();
    manager
        .register_processor(invoices.as_str(), Arc::new(invoice_processor.clone()))
        .unwrap();
    manager.start_listening(orders.as_str()).unwrap();
    manager.start_listening(invoices.as_str()).unwrap();

    send(&transport, &orders, "order-1").await;
    send(&transport, &invoices, "invoice-1").await;
    send(&transport, &orders, "order-2").await;

    assert!(wait_for_empty(&transport, &orders, Duration::from_secs(3)).await);
    assert!(wait_for_empty(&transport, &invoices, Duration::from_secs(3)).await);
    assert_eq!(order_processor.bodies(), vec!["order-1", "order-2"]);
    assert_eq!(invoice_processor.bodies(), vec!["invoice-1"]);

    manager.shutdown(Duration::from_secs(2)).await;
}
