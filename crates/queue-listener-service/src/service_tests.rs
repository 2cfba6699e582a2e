//! Tests for listener service start-up and shutdown.

use super::*;
use queue_listener_core::RetryStrategy;
use queue_runtime::{OutgoingMessage, TransportFactory};

fn service_config(queues: &[&str]) -> ServiceConfig {
    let mut config = ServiceConfig {
        queues: queues.iter().map(|q| q.to_string()).collect(),
        shutdown_timeout_seconds: 2,
        ..Default::default()
    };
    config.listener.wait_time_seconds = 1;
    config.listener.idle_interval_ms = 10;
    config
}

async fn wait_until_drained(transport: &Arc<dyn QueueTransport>, queue_url: &QueueUrl) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let attributes = transport.get_queue_attributes(queue_url).await.unwrap();
        if attributes["ApproximateNumberOfMessages"] == "0"
            && attributes["ApproximateNumberOfMessagesNotVisible"] == "0"
        {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "queue was not drained");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_start_listens_on_every_configured_queue() {
    let transport = TransportFactory::create_test_transport();
    let config = service_config(&["orders", "invoices"]);

    let service = ListenerService::start(&config, Arc::clone(&transport))
        .await
        .unwrap();

    let urls: Vec<&str> = service.queues().iter().map(QueueUrl::as_str).collect();
    assert_eq!(
        urls,
        vec!["memory://localhost/orders", "memory://localhost/invoices"]
    );
    for queue_url in service.queues() {
        assert!(service.manager().is_listening(queue_url.as_str()));
    }

    let stragglers = service.shutdown().await;
    assert!(stragglers.is_empty());
}

/// Verify messages sent to a configured queue are consumed and deleted.
#[tokio::test]
async fn test_messages_are_consumed() {
    let transport = TransportFactory::create_test_transport();
    let service = ListenerService::start(&service_config(&["orders"]), Arc::clone(&transport))
        .await
        .unwrap();
    let queue_url = service.queues()[0].clone();

    for body in ["{\"id\":1}", "{\"id\":2}"] {
        transport
            .send_message(&queue_url, &OutgoingMessage::new(body))
            .await
            .unwrap();
    }

    wait_until_drained(&transport, &queue_url).await;
    assert!(service.shutdown().await.is_empty());
}

/// Verify a configured dead-letter queue is created at start-up.
#[tokio::test]
async fn test_dead_letter_queue_is_created() {
    let transport = TransportFactory::create_test_transport();
    let mut config = service_config(&["orders"]);
    config.retry.dead_letter_queue_url = Some("memory://localhost/orders-dlq".to_string());

    let service = ListenerService::start(&config, Arc::clone(&transport))
        .await
        .unwrap();

    let dlq = QueueUrl::new("memory://localhost/orders-dlq").unwrap();
    assert!(transport.get_queue_attributes(&dlq).await.is_ok());
    service.shutdown().await;
}

/// Resubmitting into the dead-letter queue itself is rejected before any
/// listener starts.
#[tokio::test]
async fn test_resubmit_into_dead_letter_queue_fails() {
    let transport = TransportFactory::create_test_transport();
    let mut config = service_config(&["orders-dlq"]);
    config.retry.dead_letter_queue_url = Some("memory://localhost/orders-dlq".to_string());
    config.retry.strategy = RetryStrategy::Resubmit;

    let result = ListenerService::start(&config, transport).await;

    match result {
        Err(e @ ServiceError::Listener(ListenerError::InvalidArgument { .. })) => {
            assert_eq!(e.exit_code(), 2)
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("expected start-up to fail"),
    }
}

#[test]
fn test_build_processor_rejects_negative_retries() {
    let transport = TransportFactory::create_test_transport();
    let dlq = QueueUrl::new("memory://localhost/dlq").unwrap();
    let source = QueueUrl::new("memory://localhost/orders").unwrap();
    let retry = RetryConfig {
        max_retries: -1,
        ..Default::default()
    };

    assert!(build_processor(&retry, &transport, Some(&dlq), &source).is_err());
    assert!(build_processor(&retry, &transport, None, &source).is_ok());
}

#[test]
fn test_exit_codes() {
    assert_eq!(
        ServiceError::from(ServiceConfigError::NoQueues).exit_code(),
        3
    );
    assert_eq!(
        ServiceError::from(QueueError::ConnectionFailed {
            message: "refused".to_string()
        })
        .exit_code(),
        1
    );
}
