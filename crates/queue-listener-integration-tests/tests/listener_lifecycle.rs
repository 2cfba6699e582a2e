//! Integration tests for listener lifecycle
//!
//! These tests verify:
//! - Start, stop and restart of listeners on real in-memory queues
//! - Stop interrupting a long poll that would otherwise block
//! - Shutdown of every listener at once

mod common;

use common::{create_transport, fast_listener_config, send, RecordingProcessor};
use queue_listener_core::{ListenerConfig, ListenerError, QueueListenerManager, QueueManager};
use std::sync::Arc;
use std::time::Duration;

/// Verify a listener can be started, stopped and started again.
#[tokio::test]
async fn test_start_stop_restart() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("lifecycle")
        .await
        .unwrap();
    let manager = QueueListenerManager::new(transport, fast_listener_config()).unwrap();
    manager
        .register_processor(queue_url.as_str(), Arc::new(RecordingProcessor::new()))
        .unwrap();

    manager.start_listening(queue_url.as_str()).unwrap();
    assert!(manager.is_listening(queue_url.as_str()));

    let err = manager.start_listening(queue_url.as_str()).unwrap_err();
    assert!(matches!(err, ListenerError::AlreadyRunning { .. }));

    manager.stop_listening(queue_url.as_str()).unwrap();
    assert!(!manager.is_listening(queue_url.as_str()));

    manager.start_listening(queue_url.as_str()).unwrap();
    assert!(manager.is_listening(queue_url.as_str()));
    manager.stop_listening(queue_url.as_str()).unwrap();
}

/// Verify stopping interrupts a 20 second long poll promptly.
#[tokio::test]
async fn test_shutdown_interrupts_long_poll() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("long-poll")
        .await
        .unwrap();
    let config = ListenerConfig {
        wait_time_seconds: 20,
        ..fast_listener_config()
    };
    let manager = QueueListenerManager::new(transport, config).unwrap();
    manager
        .register_processor(queue_url.as_str(), Arc::new(RecordingProcessor::new()))
        .unwrap();
    manager.start_listening(queue_url.as_str()).unwrap();

    // Let the worker enter its receive call
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let stragglers = manager.shutdown(Duration::from_secs(5)).await;

    assert!(stragglers.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Verify a stopped listener leaves newly sent messages untouched.
#[tokio::test]
async fn test_stopped_listener_does_not_consume() {
    let transport = create_transport();
    let queue_url = QueueManager::new(transport.clone())
        .create_queue("stopped")
        .await
        .unwrap();
    let manager = QueueListenerManager::new(transport.clone(), fast_listener_config()).unwrap();
    let processor = RecordingProcessor::new();
    manager
        .register_processor(queue_url.as_str(), Arc::new(processor.clone()))
        .unwrap();

    manager.start_listening(queue_url.as_str()).unwrap();
    manager.stop_listening(queue_url.as_str()).unwrap();

    send(&transport, &queue_url, "late").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(processor.delivery_count(), 0);
    assert_eq!(
        common::message_counts(&transport, &queue_url).await,
        (1, 0)
    );
}

/// Verify shutdown_all stops listeners on several queues.
#[tokio::test]
async fn test_shutdown_all_across_queues() {
    let transport = create_transport();
    let queue_manager = QueueManager::new(transport.clone());
    let manager = QueueListenerManager::new(transport, fast_listener_config()).unwrap();

    let mut urls = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        let url = queue_manager.create_queue(name).await.unwrap();
        manager
            .register_processor(url.as_str(), Arc::new(RecordingProcessor::new()))
            .unwrap();
        manager.start_listening(url.as_str()).unwrap();
        urls.push(url);
    }
    assert_eq!(manager.active_queues().len(), 3);

    manager.shutdown_all();

    for url in &urls {
        assert!(!manager.is_listening(url.as_str()));
    }
}

/// A listener on a queue that does not exist keeps running and retries.
#[tokio::test]
async fn test_missing_queue_does_not_stop_listener() {
    let transport = create_transport();
    let manager = QueueListenerManager::new(transport, fast_listener_config()).unwrap();
    let url = "memory://localhost/never-created";
    manager
        .register_processor(url, Arc::new(RecordingProcessor::new()))
        .unwrap();

    manager.start_listening(url).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.is_listening(url));
    manager.stop_listening(url).unwrap();
}
