//! Tests for listener and processing errors.

use super::*;

#[test]
fn test_illegal_state_classification() {
    let url = "memory://localhost/q1".to_string();

    assert!(ListenerError::AlreadyRunning {
        queue_url: url.clone()
    }
    .is_illegal_state());
    assert!(ListenerError::NotRunning {
        queue_url: url.clone()
    }
    .is_illegal_state());
    assert!(ListenerError::NoProcessor { queue_url: url }.is_illegal_state());
    assert!(!ListenerError::invalid_argument("queue_url", "empty").is_illegal_state());
}

#[test]
fn test_validation_error_becomes_invalid_argument() {
    let error: ListenerError = ValidationError::Required {
        field: "queue_url".to_string(),
    }
    .into();

    match error {
        ListenerError::InvalidArgument { field, .. } => assert_eq!(field, "queue_url"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_processing_error_types_are_stable() {
    let parse_failure = serde_json::from_str::<u32>("nope").unwrap_err();

    assert_eq!(
        ProcessingError::invalid_message("empty").error_type(),
        "InvalidMessage"
    );
    assert_eq!(
        ProcessingError::from(parse_failure).error_type(),
        "DeserializationError"
    );
    assert_eq!(
        ProcessingError::from(anyhow::anyhow!("boom")).error_type(),
        "HandlerError"
    );
    assert_eq!(
        ProcessingError::from(QueueError::Timeout {
            duration: std::time::Duration::from_secs(1)
        })
        .error_type(),
        "TransportError"
    );
}

#[test]
fn test_handler_error_message_includes_cause() {
    let error = ProcessingError::from(anyhow::anyhow!("downstream unavailable"));
    assert_eq!(error.to_string(), "Handler failed: downstream unavailable");
}
