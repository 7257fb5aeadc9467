use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tabrelay_protocols::{
    BrokerError, CloseReason, ConnectionId, CorrelationId, FilterMode, ReplyError, SelectionPolicy,
};

use super::*;
use crate::filter::{FilterEngine, ModeSwitch};
use crate::pending::PendingTable;
use crate::registry::ConnectionRegistry;
use crate::test_support::{RecordingTransport, hello};

struct Harness {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    mode: Arc<ModeSwitch>,
    broker: Arc<RequestBroker>,
}

fn harness(allow_mode_override: bool) -> Harness {
    let registry = Arc::new(ConnectionRegistry::new(SelectionPolicy::default()));
    let pending = PendingTable::new();
    registry.add_listener(pending.clone());
    let mode = Arc::new(ModeSwitch::default());
    let broker = Arc::new(RequestBroker::new(
        registry.clone(),
        pending.clone(),
        Arc::new(FilterEngine::default()),
        mode.clone(),
        allow_mode_override,
    ));
    Harness {
        registry,
        pending,
        mode,
        broker,
    }
}

impl Harness {
    fn connect(&self) -> (ConnectionId, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new();
        let id = self.registry.register(transport.clone());
        self.registry.confirm(id, hello("ext")).unwrap();
        (id, transport)
    }

    fn spawn_execute(
        &self,
        request: ExecuteRequest,
    ) -> tokio::task::JoinHandle<Result<Value, BrokerError>> {
        let broker = self.broker.clone();
        tokio::spawn(async move { broker.execute(request).await })
    }
}

/// Wait for the `index`-th frame the transport received.
async fn frame(transport: &RecordingTransport, index: usize) -> Value {
    for _ in 0..100 {
        if let Some(frame) = transport.sent_json().into_iter().nth(index) {
            return frame;
        }
        tokio::task::yield_now().await;
    }
    panic!("no frame #{index} was sent");
}

fn correlation(frame: &Value) -> CorrelationId {
    CorrelationId::from(frame["correlationId"].as_str().unwrap())
}

fn request(operation: &str) -> ExecuteRequest {
    ExecuteRequest::new(operation, json!({}), Duration::from_secs(5))
}

#[tokio::test]
async fn test_no_connection_fails_immediately() {
    let h = harness(false);
    let err = h.broker.execute(request("getTabs")).await.unwrap_err();
    assert_eq!(
        err,
        BrokerError::NoActiveConnection {
            operation: "getTabs".to_string()
        }
    );
    assert!(h.pending.is_empty());
}

#[tokio::test]
async fn test_reply_is_filtered_and_returned() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let call = h.spawn_execute(ExecuteRequest::new(
        "getCookies",
        json!({"url": "https://example.com"}),
        Duration::from_secs(5),
    ));
    let sent = frame(&transport, 0).await;
    assert_eq!(sent["operation"], json!("getCookies"));
    assert_eq!(sent["params"], json!({"url": "https://example.com"}));

    assert!(h.broker.handle_reply(
        id,
        &correlation(&sent),
        Some(json!({"sessionCookie": "abc", "domain": "example.com"})),
        None,
    ));

    let result = call.await.unwrap().unwrap();
    assert_eq!(
        result,
        json!({"sessionCookie": "[COOKIE_REDACTED]", "domain": "example.com"})
    );
    assert!(h.pending.is_empty());
}

#[tokio::test]
async fn test_null_params_become_empty_object() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let call = h.spawn_execute(ExecuteRequest::new("ping", Value::Null, Duration::from_secs(5)));
    let sent = frame(&transport, 0).await;
    assert_eq!(sent["params"], json!({}));

    h.broker.handle_reply(id, &correlation(&sent), None, None);
    assert_eq!(call.await.unwrap().unwrap(), Value::Null);
}

#[tokio::test]
async fn test_non_object_params_are_rejected() {
    let h = harness(false);
    h.connect();
    let err = h
        .broker
        .execute(ExecuteRequest::new("ping", json!([1, 2]), Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::MalformedMessage { ref detail, .. } if detail.contains("array")));
}

#[tokio::test]
async fn test_closure_before_reply_is_connection_closed() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let call = h.spawn_execute(request("getTabs"));
    frame(&transport, 0).await;
    h.registry.close(id, CloseReason::ClientClosed).unwrap();

    match call.await.unwrap() {
        Err(BrokerError::ConnectionClosed {
            operation,
            connection,
            reason,
            ..
        }) => {
            assert_eq!(operation, "getTabs");
            assert_eq!(connection, id);
            assert_eq!(reason, CloseReason::ClientClosed);
        }
        other => panic!("expected ConnectionClosed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_silence_yields_timeout() {
    let h = harness(false);
    let (id, _transport) = h.connect();

    let err = h
        .broker
        .execute(ExecuteRequest::new("slow", json!({}), Duration::from_millis(250)))
        .await
        .unwrap_err();

    match err {
        BrokerError::Timeout {
            connection,
            elapsed,
            ..
        } => {
            assert_eq!(connection, id);
            assert!(elapsed >= Duration::from_millis(250));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(h.pending.is_empty());
}

#[tokio::test]
async fn test_duplicate_reply_is_dropped() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let call = h.spawn_execute(request("getTabs"));
    let sent = frame(&transport, 0).await;
    let correlation_id = correlation(&sent);

    assert!(h.broker.handle_reply(id, &correlation_id, Some(json!(["first"])), None));
    assert!(!h.broker.handle_reply(id, &correlation_id, Some(json!(["second"])), None));
    assert_eq!(call.await.unwrap().unwrap(), json!(["first"]));
}

#[tokio::test(start_paused = true)]
async fn test_reply_from_other_connection_is_ignored() {
    let h = harness(false);
    let (_, first_transport) = h.connect();
    tokio::time::advance(Duration::from_millis(10)).await;
    let (second, second_transport) = h.connect();

    let call = h.spawn_execute(request("getTabs"));
    let sent = frame(&second_transport, 0).await;
    assert!(first_transport.sent().is_empty());

    let intruder = ConnectionId::new(second.as_u64() - 1);
    assert!(!h.broker.handle_reply(intruder, &correlation(&sent), Some(json!("spoofed")), None));
    assert!(h.broker.handle_reply(second, &correlation(&sent), Some(json!("real")), None));
    assert_eq!(call.await.unwrap().unwrap(), json!("real"));
}

#[tokio::test]
async fn test_extension_error_is_operation_failed() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let call = h.spawn_execute(request("navigate"));
    let sent = frame(&transport, 0).await;
    h.broker.handle_reply(
        id,
        &correlation(&sent),
        None,
        Some(ReplyError {
            kind: "NavigationError".to_string(),
            message: "blocked url?token=abc123".to_string(),
        }),
    );

    match call.await.unwrap() {
        Err(BrokerError::OperationFailed { kind, message, .. }) => {
            assert_eq!(kind, "NavigationError");
            assert_eq!(message, "blocked url?token=[SECRET_REDACTED]");
        }
        other => panic!("expected OperationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_failure_is_connection_closed() {
    let h = harness(false);
    let (id, transport) = h.connect();
    transport.refuse_sends();

    match h.broker.execute(request("getTabs")).await {
        Err(BrokerError::ConnectionClosed { reason, connection, .. }) => {
            assert_eq!(reason, CloseReason::SendFailed);
            assert_eq!(connection, id);
        }
        other => panic!("expected ConnectionClosed, got {other:?}"),
    }
    assert!(h.pending.is_empty());
    assert_eq!(h.registry.state(id), None);
    assert!(transport.is_closed());
}

#[tokio::test]
async fn test_send_failure_stops_routing_to_that_connection() {
    let h = harness(false);
    let (broken, broken_transport) = h.connect();
    broken_transport.refuse_sends();

    assert!(h.broker.execute(request("getTabs")).await.is_err());
    assert!(!h.registry.is_active(broken));

    let (healthy, transport) = h.connect();
    let call = h.spawn_execute(request("getTabs"));
    let sent = frame(&transport, 0).await;
    assert!(h.broker.handle_reply(healthy, &correlation(&sent), Some(json!([])), None));
    assert_eq!(call.await.unwrap().unwrap(), json!([]));
}

#[tokio::test]
async fn test_filtered_reports_applied_mode() {
    let h = harness(true);
    let (id, transport) = h.connect();

    let broker = h.broker.clone();
    let call = tokio::spawn(async move {
        broker
            .execute_filtered(request("read").with_mode(FilterMode::RedactNone))
            .await
    });
    let sent = frame(&transport, 0).await;
    h.mode.set(FilterMode::RedactAll);
    h.broker
        .handle_reply(id, &correlation(&sent), Some(json!({"password": "p"})), None);

    let filtered = call.await.unwrap().unwrap();
    assert_eq!(filtered.mode, FilterMode::RedactNone);
    assert_eq!(filtered.result, json!({"password": "p"}));
}

#[tokio::test]
async fn test_filtered_mode_follows_switch_made_while_pending() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let broker = h.broker.clone();
    let call = tokio::spawn(async move { broker.execute_filtered(request("read")).await });
    let sent = frame(&transport, 0).await;
    h.mode.set(FilterMode::RedactNone);
    h.broker
        .handle_reply(id, &correlation(&sent), Some(json!({"password": "p"})), None);

    let filtered = call.await.unwrap().unwrap();
    assert_eq!(filtered.mode, FilterMode::RedactNone);
    assert_eq!(filtered.result, json!({"password": "p"}));
}

#[tokio::test]
async fn test_mode_change_applies_to_next_call() {
    let h = harness(false);
    let (id, transport) = h.connect();
    let payload = json!({"password": "hunter2"});

    h.mode.set(FilterMode::RedactNone);
    let call = h.spawn_execute(request("read"));
    let sent = frame(&transport, 0).await;
    h.broker.handle_reply(id, &correlation(&sent), Some(payload.clone()), None);
    assert_eq!(call.await.unwrap().unwrap(), payload);

    h.mode.set(FilterMode::RedactSensitive);
    let call = h.spawn_execute(request("read"));
    let sent = frame(&transport, 1).await;
    h.broker.handle_reply(id, &correlation(&sent), Some(payload.clone()), None);
    assert_eq!(
        call.await.unwrap().unwrap(),
        json!({"password": "[PASSWORD_REDACTED]"})
    );
}

#[test]
fn test_mode_override_requires_permission() {
    let strict = harness(false);
    assert_eq!(
        strict.broker.effective_mode(Some(FilterMode::RedactNone)),
        FilterMode::RedactSensitive
    );

    let relaxed = harness(true);
    assert_eq!(
        relaxed.broker.effective_mode(Some(FilterMode::RedactNone)),
        FilterMode::RedactNone
    );
    assert_eq!(relaxed.broker.effective_mode(None), FilterMode::RedactSensitive);
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated_independently() {
    let h = harness(false);
    let (id, transport) = h.connect();

    let first = h.spawn_execute(request("a"));
    let second = h.spawn_execute(request("b"));
    let frame_a = frame(&transport, 0).await;
    let frame_b = frame(&transport, 1).await;
    assert_ne!(correlation(&frame_a), correlation(&frame_b));

    // Answer out of order.
    for sent in [&frame_b, &frame_a] {
        let op = sent["operation"].clone();
        h.broker.handle_reply(id, &correlation(sent), Some(op), None);
    }

    assert_eq!(first.await.unwrap().unwrap(), json!("a"));
    assert_eq!(second.await.unwrap().unwrap(), json!("b"));
}
