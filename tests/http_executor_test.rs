mod common;

use std::time::Duration;

use common::{Upstream, unreachable_url};
use replaybox::entry::RequestSnapshot;
use replaybox::executor::{
    ExecutionOutcome, FailureKind, HttpConfig, HttpExecutor, RequestExecutor,
};

fn executor() -> HttpExecutor {
    HttpExecutor::new(HttpConfig {
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(300),
        idempotency_header: "X-Idempotency-Key".to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_success_carries_status_headers_and_body() {
    let upstream = Upstream::start().await;
    upstream.script("/created", &[201]);

    let request = RequestSnapshot::new("post", upstream.url("/created"))
        .with_header("X-Trace", "t-1")
        .with_body("payload");
    let outcome = executor().execute(&request, Some("key-1")).await;

    let response = match outcome {
        ExecutionOutcome::Success(response) => response,
        other => panic!("expected success, got {:?}", other),
    };
    assert_eq!(response.status, 201);
    assert_eq!(&response.body[..], b"201 /created");
    assert!(response.headers.contains_key("content-type"));

    let hit = &upstream.hits()[0];
    assert_eq!(hit.method, "POST");
    assert_eq!(hit.body, "payload");
    assert_eq!(hit.headers.get("x-trace").map(String::as_str), Some("t-1"));
    assert_eq!(hit.headers.get("x-idempotency-key").map(String::as_str), Some("key-1"));
    assert!(hit.headers.get("user-agent").is_some_and(|ua| ua.starts_with("replaybox/")));
}

#[tokio::test]
async fn test_no_idempotency_header_without_key() {
    let upstream = Upstream::start().await;

    executor()
        .execute(&RequestSnapshot::new("GET", upstream.url("/plain")), None)
        .await;

    assert!(!upstream.hits()[0].headers.contains_key("x-idempotency-key"));
}

#[tokio::test]
async fn test_server_errors_are_retryable() {
    let upstream = Upstream::start().await;
    upstream.script("/busy", &[503]);

    let outcome = executor()
        .execute(&RequestSnapshot::new("POST", upstream.url("/busy")), None)
        .await;

    match outcome {
        ExecutionOutcome::Retryable(failure) => {
            assert_eq!(failure.kind, FailureKind::Status(503));
            assert_eq!(failure.code.as_deref(), Some("HTTP_503"));
            assert!(!failure.is_network());
        }
        other => panic!("expected retryable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_errors_are_terminal() {
    let upstream = Upstream::start().await;
    upstream.script("/gone", &[410]);

    let outcome = executor()
        .execute(&RequestSnapshot::new("DELETE", upstream.url("/gone")), None)
        .await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Terminal(ref f) if f.kind == FailureKind::Status(410)
    ));
}

#[tokio::test]
async fn test_connection_refused_is_network_retryable() {
    let outcome = executor()
        .execute(&RequestSnapshot::new("POST", unreachable_url("/x")), None)
        .await;

    match outcome {
        ExecutionOutcome::Retryable(failure) => {
            assert!(failure.is_network());
            assert_eq!(failure.code.as_deref(), Some("NETWORK_ERROR"));
        }
        other => panic!("expected retryable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_network_retryable() {
    let upstream = Upstream::start().await;

    let outcome = executor()
        .execute(&RequestSnapshot::new("POST", upstream.url("/slow")), None)
        .await;

    match outcome {
        ExecutionOutcome::Retryable(failure) => {
            assert!(failure.is_network());
            assert_eq!(failure.code.as_deref(), Some("TIMEOUT"));
        }
        other => panic!("expected retryable, got {:?}", other),
    }
}
