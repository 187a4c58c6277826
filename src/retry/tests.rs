use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        timeout: Duration::from_millis(200),
    }
}

#[test]
fn backoff_is_exponential() {
    let policy = RetryPolicy {
        max_attempts: 4,
        initial_backoff: Duration::from_millis(1000),
        timeout: Duration::from_secs(1),
    };
    assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
    assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
    assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
}

#[test]
fn from_config_uses_configured_values() {
    let policy = RetryPolicy::from_config(&RetryConfig {
        max_attempts: 5,
        initial_backoff_ms: 250,
        timeout_seconds: 7,
    });
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    assert_eq!(policy.timeout, Duration::from_secs(7));
}

#[test]
fn status_classification() {
    assert!(matches!(
        CallError::from(ureq::Error::StatusCode(503)),
        CallError::Transient(_)
    ));
    assert!(matches!(
        CallError::from(ureq::Error::StatusCode(429)),
        CallError::Transient(_)
    ));
    assert!(matches!(
        CallError::from(ureq::Error::StatusCode(404)),
        CallError::Permanent(_)
    ));
    assert!(matches!(
        CallError::from(ureq::Error::ConnectionFailed),
        CallError::Transient(_)
    ));
}

#[tokio::test]
async fn retries_transient_failures_until_success() {
    let calls = AtomicU32::new(0);
    let result = fast_policy(3)
        .call("flaky", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(CallError::Transient("connection reset".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

    assert_eq!(result, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let calls = AtomicU32::new(0);
    let result: Result<(), CallError> = fast_policy(5)
        .call("bad request", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::Permanent("HTTP 400".to_string())) }
        })
        .await;

    assert_eq!(result, Err(CallError::Permanent("HTTP 400".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhaustion_returns_last_error() {
    let calls = AtomicU32::new(0);
    let result: Result<(), CallError> = fast_policy(3)
        .call("always down", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(CallError::Transient(format!("attempt {attempt}"))) }
        })
        .await;

    assert_eq!(result, Err(CallError::Transient("attempt 3".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn slow_attempts_time_out() {
    let policy = RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        timeout: Duration::from_millis(20),
    };
    let calls = AtomicU32::new(0);
    let result: Result<(), CallError> = policy
        .call("slow", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

    assert_eq!(result, Err(CallError::TimedOut(Duration::from_millis(20))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn blocking_call_maps_client_errors() {
    let result: Result<String, CallError> = fast_policy(3)
        .call_blocking("blocking", || Err(ureq::Error::StatusCode(401)))
        .await;
    assert!(matches!(result, Err(CallError::Permanent(_))));

    let result = fast_policy(1)
        .call_blocking("blocking", || Ok("body".to_string()))
        .await;
    assert_eq!(result, Ok("body".to_string()));
}
