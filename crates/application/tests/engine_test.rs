//! End-to-end behaviour of the execution engine
//!
//! These tests drive whole handshakes through the public API with a
//! scripted transport standing in for the network.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use tether_application::ports::{FixedClock, ScriptedTransport, TransportError, TransportResponse};
use tether_application::protocols::oauth::{code_challenge, validate_state};
use tether_application::{
    ExecutionEvent, HandshakeExecutor, NoopObserver, PlaceholderResolver, ProtocolRegistry,
    ResolutionContext, RetryPolicy, RunInputs, StrategyContext, is_sensitive, parse, stringify,
};
use tether_domain::catalog::ExecutionLogRecord;
use tether_domain::{
    AuthenticationConfig, EngineSettings, ErrorCode, Handshake, RequestTemplate,
    RetryPolicyConfig, RunState,
};

fn executor(transport: &ScriptedTransport) -> HandshakeExecutor {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let context = StrategyContext::new(Arc::new(transport.clone()), clock.clone());
    HandshakeExecutor::new(
        ProtocolRegistry::with_defaults(context),
        EngineSettings::default(),
        clock,
    )
}

fn handshake(urls: &[&str], retry: RetryPolicyConfig) -> Handshake {
    urls.iter()
        .enumerate()
        .fold(
            Handshake::new("integration", AuthenticationConfig::Curl).with_retry(retry),
            |h, (i, url)| h.with_request(RequestTemplate::new(format!("step-{i}"), format!("curl {url}"))),
        )
}

#[test]
fn test_parse_post_command() {
    let cmd = parse(
        r#"curl -X POST 'https://api.example.com/v1/items' -H 'Content-Type: application/json' -d '{"name":"widget"}'"#,
    );
    assert_eq!(cmd.method, "POST");
    assert_eq!(cmd.url.as_deref(), Some("https://api.example.com/v1/items"));
    assert_eq!(cmd.headers.get("content-type"), Some("application/json"));
    assert_eq!(cmd.body.as_deref(), Some(r#"{"name":"widget"}"#));

    let reparsed = parse(&stringify(&cmd));
    assert!(reparsed.semantically_eq(&cmd));
}

#[test]
fn test_input_and_uuid_resolution() {
    let resolver = PlaceholderResolver::new();
    let context = ResolutionContext::new().with_input("abc");

    let result = resolver.resolve("{INPUT}-{INPUT}-{INPUT}", &context).unwrap();
    assert_eq!(result.output, "abc-abc-abc");
    assert_eq!(result.resolved_names, vec!["INPUT".to_string()]);
    assert!(result.complete);

    let first = resolver.resolve("{UUID} {UUID}", &context).unwrap().output;
    let (a, b) = first.split_once(' ').unwrap();
    assert_eq!(a, b);
    let second = resolver.resolve("{UUID}", &context).unwrap().output;
    assert_ne!(a, second);
}

#[test]
fn test_sensitive_names() {
    assert!(is_sensitive("myApiKey"));
    assert!(is_sensitive("client_secret"));
    assert!(!is_sensitive("apiUrl"));
}

#[test]
fn test_pkce_and_state() {
    assert_eq!(
        code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r7wW1gFWFOEjXk"),
        "E9Melhoa2OwvFrEYTzPlCgwyNnO3Dsvrbd6dBl32dEM"
    );
    assert!(validate_state("s3cr3t-state", "s3cr3t-state").is_ok());
    assert!(validate_state("s3cr3t-state", "s3cr3t-statE").is_err());
    assert!(validate_state("s3cr3t-state", "s3cr3t-state ").is_err());
}

#[tokio::test(start_paused = true)]
async fn test_constant_server_error_exhausts_retries() {
    let transport = ScriptedTransport::always(Ok(TransportResponse::new(500, "down")));
    let executor = executor(&transport);
    let retry = RetryPolicyConfig {
        max_retries: 3,
        base_delay_ms: 100,
        max_delay_ms: 10_000,
        retry_non_idempotent: false,
    };

    let run = executor
        .execute_handshake(&handshake(&["https://flaky.io"], retry), &RunInputs::default(), &NoopObserver)
        .await;

    assert_eq!(run.state, RunState::Failed);
    assert_eq!(transport.call_count(), 4);
    let result = &run.results[0];
    assert_eq!(result.error_code(), Some(ErrorCode::ServerError));
    assert_eq!(result.retry.attempts, 4);
    assert_eq!(result.retry.delays_ms.len(), 3);

    let policy = RetryPolicy::new(retry);
    for (attempt, delay) in (0u32..).zip(&result.retry.delays_ms) {
        let ceiling = u64::try_from(policy.ceiling(attempt).as_millis()).unwrap();
        assert!(*delay >= ceiling / 2, "delay {delay} below window for attempt {attempt}");
        assert!(*delay < ceiling, "delay {delay} above window for attempt {attempt}");
    }
    assert_eq!(result.retry.total_delay_ms, result.retry.delays_ms.iter().sum::<u64>());
}

#[tokio::test(start_paused = true)]
async fn test_client_error_is_never_retried() {
    let transport = ScriptedTransport::always(Ok(TransportResponse::new(404, "missing")));
    let executor = executor(&transport);

    let run = executor
        .execute_handshake(
            &handshake(&["https://api.io/nope"], RetryPolicyConfig::default()),
            &RunInputs::default(),
            &NoopObserver,
        )
        .await;

    assert_eq!(run.state, RunState::Failed);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(run.results[0].retry.attempts, 1);
    assert_eq!(run.results[0].error_code(), Some(ErrorCode::ClientError));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_then_success() {
    let transport = ScriptedTransport::new()
        .then(Err(TransportError::Connection("reset".to_string())))
        .then(Ok(TransportResponse::new(200, r#"{"ok":true}"#)));
    let executor = executor(&transport);

    let run = executor
        .execute_handshake(
            &handshake(&["https://api.io/ok"], RetryPolicyConfig::default()),
            &RunInputs::default(),
            &NoopObserver,
        )
        .await;

    assert_eq!(run.state, RunState::Success);
    assert_eq!(run.results[0].retry.attempts, 2);
    assert_eq!(run.progress, 100);
}

#[tokio::test]
async fn test_cancel_after_first_request() {
    let transport = ScriptedTransport::always(Ok(TransportResponse::new(200, "ok")));
    let executor = executor(&transport);
    let handshake = handshake(
        &["https://api.io/1", "https://api.io/2", "https://api.io/3"],
        RetryPolicyConfig::none(),
    );
    let handle = executor.cancel_handle();
    let handshake_id = handshake.id;
    let observer = move |event: &ExecutionEvent| {
        if matches!(event, ExecutionEvent::Result { .. }) {
            handle.cancel_handshake(handshake_id);
        }
    };

    let run = executor
        .execute_handshake(&handshake, &RunInputs::default(), &observer)
        .await;

    assert_eq!(run.state, RunState::Cancelled);
    assert_eq!(run.results.len(), 1);
    assert_eq!(transport.call_count(), 1);
    assert!(run.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_in_flight_request() {
    let transport = ScriptedTransport::always(Ok(TransportResponse::new(200, "ok")))
        .with_delay(Duration::from_secs(20));
    let executor = executor(&transport);
    let handshake = handshake(&["https://slow.io/1", "https://slow.io/2"], RetryPolicyConfig::none());
    let handle = executor.cancel_handle();
    let inputs = RunInputs::default();

    let (run, cancelled) = tokio::join!(
        executor.execute_handshake(&handshake, &inputs, &NoopObserver),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel_handshake(handshake.id)
        }
    );

    assert_eq!(cancelled, 1);
    assert_eq!(run.state, RunState::Cancelled);
    assert!(run.results.is_empty());
    assert_eq!(transport.call_count(), 1);
    assert_eq!(executor.tracker().get(run.id).await.unwrap().state, RunState::Cancelled);
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let transport = ScriptedTransport::new();
    let executor = executor(&transport);
    let (observer, mut events) = tether_application::ChannelObserver::channel();

    let run = executor
        .execute_handshake(
            &handshake(&["https://api.io/a", "https://api.io/b"], RetryPolicyConfig::none()),
            &RunInputs::default(),
            &observer,
        )
        .await;
    drop(observer);

    let mut progress = Vec::new();
    let mut last = None;
    while let Some(event) = events.recv().await {
        assert_eq!(event.run_id(), run.id);
        if let ExecutionEvent::Progress { progress: p, .. } = event {
            progress.push(p);
        }
        last = Some(event);
    }
    assert_eq!(progress, vec![50, 100]);
    assert_eq!(
        last,
        Some(ExecutionEvent::RunFinished {
            run_id: run.id,
            state: RunState::Success,
        })
    );
}

#[tokio::test]
async fn test_transport_secrets_never_reach_the_stored_log() {
    let transport = ScriptedTransport::always(Err(TransportError::Connection(
        "error sending request for url (https://x.io/v1?access_key=hunter2)".to_string(),
    )));
    let executor = executor(&transport);

    let run = executor
        .execute_handshake(
            &handshake(&["'https://x.io/v1?access_key=hunter2'"], RetryPolicyConfig::none()),
            &RunInputs::default(),
            &NoopObserver,
        )
        .await;
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.error.as_ref().unwrap().code, ErrorCode::NetworkError);

    let stored = serde_json::to_string(&ExecutionLogRecord::from(&run)).unwrap();
    assert!(!stored.contains("hunter2"), "{stored}");
    assert!(stored.contains("access_key=[REDACTED]"));
    let emitted = serde_json::to_string(&run).unwrap();
    assert!(!emitted.contains("hunter2"), "{emitted}");
}

#[tokio::test]
async fn test_configured_fields_are_masked_in_emitted_results() {
    let transport = ScriptedTransport::always(Ok(TransportResponse::new(
        200,
        r#"{"id":1,"tenant":"acme","session":{"token":"t-1"}}"#,
    )
    .with_header("Set-Cookie", "sid=abc")
    .with_header("X-Tenant", "acme")
    .with_header("Location", "https://x.io/next?tenant=acme&page=2")));
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let context = StrategyContext::new(Arc::new(transport.clone()), clock.clone());
    let settings = EngineSettings {
        sensitive_fields: vec!["tenant".to_string()],
        ..EngineSettings::default()
    };
    let executor = HandshakeExecutor::new(ProtocolRegistry::with_defaults(context), settings, clock);
    let (observer, mut events) = tether_application::ChannelObserver::channel();

    let run = executor
        .execute_handshake(
            &handshake(&["https://x.io/me"], RetryPolicyConfig::none()),
            &RunInputs::default(),
            &observer,
        )
        .await;
    drop(observer);
    assert_eq!(run.state, RunState::Success);

    let mut emitted = None;
    while let Some(event) = events.recv().await {
        if let ExecutionEvent::Result { result, .. } = event {
            emitted = Some(*result);
        }
    }
    let emitted = emitted.expect("a result event");
    assert_eq!(emitted, run.results[0]);

    assert_eq!(emitted.headers["set-cookie"], "[REDACTED]");
    assert_eq!(emitted.headers["x-tenant"], "[REDACTED]");
    assert_eq!(emitted.headers["location"], "https://x.io/next?tenant=[REDACTED]&page=2");
    assert_eq!(
        emitted.body_json,
        Some(serde_json::json!({"id": 1, "tenant": "[REDACTED]", "session": "[REDACTED]"}))
    );
    assert!(!emitted.body.contains("acme"));
    assert!(!emitted.body.contains("t-1"));
}
