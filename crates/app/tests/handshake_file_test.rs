//! Integration tests for running handshake definition files
//!
//! These tests load definitions from disk, execute them against a scripted
//! transport and store the resulting run logs with the file repository.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use tether_application::ports::{FixedClock, Repository, ScriptedTransport, TransportResponse};
use tether_application::{HandshakeExecutor, NoopObserver, ProtocolRegistry, RunInputs, StrategyContext};
use tether_domain::catalog::ExecutionLogRecord;
use tether_domain::{EngineSettings, ErrorCode, RunState};
use tether_infrastructure::{JsonFileRepository, SettingsRepository, load_handshake};

const DEFINITION: &str = r#"
name: profile
auth:
  type: api_key
  key: '{INPUT}'
  name: X-Api-Key
retry:
  max_retries: 0
requests:
  - name: me
    command: curl https://{api_host}/v1/me
  - name: orders
    command: "curl -X POST https://{api_host}/v1/orders -H 'Content-Type: application/json' -d 'ping'"
"#;

fn executor(transport: &ScriptedTransport, settings: EngineSettings) -> HandshakeExecutor {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let context = StrategyContext::new(Arc::new(transport.clone()), clock.clone());
    HandshakeExecutor::new(ProtocolRegistry::with_defaults(context), settings, clock)
}

#[tokio::test]
async fn test_run_yaml_definition() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let file = temp_dir.path().join("profile.yaml");
    std::fs::write(&file, DEFINITION).unwrap();

    let handshake = load_handshake(&file).await.expect("Failed to load definition");
    assert_eq!(handshake.requests.len(), 2);

    let transport = ScriptedTransport::always(Ok(TransportResponse::new(200, r#"{"id":7}"#)));
    let run = executor(&transport, EngineSettings::default())
        .execute_handshake(
            &handshake,
            &RunInputs::with_input("k-123").variable("api_host", "api.example.com"),
            &NoopObserver,
        )
        .await;

    assert_eq!(run.state, RunState::Success);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, "https://api.example.com/v1/me");
    assert_eq!(requests[0].header("X-Api-Key"), Some("k-123"));
    assert_eq!(requests[1].header("content-type"), Some("application/json"));
    assert_eq!(run.results[0].body_json.as_ref().unwrap()["id"], 7);
}

#[tokio::test]
async fn test_failed_run_log_is_stored() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let file = temp_dir.path().join("profile.yml");
    std::fs::write(&file, DEFINITION).unwrap();
    let handshake = load_handshake(&file).await.unwrap();

    let transport = ScriptedTransport::always(Ok(TransportResponse::new(401, "denied")));
    let run = executor(&transport, EngineSettings::default())
        .execute_handshake(
            &handshake,
            &RunInputs::with_input("k-123").variable("api_host", "api.example.com"),
            &NoopObserver,
        )
        .await;
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(transport.call_count(), 1);

    let store = temp_dir.path().join("logs");
    let repository = JsonFileRepository::<ExecutionLogRecord>::new(&store);
    repository
        .save(ExecutionLogRecord::from(&run))
        .await
        .into_result()
        .unwrap();

    let reloaded = JsonFileRepository::<ExecutionLogRecord>::new(&store)
        .get(&run.id.to_string())
        .await
        .into_result()
        .unwrap()
        .expect("run log should exist");
    assert_eq!(reloaded.state, RunState::Failed);
    assert_eq!(reloaded.error.unwrap().code, ErrorCode::ClientError);
    assert!(!reloaded.entries.is_empty());
    assert!(
        reloaded.entries.iter().all(|e| !e.message.contains("k-123")),
        "secrets must not reach stored logs"
    );
}

#[tokio::test]
async fn test_settings_file_drives_the_engine() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let path = temp_dir.path().join("settings.json");
    std::fs::write(&path, r#"{"strict_placeholders": true}"#).unwrap();
    let settings = SettingsRepository::at(&path).load().await.unwrap();

    let file = temp_dir.path().join("profile.json");
    std::fs::write(
        &file,
        r#"{"name": "strict", "requests": [{"name": "a", "command": "curl https://{missing_host}/"}]}"#,
    )
    .unwrap();
    let handshake = load_handshake(&file).await.unwrap();

    let transport = ScriptedTransport::new();
    let run = executor(&transport, settings)
        .execute_handshake(&handshake, &RunInputs::default(), &NoopObserver)
        .await;

    assert_eq!(run.state, RunState::Failed);
    assert_eq!(transport.call_count(), 0);
}
