//! Command implementations for the CLI.

use std::collections::BTreeMap;
use std::error::Error;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tether_application::placeholder::DynamicPlaceholders;
use tether_application::ports::Repository;
use tether_application::{
    ExecutionEvent, ExecutionTracker, HandshakeExecutor, PlaceholderResolver, ProtocolRegistry,
    ResolutionContext, RunInputs, Sanitizer, StrategyContext, TokenCache,
};
use tether_domain::catalog::ExecutionLogRecord;
use tether_domain::{EngineSettings, ExecutionRun, HandshakeExecutionResult, RunState};
use tether_infrastructure::{
    JsonFileRepository, ReqwestTransport, SettingsRepository, SystemClock, load_handshake,
    to_json_stable,
};

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// Options of the `run` command.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub input: Option<String>,
    pub variables: Vec<(String, String)>,
    pub store: Option<PathBuf>,
    pub json: bool,
}

/// Parses a `NAME=VALUE` argument.
pub fn parse_variable(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in {raw:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Returns `arg`, or all of stdin when `arg` is `-`.
pub fn read_text(arg: &str) -> CliResult<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

/// Loads settings from `path` or the default location, with env overrides.
pub async fn load_settings(path: Option<&Path>) -> CliResult<EngineSettings> {
    let repository = path.map_or_else(SettingsRepository::new, SettingsRepository::at);
    Ok(repository.load_with_env().await?)
}

pub fn parse(text: &str) -> CliResult {
    let command = tether_application::parse(text);
    print!("{}", to_json_stable(&command)?);
    Ok(())
}

pub fn validate(text: &str) -> CliResult {
    let command = tether_application::parse(text);
    match tether_application::validate(&command) {
        Ok(()) => {
            println!("ok: {} {}", command.method, command.url.as_deref().unwrap_or_default());
            Ok(())
        }
        Err(problems) => {
            for problem in &problems {
                println!("error[{}]: {problem}", problem.code().as_str());
            }
            Err(format!("{} problem(s) found", problems.len()).into())
        }
    }
}

pub fn render(
    template: &str,
    input: Option<String>,
    variables: Vec<(String, String)>,
    strict: bool,
    settings: &EngineSettings,
) -> CliResult {
    let mut context = ResolutionContext::new()
        .with_variables(variables.into_iter().collect())
        .with_process_env()
        .with_fallback(settings.placeholder_fallback.clone())
        .strict(strict);
    if let Some(input) = input {
        context = context.with_input(input);
    }

    let result = PlaceholderResolver::new().resolve(template, &context)?;
    println!("{}", result.output);
    if !result.complete {
        tracing::warn!(unresolved = ?result.unresolved_names, "unresolved placeholders");
    }
    Ok(())
}

pub fn placeholders() {
    for info in DynamicPlaceholders::available() {
        println!("{:<24} {:<48} e.g. {}", info.syntax, info.description, info.example);
    }
}

fn build_executor(settings: &EngineSettings) -> CliResult<HandshakeExecutor> {
    let transport = ReqwestTransport::new(&settings.user_agent)?;
    let clock = Arc::new(SystemClock);
    let context = StrategyContext::new(Arc::new(transport), clock.clone())
        .with_tokens(TokenCache::from_settings(settings))
        .with_sanitizer(Sanitizer::from_settings(settings));
    let executor = HandshakeExecutor::new(
        ProtocolRegistry::with_defaults(context),
        settings.clone(),
        clock,
    )
    .with_tracker(ExecutionTracker::new(settings.history_capacity));
    Ok(executor)
}

pub fn protocols(settings: &EngineSettings) -> CliResult {
    let executor = build_executor(settings)?;
    for protocol in executor.registry().list_types() {
        println!("{protocol}");
    }
    Ok(())
}

/// One line per finished request.
pub fn describe_result(result: &HandshakeExecutionResult) -> String {
    let status = result
        .status
        .map_or_else(|| "---".to_string(), |s| s.as_u16().to_string());
    let mut line = format!(
        "[{status}] {} ({} ms",
        result.request_name, result.timing.total_ms
    );
    if result.retry.attempts > 1 {
        line.push_str(&format!(", {} attempts", result.retry.attempts));
    }
    line.push(')');
    if let Some(error) = &result.error {
        line.push_str(&format!(" {}: {}", error.code.as_str(), error.message));
    }
    line
}

/// Summary printed once a run has finished.
pub fn describe_run(run: &ExecutionRun) -> String {
    let mut summary = format!(
        "run {} {} ({} request(s), {}%)",
        run.id,
        run.state,
        run.results.len(),
        run.progress
    );
    if let Some(error) = &run.error {
        summary.push_str(&format!("\n{}: {}", error.code.title(), error.message));
        for hint in error.code.suggestions() {
            summary.push_str(&format!("\n  - {hint}"));
        }
    }
    summary
}

pub async fn run(file: &Path, options: RunOptions, settings: EngineSettings) -> CliResult {
    let handshake = load_handshake(file).await?;
    let executor = build_executor(&settings)?;
    let inputs = RunInputs {
        input: options.input,
        variables: options.variables.into_iter().collect::<BTreeMap<_, _>>(),
    };

    let cancel = executor.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            cancel.cancel_all();
        }
    });

    let quiet = options.json;
    let observer = move |event: &ExecutionEvent| {
        if quiet {
            return;
        }
        if let ExecutionEvent::Result { result, .. } = event {
            println!("{}", describe_result(result));
        }
    };
    let run = executor.execute_handshake(&handshake, &inputs, &observer).await;
    interrupt.abort();

    if let Some(dir) = &options.store {
        let repository = JsonFileRepository::<ExecutionLogRecord>::new(dir);
        repository
            .save(ExecutionLogRecord::from(&run))
            .await
            .into_result()?;
        tracing::info!(path = %repository.path().display(), "stored run log");
    }

    if options.json {
        print!("{}", to_json_stable(&run)?);
    } else {
        println!("{}", describe_run(&run));
    }

    match run.state {
        RunState::Success => Ok(()),
        state => Err(format!("handshake {} finished as {state}", handshake.name).into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tether_domain::{ErrorCode, ExecutionError, HandshakeId, RetryMetadata, StatusCode};

    #[test]
    fn test_parse_variable() {
        assert_eq!(
            parse_variable("region=eu-west=1").unwrap(),
            ("region".to_string(), "eu-west=1".to_string())
        );
        assert!(parse_variable("novalue").is_err());
        assert!(parse_variable("=x").is_err());
    }

    #[test]
    fn test_describe_result() {
        let ok = HandshakeExecutionResult::from_response(
            "login",
            StatusCode(200),
            BTreeMap::new(),
            String::new(),
        );
        assert!(describe_result(&ok).starts_with("[200] login ("));

        let failed = HandshakeExecutionResult::failure(
            "fetch",
            ExecutionError::new(ErrorCode::Timeout, "no answer"),
        )
        .with_retry(RetryMetadata {
            attempts: 3,
            ..RetryMetadata::default()
        });
        let line = describe_result(&failed);
        assert!(line.starts_with("[---] fetch"));
        assert!(line.contains("3 attempts"));
        assert!(line.ends_with("TIMEOUT: no answer"));
    }

    #[test]
    fn test_describe_failed_run_lists_suggestions() {
        let mut run = ExecutionRun::new(HandshakeId::new(), chrono::Utc::now());
        run.state = RunState::Failed;
        run.error = Some(ExecutionError::new(ErrorCode::AuthError, "bad credentials"));

        let summary = describe_run(&run);
        assert!(summary.contains("bad credentials"));
        assert_eq!(
            summary.matches("\n  - ").count(),
            ErrorCode::AuthError.suggestions().len()
        );
    }
}
