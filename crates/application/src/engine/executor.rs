//! Handshake executor
//!
//! Runs one handshake end to end: resolves the strategy, authenticates once,
//! then executes each request in order under the retry policy, per-attempt
//! timeout and the run's cancellation token.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tether_domain::{
    AuthenticationConfig, Credentials, EngineSettings, ErrorCode, ExecutionError, ExecutionRun,
    Handshake, HandshakeExecutionResult, HandshakeId, Headers, HttpMethod, LogEntry, LogLevel,
    ProtocolPayload, RequestSpec, RequestTemplate, RetryMetadata, RunId, RunState,
    TimingMetrics,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::observer::{ExecutionEvent, ExecutionObserver};
use super::retry::RetryPolicy;
use crate::command::parse;
use crate::lifecycle::ExecutionTracker;
use crate::placeholder::{EnvLookup, PlaceholderError, PlaceholderResolver, ResolutionContext};
use crate::ports::Clock;
use crate::protocols::{ExecOptions, ProtocolStrategy};
use crate::registry::ProtocolRegistry;
use crate::sanitizer::Sanitizer;

/// Caller-supplied values for one run.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    /// Value for `{INPUT}`.
    pub input: Option<String>,
    /// Variables layered over the handshake's own.
    pub variables: BTreeMap<String, String>,
}

impl RunInputs {
    /// Inputs with only `{INPUT}` set.
    #[must_use]
    pub fn with_input(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            variables: BTreeMap::new(),
        }
    }

    /// Adds a variable.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug)]
struct ActiveRun {
    handshake_id: HandshakeId,
    token: CancellationToken,
}

/// Cancels active runs. Cheap to clone and safe to use from observers.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    active: Arc<Mutex<HashMap<RunId, ActiveRun>>>,
}

impl CancelHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RunId, ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, run_id: RunId, handshake_id: HandshakeId) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(
            run_id,
            ActiveRun {
                handshake_id,
                token: token.clone(),
            },
        );
        token
    }

    fn release(&self, run_id: RunId) {
        self.lock().remove(&run_id);
    }

    /// Cancels one run. Returns false if it is not active.
    pub fn cancel(&self, run_id: RunId) -> bool {
        self.lock().get(&run_id).is_some_and(|run| {
            run.token.cancel();
            true
        })
    }

    /// Cancels every active run of a handshake and returns how many there were.
    pub fn cancel_handshake(&self, handshake_id: HandshakeId) -> usize {
        self.lock()
            .values()
            .filter(|run| run.handshake_id == handshake_id)
            .inspect(|run| run.token.cancel())
            .count()
    }

    /// Cancels every active run.
    pub fn cancel_all(&self) -> usize {
        self.lock().values().inspect(|run| run.token.cancel()).count()
    }

    /// Returns true while the run executes.
    #[must_use]
    pub fn is_active(&self, run_id: RunId) -> bool {
        self.lock().contains_key(&run_id)
    }
}

struct RunScope<'a> {
    run_id: RunId,
    token: CancellationToken,
    observer: &'a dyn ExecutionObserver,
}

/// Executes handshakes.
pub struct HandshakeExecutor {
    registry: ProtocolRegistry,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    tracker: ExecutionTracker,
    sanitizer: Sanitizer,
    resolver: PlaceholderResolver,
    env: EnvLookup,
    cancel: CancelHandle,
}

impl std::fmt::Debug for HandshakeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeExecutor")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Method used to judge whether a request may be retried.
fn effective_method(request: &RequestSpec) -> HttpMethod {
    match request.payload {
        Some(ProtocolPayload::GraphQl { .. } | ProtocolPayload::Soap { .. }) => HttpMethod::Post,
        Some(ProtocolPayload::WebSocket { .. }) => HttpMethod::Get,
        None => request.command.method.parse().unwrap_or_default(),
    }
}

/// Collects unresolved placeholder names across several resolutions.
struct Resolution<'a> {
    resolver: PlaceholderResolver,
    context: &'a ResolutionContext,
    unresolved: Vec<String>,
}

impl Resolution<'_> {
    fn text(&mut self, template: &str) -> Result<String, PlaceholderError> {
        let result = self.resolver.resolve(template, self.context)?;
        for name in result.unresolved_names {
            if !self.unresolved.contains(&name) {
                self.unresolved.push(name);
            }
        }
        Ok(result.output)
    }

    fn opt(&mut self, template: Option<&str>) -> Result<Option<String>, PlaceholderError> {
        template.map(|t| self.text(t)).transpose()
    }

    fn value(&mut self, value: &mut Value) -> Result<(), PlaceholderError> {
        match value {
            Value::String(text) => *text = self.text(text)?,
            Value::Array(items) => {
                for item in items {
                    self.value(item)?;
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    self.value(item)?;
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
        Ok(())
    }

    fn payload(&mut self, payload: &ProtocolPayload) -> Result<ProtocolPayload, PlaceholderError> {
        Ok(match payload {
            ProtocolPayload::GraphQl {
                query,
                variables,
                operation_name,
            } => ProtocolPayload::GraphQl {
                // Selection sets like `{viewer{login}}` share placeholder syntax.
                query: query.clone(),
                variables: self.opt(variables.as_deref())?,
                operation_name: self.opt(operation_name.as_deref())?,
            },
            ProtocolPayload::Soap {
                action,
                body_xml,
                header_xml,
            } => ProtocolPayload::Soap {
                action: self.text(action)?,
                body_xml: self.text(body_xml)?,
                header_xml: self.opt(header_xml.as_deref())?,
            },
            ProtocolPayload::WebSocket {
                messages,
                expect_messages,
            } => ProtocolPayload::WebSocket {
                messages: messages
                    .iter()
                    .map(|m| self.text(m))
                    .collect::<Result<_, _>>()?,
                expect_messages: *expect_messages,
            },
        })
    }
}

impl HandshakeExecutor {
    /// Creates an executor. `{ENV:NAME}` reads the process environment.
    #[must_use]
    pub fn new(registry: ProtocolRegistry, settings: EngineSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            tracker: ExecutionTracker::new(settings.history_capacity),
            sanitizer: Sanitizer::from_settings(&settings),
            registry,
            settings,
            clock,
            resolver: PlaceholderResolver::new(),
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            cancel: CancelHandle::default(),
        }
    }

    /// Replaces the `{ENV:NAME}` lookup.
    #[must_use]
    pub fn with_environment(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Shares an existing tracker.
    #[must_use]
    pub fn with_tracker(mut self, tracker: ExecutionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// The run tracker.
    #[must_use]
    pub const fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    /// The strategy registry.
    #[must_use]
    pub const fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Effective engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A handle that can cancel runs of this executor.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancels one active run.
    pub fn cancel(&self, run_id: RunId) -> bool {
        self.cancel.cancel(run_id)
    }

    /// Cancels every active run of a handshake.
    pub fn cancel_handshake(&self, handshake_id: HandshakeId) -> usize {
        self.cancel.cancel_handshake(handshake_id)
    }

    /// Executes `handshake` and returns the finished run.
    ///
    /// Never fails: every outcome, including configuration problems, ends in
    /// a terminal run state.
    pub async fn execute_handshake(
        &self,
        handshake: &Handshake,
        inputs: &RunInputs,
        observer: &dyn ExecutionObserver,
    ) -> ExecutionRun {
        let run = self.tracker.create_run(handshake.id, self.clock.now()).await;
        let scope = RunScope {
            run_id: run.id,
            token: self.cancel.register(run.id, handshake.id),
            observer,
        };

        let (outcome, error) = self.drive(handshake, inputs, &scope).await;
        self.cancel.release(run.id);

        let finished = match self
            .tracker
            .finish(run.id, outcome, error, self.clock.now())
            .await
        {
            Ok(finished) => finished,
            Err(err) => {
                warn!(run = %run.id, error = %err, "could not finish run");
                self.tracker.get(run.id).await.unwrap_or(run)
            }
        };
        info!(
            handshake = %handshake.name,
            run = %finished.id,
            state = %finished.state,
            results = finished.results.len(),
            "run finished"
        );
        observer.on_event(&ExecutionEvent::RunFinished {
            run_id: finished.id,
            state: finished.state,
        });
        finished
    }

    async fn drive(
        &self,
        handshake: &Handshake,
        inputs: &RunInputs,
        scope: &RunScope<'_>,
    ) -> (RunState, Option<ExecutionError>) {
        if let Err(err) = self.tracker.start(scope.run_id, self.clock.now()).await {
            warn!(run = %scope.run_id, error = %err, "could not start run");
        }
        scope.observer.on_event(&ExecutionEvent::RunStarted {
            run_id: scope.run_id,
            handshake_id: handshake.id,
        });
        let protocol = handshake.protocol_type();
        info!(
            handshake = %handshake.name,
            run = %scope.run_id,
            protocol = %protocol,
            requests = handshake.requests.len(),
            "run started"
        );

        let handler = match self.registry.create_handler(protocol) {
            Ok(handler) => handler,
            Err(err) => return self.fail(scope, ErrorCode::Unknown, err.to_string()).await,
        };

        let mut context = self.resolution_context(handshake, inputs);
        let auth = match self.resolve_auth(&handshake.auth, &context) {
            Ok((auth, unresolved)) => {
                self.warn_unresolved(scope, "authentication", &unresolved).await;
                auth
            }
            Err(err) => return self.fail(scope, err.code, err.message).await,
        };

        let outcome = tokio::select! {
            biased;
            () = scope.token.cancelled() => return (RunState::Cancelled, None),
            outcome = handler.authenticate(&auth) => outcome,
        };
        if !outcome.success {
            let message = outcome
                .error
                .map_or_else(|| "authentication failed".to_string(), |e| e.to_string());
            warn!(handshake = %handshake.name, run = %scope.run_id, "authentication failed");
            return self.fail(scope, ErrorCode::AuthError, message).await;
        }
        let credentials = outcome.credentials.unwrap_or_else(Credentials::none);
        self.log(scope, LogLevel::Info, format!("authenticated ({protocol})"))
            .await;

        let policy = RetryPolicy::new(handshake.retry.unwrap_or(self.settings.retry));
        let timeout = handshake
            .timeout_ms
            .map_or_else(|| self.settings.request_timeout(), Duration::from_millis);
        let total = handshake.requests.len();
        let mut first_error = None;

        for (index, template) in handshake.requests.iter().enumerate() {
            if scope.token.is_cancelled() {
                return (RunState::Cancelled, None);
            }

            context.now = Some(self.clock.now());
            let result = match self.prepare(template, &context) {
                Ok((request, unresolved)) => {
                    self.warn_unresolved(scope, &request.name, &unresolved).await;
                    let call = Call {
                        handler: handler.as_ref(),
                        request: &request,
                        auth: &auth,
                        credentials: &credentials,
                        policy,
                        timeout,
                    };
                    match self.execute_with_retry(&call, scope).await {
                        Some(result) => result,
                        None => return (RunState::Cancelled, None),
                    }
                }
                Err(err) => HandshakeExecutionResult::failure(
                    &template.name,
                    ExecutionError::new(err.code(), err.to_string()),
                ),
            };

            let result = self.sanitizer.sanitize_result(&result);
            self.report(scope, &result).await;
            let success = result.success;
            if !success && first_error.is_none() {
                first_error.clone_from(&result.error);
            }
            if let Err(err) = self.tracker.record_result(scope.run_id, result.clone()).await {
                warn!(run = %scope.run_id, error = %err, "could not record result");
            }
            scope.observer.on_event(&ExecutionEvent::Result {
                run_id: scope.run_id,
                result: Box::new(result),
            });

            let progress = u8::try_from((index + 1) * 100 / total).unwrap_or(100);
            if let Ok(progress) = self.tracker.set_progress(scope.run_id, progress).await {
                scope.observer.on_event(&ExecutionEvent::Progress {
                    run_id: scope.run_id,
                    progress,
                });
            }

            if !success && !handshake.continue_on_error {
                break;
            }
        }

        match first_error {
            None => (RunState::Success, None),
            Some(error) => (RunState::Failed, Some(error)),
        }
    }

    fn resolution_context(&self, handshake: &Handshake, inputs: &RunInputs) -> ResolutionContext {
        let mut variables = handshake.variables.clone();
        variables.extend(inputs.variables.clone());
        let mut context = ResolutionContext::new()
            .with_variables(variables)
            .strict(
                handshake
                    .strict_placeholders
                    .unwrap_or(self.settings.strict_placeholders),
            )
            .with_fallback(self.settings.placeholder_fallback.clone())
            .at(self.clock.now());
        context.input.clone_from(&inputs.input);
        context.env = Some(self.env.clone());
        context
    }

    /// Resolves placeholders in every string field of the configuration.
    fn resolve_auth(
        &self,
        config: &AuthenticationConfig,
        context: &ResolutionContext,
    ) -> Result<(AuthenticationConfig, Vec<String>), ExecutionError> {
        let invalid = |e: serde_json::Error| {
            ExecutionError::new(ErrorCode::ParseError, format!("invalid authentication config: {e}"))
        };
        let mut value = serde_json::to_value(config).map_err(invalid)?;
        let mut resolution = Resolution {
            resolver: self.resolver,
            context,
            unresolved: Vec::new(),
        };
        resolution
            .value(&mut value)
            .map_err(|e| ExecutionError::new(e.code(), e.to_string()))?;
        let resolved = serde_json::from_value(value).map_err(invalid)?;
        Ok((resolved, resolution.unresolved))
    }

    /// Parses a template's command and resolves its placeholders field by field.
    fn prepare(
        &self,
        template: &RequestTemplate,
        context: &ResolutionContext,
    ) -> Result<(RequestSpec, Vec<String>), PlaceholderError> {
        let mut resolution = Resolution {
            resolver: self.resolver,
            context,
            unresolved: Vec::new(),
        };
        let mut command = parse(&template.command);
        command.url = resolution.opt(command.url.as_deref())?;
        let mut headers = Headers::new();
        for header in command.headers.iter() {
            headers.set(resolution.text(&header.name)?, resolution.text(&header.value)?);
        }
        command.headers = headers;
        command.body = resolution.opt(command.body.as_deref())?;
        command.user = resolution.opt(command.user.as_deref())?;
        command.form = command
            .form
            .iter()
            .map(|field| resolution.text(field))
            .collect::<Result<_, _>>()?;
        let payload = template
            .payload
            .as_ref()
            .map(|p| resolution.payload(p))
            .transpose()?;

        Ok((
            RequestSpec {
                name: template.name.clone(),
                command,
                payload,
            },
            resolution.unresolved,
        ))
    }

    async fn execute_with_retry(
        &self,
        call: &Call<'_>,
        scope: &RunScope<'_>,
    ) -> Option<HandshakeExecutionResult> {
        let name = &call.request.name;
        let method = effective_method(call.request);
        let started = tokio::time::Instant::now();
        let started_at = self.clock.now();
        let mut delays: Vec<u64> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            debug!(request = %name, attempt = attempt + 1, "executing attempt");
            let options = ExecOptions {
                timeout: call.timeout,
                abort: scope.token.child_token(),
                user_agent: Some(self.settings.user_agent.clone()),
            };
            let attempt_call = tokio::time::timeout(
                call.timeout,
                call.handler
                    .execute_request(call.request, call.auth, call.credentials, &options),
            );
            let result = tokio::select! {
                biased;
                () = scope.token.cancelled() => return None,
                outcome = attempt_call => outcome.unwrap_or_else(|_| {
                    HandshakeExecutionResult::failure(
                        name,
                        ExecutionError::new(
                            ErrorCode::Timeout,
                            format!("request timed out after {}ms", millis(call.timeout)),
                        ),
                    )
                }),
            };

            if !call.policy.should_retry(&result, method, attempt) {
                let timing = TimingMetrics {
                    started_at: Some(started_at),
                    last_attempt_ms: result.timing.last_attempt_ms,
                    total_ms: millis(started.elapsed()),
                };
                let total_delay_ms = delays.iter().sum();
                return Some(result.with_timing(timing).with_retry(RetryMetadata {
                    attempts: attempt + 1,
                    delays_ms: delays,
                    total_delay_ms,
                }));
            }

            let delay = call.policy.delay_for(attempt);
            let reason = result
                .error
                .as_ref()
                .map_or_else(|| "failed".to_string(), |e| e.code.to_string());
            warn!(
                request = %name,
                attempt = attempt + 1,
                reason = %reason,
                delay_ms = millis(delay),
                "attempt failed, retrying"
            );
            self.log(
                scope,
                LogLevel::Warn,
                format!(
                    "{name}: attempt {} failed ({reason}), retrying in {}ms",
                    attempt + 1,
                    millis(delay)
                ),
            )
            .await;

            tokio::select! {
                biased;
                () = scope.token.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }
            delays.push(millis(delay));
            attempt += 1;
        }
    }

    async fn report(&self, scope: &RunScope<'_>, result: &HandshakeExecutionResult) {
        let message = match (&result.error, result.status) {
            (None, Some(status)) => format!(
                "{}: {status} in {}ms",
                result.request_name, result.timing.total_ms
            ),
            (None, None) => format!("{}: ok", result.request_name),
            (Some(error), _) => format!("{}: {} {}", result.request_name, error.code, error.message),
        };
        let level = if result.success {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        self.log(scope, level, message).await;
    }

    async fn warn_unresolved(&self, scope: &RunScope<'_>, what: &str, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.log(
            scope,
            LogLevel::Warn,
            format!(
                "{what}: unresolved placeholders replaced with fallback: {}",
                names.join(", ")
            ),
        )
        .await;
    }

    async fn fail(
        &self,
        scope: &RunScope<'_>,
        code: ErrorCode,
        message: String,
    ) -> (RunState, Option<ExecutionError>) {
        let message = self.sanitizer.sanitize_text(&message);
        self.log(scope, LogLevel::Error, format!("{code}: {message}"))
            .await;
        (RunState::Failed, Some(ExecutionError::new(code, message)))
    }

    async fn log(&self, scope: &RunScope<'_>, level: LogLevel, message: String) {
        let entry = LogEntry::new(self.clock.now(), level, self.sanitizer.sanitize_text(&message));
        if let Err(err) = self.tracker.append_log(scope.run_id, entry.clone()).await {
            debug!(run = %scope.run_id, error = %err, "log entry dropped");
        }
        scope.observer.on_event(&ExecutionEvent::Log {
            run_id: scope.run_id,
            entry,
        });
    }

    /// The sanitizer used for run output.
    #[must_use]
    pub const fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }
}

/// Everything one request execution needs.
struct Call<'a> {
    handler: &'a dyn ProtocolStrategy,
    request: &'a RequestSpec,
    auth: &'a AuthenticationConfig,
    credentials: &'a Credentials,
    policy: RetryPolicy,
    timeout: Duration,
}
