//! GraphQL over HTTP.

use async_trait::async_trait;
use serde_json::{Value, json};
use tether_domain::{
    AuthError, AuthenticationConfig, Credentials, ErrorCode, ExecutionError,
    HandshakeExecutionResult, HttpMethod, ProtocolPayload, ProtocolType, RequestSpec,
};

use super::{AuthOutcome, ExecOptions, ProtocolStrategy, StrategyContext, support};

/// Builds the JSON body of a GraphQL operation.
///
/// # Errors
///
/// Returns a message when `variables` is not a JSON object.
pub fn operation_body(
    query: &str,
    variables: Option<&str>,
    operation_name: Option<&str>,
) -> Result<String, String> {
    let variables = match variables.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(value @ (Value::Object(_) | Value::Null)) => value,
            Ok(_) => return Err("GraphQL variables must be a JSON object".to_string()),
            Err(e) => return Err(format!("invalid GraphQL variables: {e}")),
        },
        None => Value::Null,
    };
    Ok(json!({
        "query": query,
        "variables": variables,
        "operationName": operation_name,
    })
    .to_string())
}

/// Returns the first GraphQL error message, if the response carries any.
#[must_use]
pub fn first_error(body: &Value) -> Option<String> {
    let errors = body.get("errors")?.as_array()?;
    let first = errors.first()?;
    Some(
        first
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| first.to_string(), str::to_string),
    )
}

/// Sends GraphQL operations to the configured endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlStrategy {
    context: StrategyContext,
}

impl GraphQlStrategy {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(context: StrategyContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ProtocolStrategy for GraphQlStrategy {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::GraphQl
    }

    async fn authenticate(&self, config: &AuthenticationConfig) -> AuthOutcome {
        let AuthenticationConfig::GraphQl {
            endpoint,
            bearer_token,
            ..
        } = config
        else {
            return AuthOutcome::failed(AuthError::invalid_config(
                "expected a graphql configuration",
            ));
        };
        if endpoint.is_empty() {
            return AuthOutcome::failed(AuthError::invalid_config("endpoint is required"));
        }
        match bearer_token.as_ref().filter(|t| !t.is_empty()) {
            Some(token) => AuthOutcome::authenticated(Credentials::header(
                "Authorization",
                format!("Bearer {}", token.expose()),
            )),
            None => AuthOutcome::anonymous(),
        }
    }

    async fn execute_request(
        &self,
        request: &RequestSpec,
        config: &AuthenticationConfig,
        credentials: &Credentials,
        options: &ExecOptions,
    ) -> HandshakeExecutionResult {
        let (endpoint, static_headers) = match config {
            AuthenticationConfig::GraphQl {
                endpoint, headers, ..
            } => (endpoint.as_str(), Some(headers)),
            _ => ("", None),
        };

        let mut spec = request.clone();
        if let Some(ProtocolPayload::GraphQl {
            query,
            variables,
            operation_name,
        }) = &request.payload
        {
            match operation_body(query, variables.as_deref(), operation_name.as_deref()) {
                Ok(body) => spec.command.body = Some(body),
                Err(message) => {
                    return HandshakeExecutionResult::failure(
                        &request.name,
                        ExecutionError::new(ErrorCode::ParseError, message),
                    );
                }
            }
        }

        let mut http = match support::request_options_with_base(&spec, endpoint) {
            Ok(http) => http,
            Err(failure) => return failure,
        };
        if http.body.is_some() {
            http.method = HttpMethod::Post;
        }
        http.headers.set("Content-Type", "application/json");
        http.headers.set_if_absent("Accept", "application/json");
        for (name, value) in static_headers.into_iter().flatten() {
            http.headers.set_if_absent(name.clone(), value.clone());
        }
        support::apply_credentials(&mut http, credentials);

        let result = support::send(&self.context, &request.name, http, options).await;
        let graphql_error = result.body_json.as_ref().and_then(first_error);
        match graphql_error {
            Some(message) if result.success => result.into_failed(ExecutionError::new(
                ErrorCode::ClientError,
                format!("GraphQL error: {message}"),
            )),
            _ => result,
        }
    }

    async fn health_check(&self, config: &AuthenticationConfig) -> bool {
        matches!(config, AuthenticationConfig::GraphQl { endpoint, .. } if !endpoint.is_empty())
    }
}
