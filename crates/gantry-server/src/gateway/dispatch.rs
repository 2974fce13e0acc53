//! Outbound dispatch of operation calls to backend services.

use std::time::Duration;

use gantry_core::{GraphqlBinding, Operation, ProtocolBinding, ProxyError, RestBinding};
use reqwest::{Method as HttpMethod, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, instrument};

/// Invocation contract shared between the gateway and its backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Call native REST/GraphQL endpoints as declared by each operation.
    #[default]
    Protocol,
    /// Deprecated: POST every call to `{serviceUrl}/internal/invoke`.
    Invoke,
}

/// Per-proxy dispatch settings.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    pub dispatch_mode: DispatchMode,

    /// Deadline applied to every outbound call. `None` leaves timing to the transport.
    pub request_timeout: Option<Duration>,
}

impl ProxyOptions {
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Issues outbound calls for one backend service.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    service_name: String,
    service_url: String,
    options: ProxyOptions,
}

impl Dispatcher {
    pub fn new(
        client: reqwest::Client,
        service_name: impl Into<String>,
        service_url: impl Into<String>,
        options: ProxyOptions,
    ) -> Self {
        Self {
            client,
            service_name: service_name.into(),
            service_url: service_url.into(),
            options,
        }
    }

    /// Dispatches one call for `operation`, returning the decoded response body.
    #[instrument(skip(self, operation, input), fields(service = %self.service_name, operation_id = %operation.id))]
    pub async fn dispatch(&self, operation: &Operation, input: Value) -> Result<Value, ProxyError> {
        if self.options.dispatch_mode == DispatchMode::Invoke {
            return self.call_invoke(operation, input).await;
        }

        match operation.binding() {
            ProtocolBinding::Rest(rest) => self.call_rest(operation, rest, input).await,
            ProtocolBinding::Graphql(graphql) => self.call_graphql(operation, graphql, input).await,
            ProtocolBinding::Grpc(_) => Err(ProxyError::grpc_not_implemented()),
            ProtocolBinding::None => {
                error!("Operation has no protocol binding");
                Err(ProxyError::unknown_protocol(&operation.id))
            }
        }
    }

    async fn call_rest(
        &self,
        operation: &Operation,
        rest: &RestBinding,
        input: Value,
    ) -> Result<Value, ProxyError> {
        let method = HttpMethod::from_bytes(rest.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                self.call_error(operation, format!("invalid HTTP method '{}'", rest.method))
            })?;
        let url = self.url(&rest.path);

        debug!(method = %method, url = %url, "Forwarding REST call");

        let request = if method == HttpMethod::GET {
            self.client.get(&url).query(&query_pairs(&input))
        } else {
            self.client.request(method, &url).json(&input)
        };

        self.send(operation, request).await
    }

    async fn call_graphql(
        &self,
        operation: &Operation,
        graphql: &GraphqlBinding,
        input: Value,
    ) -> Result<Value, ProxyError> {
        let url = self.url("/graphql");
        debug!(url = %url, "Forwarding GraphQL call");

        let body = json!({
            "query": graphql.query,
            "variables": input,
        });
        self.send(operation, self.client.post(&url).json(&body)).await
    }

    async fn call_invoke(&self, operation: &Operation, input: Value) -> Result<Value, ProxyError> {
        let url = self.url("/internal/invoke");
        debug!(url = %url, "Forwarding call to invoke endpoint");

        let body = json!({
            "operationId": operation.id,
            "input": input,
        });
        self.send(operation, self.client.post(&url).json(&body)).await
    }

    async fn send(
        &self,
        operation: &Operation,
        mut request: RequestBuilder,
    ) -> Result<Value, ProxyError> {
        if let Some(timeout) = self.options.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!(
                    "request timed out after {} ms",
                    self.options.request_timeout.unwrap_or_default().as_millis()
                )
            } else if e.is_connect() {
                format!("failed to connect to {}: {}", self.service_url, e)
            } else {
                format!("request failed: {}", e)
            };
            self.call_error(operation, message)
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.call_error(operation, format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(self.call_error(
                operation,
                format!("upstream responded with status {}: {}", status, body),
            ));
        }

        debug!(status = %status, "Backend call completed");
        Ok(decode_body(&body))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.service_url.trim_end_matches('/'), path)
    }

    fn call_error(&self, operation: &Operation, message: String) -> ProxyError {
        error!(
            service = %self.service_name,
            operation_id = %operation.id,
            error = %message,
            "Proxy call failed"
        );
        ProxyError::proxy_call(&operation.id, message)
    }
}

/// Flattens a JSON object into query-string pairs. Strings are sent verbatim,
/// other scalars and nested values in their JSON rendering, nulls are skipped.
fn query_pairs(input: &Value) -> Vec<(String, String)> {
    let Value::Object(fields) = input else {
        return Vec::new();
    };

    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

/// Empty bodies decode to null; non-JSON bodies are returned as a JSON string.
fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
