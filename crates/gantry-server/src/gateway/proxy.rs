//! Per-service proxy: schema acquisition and method synthesis.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use gantry_core::{Method, MethodHandler, MethodType, Operation, ProxyError, Schema};
use tracing::{debug, error, info, instrument, warn};

use super::dispatch::{Dispatcher, ProxyOptions};

/// Owns one backend service: its schema, override table and generated methods.
///
/// Lifecycle:
/// 1. [`Proxy::new`] (no I/O), optionally followed by [`Proxy::override_operation`]
/// 2. [`Proxy::initialize`] (fetches `GET {serviceUrl}/schema`) or
///    [`Proxy::load_schema`] / [`Proxy::from_schema`] (schema injected)
/// 3. [`Proxy::methods`] for the rest of its lifetime
///
/// Building freezes the override table; later overrides are rejected.
pub struct Proxy {
    service_name: String,
    service_url: String,
    route_prefix: Option<String>,
    options: ProxyOptions,
    client: reqwest::Client,
    schema: Option<Schema>,
    overrides: HashMap<String, MethodHandler>,
    methods: Vec<Method>,
}

impl Proxy {
    pub fn new(service_name: impl Into<String>, service_url: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_url: service_url.into(),
            route_prefix: None,
            options: ProxyOptions::default(),
            client: reqwest::Client::new(),
            schema: None,
            overrides: HashMap::new(),
            methods: Vec::new(),
        }
    }

    /// Builds a ready proxy from a schema obtained out-of-band.
    pub fn from_schema(schema: Schema, route_prefix: Option<String>) -> Self {
        let mut proxy = Self::new(schema.service.name.clone(), schema.service.base_url.clone());
        proxy.route_prefix = route_prefix;
        proxy.load_schema(schema);
        proxy
    }

    /// Namespaces routes under `prefix` instead of the service name.
    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = Some(prefix.into());
        self
    }

    pub fn with_options(mut self, options: ProxyOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares a connection pool across proxies.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Registers a handler that replaces default dispatch for `operation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::AlreadyBuilt`] once methods have been generated.
    pub fn override_operation(
        &mut self,
        operation_id: impl Into<String>,
        handler: MethodHandler,
    ) -> Result<&mut Self, ProxyError> {
        let operation_id = operation_id.into();
        if self.schema.is_some() {
            warn!(
                service = %self.service_name,
                operation_id = %operation_id,
                "Override registered after methods were built"
            );
            return Err(ProxyError::AlreadyBuilt {
                service: self.service_name.clone(),
            });
        }

        debug!(service = %self.service_name, operation_id = %operation_id, "Registered override");
        self.overrides.insert(operation_id, handler);
        Ok(self)
    }

    /// Fetches the schema and builds methods. A no-op once built.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::SchemaFetch`] when the backend is unreachable,
    /// answers with a non-2xx status, or returns a malformed body.
    #[instrument(skip(self), fields(service = %self.service_name))]
    pub async fn initialize(&mut self) -> Result<(), ProxyError> {
        if self.schema.is_some() {
            debug!("Proxy already initialized");
            return Ok(());
        }

        let schema = self.fetch_schema().await?;
        self.load_schema(schema);

        info!(methods = self.methods.len(), "Proxy initialized");
        Ok(())
    }

    /// Installs `schema` and regenerates the method list.
    pub fn load_schema(&mut self, schema: Schema) {
        for id in schema.duplicate_operation_ids() {
            warn!(service = %self.service_name, operation_id = %id, "Duplicate operation id in schema");
        }

        self.methods = self.generate_proxy_methods(&schema);
        self.schema = Some(schema);
    }

    async fn fetch_schema(&self) -> Result<Schema, ProxyError> {
        let url = format!("{}/schema", self.service_url.trim_end_matches('/'));
        debug!(url = %url, "Fetching schema");

        let mut request = self.client.get(&url);
        if let Some(timeout) = self.options.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.fetch_error(e.to_string()))?;

        response
            .json::<Schema>()
            .await
            .map_err(|e| self.fetch_error(format!("malformed schema: {}", e)))
    }

    fn fetch_error(&self, message: String) -> ProxyError {
        error!(
            service = %self.service_name,
            url = %self.service_url,
            error = %message,
            "Schema fetch failed"
        );
        ProxyError::schema_fetch(&self.service_name, message)
    }

    fn generate_proxy_methods(&self, schema: &Schema) -> Vec<Method> {
        let dispatcher = Arc::new(Dispatcher::new(
            self.client.clone(),
            self.service_name.clone(),
            self.service_url.clone(),
            self.options.clone(),
        ));

        schema
            .operations
            .iter()
            .map(|operation| {
                let handler = match self.overrides.get(&operation.id) {
                    Some(custom) => {
                        debug!(operation_id = %operation.id, "Using override handler");
                        custom.clone()
                    }
                    None => default_handler(&dispatcher, operation),
                };

                let description = operation.description.clone().unwrap_or_else(|| {
                    format!("Proxy to {}: {}", self.service_name, operation.id)
                });

                Method::new(
                    MethodType::from(operation.operation_type),
                    build_route_name(self.effective_prefix(), operation),
                    handler,
                    description,
                )
            })
            .collect()
    }

    fn effective_prefix(&self) -> &str {
        self.route_prefix.as_deref().unwrap_or(&self.service_name)
    }

    /// Generated methods, in schema order.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::NotInitialized`] before a schema has been loaded.
    pub fn methods(&self) -> Result<&[Method], ProxyError> {
        if self.schema.is_none() {
            return Err(ProxyError::not_initialized(&self.service_name));
        }
        Ok(&self.methods)
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn route_prefix(&self) -> Option<&str> {
        self.route_prefix.as_deref()
    }

    /// True when a schema is loaded and produced at least one method.
    /// A schema with zero operations therefore reads as not initialized.
    pub fn is_initialized(&self) -> bool {
        self.schema.is_some() && !self.methods.is_empty()
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("service_name", &self.service_name)
            .field("service_url", &self.service_url)
            .field("route_prefix", &self.route_prefix)
            .field("options", &self.options)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

fn default_handler(dispatcher: &Arc<Dispatcher>, operation: &Operation) -> MethodHandler {
    let dispatcher = Arc::clone(dispatcher);
    let operation = Arc::new(operation.clone());
    Arc::new(move |input| {
        let dispatcher = Arc::clone(&dispatcher);
        let operation = Arc::clone(&operation);
        async move { dispatcher.dispatch(&operation, input).await }.boxed()
    })
}

/// Computes the route an operation is served under.
///
/// REST operations use their path (leading slash stripped); everything else
/// uses the operation id with its first '.' turned into '/'.
pub fn build_route_name(prefix: &str, operation: &Operation) -> String {
    match &operation.rest {
        Some(rest) if !rest.path.is_empty() => {
            format!("{}/{}", prefix, rest.path.trim_start_matches('/'))
        }
        _ => format!("{}/{}", prefix, operation.id.replacen('.', "/", 1)),
    }
}
