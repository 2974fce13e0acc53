//! Axum-backed serving strategy.
//!
//! All synthesized methods live in one in-memory table keyed by
//! "{HTTP verb} {route}". A fallback handler looks requests up in that table,
//! so the table can be (re)configured without rebuilding the router.

use std::error::Error as _;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequestParts, Query, State, ws::WebSocketUpgrade},
    http::{HeaderMap, Request, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use gantry_core::{Method, MethodType, ProxyError, route_key};
use http_body_util::LengthLimitError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use super::ServingStrategy;
use super::error::ServingError;
use crate::config::AppConfig;
use crate::gateway::WebSocketProxy;

/// The method table shared between the strategy and its request handlers.
#[derive(Debug, Default)]
pub struct ServingState {
    methods: RwLock<IndexMap<String, Method>>,
    version: RwLock<String>,
}

impl ServingState {
    /// Looks up a method by route key ("GET users/users").
    pub fn lookup(&self, key: &str) -> Option<Method> {
        self.methods.read().get(key).cloned()
    }

    /// Registered route keys in registration order.
    pub fn route_keys(&self) -> Vec<String> {
        self.methods.read().keys().cloned().collect()
    }

    pub fn version(&self) -> String {
        self.version.read().clone()
    }
}

#[derive(Clone)]
struct RouterState {
    serving: Arc<ServingState>,
    websocket: Option<Arc<WebSocketProxy>>,
    body_limit: usize,
}

/// Serves the gateway's method table (and WebSocket relay) with axum.
#[derive(Clone)]
pub struct AxumStrategy {
    addr: SocketAddr,
    body_limit: usize,
    websocket: Option<Arc<WebSocketProxy>>,
    state: Arc<ServingState>,
}

impl AxumStrategy {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            body_limit: 1024 * 1024,
            websocket: None,
            state: Arc::new(ServingState::default()),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.addr()).with_body_limit(cfg.server.body_limit_bytes)
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Upgrades WebSocket requests into `proxy` instead of the method table.
    pub fn with_websocket_proxy(mut self, proxy: Arc<WebSocketProxy>) -> Self {
        self.websocket = Some(proxy);
        self
    }

    pub fn state(&self) -> &Arc<ServingState> {
        &self.state
    }

    /// Builds the axum router over the shared method table.
    pub fn router(&self) -> Router {
        let state = RouterState {
            serving: Arc::clone(&self.state),
            websocket: self.websocket.clone(),
            body_limit: self.body_limit,
        };

        Router::new()
            .route("/healthz", get(healthz))
            .route("/_gantry/routes", get(list_routes))
            .fallback(dispatch)
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri(),
                )
            }))
    }
}

#[async_trait]
impl ServingStrategy for AxumStrategy {
    fn register_method(&self, method: Method) {
        let key = method.route_key();
        if self
            .state
            .methods
            .write()
            .insert(key.clone(), method)
            .is_some()
        {
            warn!(route = %key, "Route replaced by a later registration");
        } else {
            debug!(route = %key, "Registered method");
        }
    }

    fn configure(&self, methods: Vec<Method>, version: &str) {
        let table: IndexMap<String, Method> = methods
            .into_iter()
            .map(|method| (method.route_key(), method))
            .collect();
        let count = table.len();

        *self.state.methods.write() = table;
        *self.state.version.write() = version.to_string();

        info!(count, version, "Method table configured");
    }

    async fn run(&self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_routes(State(state): State<RouterState>) -> Json<Value> {
    let routes: Vec<Value> = state
        .serving
        .methods
        .read()
        .values()
        .map(|method| {
            json!({
                "method": method.method_type.http_method(),
                "route": format!("/{}", method.route_name),
                "description": method.description,
            })
        })
        .collect();

    let websocket: Vec<Value> = state
        .websocket
        .iter()
        .flat_map(|proxy| proxy.routes())
        .map(|(route, backend)| json!({ "route": route, "backend": backend }))
        .collect();

    Json(json!({
        "version": state.serving.version(),
        "routes": routes,
        "websocket": websocket,
    }))
}

/// Fallback handler: WebSocket upgrades go to the relay, everything else to
/// the method table.
async fn dispatch(State(state): State<RouterState>, request: Request<Body>) -> Response {
    if is_websocket_upgrade(request.headers()) {
        if let Some(proxy) = state.websocket.clone() {
            return upgrade(proxy, request).await;
        }
    }

    match invoke(&state, request).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn upgrade(proxy: Arc<WebSocketProxy>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_owned);
    let (mut parts, _body) = request.into_parts();

    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws.on_upgrade(move |socket| async move {
            proxy.handle_connection(socket, path, query).await;
        }),
        Err(rejection) => rejection.into_response(),
    }
}

async fn invoke(state: &RouterState, request: Request<Body>) -> Result<Value, ServingError> {
    let verb = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let method_type = MethodType::from_http_method(&verb)
        .ok_or_else(|| ProxyError::route_not_found(&verb, &path))?;
    let method = state
        .serving
        .lookup(&route_key(method_type, &path))
        .ok_or_else(|| ProxyError::route_not_found(&verb, &path))?;

    let input = match method_type {
        MethodType::Get => query_input(request.uri())?,
        _ => body_input(request.into_body(), state.body_limit).await?,
    };

    debug!(route = %method.route_name, "Invoking method");
    Ok(method.call(input).await?)
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Query-string parameters as a JSON object of strings.
fn query_input(uri: &Uri) -> Result<Value, ServingError> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map_err(|e| ServingError::BadRequest(e.to_string()))?;

    Ok(Value::Object(
        pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    ))
}

/// JSON request body; an empty body is treated as `{}`.
async fn body_input(body: Body, limit: usize) -> Result<Value, ServingError> {
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        let over_limit = e
            .source()
            .is_some_and(|inner| inner.is::<LengthLimitError>());
        if over_limit {
            ServingError::PayloadTooLarge { limit }
        } else {
            ServingError::BadRequest(format!("failed to read request body: {}", e))
        }
    })?;

    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| ServingError::BadRequest(format!("invalid JSON body: {}", e)))
}
