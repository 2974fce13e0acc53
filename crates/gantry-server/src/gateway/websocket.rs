//! WebSocket proxy relaying connections to backend services.
//!
//! Routes are keyed by full path pattern ("/{prefix}{pattern}"), not by
//! operation id. Each accepted connection runs its own state machine:
//!
//! ```text
//! matching ──no route──▶ closed (1008)
//!    │
//!    ▼
//! connecting ──connect failed──▶ closed (1011)
//!    │
//!    ▼
//! relaying ──close/error on either side──▶ closed
//! ```

use std::borrow::Cow;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{Sink, SinkExt, StreamExt};
use gantry_core::Schema;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A matched route: the registered pattern and the backend base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub pattern: String,
    pub backend: String,
}

/// Path-pattern route table plus the per-connection relay.
#[derive(Debug, Default)]
pub struct WebSocketProxy {
    routes: RwLock<IndexMap<String, String>>,
}

impl WebSocketProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every WebSocket endpoint declared by `schema`.
    ///
    /// Routes are stored as "/{prefix}{path}" where prefix defaults to the
    /// service name. Re-registering a path overwrites it.
    pub fn register_schema(&self, schema: &Schema, route_prefix: Option<&str>) {
        let prefix = route_prefix.unwrap_or(&schema.service.name);
        let mut routes = self.routes.write();

        for path in schema.websocket_paths() {
            let route = format!("/{}{}", prefix, path);
            debug!(
                route = %route,
                backend = %schema.service.base_url,
                "Registered WebSocket route"
            );
            if let Some(previous) = routes.insert(route.clone(), schema.service.base_url.clone()) {
                debug!(route = %route, previous = %previous, "WebSocket route overwritten");
            }
        }
    }

    /// Registered routes in insertion order.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.routes
            .read()
            .iter()
            .map(|(route, backend)| (route.clone(), backend.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Finds the route for `path`: exact match first, then the first pattern
    /// (in registration order) that matches segment by segment.
    pub fn match_route(&self, path: &str) -> Option<RouteMatch> {
        let routes = self.routes.read();

        if let Some(backend) = routes.get(path) {
            return Some(RouteMatch {
                pattern: path.to_string(),
                backend: backend.clone(),
            });
        }

        routes
            .iter()
            .find(|(pattern, _)| matches_pattern(pattern, path))
            .map(|(pattern, backend)| RouteMatch {
                pattern: pattern.clone(),
                backend: backend.clone(),
            })
    }

    /// Runs the relay for one upgraded client connection.
    #[instrument(skip(self, client, query))]
    pub async fn handle_connection(&self, mut client: WebSocket, path: String, query: Option<String>) {
        let Some(route) = self.match_route(&path) else {
            warn!("No WebSocket route matched");
            close_client(&mut client, close_code::POLICY, "Route not found").await;
            return;
        };

        let target = match backend_url(&route.backend, &path, query.as_deref()) {
            Ok(target) => target,
            Err(e) => {
                error!(backend = %route.backend, error = %e, "Invalid backend URL");
                close_client(&mut client, close_code::ERROR, "Backend error").await;
                return;
            }
        };

        let backend = match connect_async(target.as_str()).await {
            Ok((backend, response)) => {
                info!(
                    pattern = %route.pattern,
                    target = %target,
                    status = ?response.status(),
                    "Connected to backend WebSocket"
                );
                backend
            }
            Err(e) => {
                error!(error = %e, target = %target, "Failed to connect to backend WebSocket");
                close_client(&mut client, close_code::ERROR, "Backend error").await;
                return;
            }
        };

        relay(client, backend).await;
        info!("WebSocket proxy connection closed");
    }
}

/// Segment-wise match where pattern segments starting with ':' are wildcards.
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();

    pattern_segments.len() == path_segments.len()
        && pattern_segments
            .iter()
            .zip(&path_segments)
            .all(|(expected, actual)| expected.starts_with(':') || expected == actual)
}

/// Builds the backend target: scheme http→ws / https→wss, the first path
/// segment (the route prefix) stripped, and the client query string kept.
pub fn backend_url(base: &str, path: &str, query: Option<&str>) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => other,
    }
    .to_string();
    if url.set_scheme(&scheme).is_err() {
        warn!(base = %base, scheme = %scheme, "Could not rewrite backend scheme");
    }

    let mut target = format!(
        "{}{}",
        url.as_str().trim_end_matches('/'),
        strip_prefix_segment(path)
    );
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    Ok(target)
}

fn strip_prefix_segment(path: &str) -> String {
    match path.trim_start_matches('/').split_once('/') {
        Some((_, rest)) => format!("/{}", rest),
        None => "/".to_string(),
    }
}

async fn close_client(client: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = client.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame to client");
    }
}

/// Forwards frames both ways until either side closes or fails.
async fn relay(client: WebSocket, backend: BackendSocket) {
    let (mut backend_sink, mut backend_stream) = backend.split();
    let (mut client_sink, mut client_stream) = client.split();

    loop {
        tokio::select! {
            // Client → Backend
            client_msg = client_stream.next() => {
                match client_msg {
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Client sent close, closing backend");
                        let frame = frame.map(client_close_to_backend);
                        let _ = backend_sink.send(tungstenite::Message::Close(frame)).await;
                        let _ = client_sink.close().await;
                        break;
                    }
                    Some(Ok(msg)) => {
                        if let Some(backend_msg) = convert_client_to_backend(msg) {
                            if let Err(e) = backend_sink.send(backend_msg).await {
                                debug!(error = %e, "Failed to send to backend, closing client");
                                close_sink(&mut client_sink, close_code::ERROR, "Backend error").await;
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        // Dropping the backend halves ends it without a close handshake.
                        debug!(error = %e, "Client WebSocket error, dropping backend");
                        break;
                    }
                    None => {
                        debug!("Client stream ended, dropping backend");
                        break;
                    }
                }
            }

            // Backend → Client
            backend_msg = backend_stream.next() => {
                match backend_msg {
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "Backend sent close, closing client");
                        match frame {
                            Some(frame) => {
                                let frame = backend_close_to_client(frame);
                                let _ = client_sink.send(Message::Close(Some(frame))).await;
                            }
                            None => {
                                let _ = client_sink.send(Message::Close(None)).await;
                            }
                        }
                        let _ = backend_sink.close().await;
                        break;
                    }
                    Some(Ok(msg)) => {
                        if let Some(client_msg) = convert_backend_to_client(msg) {
                            if let Err(e) = client_sink.send(client_msg).await {
                                debug!(error = %e, "Failed to send to client, dropping backend");
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "Backend WebSocket error");
                        close_sink(&mut client_sink, close_code::ERROR, "Backend error").await;
                        break;
                    }
                    None => {
                        debug!("Backend stream ended");
                        close_sink(&mut client_sink, close_code::ERROR, "Backend error").await;
                        break;
                    }
                }
            }
        }
    }
}

async fn close_sink<S>(sink: &mut S, code: u16, reason: &'static str)
where
    S: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

/// Converts axum WebSocket message to tungstenite message.
fn convert_client_to_backend(msg: Message) -> Option<tungstenite::Message> {
    match msg {
        Message::Text(text) => Some(tungstenite::Message::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(tungstenite::Message::Binary(data.to_vec())),
        Message::Ping(data) => Some(tungstenite::Message::Ping(data.to_vec())),
        Message::Pong(data) => Some(tungstenite::Message::Pong(data.to_vec())),
        Message::Close(_) => None,
    }
}

/// Converts tungstenite message to axum WebSocket message.
fn convert_backend_to_client(msg: tungstenite::Message) -> Option<Message> {
    match msg {
        tungstenite::Message::Text(text) => Some(Message::Text(text.into())),
        tungstenite::Message::Binary(data) => Some(Message::Binary(data.into())),
        tungstenite::Message::Ping(data) => Some(Message::Ping(data.into())),
        tungstenite::Message::Pong(data) => Some(Message::Pong(data.into())),
        tungstenite::Message::Close(_) | tungstenite::Message::Frame(_) => None,
    }
}

fn client_close_to_backend(frame: CloseFrame) -> tungstenite::protocol::CloseFrame<'static> {
    tungstenite::protocol::CloseFrame {
        code: frame.code.into(),
        reason: Cow::Owned(frame.reason.as_str().to_owned()),
    }
}

fn backend_close_to_client(frame: tungstenite::protocol::CloseFrame<'_>) -> CloseFrame {
    CloseFrame {
        code: frame.code.into(),
        reason: frame.reason.into_owned().into(),
    }
}
