//! Aggregation of proxies into one address space.

use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use gantry_core::{Method, ProxyError};
use tracing::{error, info, instrument, warn};

use super::proxy::Proxy;
use super::registry::RouteRegistry;
use super::websocket::WebSocketProxy;
use crate::serving::ServingStrategy;

/// Owns an ordered list of proxies and registers their methods with the
/// serving layer.
///
/// Registration is one-way: removing a proxy after [`ProxyApi::initialize`]
/// does not retract the routes it already registered.
pub struct ProxyApi {
    strategy: Arc<dyn ServingStrategy>,
    proxies: Vec<Proxy>,
    websocket: Option<Arc<WebSocketProxy>>,
    registered: bool,
}

impl ProxyApi {
    pub fn new(strategy: Arc<dyn ServingStrategy>) -> Self {
        Self {
            strategy,
            proxies: Vec::new(),
            websocket: None,
            registered: false,
        }
    }

    /// Registers schema WebSocket endpoints with `proxy` during initialize.
    pub fn with_websocket_proxy(mut self, proxy: Arc<WebSocketProxy>) -> Self {
        self.websocket = Some(proxy);
        self
    }

    pub fn add_proxy(&mut self, proxy: Proxy) -> &mut Self {
        self.proxies.push(proxy);
        self
    }

    pub fn add_proxies(&mut self, proxies: impl IntoIterator<Item = Proxy>) -> &mut Self {
        self.proxies.extend(proxies);
        self
    }

    /// Removes the first proxy named `service_name`.
    pub fn remove_proxy(&mut self, service_name: &str) -> Option<Proxy> {
        let index = self
            .proxies
            .iter()
            .position(|proxy| proxy.service_name() == service_name)?;

        if self.registered {
            warn!(
                service = %service_name,
                "Proxy removed after registration; its routes remain served"
            );
        }
        Some(self.proxies.remove(index))
    }

    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }

    pub(crate) fn websocket_proxy(&self) -> Option<&Arc<WebSocketProxy>> {
        self.websocket.as_ref()
    }

    /// Every generated method, in proxy-list order.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::NotInitialized`] if any proxy has not been built.
    pub fn methods(&self) -> Result<Vec<Method>, ProxyError> {
        let mut methods = Vec::new();
        for proxy in &self.proxies {
            methods.extend_from_slice(proxy.methods()?);
        }
        Ok(methods)
    }

    /// Initializes every proxy, then registers their methods in proxy-list
    /// order.
    ///
    /// Initialization is a concurrent fan-out; the first failure is returned
    /// and nothing is registered. A `(verb, route)` claimed by two methods
    /// fails with [`ProxyError::RouteCollision`], also before registration.
    #[instrument(skip(self), fields(proxies = self.proxies.len()))]
    pub async fn initialize(&mut self) -> Result<(), ProxyError> {
        self.initialize_proxies().await?;

        let mut registry = RouteRegistry::new();
        self.claim_routes(&mut registry)?;

        let mut count = 0;
        for proxy in &self.proxies {
            for method in proxy.methods()? {
                self.strategy.register_method(method.clone());
                count += 1;
            }
        }
        self.registered = true;

        if let Some(ws) = &self.websocket {
            self.register_websocket_routes(ws);
        }

        info!(methods = count, "Proxy API initialized");
        Ok(())
    }

    /// Fetches every proxy's schema concurrently without registering anything.
    pub(crate) async fn initialize_proxies(&mut self) -> Result<(), ProxyError> {
        try_join_all(self.proxies.iter_mut().map(|proxy| proxy.initialize()))
            .await
            .map(|_| ())
            .inspect_err(|e| error!(error = %e, "Proxy API initialization failed"))
    }

    pub(crate) fn claim_routes(&self, registry: &mut RouteRegistry) -> Result<(), ProxyError> {
        for proxy in &self.proxies {
            registry.claim_all(proxy.methods()?, proxy.service_name())?;
        }
        Ok(())
    }

    pub(crate) fn register_websocket_routes(&self, ws: &WebSocketProxy) {
        for proxy in &self.proxies {
            if let Some(schema) = proxy.schema() {
                ws.register_schema(schema, proxy.route_prefix());
            }
        }
    }
}

impl fmt::Debug for ProxyApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyApi")
            .field("proxies", &self.proxies)
            .field("websocket", &self.websocket.is_some())
            .field("registered", &self.registered)
            .finish()
    }
}
