//! Composite of proxy APIs sharing one serving strategy.

use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use gantry_core::{Method, ProxyError};
use tracing::{error, info, instrument};

use super::proxy_api::ProxyApi;
use super::registry::RouteRegistry;
use super::websocket::WebSocketProxy;
use crate::serving::ServingStrategy;

pub const DEFAULT_API_VERSION: &str = "1.0.0";

/// Runs several [`ProxyApi`]s as one gateway.
///
/// Unlike [`ProxyApi::initialize`], the gateway never registers methods one
/// by one: it merges every table and configures the strategy exactly once.
pub struct ApiGateway {
    strategy: Arc<dyn ServingStrategy>,
    apis: Vec<ProxyApi>,
    version: String,
    websocket: Option<Arc<WebSocketProxy>>,
}

impl ApiGateway {
    pub fn new(strategy: Arc<dyn ServingStrategy>) -> Self {
        Self {
            strategy,
            apis: Vec::new(),
            version: DEFAULT_API_VERSION.to_string(),
            websocket: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_websocket_proxy(mut self, proxy: Arc<WebSocketProxy>) -> Self {
        self.websocket = Some(proxy);
        self
    }

    /// A new empty [`ProxyApi`] bound to this gateway's strategy and
    /// WebSocket proxy. It still has to be added with [`ApiGateway::add_api`].
    pub fn new_api(&self) -> ProxyApi {
        let api = ProxyApi::new(Arc::clone(&self.strategy));
        match &self.websocket {
            Some(ws) => api.with_websocket_proxy(Arc::clone(ws)),
            None => api,
        }
    }

    pub fn add_api(&mut self, api: ProxyApi) -> &mut Self {
        self.apis.push(api);
        self
    }

    pub fn apis(&self) -> &[ProxyApi] {
        &self.apis
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Initializes every API's proxies concurrently. Fail-fast; nothing is
    /// registered with the strategy.
    #[instrument(skip(self), fields(apis = self.apis.len()))]
    pub async fn initialize(&mut self) -> Result<(), ProxyError> {
        try_join_all(self.apis.iter_mut().map(|api| api.initialize_proxies()))
            .await
            .inspect_err(|e| error!(error = %e, "Gateway initialization failed"))?;
        Ok(())
    }

    /// One table holding every method of every API, in API then proxy order.
    ///
    /// # Errors
    ///
    /// [`ProxyError::RouteCollision`] when two methods anywhere in the gateway
    /// share verb and route; [`ProxyError::NotInitialized`] before
    /// [`ApiGateway::initialize`].
    pub fn merged_methods(&self) -> Result<Vec<Method>, ProxyError> {
        let mut registry = RouteRegistry::new();
        let mut merged = Vec::new();

        for api in &self.apis {
            api.claim_routes(&mut registry)?;
            merged.extend(api.methods()?);
        }

        Ok(merged)
    }

    /// Initializes, merges and hands the table to the strategy once.
    pub async fn build(&mut self) -> Result<(), ProxyError> {
        self.initialize().await?;
        let merged = self.merged_methods()?;

        for api in &self.apis {
            let ws = api.websocket_proxy().or(self.websocket.as_ref());
            if let Some(ws) = ws {
                api.register_websocket_routes(ws);
            }
        }

        info!(
            methods = merged.len(),
            version = %self.version,
            "Configuring serving strategy"
        );
        self.strategy.configure(merged, &self.version);
        Ok(())
    }

    /// Builds the gateway, then serves until shutdown.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.build().await?;
        self.strategy.run().await
    }
}

impl fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiGateway")
            .field("version", &self.version)
            .field("apis", &self.apis)
            .finish_non_exhaustive()
    }
}
