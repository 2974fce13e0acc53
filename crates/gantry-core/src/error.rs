use thiserror::Error;

/// Error types for schema acquisition, method synthesis and dispatch.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    #[error("Failed to fetch schema for service '{service}': {message}")]
    SchemaFetch { service: String, message: String },

    #[error("Proxy for service '{service}' is not initialized")]
    NotInitialized { service: String },

    #[error("Operation '{operation_id}' has no recognized protocol binding")]
    UnknownProtocol { operation_id: String },

    #[error("{0}")]
    NotImplemented(String),

    #[error("Proxy call for operation '{operation_id}' failed: {message}")]
    ProxyCall {
        operation_id: String,
        message: String,
    },

    #[error("No route found for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Route '{route}' from '{service}' collides with a route registered by '{existing}'")]
    RouteCollision {
        route: String,
        service: String,
        existing: String,
    },

    #[error("Proxy for service '{service}' is already built; overrides must be registered before initialization")]
    AlreadyBuilt { service: String },
}

impl ProxyError {
    /// Create a new SchemaFetch error
    pub fn schema_fetch(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaFetch {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new NotInitialized error
    pub fn not_initialized(service: impl Into<String>) -> Self {
        Self::NotInitialized {
            service: service.into(),
        }
    }

    /// Create a new UnknownProtocol error
    pub fn unknown_protocol(operation_id: impl Into<String>) -> Self {
        Self::UnknownProtocol {
            operation_id: operation_id.into(),
        }
    }

    /// Create a new ProxyCall error
    pub fn proxy_call(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProxyCall {
            operation_id: operation_id.into(),
            message: message.into(),
        }
    }

    /// Create a new RouteNotFound error
    pub fn route_not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::RouteNotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// The error raised for every gRPC dispatch.
    pub fn grpc_not_implemented() -> Self {
        Self::NotImplemented("gRPC not yet implemented".to_string())
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaFetch { .. } | Self::ProxyCall { .. } => ErrorCategory::Upstream,
            Self::NotInitialized { .. } | Self::AlreadyBuilt { .. } => ErrorCategory::Lifecycle,
            Self::UnknownProtocol { .. } | Self::RouteCollision { .. } => {
                ErrorCategory::Configuration
            }
            Self::NotImplemented(_) => ErrorCategory::Unsupported,
            Self::RouteNotFound { .. } => ErrorCategory::NotFound,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Upstream,
    Lifecycle,
    Configuration,
    Unsupported,
    NotFound,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream => write!(f, "upstream"),
            Self::Lifecycle => write!(f, "lifecycle"),
            Self::Configuration => write!(f, "configuration"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}

/// Convenience result type for gateway operations
pub type Result<T> = std::result::Result<T, ProxyError>;
