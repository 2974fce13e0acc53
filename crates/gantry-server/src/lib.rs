pub mod bootstrap;
pub mod config;
pub mod gateway;
pub mod observability;
pub mod serving;

pub use bootstrap::build_gateway;
pub use config::{AppConfig, GatewayConfig, LoggingConfig, ServerConfig, ServiceConfig};
pub use gateway::{
    ApiGateway, DispatchMode, Proxy, ProxyApi, ProxyOptions, RouteRegistry, WebSocketProxy,
};
pub use observability::{LevelChange, apply_logging_level, init_tracing};
pub use serving::{AxumStrategy, ServingError, ServingStrategy};
