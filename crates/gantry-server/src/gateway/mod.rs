//! Schema-driven proxying of backend services.
//!
//! Each backend publishes a schema at `GET {serviceUrl}/schema`. A [`Proxy`]
//! turns that schema into one [`gantry_core::Method`] per operation; proxies are
//! grouped into a [`ProxyApi`], and groups into an [`ApiGateway`] that hands a
//! single merged table to the serving layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   GET /schema   ┌─────────┐
//! │   Backend    │◀────────────────│  Proxy  │  (operation -> Method)
//! └──────────────┘                 └────┬────┘
//!        ▲                              │
//!        │                              ▼
//!        │                        ┌──────────┐
//!        │                        │ ProxyApi │  (route collision check)
//!        │                        └────┬─────┘
//!        │                             │
//!        │                             ▼
//!        │                       ┌────────────┐
//!        │                       │ ApiGateway │  (merged table, configure once)
//!        │                       └─────┬──────┘
//!        │                             │
//!        │                             ▼
//!        │   REST / GraphQL     ┌─────────────────┐
//!        └──────────────────────│ ServingStrategy │◀── HTTP / WebSocket clients
//!                               └─────────────────┘
//! ```
//!
//! WebSocket endpoints bypass the method table: they are registered with the
//! [`WebSocketProxy`] and relayed frame by frame.

pub mod api_gateway;
pub mod dispatch;
pub mod proxy;
pub mod proxy_api;
pub mod registry;
pub mod websocket;

pub use api_gateway::{ApiGateway, DEFAULT_API_VERSION};
pub use dispatch::{DispatchMode, Dispatcher, ProxyOptions};
pub use proxy::{Proxy, build_route_name};
pub use proxy_api::ProxyApi;
pub use registry::RouteRegistry;
pub use websocket::{RouteMatch, WebSocketProxy, backend_url, matches_pattern};
