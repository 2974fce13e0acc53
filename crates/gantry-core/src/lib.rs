pub mod error;
pub mod method;
pub mod schema;

pub use error::{ErrorCategory, ProxyError, Result};
pub use method::{Method, MethodHandler, MethodType, handler_fn, route_key};
pub use schema::{
    GraphqlBinding, GrpcBinding, Operation, OperationType, ProtocolBinding, RestBinding, Schema,
    ServiceDescriptor, ServiceProtocol, WebSocketEndpoint,
};
