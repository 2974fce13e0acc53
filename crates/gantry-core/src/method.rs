//! Routing-table entries synthesized from schema operations.

use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;
use crate::schema::OperationType;

/// Async handler invoked with the request input, returning the response body.
pub type MethodHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ProxyError>> + Send + Sync>;

/// Wraps an async closure as a [`MethodHandler`].
///
/// ```ignore
/// let handler = handler_fn(|input| async move { Ok(json!({ "echo": input })) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, ProxyError>> + Send + 'static,
{
    Arc::new(move |input| f(input).boxed())
}

/// Routing verb of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MethodType {
    Get,
    Create,
    Update,
    Delete,
}

impl MethodType {
    /// HTTP verb the serving layer mounts this method under.
    pub fn http_method(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Create => "POST",
            Self::Update => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Inverse of [`MethodType::http_method`].
    pub fn from_http_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Create),
            "PUT" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl From<OperationType> for MethodType {
    /// Subscriptions have no upgrade path through the method table and
    /// degrade to GET, as do unknown operation types.
    fn from(operation_type: OperationType) -> Self {
        match operation_type {
            OperationType::Mutation => Self::Create,
            OperationType::Query | OperationType::Subscription | OperationType::Unknown => {
                Self::Get
            }
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Gateway-side routing-table entry.
#[derive(Clone)]
pub struct Method {
    pub method_type: MethodType,

    /// Route without a leading slash (e.g. "users/users").
    pub route_name: String,

    pub handler: MethodHandler,

    pub description: String,
}

impl Method {
    pub fn new(
        method_type: MethodType,
        route_name: impl Into<String>,
        handler: MethodHandler,
        description: impl Into<String>,
    ) -> Self {
        Self {
            method_type,
            route_name: route_name.into(),
            handler,
            description: description.into(),
        }
    }

    /// Key the serving layer indexes this method by: "{HTTP verb} {route}".
    pub fn route_key(&self) -> String {
        route_key(self.method_type, &self.route_name)
    }

    /// Invokes the handler.
    pub async fn call(&self, input: Value) -> Result<Value, ProxyError> {
        (self.handler)(input).await
    }
}

/// Builds the serving-layer key for a verb and route.
pub fn route_key(method_type: MethodType, route_name: &str) -> String {
    format!(
        "{} {}",
        method_type.http_method(),
        route_name.trim_start_matches('/')
    )
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("method_type", &self.method_type)
            .field("route_name", &self.route_name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_type_mapping() {
        assert_eq!(MethodType::from(OperationType::Query), MethodType::Get);
        assert_eq!(MethodType::from(OperationType::Mutation), MethodType::Create);
        assert_eq!(MethodType::from(OperationType::Subscription), MethodType::Get);
        assert_eq!(MethodType::from(OperationType::Unknown), MethodType::Get);
    }

    #[test]
    fn test_http_method_round_trip() {
        for method_type in [
            MethodType::Get,
            MethodType::Create,
            MethodType::Update,
            MethodType::Delete,
        ] {
            assert_eq!(
                MethodType::from_http_method(method_type.http_method()),
                Some(method_type)
            );
        }
        assert_eq!(MethodType::from_http_method("patch"), None);
        assert_eq!(MethodType::from_http_method("post"), Some(MethodType::Create));
    }

    #[test]
    fn test_route_key() {
        let method = Method::new(
            MethodType::Create,
            "books/create",
            handler_fn(|_| async { Ok(Value::Null) }),
            "create a book",
        );
        assert_eq!(method.route_key(), "POST books/create");
        assert_eq!(route_key(MethodType::Get, "/users/users"), "GET users/users");
    }

    #[test]
    fn test_handler_fn_call() {
        let method = Method::new(
            MethodType::Get,
            "echo/echo",
            handler_fn(|input| async move { Ok(json!({ "echo": input })) }),
            "echo",
        );
        let out = tokio_test::block_on(method.call(json!(5))).unwrap();
        assert_eq!(out, json!({ "echo": 5 }));
    }
}
