//! Schema (manifest) types published by backend services at `GET /schema`.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport family a backend service declares for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceProtocol {
    #[serde(rename = "REST")]
    Rest,
    #[serde(rename = "GraphQL")]
    GraphQl,
    #[serde(rename = "gRPC")]
    Grpc,
    #[serde(rename = "mixed")]
    Mixed,
}

impl std::fmt::Display for ServiceProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rest => write!(f, "REST"),
            Self::GraphQl => write!(f, "GraphQL"),
            Self::Grpc => write!(f, "gRPC"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Identifies one backend service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Base URL all outbound calls are built from (e.g. "http://localhost:3001").
    pub base_url: String,

    pub protocol: ServiceProtocol,
}

/// Kind of operation, which decides the routing verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
    #[serde(other)]
    Unknown,
}

/// REST binding: verb and path relative to the service base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestBinding {
    pub method: String,
    pub path: String,
}

/// GraphQL binding: the document forwarded verbatim to `/graphql`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlBinding {
    pub query: String,
}

/// gRPC binding. Carried through for completeness; dispatch is unsupported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GrpcBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// One named unit of backend functionality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Dot-segmented identifier, e.g. "books.list".
    pub id: String,

    pub operation_type: OperationType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestBinding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<GraphqlBinding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<GrpcBinding>,
}

/// Protocol binding selected for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolBinding<'a> {
    Rest(&'a RestBinding),
    Graphql(&'a GraphqlBinding),
    Grpc(&'a GrpcBinding),
    None,
}

impl Operation {
    /// Returns the binding used for dispatch. When several blocks are
    /// populated the first one wins, in the order rest, graphql, grpc.
    pub fn binding(&self) -> ProtocolBinding<'_> {
        if let Some(rest) = &self.rest {
            ProtocolBinding::Rest(rest)
        } else if let Some(graphql) = &self.graphql {
            ProtocolBinding::Graphql(graphql)
        } else if let Some(grpc) = &self.grpc {
            ProtocolBinding::Grpc(grpc)
        } else {
            ProtocolBinding::None
        }
    }
}

/// WebSocket endpoint descriptor. Only the path key is used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WebSocketEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declarative description of a backend service and its operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub service: ServiceDescriptor,

    #[serde(default)]
    pub operations: Vec<Operation>,

    /// Path pattern (e.g. "/api/jobs/:id/logs") to endpoint, in document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket: Option<IndexMap<String, WebSocketEndpoint>>,
}

impl Schema {
    /// Iterates declared WebSocket path patterns in document order.
    pub fn websocket_paths(&self) -> impl Iterator<Item = &str> {
        self.websocket
            .iter()
            .flat_map(|endpoints| endpoints.keys().map(String::as_str))
    }

    /// Operation ids that appear more than once, in first-repeat order.
    pub fn duplicate_operation_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for op in &self.operations {
            if !seen.insert(op.id.as_str()) && !duplicates.contains(&op.id.as_str()) {
                duplicates.push(op.id.as_str());
            }
        }
        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Schema {
        serde_json::from_value(json!({
            "service": {
                "name": "users",
                "version": "1.0.0",
                "baseUrl": "http://localhost:3001",
                "protocol": "mixed"
            },
            "operations": [
                {
                    "id": "users.get",
                    "operationType": "query",
                    "rest": { "method": "GET", "path": "/users" }
                },
                {
                    "id": "users.search",
                    "operationType": "query",
                    "graphql": { "query": "{ users { id } }" }
                },
                {
                    "id": "users.stream",
                    "operationType": "watch"
                }
            ],
            "websocket": {
                "/api/jobs/:id/logs": {},
                "/api/events": { "description": "event feed" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_deserialize_schema() {
        let schema = sample();
        assert_eq!(schema.service.name, "users");
        assert_eq!(schema.service.protocol, ServiceProtocol::Mixed);
        assert_eq!(schema.operations.len(), 3);
        assert_eq!(schema.operations[2].operation_type, OperationType::Unknown);
        let paths: Vec<_> = schema.websocket_paths().collect();
        assert_eq!(paths, vec!["/api/jobs/:id/logs", "/api/events"]);
    }

    #[test]
    fn test_binding_order() {
        let mut op = sample().operations[0].clone();
        op.graphql = Some(GraphqlBinding {
            query: "{ a }".to_string(),
        });
        op.grpc = Some(GrpcBinding::default());
        assert!(matches!(op.binding(), ProtocolBinding::Rest(_)));

        op.rest = None;
        assert!(matches!(op.binding(), ProtocolBinding::Graphql(_)));

        op.graphql = None;
        assert!(matches!(op.binding(), ProtocolBinding::Grpc(_)));

        op.grpc = None;
        assert_eq!(op.binding(), ProtocolBinding::None);
    }

    #[test]
    fn test_duplicate_operation_ids() {
        let mut schema = sample();
        assert!(schema.duplicate_operation_ids().is_empty());

        let dup = schema.operations[0].clone();
        schema.operations.push(dup.clone());
        schema.operations.push(dup);
        assert_eq!(schema.duplicate_operation_ids(), vec!["users.get"]);
    }

    #[test]
    fn test_schema_without_websocket() {
        let schema: Schema = serde_json::from_value(json!({
            "service": { "name": "s", "baseUrl": "http://s", "protocol": "REST" }
        }))
        .unwrap();
        assert!(schema.operations.is_empty());
        assert_eq!(schema.websocket_paths().count(), 0);
    }
}
