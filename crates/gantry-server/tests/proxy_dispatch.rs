use std::time::Duration;

use gantry_core::{MethodType, ProxyError, Schema, handler_fn};
use gantry_server::gateway::{DispatchMode, Proxy, ProxyOptions};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn schema_for(base_url: &str) -> Value {
    json!({
        "service": {
            "name": "users",
            "version": "1.0.0",
            "baseUrl": base_url,
            "protocol": "mixed"
        },
        "operations": [
            { "id": "users.get", "operationType": "query",
              "rest": { "method": "GET", "path": "/users" } },
            { "id": "users.create", "operationType": "mutation",
              "rest": { "method": "POST", "path": "/users" } },
            { "id": "users.search", "operationType": "query",
              "graphql": { "query": "query($name: String) { users(name: $name) { id } }" } },
            { "id": "users.stream", "operationType": "subscription",
              "grpc": { "service": "Users", "method": "Stream" } },
            { "id": "users.orphan", "operationType": "query" }
        ]
    })
}

async fn ready_proxy(server: &MockServer, options: ProxyOptions) -> Proxy {
    let schema: Schema = serde_json::from_value(schema_for(&server.uri())).unwrap();
    let mut proxy = Proxy::new("users", server.uri()).with_options(options);
    proxy.load_schema(schema);
    proxy
}

fn method_for<'a>(proxy: &'a Proxy, route: &str) -> &'a gantry_core::Method {
    proxy
        .methods()
        .unwrap()
        .iter()
        .find(|m| m.route_name == route)
        .unwrap()
}

#[tokio::test]
async fn initialize_fetches_schema_and_builds_methods() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schema_for(&server.uri())))
        .expect(1)
        .mount(&server)
        .await;

    let mut proxy = Proxy::new("users", server.uri());
    assert!(!proxy.is_initialized());
    proxy.initialize().await.expect("schema fetch should succeed");
    assert!(proxy.is_initialized());

    let routes: Vec<(MethodType, &str)> = proxy
        .methods()
        .unwrap()
        .iter()
        .map(|m| (m.method_type, m.route_name.as_str()))
        .collect();
    assert_eq!(
        routes,
        vec![
            (MethodType::Get, "users/users"),
            (MethodType::Create, "users/users"),
            (MethodType::Get, "users/users/search"),
            (MethodType::Get, "users/users/stream"),
            (MethodType::Get, "users/users/orphan"),
        ]
    );

    // Second initialize is a no-op: the mock expects exactly one fetch.
    proxy.initialize().await.unwrap();
}

#[tokio::test]
async fn initialize_fails_on_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schema"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut proxy = Proxy::new("users", server.uri());
    let err = proxy.initialize().await.unwrap_err();
    assert!(matches!(err, ProxyError::SchemaFetch { ref service, .. } if service == "users"));
    assert!(!proxy.is_initialized());
    assert!(matches!(proxy.methods(), Err(ProxyError::NotInitialized { .. })));
}

#[tokio::test]
async fn initialize_fails_on_malformed_schema() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schema"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let mut proxy = Proxy::new("users", server.uri());
    let err = proxy.initialize().await.unwrap_err();
    assert!(matches!(err, ProxyError::SchemaFetch { .. }));
}

#[tokio::test]
async fn initialize_fails_when_backend_unreachable() {
    let mut proxy = Proxy::new("users", "http://127.0.0.1:1");
    let err = proxy.initialize().await.unwrap_err();
    assert!(matches!(err, ProxyError::SchemaFetch { .. }));
}

#[tokio::test]
async fn rest_get_sends_query_and_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("id", "5"))
        .and(query_param("limit", "10"))
        .and(|req: &Request| req.body.is_empty())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 5 }])))
        .expect(1)
        .mount(&server)
        .await;

    let proxy = ready_proxy(&server, ProxyOptions::default()).await;
    let get = &proxy.methods().unwrap()[0];
    let result = get.call(json!({ "id": "5", "limit": 10, "skip": null })).await.unwrap();
    assert_eq!(result, json!([{ "id": 5 }]));
}

#[tokio::test]
async fn rest_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "name": "ann" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1, "name": "ann" })))
        .expect(1)
        .mount(&server)
        .await;

    let proxy = ready_proxy(&server, ProxyOptions::default()).await;
    let create = &proxy.methods().unwrap()[1];
    assert_eq!(create.method_type, MethodType::Create);
    let result = create.call(json!({ "name": "ann" })).await.unwrap();
    assert_eq!(result, json!({ "id": 1, "name": "ann" }));
}

#[tokio::test]
async fn graphql_posts_query_and_variables() {
    let server = MockServer::start().await;
    let envelope = json!({ "data": { "users": [{ "id": "1" }] }, "errors": null });
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_json(json!({
            "query": "query($name: String) { users(name: $name) { id } }",
            "variables": { "name": "ann" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let proxy = ready_proxy(&server, ProxyOptions::default()).await;
    let search = method_for(&proxy, "users/users/search");
    let result = search.call(json!({ "name": "ann" })).await.unwrap();
    assert_eq!(result, envelope);
}

#[tokio::test]
async fn grpc_and_unbound_operations_fail_without_io() {
    let server = MockServer::start().await;
    let proxy = ready_proxy(&server, ProxyOptions::default()).await;

    let grpc = method_for(&proxy, "users/users/stream").call(json!({})).await;
    match grpc {
        Err(ProxyError::NotImplemented(message)) => {
            assert_eq!(message, "gRPC not yet implemented")
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let orphan = method_for(&proxy, "users/users/orphan").call(json!({})).await;
    assert!(
        matches!(orphan, Err(ProxyError::UnknownProtocol { ref operation_id }) if operation_id == "users.orphan")
    );

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_success_upstream_becomes_proxy_call_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let proxy = ready_proxy(&server, ProxyOptions::default()).await;
    let err = proxy.methods().unwrap()[0].call(json!({})).await.unwrap_err();
    match err {
        ProxyError::ProxyCall { operation_id, message } => {
            assert_eq!(operation_id, "users.get");
            assert!(message.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_and_text_bodies_are_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_string("created"))
        .mount(&server)
        .await;

    let proxy = ready_proxy(&server, ProxyOptions::default()).await;
    let methods = proxy.methods().unwrap();
    assert_eq!(methods[0].call(json!({})).await.unwrap(), Value::Null);
    assert_eq!(methods[1].call(json!({})).await.unwrap(), json!("created"));
}

#[tokio::test]
async fn request_timeout_surfaces_as_proxy_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let options = ProxyOptions::default().with_request_timeout(Duration::from_millis(50));
    let proxy = ready_proxy(&server, options).await;
    let err = proxy.methods().unwrap()[0].call(json!({})).await.unwrap_err();
    match err {
        ProxyError::ProxyCall { message, .. } => assert!(message.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invoke_mode_posts_operation_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/internal/invoke"))
        .and(body_json(json!({
            "operationId": "users.stream",
            "input": { "since": 3 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let options = ProxyOptions::default().with_dispatch_mode(DispatchMode::Invoke);
    let proxy = ready_proxy(&server, options).await;
    let result = method_for(&proxy, "users/users/stream")
        .call(json!({ "since": 3 }))
        .await
        .unwrap();
    assert_eq!(result, json!({ "ok": true }));
}

#[tokio::test]
async fn override_replaces_default_dispatch() {
    let server = MockServer::start().await;
    let schema: Schema = serde_json::from_value(schema_for(&server.uri())).unwrap();

    let mut proxy = Proxy::new("users", server.uri());
    proxy
        .override_operation(
            "users.get",
            handler_fn(|input| async move { Ok(json!({ "overridden": input })) }),
        )
        .unwrap();
    proxy.load_schema(schema);

    let result = proxy.methods().unwrap()[0].call(json!({ "id": "5" })).await.unwrap();
    assert_eq!(result, json!({ "overridden": { "id": "5" } }));
    assert!(server.received_requests().await.unwrap().is_empty());

    let late = proxy.override_operation(
        "users.create",
        handler_fn(|_| async { Ok(Value::Null) }),
    );
    assert!(matches!(late, Err(ProxyError::AlreadyBuilt { .. })));
}

#[tokio::test]
async fn non_get_verbs_send_json_body() {
    let server = MockServer::start().await;
    let schema: Schema = serde_json::from_value(json!({
        "service": { "name": "users", "baseUrl": server.uri(), "protocol": "REST" },
        "operations": [
            { "id": "users.replace", "operationType": "mutation",
              "rest": { "method": "PUT", "path": "/users/1" } },
            { "id": "users.patch", "operationType": "mutation",
              "rest": { "method": "patch", "path": "/users/1" } },
            { "id": "users.delete", "operationType": "mutation",
              "rest": { "method": "DELETE", "path": "/users/1" } }
        ]
    }))
    .unwrap();

    for verb in ["PUT", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/users/1"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "verb": verb })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "handled": verb })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let proxy = Proxy::from_schema(schema, None);
    let methods = proxy.methods().unwrap();
    for (op, verb) in methods.iter().zip(["PUT", "PATCH", "DELETE"]) {
        let result = op.call(json!({ "verb": verb })).await.unwrap();
        assert_eq!(result, json!({ "handled": verb }));
    }
}
