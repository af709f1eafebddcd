//! Integration tests for API authentication against a mock HTTP server
//!
//! Covers every auth mode end to end through `ApiClient`, and the OAuth2
//! client-credentials exchange through `AuthResolver` directly.

use connfactory::{ApiClient, ApiConfig, AuthConfig, AuthResolver, FactoryError, RequestContext};
use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

async fn token_server(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=my-client"))
        .and(body_string_contains("client_secret=my-secret"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

fn oauth_config(server: &MockServer) -> AuthConfig {
    AuthConfig::oauth2_client_credentials(
        format!("{}/oauth/token", server.uri()),
        "my-client",
        "my-secret",
    )
}

#[tokio::test]
async fn test_oauth2_exchange_sets_bearer_header() {
    let server = token_server(
        ResponseTemplate::new(200).set_body_json(json!({"access_token": "abc123", "expires_in": 3600})),
    )
    .await;

    let http_client = reqwest::Client::new();
    let mut ctx = RequestContext::new();
    AuthResolver::new(&http_client)
        .resolve(&oauth_config(&server), &mut ctx)
        .await
        .unwrap();

    assert_eq!(ctx.authorization(), Some("Bearer abc123"));
    assert!(ctx.basic_auth.is_none());
    assert!(ctx.query_params.is_empty());
}

#[tokio::test]
async fn test_oauth2_rejected_token_request_is_transport_error() {
    let server = token_server(ResponseTemplate::new(401).set_body_string("invalid_client")).await;

    let http_client = reqwest::Client::new();
    let mut ctx = RequestContext::new();
    let err = AuthResolver::new(&http_client)
        .resolve(&oauth_config(&server), &mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, FactoryError::Transport { .. }));
    assert_eq!(err.status(), Some(401));
    assert!(ctx.authorization().is_none());
}

#[tokio::test]
async fn test_oauth2_response_without_token_is_protocol_error() {
    let server = token_server(ResponseTemplate::new(200).set_body_json(json!({"token_type": "bearer"}))).await;

    let http_client = reqwest::Client::new();
    let err = AuthResolver::new(&http_client)
        .resolve(&oauth_config(&server), &mut RequestContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FactoryError::Protocol { .. }));
    assert!(err.to_string().contains("access_token"));
}

#[tokio::test]
async fn test_oauth2_non_json_response_is_protocol_error() {
    let server = token_server(ResponseTemplate::new(200).set_body_string("<html>login</html>")).await;

    let http_client = reqwest::Client::new();
    let err = AuthResolver::new(&http_client)
        .resolve(&oauth_config(&server), &mut RequestContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FactoryError::Protocol { .. }));
}

#[tokio::test]
async fn test_api_client_oauth2_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "abc123"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .and(header("Authorization", "Bearer abc123"))
        .and(query_param("status", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let config = ApiConfig::new(format!("{}/v1/", server.uri())).with_auth(oauth_config(&server));
    let client = ApiClient::new(config).unwrap();

    let response = client.get("/orders", &[("status", "open")]).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!([{"id": 1}]));
}

#[tokio::test]
async fn test_api_client_does_not_call_api_when_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ApiClient::new(ApiConfig::new(server.uri()).with_auth(oauth_config(&server))).unwrap();
    let err = client.get("orders", &[]).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_api_client_basic_auth() {
    let server = MockServer::start().await;
    // base64("u:p")
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("Authorization", "Basic dTpw"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(ApiConfig::new(server.uri()).with_auth(AuthConfig::basic("u", "p"))).unwrap();
    let response = client.get("ping", &[]).await.unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_api_client_bearer_and_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header("Authorization", "Bearer static-token"))
        .and(header("X-Tenant", "acme"))
        .and(body_string_contains("\"kind\":\"deploy\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "evt-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ApiConfig::new(server.uri())
        .with_auth(AuthConfig::bearer("static-token"))
        .with_header("X-Tenant", "acme");
    let client = ApiClient::new(config).unwrap();

    let response = client.post("events", &json!({"kind": "deploy"})).await.unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_api_client_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .and(header("X-API-Key", "k-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = ApiConfig::new(server.uri()).with_auth(AuthConfig::api_key_header("X-API-Key", "k-123"));
    let response = ApiClient::new(config).unwrap().get("status", &[]).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_api_client_api_key_query_beats_caller_param() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("api_key", "configured"))
        .and(query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = ApiConfig::new(server.uri()).with_auth(AuthConfig::api_key_query("api_key", "configured"));
    let client = ApiClient::new(config).unwrap();

    let response = client
        .get("search", &[("q", "rust"), ("api_key", "from-caller")])
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_api_client_returns_error_statuses_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items/7"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such item"))
        .mount(&server)
        .await;

    let client = ApiClient::new(ApiConfig::new(server.uri())).unwrap();
    let response = client.delete("items/7", &[]).await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "no such item");
}
