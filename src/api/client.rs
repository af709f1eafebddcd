//! HTTP API client with pluggable authentication
//!
//! Each request builds a fresh [`RequestContext`]: default headers, then the
//! resolved authentication, then caller parameters, then the query-string API
//! key. The native `reqwest::Response` is returned without checking its status.

use crate::api::auth::{AuthResolver, RequestContext};
use crate::config::ApiConfig;
use crate::error::{FactoryError, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Join a base URL and a path with exactly one `/`.
///
/// One trailing slash is stripped from `base` and one leading slash from `path`.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{}/{}", base, path)
}

/// HTTP client bound to one [`ApiConfig`]
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http_client: Client,
}

impl ApiClient {
    /// Create a client, applying the configured timeout to every call
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let http_client = builder
            .build()
            .map_err(|e| FactoryError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_http_client(config, http_client))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_http_client(config: ApiConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Full URL for `path` under the configured base URL
    pub fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    /// Build the credential and query state for one request
    pub async fn prepare(&self, params: &[(&str, &str)]) -> Result<RequestContext> {
        let mut ctx = RequestContext::new();
        ctx.headers.extend(
            self.config
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        AuthResolver::new(&self.http_client)
            .resolve(&self.config.auth, &mut ctx)
            .await?;

        for (k, v) in params {
            ctx.query_params.insert(k.to_string(), v.to_string());
        }
        if let Some((name, value)) = self.config.auth.query_param() {
            ctx.query_params.insert(name.to_string(), value.to_string());
        }

        Ok(ctx)
    }

    /// Issue a request and return the raw response, whatever its status
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = self.url(path);
        let ctx = self.prepare(params).await?;

        debug!(method = %method, url = %url, "Sending API request");
        let mut req_builder = self.http_client.request(method, &url);
        req_builder = apply_context(req_builder, &ctx);
        if let Some(body) = body {
            req_builder = req_builder.json(body);
        }

        let response = req_builder.send().await?;
        debug!(status = %response.status(), url = %url, "API response received");
        Ok(response)
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Response> {
        self.request(Method::GET, path, params, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Response> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Response> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str, params: &[(&str, &str)]) -> Result<Response> {
        self.request(Method::DELETE, path, params, None).await
    }
}

/// Add headers, basic auth and query parameters to the request
fn apply_context(mut req_builder: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
    for (name, value) in &ctx.headers {
        req_builder = req_builder.header(name.as_str(), value.as_str());
    }
    if let Some((username, password)) = &ctx.basic_auth {
        req_builder = req_builder.basic_auth(username, Some(password));
    }
    if !ctx.query_params.is_empty() {
        req_builder = req_builder.query(&ctx.query_params);
    }
    req_builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    #[test]
    fn test_join_url_strips_one_slash_each_side() {
        assert_eq!(join_url("https://api.example.com", "items"), "https://api.example.com/items");
        assert_eq!(join_url("https://api.example.com/", "/items"), "https://api.example.com/items");
        assert_eq!(join_url("https://api.example.com/v1/", "items/1"), "https://api.example.com/v1/items/1");
        assert_eq!(join_url("https://api.example.com//", "//items"), "https://api.example.com///items");
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let err = ApiClient::new(ApiConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, FactoryError::Config { .. }));
    }

    #[tokio::test]
    async fn test_prepare_applies_headers_then_auth_then_query_key() {
        let config = ApiConfig::new("https://api.example.com")
            .with_header("X-Client", "etl")
            .with_auth(AuthConfig::api_key_query("api_key", "SECRET"));
        let client = ApiClient::new(config).unwrap();

        let ctx = client.prepare(&[("foo", "bar"), ("api_key", "caller")]).await.unwrap();
        assert_eq!(ctx.headers.get("X-Client").map(String::as_str), Some("etl"));
        assert_eq!(ctx.query_params.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(ctx.query_params.get("api_key").map(String::as_str), Some("SECRET"));
    }

    #[tokio::test]
    async fn test_auth_header_wins_over_default_header() {
        let config = ApiConfig::new("https://api.example.com")
            .with_header("Authorization", "Token stale")
            .with_auth(AuthConfig::bearer("fresh"));
        let client = ApiClient::new(config).unwrap();

        let ctx = client.prepare(&[]).await.unwrap();
        assert_eq!(ctx.authorization(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn test_basic_auth_replaces_default_authorization_header() {
        let config = ApiConfig::new("https://api.example.com")
            .with_header("Authorization", "Token stale")
            .with_auth(AuthConfig::basic("u", "p"));
        let client = ApiClient::new(config).unwrap();

        let ctx = client.prepare(&[]).await.unwrap();
        let request = apply_context(client.http_client.get(client.url("items")), &ctx)
            .build()
            .unwrap();

        // base64("u:p")
        let values: Vec<&str> = request
            .headers()
            .get_all("authorization")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["Basic dTpw"]);
    }
}
