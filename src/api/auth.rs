//! Multi-mode HTTP authentication resolution
//!
//! [`AuthResolver`] turns an [`AuthConfig`] into the headers or basic-auth pair
//! carried by one outgoing request. The OAuth2 client-credentials mode performs
//! a fresh token exchange on every resolution; nothing is cached.

use crate::config::AuthConfig;
use crate::error::{FactoryError, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Mutable credential state for a single outgoing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Header name to value, case-sensitive as provided
    pub headers: HashMap<String, String>,
    /// Username and password for HTTP basic auth
    pub basic_auth: Option<(String, String)>,
    /// Query parameters, ordered so generated URLs are deterministic
    pub query_params: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the `Authorization` header, if set
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("Authorization").map(String::as_str)
    }
}

/// Sends the form-encoded POST of a token exchange
#[async_trait]
pub trait TokenTransport: Send + Sync {
    /// POST `form` to `url` and return the decoded JSON body.
    ///
    /// A failed call or non-2xx status is a `Transport` error; a body that is
    /// not JSON is a `Protocol` error.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<serde_json::Value>;
}

#[async_trait]
impl TokenTransport for reqwest::Client {
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<serde_json::Value> {
        let response = self.post(url).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FactoryError::transport_status(
                status.as_u16(),
                format!("token endpoint returned {}: {}", status, body),
            ));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| FactoryError::protocol(format!("token response is not JSON: {}", e)))
    }
}

/// Applies an [`AuthConfig`] to a [`RequestContext`]
pub struct AuthResolver<'a> {
    transport: &'a dyn TokenTransport,
}

impl<'a> AuthResolver<'a> {
    pub fn new(transport: &'a dyn TokenTransport) -> Self {
        Self { transport }
    }

    /// Resolve `config` into `ctx`.
    ///
    /// `api_key_query` is a no-op here; the request builder merges the key into
    /// the query string (see [`AuthConfig::query_param`]). On failure `ctx` is
    /// left untouched.
    pub async fn resolve(&self, config: &AuthConfig, ctx: &mut RequestContext) -> Result<()> {
        debug!(mode = %config.mode(), "Resolving API authentication");

        match config {
            AuthConfig::None => {}
            AuthConfig::Basic { username, password } => {
                // reqwest appends the basic header, so drop any preset one
                clear_authorization(ctx);
                ctx.basic_auth = Some((
                    username.clone().unwrap_or_default(),
                    password
                        .as_ref()
                        .map(|p| p.expose_secret().clone())
                        .unwrap_or_default(),
                ));
            }
            AuthConfig::Bearer { token } => {
                let token = secret_value(token.as_ref()).ok_or_else(|| {
                    FactoryError::config("bearer auth requires a non-empty token")
                })?;
                set_bearer(ctx, token);
            }
            AuthConfig::ApiKeyHeader {
                api_key_name,
                api_key_value,
            } => {
                let name = api_key_name.as_deref().filter(|n| !n.is_empty());
                if let (Some(name), Some(value)) = (name, secret_value(api_key_value.as_ref())) {
                    ctx.headers.insert(name.to_string(), value.to_string());
                }
            }
            AuthConfig::ApiKeyQuery { .. } => {}
            AuthConfig::OAuth2ClientCredentials {
                oauth2_token_url,
                oauth2_client_id,
                oauth2_client_secret,
            } => {
                let token = self
                    .client_credentials_token(
                        oauth2_token_url.as_deref(),
                        oauth2_client_id.as_deref(),
                        oauth2_client_secret.as_ref(),
                    )
                    .await?;
                set_bearer(ctx, &token);
            }
        }

        Ok(())
    }

    async fn client_credentials_token(
        &self,
        token_url: Option<&str>,
        client_id: Option<&str>,
        client_secret: Option<&SecretString>,
    ) -> Result<String> {
        let token_url = token_url.filter(|s| !s.is_empty());
        let client_id = client_id.filter(|s| !s.is_empty());
        let client_secret = secret_value(client_secret);

        let (token_url, client_id, client_secret) = match (token_url, client_id, client_secret) {
            (Some(url), Some(id), Some(secret)) => (url, id, secret),
            _ => {
                return Err(FactoryError::config(
                    "OAuth2 client credentials require token_url, client_id, client_secret",
                ))
            }
        };

        debug!(token_url = %token_url, "Requesting OAuth2 client-credentials token");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let body = self.transport.post_form(token_url, &params).await?;

        body.get("access_token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FactoryError::protocol("token response missing access_token"))
    }
}

fn secret_value(secret: Option<&SecretString>) -> Option<&str> {
    secret
        .map(|s| s.expose_secret().as_str())
        .filter(|s| !s.is_empty())
}

/// Header names are matched case-insensitively, as HTTP does
fn clear_authorization(ctx: &mut RequestContext) {
    ctx.headers
        .retain(|name, _| !name.eq_ignore_ascii_case("Authorization"));
}

fn set_bearer(ctx: &mut RequestContext, token: &str) {
    clear_authorization(ctx);
    ctx.headers
        .insert("Authorization".to_string(), format!("Bearer {}", token));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every POST and answers with a fixed body
    struct StubTransport {
        reply: Result<serde_json::Value>,
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl StubTransport {
        fn replying(body: serde_json::Value) -> Self {
            Self {
                reply: Ok(body),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(FactoryError::transport_status(status, "boom")),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TokenTransport for StubTransport {
        async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<serde_json::Value> {
            self.calls.lock().unwrap().push((
                url.to_string(),
                form.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            match &self.reply {
                Ok(body) => Ok(body.clone()),
                Err(e) => Err(FactoryError::transport_status(e.status().unwrap_or(500), "boom")),
            }
        }
    }

    fn oauth(url: Option<&str>, id: Option<&str>, secret: Option<&str>) -> AuthConfig {
        AuthConfig::OAuth2ClientCredentials {
            oauth2_token_url: url.map(str::to_string),
            oauth2_client_id: id.map(str::to_string),
            oauth2_client_secret: secret.map(|s| SecretString::new(s.to_string())),
        }
    }

    #[tokio::test]
    async fn test_none_does_not_mutate() {
        let transport = StubTransport::replying(json!({}));
        let mut ctx = RequestContext::new();
        AuthResolver::new(&transport)
            .resolve(&AuthConfig::None, &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx, RequestContext::default());
    }

    #[tokio::test]
    async fn test_basic_sets_pair_and_defaults_missing_values() {
        let transport = StubTransport::replying(json!({}));
        let resolver = AuthResolver::new(&transport);

        let mut ctx = RequestContext::new();
        resolver.resolve(&AuthConfig::basic("u", "p"), &mut ctx).await.unwrap();
        assert_eq!(ctx.basic_auth, Some(("u".to_string(), "p".to_string())));
        assert!(ctx.headers.is_empty());

        let mut ctx = RequestContext::new();
        let config = AuthConfig::Basic {
            username: None,
            password: None,
        };
        resolver.resolve(&config, &mut ctx).await.unwrap();
        assert_eq!(ctx.basic_auth, Some((String::new(), String::new())));
    }

    #[tokio::test]
    async fn test_bearer_sets_header() {
        let transport = StubTransport::replying(json!({}));
        let mut ctx = RequestContext::new();
        AuthResolver::new(&transport)
            .resolve(&AuthConfig::bearer("XYZ"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.authorization(), Some("Bearer XYZ"));
    }

    #[tokio::test]
    async fn test_resolved_auth_replaces_preset_authorization() {
        let transport = StubTransport::replying(json!({}));
        let resolver = AuthResolver::new(&transport);

        let mut ctx = RequestContext::new();
        ctx.headers.insert("authorization".to_string(), "Token stale".to_string());
        ctx.headers.insert("X-Client".to_string(), "etl".to_string());
        resolver.resolve(&AuthConfig::basic("u", "p"), &mut ctx).await.unwrap();
        assert!(ctx.authorization().is_none());
        assert!(!ctx.headers.contains_key("authorization"));
        assert_eq!(ctx.headers.len(), 1);

        let mut ctx = RequestContext::new();
        ctx.headers.insert("AUTHORIZATION".to_string(), "Token stale".to_string());
        resolver.resolve(&AuthConfig::bearer("fresh"), &mut ctx).await.unwrap();
        assert_eq!(ctx.headers.len(), 1);
        assert_eq!(ctx.authorization(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn test_bearer_without_token_fails_fast() {
        let transport = StubTransport::replying(json!({}));
        let mut ctx = RequestContext::new();
        let err = AuthResolver::new(&transport)
            .resolve(&AuthConfig::Bearer { token: None }, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::Config { .. }));
        assert!(ctx.headers.is_empty());
    }

    #[tokio::test]
    async fn test_api_key_header_requires_both_fields() {
        let transport = StubTransport::replying(json!({}));
        let resolver = AuthResolver::new(&transport);

        let mut ctx = RequestContext::new();
        resolver
            .resolve(&AuthConfig::api_key_header("X-API-Key", "SECRET"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.headers.get("X-API-Key").map(String::as_str), Some("SECRET"));

        for config in [
            AuthConfig::ApiKeyHeader {
                api_key_name: None,
                api_key_value: Some(SecretString::new("SECRET".to_string())),
            },
            AuthConfig::ApiKeyHeader {
                api_key_name: Some("X-API-Key".to_string()),
                api_key_value: None,
            },
        ] {
            let mut ctx = RequestContext::new();
            resolver.resolve(&config, &mut ctx).await.unwrap();
            assert!(ctx.headers.is_empty());
        }
    }

    #[tokio::test]
    async fn test_api_key_query_leaves_context_alone() {
        let transport = StubTransport::replying(json!({}));
        let mut ctx = RequestContext::new();
        AuthResolver::new(&transport)
            .resolve(&AuthConfig::api_key_query("api_key", "SECRET"), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx, RequestContext::default());
    }

    #[tokio::test]
    async fn test_oauth2_missing_fields_make_no_network_call() {
        let transport = StubTransport::replying(json!({"access_token": "ACCESS"}));
        let resolver = AuthResolver::new(&transport);

        for config in [
            oauth(None, Some("id"), Some("secret")),
            oauth(Some("https://auth/token"), None, Some("secret")),
            oauth(Some("https://auth/token"), Some("id"), None),
            oauth(Some("https://auth/token"), Some(""), Some("secret")),
        ] {
            let mut ctx = RequestContext::new();
            let err = resolver.resolve(&config, &mut ctx).await.unwrap_err();
            assert!(matches!(err, FactoryError::Config { .. }));
            assert!(ctx.headers.is_empty());
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oauth2_exchange_sets_bearer() {
        let transport = StubTransport::replying(json!({"access_token": "ACCESS", "expires_in": 3600}));
        let mut ctx = RequestContext::new();
        AuthResolver::new(&transport)
            .resolve(
                &AuthConfig::oauth2_client_credentials("https://auth/token", "id", "secret"),
                &mut ctx,
            )
            .await
            .unwrap();

        assert_eq!(ctx.authorization(), Some("Bearer ACCESS"));

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, form) = &calls[0];
        assert_eq!(url, "https://auth/token");
        assert!(form.contains(&("grant_type".to_string(), "client_credentials".to_string())));
        assert!(form.contains(&("client_id".to_string(), "id".to_string())));
        assert!(form.contains(&("client_secret".to_string(), "secret".to_string())));
    }

    #[tokio::test]
    async fn test_oauth2_missing_access_token_is_protocol_error() {
        for body in [json!({}), json!({"access_token": ""}), json!({"access_token": 42})] {
            let transport = StubTransport::replying(body);
            let mut ctx = RequestContext::new();
            let err = AuthResolver::new(&transport)
                .resolve(
                    &AuthConfig::oauth2_client_credentials("https://auth/token", "id", "secret"),
                    &mut ctx,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, FactoryError::Protocol { .. }));
            assert_eq!(err.to_string(), "Protocol error: token response missing access_token");
            assert!(ctx.authorization().is_none());
        }
    }

    #[tokio::test]
    async fn test_oauth2_transport_failure_propagates() {
        let transport = StubTransport::failing(401);
        let mut ctx = RequestContext::new();
        let err = AuthResolver::new(&transport)
            .resolve(
                &AuthConfig::oauth2_client_credentials("https://auth/token", "id", "secret"),
                &mut ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::Transport { .. }));
        assert_eq!(err.status(), Some(401));
        assert!(ctx.headers.is_empty());
    }

    #[tokio::test]
    async fn test_oauth2_exchanges_fresh_token_every_time() {
        let transport = StubTransport::replying(json!({"access_token": "ACCESS"}));
        let resolver = AuthResolver::new(&transport);
        let config = AuthConfig::oauth2_client_credentials("https://auth/token", "id", "secret");

        for _ in 0..2 {
            let mut ctx = RequestContext::new();
            resolver.resolve(&config, &mut ctx).await.unwrap();
        }
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let transport = StubTransport::replying(json!({}));
        let resolver = AuthResolver::new(&transport);

        for config in [AuthConfig::None, AuthConfig::basic("u", "p")] {
            let mut first = RequestContext::new();
            let mut second = RequestContext::new();
            resolver.resolve(&config, &mut first).await.unwrap();
            resolver.resolve(&config, &mut second).await.unwrap();
            assert_eq!(first, second);
        }
    }
}
