//! Secret management: HashiCorp Vault via a direct token or GCP JWT login

use crate::api::join_url;
use crate::config::VaultConfig;
use crate::error::{FactoryError, Result};
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Authenticated Vault client
#[derive(Debug, Clone)]
pub struct VaultClient {
    url: String,
    token: Option<SecretString>,
    http_client: Client,
}

/// Create a Vault client from `config`.
///
/// A direct token wins. Without one, a configured JWT is exchanged at
/// `POST /v1/auth/<mount>/login` for a client token. With neither, the client
/// is returned unauthenticated.
pub async fn create_vault_client(config: &VaultConfig) -> Result<VaultClient> {
    create_vault_client_with(config, Client::new()).await
}

/// Same as [`create_vault_client`] over an existing `reqwest::Client`
pub async fn create_vault_client_with(config: &VaultConfig, http_client: Client) -> Result<VaultClient> {
    config.validate()?;
    let mut client = VaultClient {
        url: config.url.clone(),
        token: config
            .token
            .clone()
            .filter(|t| !t.expose_secret().is_empty()),
        http_client,
    };

    if client.token.is_none() {
        if let Some(jwt) = config.jwt.as_ref().filter(|j| !j.expose_secret().is_empty()) {
            let token = client.login_jwt(&config.auth_mount, &config.role, jwt).await?;
            client.token = Some(token);
        }
    }

    Ok(client)
}

impl VaultClient {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a token has been set, directly or through login
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.url, &format!("v1/{}", path.trim_start_matches('/')))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req_builder = self.http_client.request(method, self.endpoint(path));
        if let Some(token) = &self.token {
            req_builder = req_builder.header(TOKEN_HEADER, token.expose_secret().as_str());
        }
        req_builder
    }

    async fn send(&self, req_builder: RequestBuilder, operation: &str) -> Result<Option<Value>> {
        let response = req_builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FactoryError::transport_status(
                status.as_u16(),
                format!("Vault {} returned {}: {}", operation, status, body),
            ));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| FactoryError::protocol(format!("Vault {} response is not JSON: {}", operation, e)))
    }

    async fn login_jwt(&self, mount: &str, role: &str, jwt: &SecretString) -> Result<SecretString> {
        let mount = mount.trim_matches('/');
        debug!(mount = %mount, role = %role, "Logging in to Vault with JWT");

        let body = json!({ "role": role, "jwt": jwt.expose_secret() });
        let response = self
            .send(
                self.http_client
                    .post(self.endpoint(&format!("auth/{}/login", mount)))
                    .json(&body),
                "login",
            )
            .await?;

        let token = response
            .as_ref()
            .and_then(|v| v.pointer("/auth/client_token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FactoryError::protocol("Vault login response missing auth.client_token"))?;

        info!("Authenticated to Vault via auth/{}", mount);
        Ok(SecretString::new(token.to_string()))
    }

    /// Check the current token with `auth/token/lookup-self`
    pub async fn is_authenticated(&self) -> Result<bool> {
        if self.token.is_none() {
            return Ok(false);
        }
        match self
            .send(self.request(Method::GET, "auth/token/lookup-self"), "token lookup")
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.status(), Some(401) | Some(403)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read the latest version of a KV v2 secret's data
    pub async fn read_secret(&self, mount: &str, path: &str) -> Result<Map<String, Value>> {
        let response = self
            .send(self.request(Method::GET, &kv_path(mount, "data", path)), "read secret")
            .await?;

        response
            .as_ref()
            .and_then(|v| v.pointer("/data/data"))
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| FactoryError::protocol(format!("Vault secret {} has no data.data", path)))
    }

    /// Write a new version of a KV v2 secret, returning the version number
    pub async fn write_secret(&self, mount: &str, path: &str, data: &Map<String, Value>) -> Result<u64> {
        let response = self
            .send(
                self.request(Method::POST, &kv_path(mount, "data", path))
                    .json(&json!({ "data": data })),
                "write secret",
            )
            .await?;

        response
            .as_ref()
            .and_then(|v| v.pointer("/data/version"))
            .and_then(Value::as_u64)
            .ok_or_else(|| FactoryError::protocol(format!("Vault write of {} returned no version", path)))
    }

    /// Soft-delete the latest version of a KV v2 secret
    pub async fn delete_latest_version(&self, mount: &str, path: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &kv_path(mount, "data", path)), "delete secret")
            .await?;
        Ok(())
    }
}

fn kv_path(mount: &str, kind: &str, path: &str) -> String {
    format!("{}/{}/{}", mount.trim_matches('/'), kind, path.trim_matches('/'))
}
