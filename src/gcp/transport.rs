//! Authenticated JSON calls shared by the GCP clients

use crate::error::{FactoryError, Result};
use crate::gcp::credentials::GcpCredentials;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct GcpTransport {
    http_client: Client,
    credentials: GcpCredentials,
}

impl GcpTransport {
    pub fn new(credentials: GcpCredentials) -> Self {
        Self {
            http_client: Client::new(),
            credentials,
        }
    }

    pub fn http(&self) -> &Client {
        &self.http_client
    }

    /// Access token for one high-level operation
    pub async fn token(&self) -> Result<SecretString> {
        self.credentials.fetch_token(&self.http_client).await
    }

    /// Send with a bearer token, turning non-2xx statuses into `Transport` errors
    pub async fn send(&self, req_builder: RequestBuilder, token: &SecretString, operation: &str) -> Result<Response> {
        let response = req_builder
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        Err(FactoryError::transport_status(
            status.as_u16(),
            format!("{} failed with {}: {}", operation, status, message),
        ))
    }

    /// Send and decode a JSON body; an empty body decodes as `null`
    pub async fn send_json(&self, req_builder: RequestBuilder, token: &SecretString, operation: &str) -> Result<Value> {
        let body = self.send(req_builder, token, operation).await?.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| FactoryError::protocol(format!("{} returned invalid JSON: {}", operation, e)))
    }
}
