//! Explicit Google Cloud credentials
//!
//! Credentials are resolved once into a [`GcpCredentials`] value and handed to
//! each client. The process environment is only read, never written.

use crate::api::TokenTransport;
use crate::config::GcpConfig;
use crate::error::{FactoryError, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a credentials file for application default credentials
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// OAuth scope requested for every client in this crate
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Service account key file contents
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    pub private_key_id: Option<String>,
    pub token_uri: Option<String>,
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// RS256-signed JWT-bearer assertion valid for one hour from `now`
    pub fn assertion(&self, scope: &str, now: i64) -> Result<String> {
        use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let claims = json!({
            "iss": self.client_email,
            "scope": scope,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });

        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| FactoryError::config(format!("Invalid service account private key: {}", e)))?;
        encode(&header, &claims, &key)
            .map_err(|e| FactoryError::config(format!("Failed to sign service account assertion: {}", e)))
    }
}

/// `gcloud auth application-default login` credentials
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

/// Source of access tokens for the GCP clients
#[derive(Debug, Clone)]
pub enum GcpCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
    /// Pre-issued access token, used as-is
    AccessToken(SecretString),
    /// Compute metadata server of the running instance
    MetadataServer { url: String },
}

impl GcpCredentials {
    /// Resolve credentials for `config`.
    ///
    /// Order: `credentials_path`, then the file named by
    /// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud well-known file, then
    /// the metadata server.
    pub fn from_config(config: &GcpConfig) -> Result<Self> {
        if let Some(path) = &config.credentials_path {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CREDENTIALS_ENV).filter(|p| !p.is_empty()) {
            debug!("Using GCP credentials from {}", CREDENTIALS_ENV);
            return Self::from_file(path);
        }
        if let Some(path) = well_known_file().filter(|p| p.exists()) {
            debug!("Using gcloud application default credentials at {}", path.display());
            return Self::from_file(path);
        }
        debug!("No GCP credentials file found, using the metadata server");
        Ok(Self::metadata_server())
    }

    /// Load a service account or authorized user JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FactoryError::config(format!(
                "Failed to read GCP credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(content)
            .map_err(|e| FactoryError::config(format!("Invalid GCP credentials file: {}", e)))?;
        Ok(match file {
            CredentialsFile::ServiceAccount(key) => GcpCredentials::ServiceAccount(key),
            CredentialsFile::AuthorizedUser(user) => GcpCredentials::AuthorizedUser(user),
        })
    }

    pub fn access_token(token: impl Into<String>) -> Self {
        GcpCredentials::AccessToken(SecretString::new(token.into()))
    }

    pub fn metadata_server() -> Self {
        GcpCredentials::MetadataServer {
            url: METADATA_TOKEN_URL.to_string(),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            GcpCredentials::ServiceAccount(_) => "service_account",
            GcpCredentials::AuthorizedUser(_) => "authorized_user",
            GcpCredentials::AccessToken(_) => "access_token",
            GcpCredentials::MetadataServer { .. } => "metadata_server",
        }
    }

    /// Obtain a fresh access token
    pub async fn fetch_token(&self, http_client: &Client) -> Result<SecretString> {
        debug!(kind = self.kind(), "Fetching GCP access token");
        match self {
            GcpCredentials::ServiceAccount(key) => {
                let assertion = key.assertion(CLOUD_PLATFORM_SCOPE, chrono::Utc::now().timestamp())?;
                let body = http_client
                    .post_form(
                        key.token_uri(),
                        &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
                    )
                    .await?;
                access_token_from(&body)
            }
            GcpCredentials::AuthorizedUser(user) => {
                let body = http_client
                    .post_form(
                        user.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI),
                        &[
                            ("grant_type", "refresh_token"),
                            ("client_id", user.client_id.as_str()),
                            ("client_secret", user.client_secret.expose_secret().as_str()),
                            ("refresh_token", user.refresh_token.expose_secret().as_str()),
                        ],
                    )
                    .await?;
                access_token_from(&body)
            }
            GcpCredentials::AccessToken(token) => Ok(token.clone()),
            GcpCredentials::MetadataServer { url } => {
                let response = http_client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FactoryError::transport_status(
                        status.as_u16(),
                        format!("metadata server returned {}", status),
                    ));
                }
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| FactoryError::protocol(format!("metadata token is not JSON: {}", e)))?;
                access_token_from(&body)
            }
        }
    }
}

fn access_token_from(body: &Value) -> Result<SecretString> {
    body.get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::new(t.to_string()))
        .ok_or_else(|| FactoryError::protocol("token response missing access_token"))
}

fn well_known_file() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("gcloud")
            .join("application_default_credentials.json")
    })
}
