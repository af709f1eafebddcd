//! Connection configuration types
//!
//! Every factory in this crate takes one of these structs. They are plain data:
//! validation is structural only, and nothing here touches the network.

use crate::error::{FactoryError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Relational database kinds supported by [`crate::db::create_db_connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum DatabaseType {
    Postgres,
    MySql,
    SqlServer,
    Oracle,
}

impl DatabaseType {
    /// Canonical lowercase name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
            DatabaseType::MySql => "mysql",
            DatabaseType::SqlServer => "mssql",
            DatabaseType::Oracle => "oracle",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            "mysql" => Ok(DatabaseType::MySql),
            "mssql" | "sqlserver" => Ok(DatabaseType::SqlServer),
            "oracle" => Ok(DatabaseType::Oracle),
            other => Err(FactoryError::config(format!("Unsupported db_type: {}", other))),
        }
    }
}

impl TryFrom<String> for DatabaseType {
    type Error = FactoryError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Relational database connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub db_type: DatabaseType,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    /// Database name (service name for Oracle)
    pub database: String,
    /// Driver-specific options; scalars in YAML are kept as their string form
    #[serde(default, deserialize_with = "deserialize_extra")]
    pub extra: BTreeMap<String, String>,
}

impl DbConfig {
    pub fn new(
        db_type: DatabaseType,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            db_type,
            host: host.into(),
            port,
            user: user.into(),
            password: SecretString::new(password.into()),
            database: database.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Add a driver option
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Validate database configuration
    pub fn validate(&self) -> Result<()> {
        // A complete SQL Server DSN makes host/port irrelevant
        let has_dsn = self.db_type == DatabaseType::SqlServer && self.extra.contains_key("dsn");
        if has_dsn {
            return Ok(());
        }

        if self.host.trim().is_empty() {
            return Err(FactoryError::config(format!(
                "{} host cannot be empty",
                self.db_type
            )));
        }
        if self.port == 0 {
            return Err(FactoryError::config(format!(
                "{} port must be non-zero",
                self.db_type
            )));
        }
        if self.database.trim().is_empty() {
            return Err(FactoryError::config(format!(
                "{} database cannot be empty",
                self.db_type
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtraValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

fn deserialize_extra<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, ExtraValue>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                ExtraValue::Bool(b) => b.to_string(),
                ExtraValue::Int(i) => i.to_string(),
                ExtraValue::Float(f) => f.to_string(),
                ExtraValue::Str(s) => s,
            };
            (k, v)
        })
        .collect())
}

/// Flat authentication mode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiAuthType {
    None,
    Basic,
    Bearer,
    ApiKeyHeader,
    ApiKeyQuery,
    OAuth2ClientCredentials,
}

impl ApiAuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiAuthType::None => "none",
            ApiAuthType::Basic => "basic",
            ApiAuthType::Bearer => "bearer",
            ApiAuthType::ApiKeyHeader => "api_key_header",
            ApiAuthType::ApiKeyQuery => "api_key_query",
            ApiAuthType::OAuth2ClientCredentials => "oauth2_client_credentials",
        }
    }
}

impl fmt::Display for ApiAuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiAuthType {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ApiAuthType::None),
            "basic" => Ok(ApiAuthType::Basic),
            "bearer" => Ok(ApiAuthType::Bearer),
            "api_key_header" => Ok(ApiAuthType::ApiKeyHeader),
            "api_key_query" => Ok(ApiAuthType::ApiKeyQuery),
            "oauth2_client_credentials" => Ok(ApiAuthType::OAuth2ClientCredentials),
            _ => Err(FactoryError::config(format!("unsupported auth type: {}", s))),
        }
    }
}

/// Authentication settings for an HTTP API, one variant per mode.
///
/// In YAML the mode is selected by `type` and the remaining keys are flat,
/// e.g. `{ type: bearer, token: "..." }`. Keys belonging to other modes are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "RawAuthConfig")]
pub enum AuthConfig {
    #[default]
    None,
    Basic {
        username: Option<String>,
        password: Option<SecretString>,
    },
    Bearer {
        token: Option<SecretString>,
    },
    ApiKeyHeader {
        api_key_name: Option<String>,
        api_key_value: Option<SecretString>,
    },
    ApiKeyQuery {
        api_key_name: Option<String>,
        api_key_value: Option<SecretString>,
    },
    OAuth2ClientCredentials {
        oauth2_token_url: Option<String>,
        oauth2_client_id: Option<String>,
        oauth2_client_secret: Option<SecretString>,
    },
}

impl AuthConfig {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthConfig::Basic {
            username: Some(username.into()),
            password: Some(SecretString::new(password.into())),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        AuthConfig::Bearer {
            token: Some(SecretString::new(token.into())),
        }
    }

    pub fn api_key_header(name: impl Into<String>, value: impl Into<String>) -> Self {
        AuthConfig::ApiKeyHeader {
            api_key_name: Some(name.into()),
            api_key_value: Some(SecretString::new(value.into())),
        }
    }

    pub fn api_key_query(name: impl Into<String>, value: impl Into<String>) -> Self {
        AuthConfig::ApiKeyQuery {
            api_key_name: Some(name.into()),
            api_key_value: Some(SecretString::new(value.into())),
        }
    }

    pub fn oauth2_client_credentials(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        AuthConfig::OAuth2ClientCredentials {
            oauth2_token_url: Some(token_url.into()),
            oauth2_client_id: Some(client_id.into()),
            oauth2_client_secret: Some(SecretString::new(client_secret.into())),
        }
    }

    /// The mode tag of this configuration
    pub fn mode(&self) -> ApiAuthType {
        match self {
            AuthConfig::None => ApiAuthType::None,
            AuthConfig::Basic { .. } => ApiAuthType::Basic,
            AuthConfig::Bearer { .. } => ApiAuthType::Bearer,
            AuthConfig::ApiKeyHeader { .. } => ApiAuthType::ApiKeyHeader,
            AuthConfig::ApiKeyQuery { .. } => ApiAuthType::ApiKeyQuery,
            AuthConfig::OAuth2ClientCredentials { .. } => ApiAuthType::OAuth2ClientCredentials,
        }
    }

    /// Query parameter to merge into every request, for `api_key_query` with
    /// both name and value present
    pub fn query_param(&self) -> Option<(&str, &str)> {
        match self {
            AuthConfig::ApiKeyQuery {
                api_key_name: Some(name),
                api_key_value: Some(value),
            } if !name.is_empty() && !value.expose_secret().is_empty() => {
                Some((name.as_str(), value.expose_secret().as_str()))
            }
            _ => None,
        }
    }
}

/// Wire form of [`AuthConfig`]
#[derive(Deserialize)]
struct RawAuthConfig {
    #[serde(rename = "type", default = "default_auth_type")]
    auth_type: String,
    username: Option<String>,
    password: Option<SecretString>,
    token: Option<SecretString>,
    api_key_name: Option<String>,
    api_key_value: Option<SecretString>,
    oauth2_token_url: Option<String>,
    oauth2_client_id: Option<String>,
    oauth2_client_secret: Option<SecretString>,
}

fn default_auth_type() -> String {
    "none".to_string()
}

impl TryFrom<RawAuthConfig> for AuthConfig {
    type Error = FactoryError;

    fn try_from(raw: RawAuthConfig) -> Result<Self> {
        Ok(match raw.auth_type.parse::<ApiAuthType>()? {
            ApiAuthType::None => AuthConfig::None,
            ApiAuthType::Basic => AuthConfig::Basic {
                username: raw.username,
                password: raw.password,
            },
            ApiAuthType::Bearer => AuthConfig::Bearer { token: raw.token },
            ApiAuthType::ApiKeyHeader => AuthConfig::ApiKeyHeader {
                api_key_name: raw.api_key_name,
                api_key_value: raw.api_key_value,
            },
            ApiAuthType::ApiKeyQuery => AuthConfig::ApiKeyQuery {
                api_key_name: raw.api_key_name,
                api_key_value: raw.api_key_value,
            },
            ApiAuthType::OAuth2ClientCredentials => AuthConfig::OAuth2ClientCredentials {
                oauth2_token_url: raw.oauth2_token_url,
                oauth2_client_id: raw.oauth2_client_id,
                oauth2_client_secret: raw.oauth2_client_secret,
            },
        })
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Headers applied to every request before authentication
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
    /// Timeout applied to every call, including the OAuth2 token exchange
    pub timeout_secs: Option<u64>,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthConfig::None,
            default_headers: HashMap::new(),
            timeout_secs: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Validate API configuration
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            FactoryError::config(format!("Invalid API base_url '{}': {}", self.base_url, e))
        })?;
        if self.timeout_secs == Some(0) {
            return Err(FactoryError::config("API timeout_secs must be non-zero"));
        }
        Ok(())
    }
}

/// MongoDB settings
#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub app_name: Option<String>,
}

impl MongoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.uri.starts_with("mongodb://") || self.uri.starts_with("mongodb+srv://")) {
            return Err(FactoryError::config(format!(
                "Invalid MongoDB uri '{}': expected mongodb:// or mongodb+srv://",
                self.uri
            )));
        }
        Ok(())
    }
}

/// How an SFTP session authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SftpAuthType {
    #[default]
    Password,
    PrivateKey,
    PasswordAndKey,
}

/// SFTP settings
#[derive(Debug, Clone, Deserialize)]
pub struct SftpConfig {
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    pub password: Option<SecretString>,
    pub private_key_path: Option<PathBuf>,
    pub private_key_passphrase: Option<SecretString>,
    #[serde(default)]
    pub auth_type: SftpAuthType,
    /// Expected SHA256 host key fingerprint; unpinned hosts are accepted with a warning
    pub host_key_fingerprint: Option<String>,
}

fn default_sftp_port() -> u16 {
    22
}

impl SftpConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_sftp_port(),
            username: username.into(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
            auth_type: SftpAuthType::Password,
            host_key_fingerprint: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(FactoryError::config("SFTP host cannot be empty"));
        }
        if self.port == 0 {
            return Err(FactoryError::config("SFTP port must be non-zero"));
        }
        Ok(())
    }
}

/// Google Cloud project settings
#[derive(Debug, Clone, Deserialize)]
pub struct GcpConfig {
    pub project_id: String,
    /// Service account or authorized user JSON; falls back to application default credentials
    pub credentials_path: Option<PathBuf>,
}

impl GcpConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            credentials_path: None,
        }
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(FactoryError::config("GCP project_id cannot be empty"));
        }
        Ok(())
    }
}

/// HashiCorp Vault settings
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    pub url: String,
    #[serde(default)]
    pub role: String,
    /// Signed JWT used for the login exchange when no token is given
    pub jwt: Option<SecretString>,
    pub token: Option<SecretString>,
    /// Auth method mount path used for the JWT login
    #[serde(default = "default_vault_auth_mount")]
    pub auth_mount: String,
}

fn default_vault_auth_mount() -> String {
    "gcp".to_string()
}

impl VaultConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            role: String::new(),
            jwt: None,
            token: None,
            auth_mount: default_vault_auth_mount(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token.into()));
        self
    }

    pub fn with_jwt(mut self, role: impl Into<String>, jwt: impl Into<String>) -> Self {
        self.role = role.into();
        self.jwt = Some(SecretString::new(jwt.into()));
        self
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.url).map_err(|e| {
            FactoryError::config(format!("Invalid Vault url '{}': {}", self.url, e))
        })?;
        if self.auth_mount.trim_matches('/').is_empty() {
            return Err(FactoryError::config("Vault auth_mount cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_parsing() {
        assert_eq!("postgresql".parse::<DatabaseType>().unwrap(), DatabaseType::Postgres);
        assert_eq!("MSSQL".parse::<DatabaseType>().unwrap(), DatabaseType::SqlServer);
        assert_eq!("sqlserver".parse::<DatabaseType>().unwrap(), DatabaseType::SqlServer);

        let err = "sqlite".parse::<DatabaseType>().unwrap_err();
        assert!(matches!(err, FactoryError::Config { .. }));
        assert!(err.to_string().contains("Unsupported db_type: sqlite"));
    }

    #[test]
    fn test_auth_type_parsing() {
        assert_eq!(
            "oauth2_client_credentials".parse::<ApiAuthType>().unwrap(),
            ApiAuthType::OAuth2ClientCredentials
        );
        let err = "digest".parse::<ApiAuthType>().unwrap_err();
        assert!(matches!(err, FactoryError::Config { .. }));
        assert!(err.to_string().contains("unsupported auth type: digest"));
    }

    #[test]
    fn test_auth_config_from_yaml() {
        let auth: AuthConfig = serde_yaml::from_str(
            "type: api_key_header\napi_key_name: X-API-Key\napi_key_value: SECRET\ntoken: ignored\n",
        )
        .unwrap();
        match auth {
            AuthConfig::ApiKeyHeader {
                api_key_name,
                api_key_value,
            } => {
                assert_eq!(api_key_name.as_deref(), Some("X-API-Key"));
                assert_eq!(api_key_value.unwrap().expose_secret(), "SECRET");
            }
            other => panic!("unexpected auth config: {:?}", other.mode()),
        }

        let err = serde_yaml::from_str::<AuthConfig>("type: kerberos\n").unwrap_err();
        assert!(err.to_string().contains("unsupported auth type: kerberos"));
    }

    #[test]
    fn test_auth_config_defaults_to_none() {
        let api: ApiConfig = serde_yaml::from_str("base_url: https://api.example.com\n").unwrap();
        assert_eq!(api.auth.mode(), ApiAuthType::None);
        assert!(api.default_headers.is_empty());
    }

    #[test]
    fn test_query_param_requires_both_fields() {
        let auth = AuthConfig::api_key_query("api_key", "SECRET");
        assert_eq!(auth.query_param(), Some(("api_key", "SECRET")));

        let partial = AuthConfig::ApiKeyQuery {
            api_key_name: Some("api_key".to_string()),
            api_key_value: None,
        };
        assert_eq!(partial.query_param(), None);
        assert_eq!(AuthConfig::bearer("x").query_param(), None);
    }

    #[test]
    fn test_db_config_extra_scalars() {
        let db: DbConfig = serde_yaml::from_str(
            "db_type: postgres\nhost: localhost\nport: 5432\nuser: u\npassword: p\ndatabase: app\nextra:\n  connect_timeout: 10\n  application_name: etl\n  sslmode_required: true\n",
        )
        .unwrap();
        assert_eq!(db.extra.get("connect_timeout").map(String::as_str), Some("10"));
        assert_eq!(db.extra.get("application_name").map(String::as_str), Some("etl"));
        assert_eq!(db.extra.get("sslmode_required").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_db_config_validation() {
        let db = DbConfig::new(DatabaseType::MySql, "", 3306, "u", "p", "app");
        assert!(db.validate().is_err());

        let db = DbConfig::new(DatabaseType::MySql, "localhost", 0, "u", "p", "app");
        assert!(db.validate().is_err());

        let db = DbConfig::new(DatabaseType::SqlServer, "", 0, "", "", "")
            .with_extra("dsn", "DSN=warehouse");
        assert!(db.validate().is_ok());
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let db = DbConfig::new(DatabaseType::Postgres, "localhost", 5432, "u", "hunter2", "app");
        assert!(!format!("{:?}", db).contains("hunter2"));

        let auth = AuthConfig::bearer("top-secret-token");
        assert!(!format!("{:?}", auth).contains("top-secret-token"));
    }

    #[test]
    fn test_sftp_and_vault_defaults() {
        let sftp: SftpConfig = serde_yaml::from_str("host: sftp.example.com\nusername: u\n").unwrap();
        assert_eq!(sftp.port, 22);
        assert_eq!(sftp.auth_type, SftpAuthType::Password);

        let vault: VaultConfig = serde_yaml::from_str("url: https://vault.example.com\n").unwrap();
        assert_eq!(vault.auth_mount, "gcp");
        assert!(vault.role.is_empty());
        assert!(vault.validate().is_ok());
    }
}
