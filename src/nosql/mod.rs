//! Document store clients (MongoDB)

use crate::config::MongoConfig;
use crate::error::Result;
use secrecy::ExposeSecret;
use tracing::debug;

#[cfg(feature = "mongodb")]
pub use mongodb::Client as MongoClient;

/// Uninhabited stand-in for builds without the `mongodb` feature
#[cfg(not(feature = "mongodb"))]
pub enum MongoClient {}

/// Credentials are attached only when both parts are present and non-empty
pub fn credential_pair<'a>(
    username: Option<&'a str>,
    password: Option<&'a str>,
) -> Option<(&'a str, &'a str)> {
    match (username, password) {
        (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
        _ => None,
    }
}

/// Create a native MongoDB client for `uri`.
///
/// The client connects lazily on first operation, so this only fails for an
/// invalid URI or a missing driver.
pub async fn create_mongo_client(
    uri: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<MongoClient> {
    build_client(uri, credential_pair(username, password), None).await
}

/// Create a MongoDB client from a named configuration entry
pub async fn create_mongo_client_from_config(config: &MongoConfig) -> Result<MongoClient> {
    config.validate()?;
    let password = config.password.as_ref().map(|p| p.expose_secret().as_str());
    build_client(
        &config.uri,
        credential_pair(config.username.as_deref(), password),
        config.app_name.as_deref(),
    )
    .await
}

#[cfg(feature = "mongodb")]
async fn build_client(
    uri: &str,
    credentials: Option<(&str, &str)>,
    app_name: Option<&str>,
) -> Result<MongoClient> {
    use crate::error::FactoryError;
    use mongodb::options::ClientOptions;

    debug!(with_credentials = credentials.is_some(), "Creating MongoDB client");

    let mut client_options = ClientOptions::parse(uri)
        .await
        .map_err(|e| FactoryError::config(format!("Invalid MongoDB uri: {}", e)))?;

    if let Some((username, password)) = credentials {
        // Keep any auth source or mechanism given in the URI
        let mut credential = client_options.credential.take().unwrap_or_default();
        credential.username = Some(username.to_string());
        credential.password = Some(password.to_string());
        client_options.credential = Some(credential);
    }
    if let Some(app_name) = app_name {
        client_options.app_name = Some(app_name.to_string());
    }

    let client = mongodb::Client::with_options(client_options)
        .map_err(|e| FactoryError::driver("mongodb", e))?;
    tracing::info!("MongoDB client created");
    Ok(client)
}

#[cfg(not(feature = "mongodb"))]
async fn build_client(
    _uri: &str,
    credentials: Option<(&str, &str)>,
    _app_name: Option<&str>,
) -> Result<MongoClient> {
    debug!(with_credentials = credentials.is_some(), "Creating MongoDB client");
    Err(crate::drivers::Driver::MongoDb.missing())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_need_both_parts() {
        assert_eq!(credential_pair(Some("u"), Some("p")), Some(("u", "p")));
        assert_eq!(credential_pair(Some("u"), None), None);
        assert_eq!(credential_pair(None, Some("p")), None);
        assert_eq!(credential_pair(Some(""), Some("p")), None);
    }

    #[cfg(feature = "mongodb")]
    #[tokio::test]
    async fn test_client_construction_is_lazy() {
        let client = create_mongo_client("mongodb://localhost:27017", Some("u"), Some("p"))
            .await
            .unwrap();
        assert!(client.default_database().is_none());
    }

    #[cfg(feature = "mongodb")]
    #[tokio::test]
    async fn test_invalid_uri_is_config_error() {
        let err = create_mongo_client("postgres://localhost", None, None)
            .await
            .err()
            .expect("non-mongodb scheme must fail");
        assert!(matches!(err, crate::error::FactoryError::Config { .. }));
    }
}
