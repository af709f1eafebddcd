//! MySQL connections over mysql_async

use crate::config::DbConfig;
use crate::db::DbConnection;
use crate::error::Result;
use secrecy::ExposeSecret;
use urlencoding::encode;

/// Build a `mysql://` URL with credentials and database percent-encoded.
///
/// Extras become query parameters, which the driver validates.
pub fn mysql_url(config: &DbConfig) -> String {
    let mut url = format!(
        "mysql://{}:{}@{}:{}/{}",
        encode(&config.user),
        encode(config.password.expose_secret()),
        config.host,
        config.port,
        encode(&config.database)
    );

    if !config.extra.is_empty() {
        let query = config
            .extra
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);
    }
    url
}

#[cfg(feature = "mysql")]
pub(crate) async fn connect(config: &DbConfig) -> Result<DbConnection> {
    use crate::error::FactoryError;

    let opts = mysql_async::Opts::from_url(&mysql_url(config))
        .map_err(|e| FactoryError::config(format!("Invalid MySQL options: {}", e)))?;

    let conn = mysql_async::Conn::new(opts)
        .await
        .map_err(|e| FactoryError::driver("mysql", e))?;

    Ok(DbConnection::MySql(conn))
}

#[cfg(not(feature = "mysql"))]
pub(crate) async fn connect(_config: &DbConfig) -> Result<DbConnection> {
    Err(crate::drivers::Driver::MySql.missing())
}
