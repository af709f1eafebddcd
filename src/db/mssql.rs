//! SQL Server connections over ODBC

use crate::config::DbConfig;
use crate::db::DbConnection;
use crate::error::Result;
use secrecy::ExposeSecret;

/// Driver name used when the `driver` extra is absent
pub const DEFAULT_ODBC_DRIVER: &str = "ODBC Driver 17 for SQL Server";

/// ODBC connection string for SQL Server.
///
/// A `dsn` extra is used verbatim. Otherwise the string is assembled from the
/// host, port, database and credentials, with the driver taken from the
/// `driver` extra.
pub fn mssql_connection_string(config: &DbConfig) -> String {
    if let Some(dsn) = config.extra.get("dsn").filter(|d| !d.is_empty()) {
        return dsn.clone();
    }

    let driver = config
        .extra
        .get("driver")
        .map(String::as_str)
        .unwrap_or(DEFAULT_ODBC_DRIVER);

    format!(
        "DRIVER={{{}}};SERVER={},{};DATABASE={};UID={};PWD={}",
        driver,
        config.host,
        config.port,
        odbc_value(&config.database),
        odbc_value(&config.user),
        odbc_value(config.password.expose_secret())
    )
}

/// Brace-quote values that would otherwise break the `key=value;` grammar
fn odbc_value(value: &str) -> String {
    if value.contains([';', '{', '}', '=']) || value.starts_with(' ') || value.ends_with(' ') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

#[cfg(feature = "mssql")]
static ODBC_ENV: once_cell::sync::OnceCell<odbc_api::Environment> = once_cell::sync::OnceCell::new();

#[cfg(feature = "mssql")]
pub(crate) fn connect(config: &DbConfig) -> Result<DbConnection> {
    use crate::error::FactoryError;
    use odbc_api::{ConnectionOptions, Environment};

    let env = ODBC_ENV.get_or_try_init(Environment::new).map_err(|e| {
        FactoryError::missing_driver(
            "odbc-api",
            format!("ODBC driver manager is not available: {}", e),
        )
    })?;

    let conn = env
        .connect_with_connection_string(&mssql_connection_string(config), ConnectionOptions::default())
        .map_err(|e| FactoryError::driver("mssql", e))?;

    Ok(DbConnection::SqlServer(conn))
}

#[cfg(not(feature = "mssql"))]
pub(crate) fn connect(_config: &DbConfig) -> Result<DbConnection> {
    Err(crate::drivers::Driver::SqlServer.missing())
}
