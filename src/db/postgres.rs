//! Postgres connections over tokio-postgres

use crate::config::DbConfig;
use crate::db::DbConnection;
use crate::error::Result;
use secrecy::ExposeSecret;

/// Build a libpq-style `key=value` connection string.
///
/// Every value is single-quoted with `\` and `'` escaped, so passwords and
/// application names may contain spaces or quotes. Extras are appended as-is
/// and left to the driver to accept or reject.
pub fn postgres_dsn(config: &DbConfig) -> String {
    let port = config.port.to_string();
    let mut pairs: Vec<(&str, &str)> = vec![
        ("host", config.host.as_str()),
        ("port", port.as_str()),
        ("user", config.user.as_str()),
        ("password", config.password.expose_secret().as_str()),
        ("dbname", config.database.as_str()),
    ];
    for (k, v) in &config.extra {
        pairs.push((k.as_str(), v.as_str()));
    }

    pairs
        .iter()
        .map(|(k, v)| format!("{}='{}'", k, quote_value(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(feature = "postgres")]
pub(crate) async fn connect(config: &DbConfig) -> Result<DbConnection> {
    use crate::error::FactoryError;
    use std::str::FromStr;
    use tokio_postgres::NoTls;

    let pg_config = tokio_postgres::Config::from_str(&postgres_dsn(config))
        .map_err(|e| FactoryError::config(format!("Invalid Postgres options: {}", e)))?;

    let (client, connection) = pg_config
        .connect(NoTls)
        .await
        .map_err(|e| FactoryError::driver("postgres", e))?;

    // Spawn the connection task
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Postgres connection error: {}", e);
        }
    });

    Ok(DbConnection::Postgres(client))
}

#[cfg(not(feature = "postgres"))]
pub(crate) async fn connect(_config: &DbConfig) -> Result<DbConnection> {
    Err(crate::drivers::Driver::Postgres.missing())
}
