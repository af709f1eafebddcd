//! Relational database connections
//!
//! [`create_db_connection`] picks the native driver for a [`DbConfig`] and
//! returns its connection object unmodified. The caller owns the connection
//! and is responsible for closing it.

mod mssql;
mod mysql;
mod oracle;
mod postgres;

pub use mssql::{mssql_connection_string, DEFAULT_ODBC_DRIVER};
pub use mysql::mysql_url;
pub use oracle::{oracle_dsn, OracleOptions, OraclePrivilege};
pub use postgres::postgres_dsn;

use crate::config::{DatabaseType, DbConfig};
use crate::drivers::Driver;
use crate::error::Result;
use tracing::{debug, info};

/// Native connection returned by [`create_db_connection`]
pub enum DbConnection {
    #[cfg(feature = "postgres")]
    Postgres(tokio_postgres::Client),
    #[cfg(feature = "mysql")]
    MySql(mysql_async::Conn),
    #[cfg(feature = "mssql")]
    SqlServer(odbc_api::Connection<'static>),
    #[cfg(feature = "oracle")]
    Oracle(oracle::Connection),
}

impl DbConnection {
    /// Database kind of this connection
    pub fn db_type(&self) -> DatabaseType {
        match *self {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "mysql")]
            DbConnection::MySql(_) => DatabaseType::MySql,
            #[cfg(feature = "mssql")]
            DbConnection::SqlServer(_) => DatabaseType::SqlServer,
            #[cfg(feature = "oracle")]
            DbConnection::Oracle(_) => DatabaseType::Oracle,
        }
    }
}

/// Open a connection for `config` with its native driver.
///
/// Fails with `MissingDriver` when the driver is not compiled in, `Config` when
/// the settings or extras are invalid, and `Driver` when the server refuses.
/// SQL Server and Oracle drivers are blocking and run on the calling thread.
pub async fn create_db_connection(config: &DbConfig) -> Result<DbConnection> {
    debug!(
        db_type = %config.db_type,
        host = %config.host,
        port = config.port,
        database = %config.database,
        "Creating database connection"
    );

    config.validate()?;
    Driver::from(config.db_type).require()?;

    let conn = match config.db_type {
        DatabaseType::Postgres => postgres::connect(config).await?,
        DatabaseType::MySql => mysql::connect(config).await?,
        DatabaseType::SqlServer => mssql::connect(config)?,
        DatabaseType::Oracle => oracle::connect(config)?,
    };

    info!("Connected to {} database at {}:{}", config.db_type, config.host, config.port);
    Ok(conn)
}
