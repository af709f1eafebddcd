//! Oracle connections over the OCI client library

use crate::config::DbConfig;
use crate::db::DbConnection;
use crate::error::{FactoryError, Result};
use std::collections::BTreeMap;

/// Connect descriptor for a service name, in the form `makedsn` produces
pub fn oracle_dsn(host: &str, port: u16, service_name: &str) -> String {
    format!(
        "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SERVICE_NAME={})))",
        host, port, service_name
    )
}

/// Administrative privilege requested at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OraclePrivilege {
    Sysdba,
    Sysoper,
    Sysasm,
    Sysbackup,
    Sysdg,
    Syskm,
    Sysrac,
}

impl std::str::FromStr for OraclePrivilege {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sysdba" => Ok(OraclePrivilege::Sysdba),
            "sysoper" => Ok(OraclePrivilege::Sysoper),
            "sysasm" => Ok(OraclePrivilege::Sysasm),
            "sysbackup" => Ok(OraclePrivilege::Sysbackup),
            "sysdg" => Ok(OraclePrivilege::Sysdg),
            "syskm" => Ok(OraclePrivilege::Syskm),
            "sysrac" => Ok(OraclePrivilege::Sysrac),
            _ => Err(FactoryError::config(format!("Invalid Oracle privilege: {}", s))),
        }
    }
}

/// Connector options accepted in `extra`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleOptions {
    pub privilege: Option<OraclePrivilege>,
    pub stmt_cache_size: Option<u32>,
    pub connection_class: Option<String>,
    pub edition: Option<String>,
    pub external_auth: bool,
}

impl OracleOptions {
    /// Map `extra` onto connector options; unknown keys are a `Config` error
    pub fn from_extras(extra: &BTreeMap<String, String>) -> Result<Self> {
        let mut options = Self::default();
        for (key, value) in extra {
            let invalid = |e: &dyn std::fmt::Display| {
                FactoryError::config(format!("Invalid Oracle option {}={}: {}", key, value, e))
            };
            match key.as_str() {
                "privilege" | "mode" => options.privilege = Some(value.parse()?),
                "stmt_cache_size" | "stmtcachesize" => {
                    options.stmt_cache_size = Some(value.parse().map_err(|e| invalid(&e))?)
                }
                "connection_class" | "cclass" => options.connection_class = Some(value.clone()),
                "edition" => options.edition = Some(value.clone()),
                "external_auth" | "externalauth" => {
                    options.external_auth = value.parse().map_err(|e| invalid(&e))?
                }
                _ => return Err(FactoryError::config(format!("Unsupported Oracle option: {}", key))),
            }
        }
        Ok(options)
    }
}

#[cfg(feature = "oracle")]
pub(crate) fn connect(config: &DbConfig) -> Result<DbConnection> {
    use secrecy::ExposeSecret;

    let options = OracleOptions::from_extras(&config.extra)?;

    // The crate links OCI at runtime; probe it so a missing Instant Client is
    // reported as a missing driver rather than a connection failure
    let client_version = oracle::Version::client().map_err(|e| {
        FactoryError::missing_driver(
            "oracle",
            format!("Oracle Instant Client could not be loaded: {}", e),
        )
    })?;
    tracing::debug!("Using Oracle client {}", client_version);

    let dsn = oracle_dsn(&config.host, config.port, &config.database);
    let mut connector = oracle::Connector::new(config.user.as_str(), config.password.expose_secret().as_str(), dsn);
    if let Some(privilege) = options.privilege {
        connector.privilege(match privilege {
            OraclePrivilege::Sysdba => oracle::Privilege::Sysdba,
            OraclePrivilege::Sysoper => oracle::Privilege::Sysoper,
            OraclePrivilege::Sysasm => oracle::Privilege::Sysasm,
            OraclePrivilege::Sysbackup => oracle::Privilege::Sysbackup,
            OraclePrivilege::Sysdg => oracle::Privilege::Sysdg,
            OraclePrivilege::Syskm => oracle::Privilege::Syskm,
            OraclePrivilege::Sysrac => oracle::Privilege::Sysrac,
        });
    }
    if let Some(size) = options.stmt_cache_size {
        connector.stmt_cache_size(size);
    }
    if let Some(class) = &options.connection_class {
        connector.connection_class(class.as_str());
    }
    if let Some(edition) = &options.edition {
        connector.edition(edition.as_str());
    }
    if options.external_auth {
        connector.external_auth(true);
    }

    let conn = connector
        .connect()
        .map_err(|e| FactoryError::driver("oracle", e))?;

    Ok(DbConnection::Oracle(conn))
}

#[cfg(not(feature = "oracle"))]
pub(crate) fn connect(_config: &DbConfig) -> Result<DbConnection> {
    Err(crate::drivers::Driver::Oracle.missing())
}
