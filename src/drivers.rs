//! Capability probe for the optional native drivers
//!
//! Drivers are Cargo features. Asking for one that was not compiled in fails
//! with [`FactoryError::MissingDriver`] at the point of first use.

use crate::config::DatabaseType;
use crate::error::{FactoryError, Result};
use std::fmt;

/// Optional native driver backing a factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    Postgres,
    MySql,
    SqlServer,
    Oracle,
    MongoDb,
    Sftp,
}

impl Driver {
    /// Every optional driver, in display order
    pub fn all() -> &'static [Driver] {
        &[
            Driver::Postgres,
            Driver::MySql,
            Driver::SqlServer,
            Driver::Oracle,
            Driver::MongoDb,
            Driver::Sftp,
        ]
    }

    /// Cargo feature that compiles this driver in
    pub fn feature(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
            Driver::SqlServer => "mssql",
            Driver::Oracle => "oracle",
            Driver::MongoDb => "mongodb",
            Driver::Sftp => "sftp",
        }
    }

    /// Native library used by this driver
    pub fn library(&self) -> &'static str {
        match self {
            Driver::Postgres => "tokio-postgres",
            Driver::MySql => "mysql_async",
            Driver::SqlServer => "odbc-api",
            Driver::Oracle => "oracle",
            Driver::MongoDb => "mongodb",
            Driver::Sftp => "russh",
        }
    }

    /// Whether the driver was compiled into this build
    pub fn is_compiled(&self) -> bool {
        match self {
            Driver::Postgres => cfg!(feature = "postgres"),
            Driver::MySql => cfg!(feature = "mysql"),
            Driver::SqlServer => cfg!(feature = "mssql"),
            Driver::Oracle => cfg!(feature = "oracle"),
            Driver::MongoDb => cfg!(feature = "mongodb"),
            Driver::Sftp => cfg!(feature = "sftp"),
        }
    }

    /// Fail with `MissingDriver` unless the driver was compiled in
    pub fn require(&self) -> Result<()> {
        if self.is_compiled() {
            Ok(())
        } else {
            Err(self.missing())
        }
    }

    /// The `MissingDriver` error for this driver
    pub fn missing(&self) -> FactoryError {
        FactoryError::missing_driver(
            self.library(),
            format!("rebuild with `--features {}`", self.feature()),
        )
    }
}

impl From<DatabaseType> for Driver {
    fn from(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::Postgres => Driver::Postgres,
            DatabaseType::MySql => Driver::MySql,
            DatabaseType::SqlServer => Driver::SqlServer,
            DatabaseType::Oracle => Driver::Oracle,
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_matches_compiled_features() {
        for driver in Driver::all() {
            assert_eq!(driver.require().is_ok(), driver.is_compiled(), "{}", driver);
        }
    }

    #[test]
    fn test_missing_driver_hint_names_feature() {
        let err = Driver::Oracle.missing();
        assert!(matches!(err, FactoryError::MissingDriver { .. }));
        assert_eq!(
            err.to_string(),
            "Missing driver: oracle (rebuild with `--features oracle`)"
        );
    }

    #[test]
    fn test_database_type_mapping() {
        assert_eq!(Driver::from(DatabaseType::SqlServer), Driver::SqlServer);
        assert_eq!(Driver::from(DatabaseType::SqlServer).feature(), "mssql");
    }
}
