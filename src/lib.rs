//! connfactory - Turn declarative connection configs into native clients
//!
//! Each factory validates a configuration, checks that the matching driver is
//! available, and returns that driver's own client object unmodified:
//!
//! - [`db::create_db_connection`] for Postgres, MySQL, SQL Server and Oracle
//! - [`nosql::create_mongo_client`] for MongoDB
//! - [`api::ApiClient`] for HTTP APIs, with authentication resolved by [`api::AuthResolver`]
//! - [`sftp::create_sftp_client`] for SFTP over SSH
//! - [`secrets::create_vault_client`] for HashiCorp Vault
//! - [`gcp`] for Cloud Storage, BigQuery, Dataproc and Dataflow
//!
//! Nothing is pooled, cached or retried: every call is a one-shot factory.

pub mod api;
pub mod config;
pub mod db;
pub mod drivers;
pub mod error;
pub mod gcp;
pub mod nosql;
pub mod secrets;
pub mod sftp;
pub mod startup;

pub use api::{ApiClient, AuthResolver, RequestContext, TokenTransport};
pub use config::{
    ApiAuthType, ApiConfig, AuthConfig, Config, DatabaseType, DbConfig, GcpConfig, MongoConfig,
    SftpAuthType, SftpConfig, VaultConfig,
};
pub use drivers::Driver;
pub use error::{FactoryError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
