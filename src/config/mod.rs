//! Configuration module for connfactory
//!
//! This module provides the connection configuration types and the YAML loader.

mod config;
mod connections;

// Re-export the main configuration types
pub use config::{Config, LoggingConfig, DEFAULT_CONFIG_FILE};
pub use connections::{
    ApiAuthType, ApiConfig, AuthConfig, DatabaseType, DbConfig, GcpConfig, MongoConfig,
    SftpAuthType, SftpConfig, VaultConfig,
};
