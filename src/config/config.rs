//! Configuration structures and loading for connfactory

use crate::config::connections::{ApiConfig, DbConfig, GcpConfig, MongoConfig, SftpConfig, VaultConfig};
use crate::error::{FactoryError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default configuration file name looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "connections.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named relational databases
    #[serde(default)]
    pub databases: BTreeMap<String, DbConfig>,
    /// Named HTTP APIs
    #[serde(default)]
    pub apis: BTreeMap<String, ApiConfig>,
    /// Named MongoDB deployments
    #[serde(default)]
    pub mongo: BTreeMap<String, MongoConfig>,
    /// Named SFTP servers
    #[serde(default)]
    pub sftp: BTreeMap<String, SftpConfig>,
    /// Google Cloud project shared by the GCS/BigQuery/Dataproc/Dataflow clients
    pub gcp: Option<GcpConfig>,
    /// Named Vault servers
    #[serde(default)]
    pub vault: BTreeMap<String, VaultConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Result<()> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(FactoryError::config(format!(
                    "Invalid log level: '{}'. Valid levels: trace, debug, info, warn, error",
                    self.level
                )))
            }
        }

        match self.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => {
                return Err(FactoryError::config(format!(
                    "Invalid log format: '{}'. Valid formats: json, text",
                    self.format
                )))
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load .env files, base file first so local overrides win
    fn load_env_files() {
        for env_file in [".env", ".env.local"] {
            match dotenvy::from_filename(env_file) {
                Ok(_) => tracing::debug!("Loaded environment variables from {}", env_file),
                Err(e) if e.not_found() => tracing::debug!("No {} file found, skipping", env_file),
                Err(e) => tracing::warn!("Failed to load {}: {}", env_file, e),
            }
        }
    }

    /// Load configuration from file with environment variable expansion and overrides.
    ///
    /// A missing file is not an error: defaults are used and a warning is logged.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_env_files();

        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            let mut config = Self::default();
            config.apply_environment_overrides()?;
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| FactoryError::config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` references first.
    ///
    /// Only the braced form is expanded. Any other `$`, as in `Pa$$w0rd`, is
    /// kept verbatim.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let escaped = escape_bare_dollars(content);
        let expanded = shellexpand::env(&escaped).map_err(|e| {
            FactoryError::config(format!(
                "Failed to expand environment variable '{}' in config: {}",
                e.var_name, e.cause
            ))
        })?;

        let mut config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| FactoryError::config(format!("Failed to parse config file: {}", e)))?;

        config.apply_environment_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Ok(level) = std::env::var("CONNFACTORY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }

        if let Ok(format) = std::env::var("CONNFACTORY_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    /// Validate every section, naming the entry that failed
    pub fn validate(&self) -> Result<()> {
        self.logging.validate()?;

        for (name, db) in &self.databases {
            db.validate().map_err(|e| section_error("databases", name, e))?;
        }
        for (name, api) in &self.apis {
            api.validate().map_err(|e| section_error("apis", name, e))?;
        }
        for (name, mongo) in &self.mongo {
            mongo.validate().map_err(|e| section_error("mongo", name, e))?;
        }
        for (name, sftp) in &self.sftp {
            sftp.validate().map_err(|e| section_error("sftp", name, e))?;
        }
        if let Some(ref gcp) = self.gcp {
            gcp.validate()?;
        }
        for (name, vault) in &self.vault {
            vault.validate().map_err(|e| section_error("vault", name, e))?;
        }

        Ok(())
    }

    pub fn database(&self, name: &str) -> Result<&DbConfig> {
        lookup(&self.databases, "databases", name)
    }

    pub fn api(&self, name: &str) -> Result<&ApiConfig> {
        lookup(&self.apis, "apis", name)
    }

    pub fn mongo(&self, name: &str) -> Result<&MongoConfig> {
        lookup(&self.mongo, "mongo", name)
    }

    pub fn sftp(&self, name: &str) -> Result<&SftpConfig> {
        lookup(&self.sftp, "sftp", name)
    }

    pub fn vault(&self, name: &str) -> Result<&VaultConfig> {
        lookup(&self.vault, "vault", name)
    }

    pub fn gcp(&self) -> Result<&GcpConfig> {
        self.gcp
            .as_ref()
            .ok_or_else(|| FactoryError::config("No gcp section configured"))
    }
}

/// Double every `$` that does not open `${`, so shellexpand's `$$` escape
/// turns it back into a single literal `$`
fn escape_bare_dollars(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        escaped.push(c);
        if c == '$' && chars.peek() != Some(&'{') {
            escaped.push('$');
        }
    }
    escaped
}

fn lookup<'a, T>(section: &'a BTreeMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    section.get(name).ok_or_else(|| {
        FactoryError::config(format!("No entry named '{}' in {} section", name, kind))
    })
}

fn section_error(kind: &str, name: &str, err: FactoryError) -> FactoryError {
    match err {
        FactoryError::Config { message } => {
            FactoryError::config(format!("{}.{}: {}", kind, name, message))
        }
        other => other,
    }
}
