//! Logging setup and the startup report

use crate::config::{Config, LoggingConfig};
use crate::drivers::Driver;
use crate::error::{FactoryError, Result};
use tracing::{info, warn};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays clean.
pub fn init_logging(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match logging.format.to_lowercase().as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| FactoryError::config(format!("Failed to initialize logging: {}", e)))
}

/// Startup report for the CLI
pub struct StartupLogger;

impl StartupLogger {
    /// Log the loaded configuration and driver availability
    pub fn display_startup_info(config: &Config, version: &str) {
        info!("connfactory v{} starting", version);
        Self::display_configuration(config);
        Self::display_drivers();
    }

    fn display_configuration(config: &Config) {
        info!(
            "Configured: {} database(s), {} API(s), {} MongoDB, {} SFTP, {} Vault, GCP {}",
            config.databases.len(),
            config.apis.len(),
            config.mongo.len(),
            config.sftp.len(),
            config.vault.len(),
            config
                .gcp
                .as_ref()
                .map(|g| g.project_id.as_str())
                .unwrap_or("not configured")
        );

        for (name, db) in &config.databases {
            let driver = Driver::from(db.db_type);
            if !driver.is_compiled() {
                warn!(
                    "Database '{}' uses {} but the `{}` feature is not enabled",
                    name,
                    db.db_type,
                    driver.feature()
                );
            }
        }
        if !config.mongo.is_empty() && !Driver::MongoDb.is_compiled() {
            warn!("MongoDB entries are configured but the `mongodb` feature is not enabled");
        }
        if !config.sftp.is_empty() && !Driver::Sftp.is_compiled() {
            warn!("SFTP entries are configured but the `sftp` feature is not enabled");
        }
    }

    fn display_drivers() {
        let enabled: Vec<&str> = Driver::all()
            .iter()
            .filter(|d| d.is_compiled())
            .map(|d| d.feature())
            .collect();
        info!("Drivers compiled in: {}", enabled.join(", "));
    }
}
