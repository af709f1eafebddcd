use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use connfactory::config::{Config, LoggingConfig, DEFAULT_CONFIG_FILE};
use connfactory::db::create_db_connection;
use connfactory::drivers::Driver;
use connfactory::startup::{self, StartupLogger};
use connfactory::ApiClient;
use reqwest::Method;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate the configuration, then print a summary
    Validate,
    /// List optional drivers and whether they are compiled in
    Drivers,
    /// Open the named database connection and report the result
    Db {
        /// Entry under `databases`
        name: String,
    },
    /// Issue a request through the named API and print status and body
    Api {
        /// Entry under `apis`
        name: String,
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// Query parameters as key=value
        #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Drivers = cli.command {
        print_drivers();
        return Ok(());
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet, so fall back to defaults to report this
            let _ = startup::init_logging(&LoggingConfig::default());
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let mut logging = config.logging.clone();
    if let Some(level) = cli.log_level {
        logging.level = level;
    }
    logging.validate()?;
    startup::init_logging(&logging)?;
    StartupLogger::display_startup_info(&config, connfactory::VERSION);

    match cli.command {
        Command::Validate => print_summary(&config),
        Command::Drivers => print_drivers(),
        Command::Db { name } => {
            let db_config = config.database(&name)?;
            let conn = create_db_connection(db_config)
                .await
                .with_context(|| format!("connecting to database '{}'", name))?;
            println!("{}: connected ({})", name, conn.db_type());
        }
        Command::Api {
            name,
            method,
            path,
            params,
            body,
        } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method '{}'", method))?;
            let body = body
                .map(|b| serde_json::from_str::<serde_json::Value>(&b))
                .transpose()
                .context("request body is not valid JSON")?;

            let client = ApiClient::new(config.api(&name)?.clone())?;
            let params: Vec<(&str, &str)> = params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();

            let response = client.request(method, &path, &params, body.as_ref()).await?;
            let status = response.status();
            let text = response.text().await?;
            println!("{}", status);
            println!("{}", text);
            if !status.is_success() {
                bail!("request returned {}", status);
            }
        }
    }

    info!("Done");
    Ok(())
}

fn print_drivers() {
    for driver in Driver::all() {
        println!(
            "{:<10} {:<16} {}",
            driver.feature(),
            driver.library(),
            if driver.is_compiled() { "available" } else { "not compiled in" }
        );
    }
}

fn print_summary(config: &Config) {
    println!("Configuration is valid");
    for (name, db) in &config.databases {
        println!("  database {:<16} {} {}:{}/{}", name, db.db_type, db.host, db.port, db.database);
    }
    for (name, api) in &config.apis {
        println!("  api      {:<16} {} (auth: {})", name, api.base_url, api.auth.mode());
    }
    for (name, mongo) in &config.mongo {
        println!("  mongo    {:<16} {}", name, redact_uri(&mongo.uri));
    }
    for (name, sftp) in &config.sftp {
        println!("  sftp     {:<16} {}@{}:{}", name, sftp.username, sftp.host, sftp.port);
    }
    for (name, vault) in &config.vault {
        println!("  vault    {:<16} {}", name, vault.url);
    }
    if let Some(gcp) = &config.gcp {
        println!("  gcp      project {}", gcp.project_id);
    }
}

/// Hide any password embedded in a connection URI
fn redact_uri(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => uri.to_string(),
    }
}
