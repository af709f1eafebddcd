//! Startup: logging initialization and the startup report

mod logger;

pub use logger::{init_logging, StartupLogger};
