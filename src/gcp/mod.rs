//! Google Cloud clients: Cloud Storage, BigQuery, Dataproc and Dataflow
//!
//! Every client carries its own [`GcpCredentials`], so clients for different
//! projects or identities can coexist in one process.

pub mod bigquery;
pub mod credentials;
pub mod pipelines;
pub mod storage;
pub mod uri;
mod transport;

pub use bigquery::{BigQueryClient, ExtractFormat, SourceFormat, TableRef};
pub use credentials::{GcpCredentials, CREDENTIALS_ENV};
pub use pipelines::{DataflowClient, DataprocClient};
pub use storage::GcsClient;
pub use uri::GcsUri;

use crate::config::GcpConfig;
use crate::error::Result;

pub fn create_gcs_client(config: &GcpConfig) -> Result<GcsClient> {
    GcsClient::new(config)
}

pub fn create_bigquery_client(config: &GcpConfig) -> Result<BigQueryClient> {
    BigQueryClient::new(config)
}

pub fn create_dataproc_client(config: &GcpConfig, region: &str) -> Result<DataprocClient> {
    DataprocClient::new(config, region)
}

pub fn create_dataflow_client(config: &GcpConfig) -> Result<DataflowClient> {
    DataflowClient::new(config)
}
