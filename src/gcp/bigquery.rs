//! BigQuery client: GCS loads, GCS extracts and streaming inserts

use crate::config::GcpConfig;
use crate::error::{FactoryError, Result};
use crate::gcp::credentials::GcpCredentials;
use crate::gcp::transport::GcpTransport;
use crate::gcp::uri::GcsUri;
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";

/// Fully qualified table reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    /// Parse `project.dataset.table`, or `dataset.table` within `default_project`
    pub fn parse(table: &str, default_project: &str) -> Result<Self> {
        let parts: Vec<&str> = table.split('.').collect();
        let (project, dataset, name) = match parts.as_slice() {
            [project, dataset, name] => (*project, *dataset, *name),
            [dataset, name] => (default_project, *dataset, *name),
            _ => {
                return Err(FactoryError::config(format!(
                    "Invalid table id '{}': expected project.dataset.table or dataset.table",
                    table
                )))
            }
        };
        if [project, dataset, name].iter().any(|p| p.is_empty()) {
            return Err(FactoryError::config(format!("Invalid table id '{}'", table)));
        }
        Ok(Self {
            project_id: project.to_string(),
            dataset_id: dataset.to_string(),
            table_id: name.to_string(),
        })
    }

    fn to_json(&self) -> Value {
        json!({
            "projectId": self.project_id,
            "datasetId": self.dataset_id,
            "tableId": self.table_id,
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Source format of a load job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    #[default]
    Csv,
    NewlineDelimitedJson,
    Avro,
    Parquet,
    Orc,
    DatastoreBackup,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
            SourceFormat::Avro => "AVRO",
            SourceFormat::Parquet => "PARQUET",
            SourceFormat::Orc => "ORC",
            SourceFormat::DatastoreBackup => "DATASTORE_BACKUP",
        }
    }
}

impl FromStr for SourceFormat {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CSV" => Ok(SourceFormat::Csv),
            "NEWLINE_DELIMITED_JSON" | "JSON" => Ok(SourceFormat::NewlineDelimitedJson),
            "AVRO" => Ok(SourceFormat::Avro),
            "PARQUET" => Ok(SourceFormat::Parquet),
            "ORC" => Ok(SourceFormat::Orc),
            "DATASTORE_BACKUP" => Ok(SourceFormat::DatastoreBackup),
            _ => Err(FactoryError::config(format!("Unsupported source format: {}", s))),
        }
    }
}

/// Destination format of an extract job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractFormat {
    #[default]
    Csv,
    NewlineDelimitedJson,
    Avro,
    Parquet,
}

impl ExtractFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractFormat::Csv => "CSV",
            ExtractFormat::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
            ExtractFormat::Avro => "AVRO",
            ExtractFormat::Parquet => "PARQUET",
        }
    }
}

impl FromStr for ExtractFormat {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CSV" => Ok(ExtractFormat::Csv),
            "NEWLINE_DELIMITED_JSON" | "JSON" => Ok(ExtractFormat::NewlineDelimitedJson),
            "AVRO" => Ok(ExtractFormat::Avro),
            "PARQUET" => Ok(ExtractFormat::Parquet),
            _ => Err(FactoryError::config(format!("Unsupported extract format: {}", s))),
        }
    }
}

/// BigQuery REST client for one project
#[derive(Debug, Clone)]
pub struct BigQueryClient {
    project_id: String,
    base_url: String,
    transport: GcpTransport,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl BigQueryClient {
    pub fn new(config: &GcpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_credentials(
            &config.project_id,
            GcpCredentials::from_config(config)?,
        ))
    }

    pub fn with_credentials(project_id: impl Into<String>, credentials: GcpCredentials) -> Self {
        Self {
            project_id: project_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            transport: GcpTransport::new(credentials),
            poll_interval: Duration::from_secs(2),
            job_timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// How often job status is polled while waiting
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound on waiting for a job to finish
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn jobs_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}/jobs", self.base_url, self.project_id)
    }

    /// Load files from GCS into a table and wait for the job.
    ///
    /// `options` are merged into the load configuration as given, e.g.
    /// `{"skipLeadingRows": 1, "writeDisposition": "WRITE_TRUNCATE"}`.
    pub async fn load_from_gcs(
        &self,
        table_id: &str,
        source_uri: &str,
        format: SourceFormat,
        options: &Map<String, Value>,
    ) -> Result<Value> {
        let table = TableRef::parse(table_id, &self.project_id)?;
        let source: GcsUri = source_uri.parse()?;
        debug!(table = %table, source = %source, format = format.as_str(), "Starting BigQuery load");

        let mut load = Map::new();
        load.insert("sourceUris".to_string(), json!([source.to_string()]));
        load.insert("destinationTable".to_string(), table.to_json());
        load.insert("sourceFormat".to_string(), json!(format.as_str()));
        load.extend(options.clone());

        let job = self
            .run_job(json!({ "configuration": { "load": load } }), "load")
            .await?;
        info!("Loaded {} into {}", source, table);
        Ok(job)
    }

    /// Export a table to GCS and wait for the job
    pub async fn extract_to_gcs(
        &self,
        table_id: &str,
        destination_uri: &str,
        format: ExtractFormat,
        options: &Map<String, Value>,
    ) -> Result<Value> {
        let table = TableRef::parse(table_id, &self.project_id)?;
        let destination: GcsUri = destination_uri.parse()?;
        debug!(table = %table, destination = %destination, format = format.as_str(), "Starting BigQuery extract");

        let mut extract = Map::new();
        extract.insert("sourceTable".to_string(), table.to_json());
        extract.insert("destinationUris".to_string(), json!([destination.to_string()]));
        extract.insert("destinationFormat".to_string(), json!(format.as_str()));
        extract.extend(options.clone());

        let job = self
            .run_job(json!({ "configuration": { "extract": extract } }), "extract")
            .await?;
        info!("Extracted {} to {}", table, destination);
        Ok(job)
    }

    /// Stream JSON rows into a table.
    ///
    /// Any per-row error reported by the service fails the whole call with
    /// `Rejected`.
    pub async fn insert_rows(&self, table_id: &str, rows: &[Value]) -> Result<()> {
        let table = TableRef::parse(table_id, &self.project_id)?;
        if rows.is_empty() {
            return Ok(());
        }
        debug!(table = %table, rows = rows.len(), "Inserting BigQuery rows");

        let url = format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.base_url, table.project_id, table.dataset_id, table.table_id
        );
        let body = json!({
            "rows": rows.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
        });

        let token = self.transport.token().await?;
        let response = self
            .transport
            .send_json(self.transport.http().post(url).json(&body), &token, "BigQuery insertAll")
            .await?;

        match response.get("insertErrors").and_then(Value::as_array) {
            Some(errors) if !errors.is_empty() => Err(FactoryError::rejected(
                "insert_rows",
                format!("{} row(s) rejected: {}", errors.len(), Value::Array(errors.clone())),
            )),
            _ => Ok(()),
        }
    }

    async fn run_job(&self, job: Value, kind: &str) -> Result<Value> {
        let token = self.transport.token().await?;
        let inserted = self
            .transport
            .send_json(self.transport.http().post(self.jobs_url()).json(&job), &token, "BigQuery job insert")
            .await?;

        let job_id = inserted
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)
            .ok_or_else(|| FactoryError::protocol("BigQuery job response missing jobReference.jobId"))?
            .to_string();
        let location = inserted
            .pointer("/jobReference/location")
            .and_then(Value::as_str)
            .map(str::to_string);

        let finished = if job_state(&inserted) == Some("DONE") {
            inserted
        } else {
            tokio::time::timeout(
                self.job_timeout,
                self.wait_for_job(&token, &job_id, location.as_deref()),
            )
            .await
            .map_err(|_| {
                FactoryError::transport(format!(
                    "Timed out after {:?} waiting for BigQuery job {}",
                    self.job_timeout, job_id
                ))
            })??
        };

        if let Some(error) = finished.pointer("/status/errorResult") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("job failed");
            return Err(FactoryError::rejected(
                format!("BigQuery {} job {}", kind, job_id),
                message,
            ));
        }
        Ok(finished)
    }

    async fn wait_for_job(&self, token: &SecretString, job_id: &str, location: Option<&str>) -> Result<Value> {
        let url = format!("{}/{}", self.jobs_url(), job_id);
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let mut req_builder = self.transport.http().get(&url);
            if let Some(location) = location {
                req_builder = req_builder.query(&[("location", location)]);
            }
            let job = self
                .transport
                .send_json(req_builder, token, "BigQuery job status")
                .await?;

            if job_state(&job) == Some("DONE") {
                return Ok(job);
            }
            debug!(job_id = %job_id, state = ?job_state(&job), "Waiting for BigQuery job");
        }
    }
}

fn job_state(job: &Value) -> Option<&str> {
    job.pointer("/status/state").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_forms() {
        let full = TableRef::parse("other.sales.orders", "mine").unwrap();
        assert_eq!(full.project_id, "other");
        assert_eq!(full.to_string(), "other.sales.orders");

        let relative = TableRef::parse("sales.orders", "mine").unwrap();
        assert_eq!(relative.project_id, "mine");

        for bad in ["orders", "a.b.c.d", "sales..orders", ".b"] {
            assert!(TableRef::parse(bad, "mine").is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_format_tags() {
        assert_eq!("parquet".parse::<SourceFormat>().unwrap(), SourceFormat::Parquet);
        assert_eq!(
            "NEWLINE_DELIMITED_JSON".parse::<SourceFormat>().unwrap().as_str(),
            "NEWLINE_DELIMITED_JSON"
        );
        assert!(matches!(
            "XLSX".parse::<SourceFormat>(),
            Err(FactoryError::Config { .. })
        ));
        assert!("ORC".parse::<ExtractFormat>().is_err());
        assert_eq!(ExtractFormat::default().as_str(), "CSV");
    }

    #[tokio::test]
    async fn test_non_gcs_source_is_rejected_before_any_call() {
        let client = BigQueryClient::with_credentials("p", GcpCredentials::access_token("t"))
            .with_base_url("http://127.0.0.1:9");
        let err = client
            .load_from_gcs("d.t", "s3://bucket/file.csv", SourceFormat::Csv, &Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Not a GCS URI"));
    }
}
