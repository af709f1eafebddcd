//! Dataproc and Dataflow pipelines
//!
//! These only wire up the request: the PySpark script or Dataflow template is
//! expected to exist and to know how to read from GCS and write to BigQuery.

use crate::config::GcpConfig;
use crate::error::{FactoryError, Result};
use crate::gcp::credentials::GcpCredentials;
use crate::gcp::transport::GcpTransport;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

const DATAFLOW_BASE_URL: &str = "https://dataflow.googleapis.com";

/// Regional Dataproc endpoint
pub fn dataproc_endpoint(region: &str) -> String {
    format!("https://{}-dataproc.googleapis.com", region)
}

fn require_region(region: &str) -> Result<()> {
    if region.trim().is_empty() {
        return Err(FactoryError::config("GCP region cannot be empty"));
    }
    Ok(())
}

/// Dataproc job controller for one project and region
#[derive(Debug, Clone)]
pub struct DataprocClient {
    project_id: String,
    region: String,
    base_url: String,
    transport: GcpTransport,
}

impl DataprocClient {
    pub fn new(config: &GcpConfig, region: &str) -> Result<Self> {
        config.validate()?;
        Self::with_credentials(&config.project_id, region, GcpCredentials::from_config(config)?)
    }

    pub fn with_credentials(
        project_id: impl Into<String>,
        region: &str,
        credentials: GcpCredentials,
    ) -> Result<Self> {
        require_region(region)?;
        Ok(Self {
            project_id: project_id.into(),
            region: region.to_string(),
            base_url: dataproc_endpoint(region),
            transport: GcpTransport::new(credentials),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a PySpark job to an existing cluster, returning the created job
    pub async fn submit_pyspark_job(
        &self,
        cluster_name: &str,
        main_python_file_uri: &str,
        args: &[String],
    ) -> Result<Value> {
        debug!(
            cluster = %cluster_name,
            main = %main_python_file_uri,
            "Submitting Dataproc PySpark job"
        );

        let url = format!(
            "{}/v1/projects/{}/regions/{}/jobs:submit",
            self.base_url, self.project_id, self.region
        );
        let body = json!({
            "job": {
                "placement": { "clusterName": cluster_name },
                "pysparkJob": {
                    "mainPythonFileUri": main_python_file_uri,
                    "args": args,
                },
            },
        });

        let token = self.transport.token().await?;
        let job = self
            .transport
            .send_json(self.transport.http().post(url).json(&body), &token, "Dataproc submit")
            .await?;

        let job_id = job
            .pointer("/reference/jobId")
            .and_then(Value::as_str)
            .unwrap_or("?");
        info!("Submitted Dataproc job {} to cluster {}", job_id, cluster_name);
        Ok(job)
    }
}

/// Dataflow template launcher for one project
#[derive(Debug, Clone)]
pub struct DataflowClient {
    project_id: String,
    base_url: String,
    transport: GcpTransport,
}

impl DataflowClient {
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
            base_url: DATAFLOW_BASE_URL.to_string(),
            transport: GcpTransport::new(credentials),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Launch a classic template stored at `template_path`.
    ///
    /// `environment.tempLocation` is taken from the `tempLocation` parameter.
    pub async fn launch_template(
        &self,
        region: &str,
        template_path: &str,
        job_name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Value> {
        require_region(region)?;
        debug!(template = %template_path, job_name = %job_name, "Launching Dataflow template");

        let url = format!(
            "{}/v1b3/projects/{}/locations/{}/templates:launch",
            self.base_url, self.project_id, region
        );
        let body = launch_body(job_name, parameters);

        let token = self.transport.token().await?;
        let response = self
            .transport
            .send_json(
                self.transport
                    .http()
                    .post(url)
                    .query(&[("gcsPath", template_path)])
                    .json(&body),
                &token,
                "Dataflow launch",
            )
            .await?;

        info!("Launched Dataflow job {}", job_name);
        Ok(response)
    }
}

fn launch_body(job_name: &str, parameters: &BTreeMap<String, String>) -> Value {
    let mut environment = Map::new();
    if let Some(temp_location) = parameters.get("tempLocation") {
        environment.insert("tempLocation".to_string(), json!(temp_location));
    }
    json!({
        "jobName": job_name,
        "parameters": parameters,
        "environment": environment,
    })
}
