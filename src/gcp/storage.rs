//! Cloud Storage client

use crate::config::GcpConfig;
use crate::error::Result;
use crate::gcp::credentials::GcpCredentials;
use crate::gcp::transport::GcpTransport;
use crate::gcp::uri::GcsUri;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info};
use urlencoding::encode;

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Cloud Storage JSON API client for one project
#[derive(Debug, Clone)]
pub struct GcsClient {
    project_id: String,
    base_url: String,
    transport: GcpTransport,
}

impl GcsClient {
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
        }
    }

    /// Point the client at another endpoint, such as an emulator
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn object_url(&self, uri: &GcsUri, object: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            encode(&uri.bucket),
            encode(object)
        )
    }

    /// Copy one object to another location, returning the new object's metadata
    pub async fn copy(&self, src: &GcsUri, dest: &GcsUri) -> Result<Value> {
        let src_object = src.require_object()?;
        let dest_object = dest.require_object()?;
        debug!(src = %src, dest = %dest, "Copying GCS object");

        let url = format!(
            "{}/copyTo/b/{}/o/{}",
            self.object_url(src, src_object),
            encode(&dest.bucket),
            encode(dest_object)
        );
        let token = self.transport.token().await?;
        let object = self
            .transport
            .send_json(self.transport.http().post(url), &token, "GCS copy")
            .await?;

        info!("Copied {} to {}", src, dest);
        Ok(object)
    }

    /// Download an object's contents
    pub async fn download(&self, uri: &GcsUri) -> Result<Bytes> {
        let object = uri.require_object()?;
        debug!(uri = %uri, "Downloading GCS object");

        let token = self.transport.token().await?;
        let response = self
            .transport
            .send(
                self.transport
                    .http()
                    .get(self.object_url(uri, object))
                    .query(&[("alt", "media")]),
                &token,
                "GCS download",
            )
            .await?;
        Ok(response.bytes().await?)
    }

    /// Upload bytes as an object, returning its metadata
    pub async fn upload(&self, uri: &GcsUri, data: impl Into<Bytes>, content_type: &str) -> Result<Value> {
        let object = uri.require_object()?;
        let data: Bytes = data.into();
        debug!(uri = %uri, size = data.len(), "Uploading GCS object");

        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, encode(&uri.bucket));
        let req_builder = self
            .transport
            .http()
            .post(url)
            .query(&[("uploadType", "media"), ("name", object)])
            .header("Content-Type", content_type)
            .body(data);

        let token = self.transport.token().await?;
        self.transport.send_json(req_builder, &token, "GCS upload").await
    }

    /// Delete an object
    pub async fn delete(&self, uri: &GcsUri) -> Result<()> {
        let object = uri.require_object()?;
        debug!(uri = %uri, "Deleting GCS object");

        let token = self.transport.token().await?;
        self.transport
            .send(self.transport.http().delete(self.object_url(uri, object)), &token, "GCS delete")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names_are_path_encoded() {
        let client = GcsClient::with_credentials("p", GcpCredentials::access_token("t"))
            .with_base_url("http://localhost:4443/");
        let uri: GcsUri = "gs://raw/2024/01/a b.csv".parse().unwrap();
        assert_eq!(
            client.object_url(&uri, &uri.object),
            "http://localhost:4443/storage/v1/b/raw/o/2024%2F01%2Fa%20b.csv"
        );
    }

    #[tokio::test]
    async fn test_bucket_root_is_rejected_before_any_call() {
        let client = GcsClient::with_credentials("p", GcpCredentials::access_token("t"))
            .with_base_url("http://127.0.0.1:9");
        let err = client.delete(&"gs://raw".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, crate::error::FactoryError::Config { .. }));
    }
}
