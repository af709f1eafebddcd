//! `gs://bucket/object` URIs

use crate::error::{FactoryError, Result};
use std::fmt;
use std::str::FromStr;

/// A Cloud Storage location. The object may be empty (bucket root) or contain
/// wildcards when used as a BigQuery load source or extract destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GcsUri {
    pub bucket: String,
    pub object: String,
}

impl GcsUri {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// The object name, failing when the URI points at a bucket root
    pub fn require_object(&self) -> Result<&str> {
        if self.object.is_empty() {
            Err(FactoryError::config(format!("GCS URI {} has no object name", self)))
        } else {
            Ok(&self.object)
        }
    }
}

impl FromStr for GcsUri {
    type Err = FactoryError;

    fn from_str(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("gs://")
            .ok_or_else(|| FactoryError::config(format!("Not a GCS URI: {}", uri)))?;

        let (bucket, object) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(FactoryError::config(format!("GCS URI has no bucket: {}", uri)));
        }

        Ok(Self::new(bucket, object.trim_start_matches('/')))
    }
}

impl fmt::Display for GcsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.object)
    }
}
