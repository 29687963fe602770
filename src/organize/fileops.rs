//! File-operations collaborator protocol
//!
//! The collaborator owns destination resolution and permissions; the core
//! consumes exactly two operations: `place` (file a document under a
//! domain) and `exists` (probe a destination). Responses follow the
//! collaborator's uniform `{success, destination, message}` shape.

use crate::config::FileOpsSettings;
use crate::domain::DomainLabel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures from the file-operations collaborator.
#[derive(Debug, Clone, Error)]
pub enum FileOpsError {
    /// Connectivity failure; the request may never have arrived.
    #[error("file-operations collaborator unreachable: {0}")]
    Unreachable(String),

    /// The collaborator refused the operation (bad path, unwritable
    /// destination, permission denied).
    #[error("file operation rejected: {0}")]
    Rejected(String),

    /// The collaborator answered, but not in the expected protocol shape.
    #[error("file-operations protocol error: {0}")]
    Protocol(String),
}

impl FileOpsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// The two operations the core consumes from the collaborator.
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Ask the collaborator to file `source` under `domain`. Returns the
    /// resolved destination path on success.
    async fn place(&self, source: &Path, domain: &DomainLabel) -> Result<PathBuf, FileOpsError>;

    /// Whether `destination` already holds a file.
    async fn exists(&self, destination: &Path) -> Result<bool, FileOpsError>;
}

/// HTTP client for the remote file-operations server.
pub struct HttpFileOps {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceRequest<'a> {
    source_path: &'a str,
    domain: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceResponse {
    success: bool,
    destination: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExistsResponse {
    exists: bool,
}

impl HttpFileOps {
    pub fn new(settings: FileOpsSettings) -> Result<Self, FileOpsError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FileOpsError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url,
        })
    }
}

#[async_trait]
impl FileOps for HttpFileOps {
    async fn place(&self, source: &Path, domain: &DomainLabel) -> Result<PathBuf, FileOpsError> {
        let request = PlaceRequest {
            source_path: &source.to_string_lossy(),
            domain: domain.as_str(),
        };

        let response = self
            .client
            .post(format!("{}/mcp/place_file", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| FileOpsError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FileOpsError::Unreachable(format!("server error {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FileOpsError::Rejected(format!("{}: {}", status, body)));
        }

        let body: PlaceResponse = response
            .json()
            .await
            .map_err(|e| FileOpsError::Protocol(e.to_string()))?;

        if !body.success {
            return Err(FileOpsError::Rejected(
                body.message.unwrap_or_else(|| "placement refused".to_string()),
            ));
        }

        body.destination
            .map(PathBuf::from)
            .ok_or_else(|| FileOpsError::Protocol("success without destination".to_string()))
    }

    async fn exists(&self, destination: &Path) -> Result<bool, FileOpsError> {
        let response = self
            .client
            .get(format!("{}/mcp/file_exists", self.base_url))
            .query(&[("path", destination.to_string_lossy().as_ref())])
            .send()
            .await
            .map_err(|e| FileOpsError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FileOpsError::Unreachable(format!(
                "exists probe failed: {}",
                response.status()
            )));
        }

        let body: ExistsResponse = response
            .json()
            .await
            .map_err(|e| FileOpsError::Protocol(e.to_string()))?;

        Ok(body.exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FileOpsError::Unreachable("refused".into()).is_transient());
        assert!(!FileOpsError::Rejected("no permission".into()).is_transient());
        assert!(!FileOpsError::Protocol("bad json".into()).is_transient());
    }

    #[test]
    fn test_place_request_wire_shape() {
        let request = PlaceRequest {
            source_path: "/in/doc.pdf",
            domain: "finance",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sourcePath"], "/in/doc.pdf");
        assert_eq!(json["domain"], "finance");
    }
}
