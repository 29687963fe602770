//! Document representation
//!
//! A [`DocumentRepresentation`] is the normalized bundle the classifiers
//! consume: extracted text (possibly empty), a bounded sequence of page
//! previews, and metadata. It is immutable once built and owned by the
//! document's processing instance; the engine drops it once classification
//! completes.

use crate::config::IntakeSettings;
use crate::document::render::{DocumentInfo, PagePreview, PageRenderer};
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

/// Number of chars of extracted text kept as an audit preview.
const TEXT_PREVIEW_CHARS: usize = 2000;

/// Metadata extracted alongside the document content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub file_name: String,
    pub file_size_bytes: u64,
    /// SHA-256 of the raw file contents.
    pub fingerprint: String,
    pub page_count: Option<usize>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
}

/// Normalized document bundle handed to the classifiers.
#[derive(Debug, Clone)]
pub struct DocumentRepresentation {
    /// Full extracted text, truncated to the configured maximum.
    pub text: String,
    /// First chars of `text`, retained for audit.
    pub text_preview: String,
    /// Rendered page previews, first page first, bounded by configuration.
    pub previews: Vec<PagePreview>,
    pub meta: DocumentMeta,
}

impl DocumentRepresentation {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn has_previews(&self) -> bool {
        !self.previews.is_empty()
    }
}

/// Representation-building capability consumed by the workflow engine.
#[async_trait]
pub trait Represent: Send + Sync {
    async fn build(&self, path: &Path) -> Result<DocumentRepresentation, PipelineError>;
}

/// Builds representations from raw PDF files.
pub struct RepresentationBuilder {
    settings: IntakeSettings,
    renderer: Arc<dyn PageRenderer>,
}

impl RepresentationBuilder {
    pub fn new(settings: IntakeSettings, renderer: Arc<dyn PageRenderer>) -> Self {
        Self { settings, renderer }
    }
}

#[async_trait]
impl Represent for RepresentationBuilder {
    /// Build the representation for a single PDF.
    ///
    /// Unreadable, corrupt, or oversized documents fail with
    /// [`PipelineError::Representation`]. Preview rendering failure is not
    /// fatal: the vision classifier simply gets nothing to look at, which
    /// it reports as inconclusive.
    async fn build(&self, path: &Path) -> Result<DocumentRepresentation, PipelineError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            PipelineError::Representation(format!("cannot stat {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(PipelineError::Representation(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let file_size_bytes = metadata.len();
        if file_size_bytes > self.settings.max_file_size_bytes {
            return Err(PipelineError::Representation(format!(
                "document too large: {} bytes (limit {})",
                file_size_bytes, self.settings.max_file_size_bytes
            )));
        }

        let fingerprint = fingerprint_file(path).await?;
        let text = extract_text(path, self.settings.max_text_chars).await?;
        let text_preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();

        let previews = match self
            .renderer
            .render_pages(path, self.settings.max_preview_pages)
            .await
        {
            Ok(previews) => previews,
            Err(e) => {
                tracing::warn!(
                    "[Representation] Preview rendering failed for {}: {}",
                    path.display(),
                    e
                );
                Vec::new()
            }
        };

        let info = self
            .renderer
            .document_info(path)
            .await
            .unwrap_or_else(|_| DocumentInfo::default());

        tracing::debug!(
            "[Representation] Built {}: {} text chars, {} previews",
            path.display(),
            text.chars().count(),
            previews.len()
        );

        Ok(DocumentRepresentation {
            text,
            text_preview,
            previews,
            meta: DocumentMeta {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                file_size_bytes,
                fingerprint,
                page_count: info.page_count,
                title: info.title,
                author: info.author,
                subject: info.subject,
                creator: info.creator,
            },
        })
    }
}

/// SHA-256 the file contents for a stable content identity.
async fn fingerprint_file(path: &Path) -> Result<String, PipelineError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        PipelineError::Representation(format!("cannot read {}: {}", path.display(), e))
    })?;

    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Extract text on a blocking thread; parser panics are contained by the
/// task boundary and surface as representation errors.
async fn extract_text(path: &Path, max_chars: usize) -> Result<String, PipelineError> {
    let path_buf = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path_buf)).await;

    match result {
        Ok(Ok(text)) => Ok(truncate_chars(text, max_chars)),
        Ok(Err(e)) => Err(PipelineError::Representation(format!(
            "unable to parse {}: {}",
            path.display(),
            e
        ))),
        Err(join_err) => Err(PipelineError::Representation(format!(
            "text extraction crashed for {}: {}",
            path.display(),
            join_err
        ))),
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text
    } else {
        text.chars().take(max_chars).collect()
    }
}
