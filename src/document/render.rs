//! Page preview rendering
//!
//! The vision classifier needs page images; producing them requires a PDF
//! rasterizer. Rendering sits behind the [`PageRenderer`] trait so the rest
//! of the pipeline never depends on the rasterizer directly. The pdfium
//! implementation is compiled only with the `pdfium` feature; without it,
//! [`NoopRenderer`] yields no previews and the vision classifier reports an
//! inconclusive verdict.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single rendered page, JPEG-encoded and base64-wrapped for the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePreview {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub jpeg_base64: String,
}

/// Document-level info the rasterizer can read without full rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub page_count: Option<usize>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
}

/// Rendering capability consumed by the representation builder.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Read page count and PDF info-dictionary metadata.
    async fn document_info(&self, path: &Path) -> Result<DocumentInfo, PipelineError>;

    /// Render up to `max_pages` pages as previews, first page first.
    async fn render_pages(
        &self,
        path: &Path,
        max_pages: usize,
    ) -> Result<Vec<PagePreview>, PipelineError>;
}

/// Renderer used when no rasterizer is available. Produces no previews.
pub struct NoopRenderer;

#[async_trait]
impl PageRenderer for NoopRenderer {
    async fn document_info(&self, _path: &Path) -> Result<DocumentInfo, PipelineError> {
        Ok(DocumentInfo::default())
    }

    async fn render_pages(
        &self,
        path: &Path,
        _max_pages: usize,
    ) -> Result<Vec<PagePreview>, PipelineError> {
        tracing::debug!(
            "[Render] No rasterizer configured, skipping previews for {}",
            path.display()
        );
        Ok(Vec::new())
    }
}

/// Pdfium-backed renderer. Pages are rasterized, downscaled to fit
/// 800x1000, and JPEG-encoded.
#[cfg(feature = "pdfium")]
pub struct PdfiumRenderer;

#[cfg(feature = "pdfium")]
#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn document_info(&self, path: &Path) -> Result<DocumentInfo, PipelineError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || pdfium_impl::document_info(&path))
            .await
            .map_err(|e| PipelineError::Representation(format!("render task failed: {}", e)))?
    }

    async fn render_pages(
        &self,
        path: &Path,
        max_pages: usize,
    ) -> Result<Vec<PagePreview>, PipelineError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || pdfium_impl::render_pages(&path, max_pages))
            .await
            .map_err(|e| PipelineError::Representation(format!("render task failed: {}", e)))?
    }
}

#[cfg(feature = "pdfium")]
mod pdfium_impl {
    use super::{DocumentInfo, PagePreview};
    use crate::error::PipelineError;
    use base64::Engine;
    use pdfium_render::prelude::*;
    use std::io::Cursor;
    use std::path::Path;

    const MAX_WIDTH: u32 = 800;
    const MAX_HEIGHT: u32 = 1000;
    const JPEG_QUALITY: u8 = 85;

    fn bind() -> Result<Pdfium, PipelineError> {
        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| PipelineError::Representation(format!("pdfium unavailable: {}", e)))
    }

    pub fn document_info(path: &Path) -> Result<DocumentInfo, PipelineError> {
        let pdfium = bind()?;
        let doc = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| PipelineError::Representation(format!("unable to open PDF: {}", e)))?;

        let meta = doc.metadata();
        let tag = |t: PdfDocumentMetadataTagType| {
            meta.get(t).map(|m| m.value().to_string()).filter(|v| !v.is_empty())
        };

        Ok(DocumentInfo {
            page_count: Some(doc.pages().len() as usize),
            title: tag(PdfDocumentMetadataTagType::Title),
            author: tag(PdfDocumentMetadataTagType::Author),
            subject: tag(PdfDocumentMetadataTagType::Subject),
            creator: tag(PdfDocumentMetadataTagType::Creator),
        })
    }

    pub fn render_pages(path: &Path, max_pages: usize) -> Result<Vec<PagePreview>, PipelineError> {
        let pdfium = bind()?;
        let doc = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| PipelineError::Representation(format!("unable to open PDF: {}", e)))?;

        let config = PdfRenderConfig::new()
            .set_target_width(MAX_WIDTH as i32)
            .set_maximum_height(MAX_HEIGHT as i32);

        let mut previews = Vec::new();
        for (page_index, page) in doc.pages().iter().take(max_pages).enumerate() {
            let image = page
                .render_with_config(&config)
                .map_err(|e| {
                    PipelineError::Representation(format!(
                        "failed to render page {}: {}",
                        page_index, e
                    ))
                })?
                .as_image();

            let image = image.thumbnail(MAX_WIDTH, MAX_HEIGHT);
            let mut buffer = Vec::new();
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                Cursor::new(&mut buffer),
                JPEG_QUALITY,
            );
            image
                .write_with_encoder(encoder)
                .map_err(|e| {
                    PipelineError::Representation(format!(
                        "failed to encode page {}: {}",
                        page_index, e
                    ))
                })?;

            previews.push(PagePreview {
                page_index,
                width: image.width(),
                height: image.height(),
                jpeg_base64: base64::engine::general_purpose::STANDARD.encode(&buffer),
            });
        }

        Ok(previews)
    }
}
