//! Document intake
//!
//! Turns a raw PDF into an immutable [`DocumentRepresentation`]: extracted
//! text, bounded page previews, and metadata. No classification logic lives
//! here.
//!
//! ## Modules
//! - `representation` - the representation bundle and its builder
//! - `render` - page preview rendering seam (pdfium behind a feature flag)

pub mod render;
pub mod representation;

pub use render::{DocumentInfo, NoopRenderer, PagePreview, PageRenderer};
pub use representation::{DocumentMeta, DocumentRepresentation, Represent, RepresentationBuilder};

#[cfg(feature = "pdfium")]
pub use render::PdfiumRenderer;
