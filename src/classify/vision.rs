//! Vision classifier
//!
//! Classifies a document from its rendered page previews. Only the first
//! page is sent to the vision model (the most representative page); a
//! document with no previews yields an inconclusive verdict rather than an
//! error. Evidence strings are the layout cues the model reports.

use super::verdict::{ClassifierVerdict, VerdictSource};
use super::Classify;
use crate::document::DocumentRepresentation;
use crate::domain::DomainSet;
use crate::error::PipelineError;
use crate::inference::{extract_json, InferenceClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Layout-based classifier over page previews.
pub struct VisionClassifier {
    inference: Arc<InferenceClient>,
    domains: DomainSet,
}

#[derive(Deserialize)]
struct RawVisionVerdict {
    domain: String,
    confidence: f32,
    #[serde(default)]
    layout_cues: Vec<String>,
    #[serde(default)]
    document_type: Option<String>,
}

impl VisionClassifier {
    pub fn new(inference: Arc<InferenceClient>, domains: DomainSet) -> Self {
        Self { inference, domains }
    }

    fn build_prompt(&self, representation: &DocumentRepresentation) -> String {
        format!(
            r#"Analyze this document page image and classify the document into exactly ONE of these domains:

{domains}

Judge from visual layout only: letterheads, legal formatting, tables and
charts, medical forms, code listings, academic formatting, technical
drawings. Use "unknown" only if the layout carries no classifiable signal.

Respond with ONLY this JSON, no markdown:
{{
  "domain": "domain_name",
  "confidence": 0.75,
  "layout_cues": ["cue 1", "cue 2"],
  "document_type": "report|contract|invoice|paper|form|other"
}}

Filename: {filename}"#,
            domains = self.domains.prompt_list(),
            filename = representation.meta.file_name,
        )
    }
}

#[async_trait]
impl Classify for VisionClassifier {
    fn source(&self) -> VerdictSource {
        VerdictSource::Vision
    }

    async fn classify(
        &self,
        representation: &DocumentRepresentation,
    ) -> Result<ClassifierVerdict, PipelineError> {
        let Some(first_page) = representation.previews.first() else {
            tracing::debug!(
                "[VisionClassifier] No previews for {}, returning inconclusive",
                representation.meta.file_name
            );
            return Ok(ClassifierVerdict::inconclusive(VerdictSource::Vision));
        };

        let prompt = self.build_prompt(representation);
        let response = self
            .inference
            .complete_vision(&prompt, &first_page.jpeg_base64)
            .await
            .map_err(|e| PipelineError::ClassifierUpstream {
                agent: VerdictSource::Vision.as_str().to_string(),
                message: e.to_string(),
            })?;

        let raw: RawVisionVerdict =
            extract_json(&response).map_err(|e| PipelineError::ClassifierUpstream {
                agent: VerdictSource::Vision.as_str().to_string(),
                message: e,
            })?;

        let mut evidence = raw.layout_cues;
        if let Some(doc_type) = raw.document_type.filter(|t| !t.is_empty()) {
            evidence.push(format!("document type: {}", doc_type));
        }

        Ok(ClassifierVerdict::conclusive(
            VerdictSource::Vision,
            self.domains.resolve(&raw.domain),
            raw.confidence,
            evidence,
        ))
    }
}
