//! Text classifier
//!
//! Classifies a document from its extracted text. Documents with enough
//! text go to the inference collaborator with the domain set inlined into
//! the prompt; documents with too little text fall back to a local keyword
//! scorer so the pipeline never burns an inference call on an empty page.
//! Evidence strings are the matched terminology in both paths.

use super::verdict::{ClassifierVerdict, VerdictSource};
use super::Classify;
use crate::document::DocumentRepresentation;
use crate::domain::{default_keywords, DomainSet};
use crate::error::PipelineError;
use crate::inference::{extract_json, InferenceClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Below this many chars of text, skip inference and score keywords.
const MIN_TEXT_CHARS: usize = 50;

/// Chars of text included in the classification prompt.
const MAX_PROMPT_CHARS: usize = 8000;

/// Keyword-fallback confidence is capped below LLM-grade confidence.
const KEYWORD_CONFIDENCE_CAP: f32 = 0.85;

/// Terminology-based classifier.
pub struct TextClassifier {
    inference: Arc<InferenceClient>,
    domains: DomainSet,
    keywords: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct RawTextVerdict {
    primary_domain: String,
    confidence: f32,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

impl TextClassifier {
    pub fn new(inference: Arc<InferenceClient>, domains: DomainSet) -> Self {
        Self {
            inference,
            domains,
            keywords: default_keywords(),
        }
    }

    pub fn with_keywords(mut self, keywords: HashMap<String, Vec<String>>) -> Self {
        self.keywords = keywords;
        self
    }

    fn build_prompt(&self, representation: &DocumentRepresentation, sample: &str) -> String {
        format!(
            r#"You are a document classification expert. Classify the document text below into exactly ONE of these domains:

{domains}

Use "unknown" only if the text carries no classifiable signal.

Respond with ONLY this JSON, no markdown:
{{
  "primary_domain": "domain_name",
  "confidence": 0.85,
  "keywords": ["matched term 1", "matched term 2"],
  "reasoning": "one sentence"
}}

Document filename: {filename}

Document text:
{sample}"#,
            domains = self.domains.prompt_list(),
            filename = representation.meta.file_name,
            sample = sample,
        )
    }

    /// Local fallback: count per-domain keyword hits and score the winner
    /// against the total. No hits at all is an inconclusive verdict.
    fn keyword_verdict(&self, text: &str) -> ClassifierVerdict {
        let haystack = text.to_lowercase();

        let mut scores: Vec<(&String, usize, Vec<&String>)> = self
            .keywords
            .iter()
            .filter(|(domain, _)| self.domains.contains(domain))
            .map(|(domain, words)| {
                let matched: Vec<&String> =
                    words.iter().filter(|w| haystack.contains(w.as_str())).collect();
                (domain, matched.len(), matched)
            })
            .collect();

        scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let total: usize = scores.iter().map(|(_, n, _)| n).sum();
        match scores.first() {
            Some((domain, hits, matched)) if *hits > 0 => {
                let confidence = (*hits as f32 / total as f32).min(KEYWORD_CONFIDENCE_CAP);
                let evidence = matched.iter().take(10).map(|w| w.to_string()).collect();
                ClassifierVerdict::conclusive(
                    VerdictSource::Text,
                    self.domains.resolve(domain),
                    confidence,
                    evidence,
                )
            }
            _ => ClassifierVerdict::inconclusive(VerdictSource::Text),
        }
    }
}

#[async_trait]
impl Classify for TextClassifier {
    fn source(&self) -> VerdictSource {
        VerdictSource::Text
    }

    async fn classify(
        &self,
        representation: &DocumentRepresentation,
    ) -> Result<ClassifierVerdict, PipelineError> {
        let text = representation.text.trim();

        if text.chars().count() < MIN_TEXT_CHARS {
            tracing::debug!(
                "[TextClassifier] Insufficient text for {}, using keyword fallback",
                representation.meta.file_name
            );
            return Ok(self.keyword_verdict(text));
        }

        let sample: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let prompt = self.build_prompt(representation, &sample);

        let response = self
            .inference
            .complete_text(&prompt)
            .await
            .map_err(|e| PipelineError::ClassifierUpstream {
                agent: VerdictSource::Text.as_str().to_string(),
                message: e.to_string(),
            })?;

        let raw: RawTextVerdict =
            extract_json(&response).map_err(|e| PipelineError::ClassifierUpstream {
                agent: VerdictSource::Text.as_str().to_string(),
                message: e,
            })?;

        if !raw.reasoning.is_empty() {
            tracing::debug!(
                "[TextClassifier] {} -> {}: {}",
                representation.meta.file_name,
                raw.primary_domain,
                raw.reasoning
            );
        }

        Ok(ClassifierVerdict::conclusive(
            VerdictSource::Text,
            self.domains.resolve(&raw.primary_domain),
            raw.confidence,
            raw.keywords,
        ))
    }
}
