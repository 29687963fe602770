//! Classification agents
//!
//! Two classifiers implement the same [`Classify`] capability: one over
//! page previews (layout), one over extracted text (terminology). The
//! engine runs them concurrently through [`run_classifier`], which applies
//! the per-agent timeout and the bounded retry policy for transient
//! failures, and always comes back with a verdict — a classifier that
//! cannot run yields an error-flagged verdict rather than blocking or
//! failing the document.
//!
//! ## Modules
//! - `verdict` - verdict type and confidence discipline
//! - `text` - terminology-based classifier with keyword fallback
//! - `vision` - layout-based classifier over the first page preview

pub mod text;
pub mod verdict;
pub mod vision;

pub use text::TextClassifier;
pub use verdict::{ClassifierVerdict, VerdictSource};
pub use vision::VisionClassifier;

use crate::document::DocumentRepresentation;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::time::Duration;

/// The classification capability both agents implement.
#[async_trait]
pub trait Classify: Send + Sync {
    fn source(&self) -> VerdictSource;

    /// Classify one document representation. An `Err` means the classifier
    /// failed to run; "ran but found nothing" is an `Ok` verdict with the
    /// `unknown` label.
    async fn classify(
        &self,
        representation: &DocumentRepresentation,
    ) -> Result<ClassifierVerdict, PipelineError>;
}

/// Run one classifier with a per-call timeout and bounded retries.
///
/// Timeouts and transient upstream failures are retried up to
/// `max_retries` times with doubling backoff; non-transient failures stop
/// immediately. Exhaustion produces an error-flagged verdict, never an
/// error — one failing agent must not take the document down.
pub async fn run_classifier(
    classifier: &dyn Classify,
    representation: &DocumentRepresentation,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
) -> ClassifierVerdict {
    let source = classifier.source();
    let mut delay = backoff;
    let mut last_error = PipelineError::ClassifierTimeout {
        agent: source.as_str().to_string(),
        timeout_ms: timeout.as_millis() as u64,
    };

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        match tokio::time::timeout(timeout, classifier.classify(representation)).await {
            Ok(Ok(verdict)) => return verdict,
            Ok(Err(e)) => {
                tracing::warn!(
                    "[Classify] {} attempt {}/{} failed: {}",
                    source,
                    attempt + 1,
                    max_retries + 1,
                    e
                );
                let transient = e.is_transient();
                last_error = e;
                if !transient {
                    break;
                }
            }
            Err(_) => {
                tracing::warn!(
                    "[Classify] {} attempt {}/{} timed out after {}ms",
                    source,
                    attempt + 1,
                    max_retries + 1,
                    timeout.as_millis()
                );
                last_error = PipelineError::ClassifierTimeout {
                    agent: source.as_str().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
            }
        }
    }

    ClassifierVerdict::failed(source, last_error.to_string())
}
