//! Workflow engine
//!
//! Sequences one document through the pipeline: representation, concurrent
//! classifier fan-out, fusion, organization. The classifier fan-out is the
//! only point of true parallelism; everything else is strictly sequential.
//! Every failure mode is converted into a typed [`FinalOutcome`] at this
//! boundary — `process` never raises, never hangs past the per-document
//! deadline, and produces at most one terminal outcome per document
//! identity (concurrent re-submissions are rejected).

use super::pool::InFlightRegistry;
use super::state::{Document, FinalOutcome, Outcome, Stage};
use crate::classify::{run_classifier, Classify};
use crate::config::WorkflowSettings;
use crate::document::Represent;
use crate::error::PipelineError;
use crate::fusion::{fuse, FusionConfig, FusionDecision};
use crate::organize::{OrganizationDispatcher, OrganizationResult};
use crate::persist::{StageUpdate, StateSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One engine instance drives any number of documents; each `process` call
/// owns its document exclusively for the duration.
pub struct WorkflowEngine {
    representation: Arc<dyn Represent>,
    vision: Arc<dyn Classify>,
    text: Arc<dyn Classify>,
    dispatcher: Arc<OrganizationDispatcher>,
    sink: Arc<dyn StateSink>,
    fusion: FusionConfig,
    settings: WorkflowSettings,
    in_flight: InFlightRegistry,
}

impl WorkflowEngine {
    pub fn new(
        representation: Arc<dyn Represent>,
        vision: Arc<dyn Classify>,
        text: Arc<dyn Classify>,
        dispatcher: Arc<OrganizationDispatcher>,
        sink: Arc<dyn StateSink>,
        fusion: FusionConfig,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            representation,
            vision,
            text,
            dispatcher,
            sink,
            fusion,
            settings,
            in_flight: InFlightRegistry::new(),
        }
    }

    /// Process one document to a terminal outcome.
    ///
    /// A second concurrent call for the same document identity is rejected
    /// with `AlreadyInFlight` without touching any stage; once the first
    /// call reaches its terminal outcome the identity may be re-submitted.
    pub async fn process(&self, mut document: Document) -> FinalOutcome {
        let Some(_guard) = self.in_flight.claim(document.id) else {
            tracing::warn!(
                "[Engine] Rejecting concurrent re-submission of {} ({})",
                document.file_name,
                document.id
            );
            return FinalOutcome::new(
                &document,
                Outcome::Failed {
                    error: PipelineError::AlreadyInFlight(document.id.to_string()),
                },
            );
        };

        tracing::info!("[Engine] Processing {} ({})", document.file_name, document.id);

        let deadline = self.settings.document_deadline;
        match tokio::time::timeout(deadline, self.run(&mut document)).await {
            Ok(outcome) => {
                tracing::info!(
                    "[Engine] {} finished in stage {}",
                    document.file_name,
                    document.stage()
                );
                FinalOutcome::new(&document, outcome)
            }
            Err(_) => {
                // Dropping the stage future cancelled any still-running
                // classifier calls; organization never starts past here.
                let error = PipelineError::DeadlineExceeded(deadline.as_millis() as u64);
                tracing::warn!("[Engine] {}: {}", document.file_name, error);
                self.fail(&mut document, &error);
                FinalOutcome::new(&document, Outcome::Failed { error })
            }
        }
    }

    async fn run(&self, document: &mut Document) -> Outcome {
        // Representation. The retry seam covers transient causes; the
        // builder's own errors (unreadable, corrupt, oversized) are
        // non-transient and short-circuit on first occurrence.
        let build_timeout = self.settings.representation_timeout;
        let source_path = document.source_path.clone();
        let built = retry_transient(
            self.settings.max_retries,
            self.settings.retry_backoff,
            || {
                let path = source_path.clone();
                async move {
                    match tokio::time::timeout(build_timeout, self.representation.build(&path))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(PipelineError::Representation(format!(
                            "representation timed out after {}ms",
                            build_timeout.as_millis()
                        ))),
                    }
                }
            },
        )
        .await;

        let representation = match built {
            Ok(representation) => representation,
            Err(error) => {
                self.fail(document, &error);
                return Outcome::Failed { error };
            }
        };
        self.advance(document, Stage::Represented, None, None);

        // Classifier fan-out: both agents run concurrently, each behind its
        // own timeout and retry budget, and each always yields a verdict.
        let (vision_verdict, text_verdict) = tokio::join!(
            run_classifier(
                self.vision.as_ref(),
                &representation,
                self.settings.vision_timeout,
                self.settings.max_retries,
                self.settings.retry_backoff,
            ),
            run_classifier(
                self.text.as_ref(),
                &representation,
                self.settings.text_timeout,
                self.settings.max_retries,
                self.settings.retry_backoff,
            ),
        );
        self.advance(document, Stage::Classified, None, None);

        let decision = fuse(&vision_verdict, &text_verdict, &self.fusion);
        // The representation is not retained beyond classification.
        drop(representation);
        self.advance(document, Stage::Decided, Some(&decision), None);

        if decision.needs_review {
            tracing::info!(
                "[Engine] {} flagged for manual review ({})",
                document.file_name,
                decision.rationale.join("; ")
            );
            return Outcome::ManualReview { decision };
        }

        // Organization. The dispatcher owns duplicate-safe retry; whatever
        // error survives it is terminal for this document.
        match self
            .dispatcher
            .organize(&document.source_path, &document.file_name, &decision)
            .await
        {
            Ok(organization) => {
                self.advance(document, Stage::Organized, Some(&decision), Some(&organization));
                Outcome::Done {
                    decision,
                    organization,
                }
            }
            Err(error) => {
                self.fail(document, &error);
                Outcome::Failed { error }
            }
        }
    }

    fn advance(
        &self,
        document: &mut Document,
        stage: Stage,
        decision: Option<&FusionDecision>,
        organization: Option<&OrganizationResult>,
    ) {
        if !document.advance(stage) {
            return;
        }

        let mut update = StageUpdate::transition(document.id, &document.file_name, stage);
        if let Some(decision) = decision {
            update = update.with_decision(decision.clone());
        }
        if let Some(organization) = organization {
            update = update.with_organization(organization.clone());
        }
        self.record(update);
    }

    fn fail(&self, document: &mut Document, error: &PipelineError) {
        if document.advance(Stage::Failed) {
            self.record(
                StageUpdate::transition(document.id, &document.file_name, Stage::Failed)
                    .with_error(error.clone()),
            );
        }
    }

    /// Fire-and-forget persistence write.
    fn record(&self, update: StageUpdate) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.record(update).await;
        });
    }
}

/// Retry an operation with doubling backoff, but only while its error is
/// classified transient.
async fn retry_transient<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    mut operation: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut delay = backoff;
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "[Engine] Transient failure (attempt {}/{}): {}",
                    attempt,
                    max_retries,
                    error
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierVerdict, VerdictSource};
    use crate::document::{DocumentMeta, DocumentRepresentation};
    use crate::domain::{DomainLabel, DomainSet};
    use crate::organize::fileops::{FileOps, FileOpsError};
    use crate::persist::MemorySink;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct StubBuilder {
        text: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl Represent for StubBuilder {
        async fn build(&self, path: &Path) -> Result<DocumentRepresentation, PipelineError> {
            if self.fail {
                return Err(PipelineError::Representation("corrupt xref table".into()));
            }
            Ok(DocumentRepresentation {
                text: self.text.to_string(),
                text_preview: self.text.chars().take(2000).collect(),
                previews: Vec::new(),
                meta: DocumentMeta {
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    file_size_bytes: self.text.len() as u64,
                    fingerprint: "stub".into(),
                    page_count: Some(1),
                    title: None,
                    author: None,
                    subject: None,
                    creator: None,
                },
            })
        }
    }

    /// Answers after `delay` with a fixed verdict; `label = None` means
    /// inconclusive.
    struct FixedClassifier {
        source: VerdictSource,
        label: Option<&'static str>,
        confidence: f32,
        delay: Duration,
    }

    #[async_trait]
    impl Classify for FixedClassifier {
        fn source(&self) -> VerdictSource {
            self.source
        }

        async fn classify(
            &self,
            _representation: &DocumentRepresentation,
        ) -> Result<ClassifierVerdict, PipelineError> {
            tokio::time::sleep(self.delay).await;
            Ok(match self.label {
                Some(label) => ClassifierVerdict::conclusive(
                    self.source,
                    DomainSet::default().resolve(label),
                    self.confidence,
                    vec![],
                ),
                None => ClassifierVerdict::inconclusive(self.source),
            })
        }
    }

    struct FakeFileOps {
        placed: Mutex<HashSet<PathBuf>>,
        place_calls: Mutex<u32>,
    }

    impl FakeFileOps {
        fn new() -> Self {
            Self {
                placed: Mutex::new(HashSet::new()),
                place_calls: Mutex::new(0),
            }
        }

        fn place_calls(&self) -> u32 {
            *self.place_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl FileOps for FakeFileOps {
        async fn place(
            &self,
            source: &Path,
            domain: &DomainLabel,
        ) -> Result<PathBuf, FileOpsError> {
            *self.place_calls.lock().unwrap() += 1;
            let file_name = source.file_name().unwrap().to_string_lossy().to_string();
            let destination = PathBuf::from(domain.as_str()).join(file_name);
            self.placed.lock().unwrap().insert(destination.clone());
            Ok(destination)
        }

        async fn exists(&self, destination: &Path) -> Result<bool, FileOpsError> {
            Ok(self.placed.lock().unwrap().contains(destination))
        }
    }

    fn fast_settings() -> WorkflowSettings {
        WorkflowSettings {
            representation_timeout: Duration::from_millis(500),
            vision_timeout: Duration::from_millis(500),
            text_timeout: Duration::from_millis(500),
            document_deadline: Duration::from_secs(5),
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            max_concurrency: 4,
        }
    }

    struct Harness {
        engine: Arc<WorkflowEngine>,
        fileops: Arc<FakeFileOps>,
        sink: Arc<MemorySink>,
    }

    fn harness(
        builder: StubBuilder,
        vision: FixedClassifier,
        text: FixedClassifier,
        settings: WorkflowSettings,
    ) -> Harness {
        let fileops = Arc::new(FakeFileOps::new());
        let sink = Arc::new(MemorySink::new());
        let dispatcher = Arc::new(OrganizationDispatcher::new(
            Arc::clone(&fileops) as Arc<dyn FileOps>,
            2,
            Duration::from_millis(1),
        ));

        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(builder),
            Arc::new(vision),
            Arc::new(text),
            dispatcher,
            Arc::clone(&sink) as Arc<dyn StateSink>,
            FusionConfig::default(),
            settings,
        ));

        Harness {
            engine,
            fileops,
            sink,
        }
    }

    fn classifier(
        source: VerdictSource,
        label: Option<&'static str>,
        confidence: f32,
    ) -> FixedClassifier {
        FixedClassifier {
            source,
            label,
            confidence,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_agreeing_classifiers_reach_done() {
        let h = harness(
            StubBuilder { text: "quarterly revenue and cash flow", fail: false },
            classifier(VerdictSource::Vision, Some("finance"), 0.7),
            classifier(VerdictSource::Text, Some("finance"), 0.9),
            fast_settings(),
        );

        let outcome = h.engine.process(Document::new("/in/q3.pdf")).await;

        assert!(outcome.is_done());
        match outcome.outcome {
            Outcome::Done { decision, organization } => {
                assert_eq!(decision.label.as_str(), "finance");
                assert_eq!(organization.destination, PathBuf::from("finance/q3.pdf"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let stages: Vec<Stage> = outcome.transitions.iter().map(|t| t.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Received,
                Stage::Represented,
                Stage::Classified,
                Stage::Decided,
                Stage::Organized,
            ]
        );
    }

    #[tokio::test]
    async fn test_vision_timeout_falls_back_to_text_alone() {
        let h = harness(
            StubBuilder { text: "laboratory experiment results", fail: false },
            FixedClassifier {
                source: VerdictSource::Vision,
                label: Some("law"),
                confidence: 0.9,
                delay: Duration::from_secs(3600),
            },
            classifier(VerdictSource::Text, Some("science"), 0.9),
            WorkflowSettings {
                vision_timeout: Duration::from_millis(30),
                ..fast_settings()
            },
        );

        let outcome = h.engine.process(Document::new("/in/paper.pdf")).await;

        match outcome.outcome {
            Outcome::Done { decision, .. } => {
                assert_eq!(decision.label.as_str(), "science");
                assert_eq!(decision.confidence, 0.9);
                assert!(decision.vision.errored);
                assert!(!decision.text.errored);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_both_unknown_is_manual_review() {
        let h = harness(
            StubBuilder { text: "", fail: false },
            classifier(VerdictSource::Vision, None, 0.0),
            classifier(VerdictSource::Text, None, 0.0),
            fast_settings(),
        );

        let outcome = h.engine.process(Document::new("/in/blank.pdf")).await;

        assert!(outcome.is_manual_review());
        match outcome.outcome {
            Outcome::ManualReview { decision } => {
                assert!(decision.label.is_unknown());
                assert_eq!(decision.confidence, 0.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Nothing was filed for a document nobody could label.
        assert_eq!(h.fileops.place_calls(), 0);
    }

    #[tokio::test]
    async fn test_deadline_exceeded_never_organizes() {
        let h = harness(
            StubBuilder { text: "some text", fail: false },
            FixedClassifier {
                source: VerdictSource::Vision,
                label: Some("law"),
                confidence: 0.9,
                delay: Duration::from_secs(3600),
            },
            FixedClassifier {
                source: VerdictSource::Text,
                label: Some("law"),
                confidence: 0.9,
                delay: Duration::from_secs(3600),
            },
            WorkflowSettings {
                vision_timeout: Duration::from_secs(3600),
                text_timeout: Duration::from_secs(3600),
                document_deadline: Duration::from_millis(80),
                ..fast_settings()
            },
        );

        let outcome = h.engine.process(Document::new("/in/slow.pdf")).await;

        assert!(outcome.is_failed());
        match outcome.outcome {
            Outcome::Failed { error } => {
                assert!(matches!(error, PipelineError::DeadlineExceeded(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.fileops.place_calls(), 0);
        assert_eq!(outcome.transitions.last().map(|t| t.stage), Some(Stage::Failed));
    }

    #[tokio::test]
    async fn test_representation_failure_short_circuits() {
        let h = harness(
            StubBuilder { text: "", fail: true },
            classifier(VerdictSource::Vision, Some("law"), 0.9),
            classifier(VerdictSource::Text, Some("law"), 0.9),
            fast_settings(),
        );

        let outcome = h.engine.process(Document::new("/in/corrupt.pdf")).await;

        assert!(outcome.is_failed());
        match outcome.outcome {
            Outcome::Failed { error } => {
                assert!(matches!(error, PipelineError::Representation(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.fileops.place_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_resubmission_rejected() {
        let h = harness(
            StubBuilder { text: "contract and agreement", fail: false },
            FixedClassifier {
                source: VerdictSource::Vision,
                label: Some("law"),
                confidence: 0.8,
                delay: Duration::from_millis(150),
            },
            FixedClassifier {
                source: VerdictSource::Text,
                label: Some("law"),
                confidence: 0.8,
                delay: Duration::from_millis(150),
            },
            fast_settings(),
        );

        let document = Document::new("/in/contract.pdf");
        let duplicate = document.clone();

        let engine = Arc::clone(&h.engine);
        let first = tokio::spawn(async move { engine.process(document).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let rejected = h.engine.process(duplicate).await;

        match rejected.outcome {
            Outcome::Failed { error } => {
                assert!(matches!(error, PipelineError::AlreadyInFlight(_)));
            }
            other => panic!("duplicate was not rejected: {:?}", other),
        }

        let first = first.await.unwrap();
        assert!(first.is_done());

        // Identity is free again after the terminal outcome.
        let rerun = h
            .engine
            .process(Document::with_id(first.document_id, "/in/contract.pdf"))
            .await;
        assert!(rerun.is_done());
    }

    #[tokio::test]
    async fn test_stage_transitions_are_persisted() {
        let h = harness(
            StubBuilder { text: "patient diagnosis", fail: false },
            classifier(VerdictSource::Vision, Some("healthcare"), 0.7),
            classifier(VerdictSource::Text, Some("healthcare"), 0.8),
            fast_settings(),
        );

        let outcome = h.engine.process(Document::new("/in/record.pdf")).await;
        assert!(outcome.is_done());

        // Writes are fire-and-forget; give the spawned tasks a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stages = h.sink.stages();
        assert!(stages.contains(&Stage::Represented));
        assert!(stages.contains(&Stage::Decided));
        assert!(stages.contains(&Stage::Organized));

        let updates = h.sink.updates.lock().unwrap();
        let organized = updates
            .iter()
            .find(|u| u.stage == Stage::Organized)
            .expect("organized transition persisted");
        assert!(organized.decision.is_some());
        assert!(organized.organization.is_some());
    }
}
