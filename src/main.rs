//! docsort binary
//!
//! Scans the configured input folder for PDFs and runs each one through
//! the classification workflow with bounded concurrency. Configuration
//! comes from the environment (see `config`); collaborator endpoints must
//! be reachable for classification and placement to succeed.

use docsort::classify::{TextClassifier, VisionClassifier};
use docsort::config::Settings;
use docsort::document::{PageRenderer, RepresentationBuilder};
use docsort::inference::InferenceClient;
use docsort::organize::{HttpFileOps, OrganizationDispatcher};
use docsort::persist::{HttpStateSink, NullSink, StateSink};
use docsort::workflow::{Document, WorkerPool, WorkflowEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env();

    let documents = scan_input_folder(&settings);
    if documents.is_empty() {
        tracing::warn!(
            "[Main] No PDFs found in {}",
            settings.intake.input_folder.display()
        );
        return;
    }
    tracing::info!("[Main] Found {} PDFs to process", documents.len());

    let inference = match InferenceClient::new(settings.inference.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("[Main] Cannot construct inference client: {}", e);
            std::process::exit(1);
        }
    };

    let fileops = match HttpFileOps::new(settings.fileops.clone()) {
        Ok(fileops) => Arc::new(fileops),
        Err(e) => {
            tracing::error!("[Main] Cannot construct file-operations client: {}", e);
            std::process::exit(1);
        }
    };

    let sink: Arc<dyn StateSink> = match HttpStateSink::new(settings.persist.clone()) {
        Some(sink) => Arc::new(sink),
        None => {
            tracing::info!("[Main] Persistence not configured, transitions will not be recorded");
            Arc::new(NullSink)
        }
    };

    let renderer: Arc<dyn PageRenderer> = default_renderer();
    let builder = Arc::new(RepresentationBuilder::new(
        settings.intake.clone(),
        renderer,
    ));

    let vision = Arc::new(VisionClassifier::new(
        Arc::clone(&inference),
        settings.domains.clone(),
    ));
    let text = Arc::new(TextClassifier::new(
        Arc::clone(&inference),
        settings.domains.clone(),
    ));

    let dispatcher = Arc::new(OrganizationDispatcher::new(
        fileops,
        settings.workflow.max_retries,
        settings.workflow.retry_backoff,
    ));

    let engine = Arc::new(WorkflowEngine::new(
        builder,
        vision,
        text,
        dispatcher,
        sink,
        settings.fusion.clone(),
        settings.workflow.clone(),
    ));

    let pool = WorkerPool::new(engine, settings.workflow.max_concurrency);
    let outcomes = pool
        .process_all(documents.into_iter().map(Document::new).collect())
        .await;

    let done = outcomes.iter().filter(|o| o.is_done()).count();
    let review = outcomes.iter().filter(|o| o.is_manual_review()).count();
    let failed = outcomes.iter().filter(|o| o.is_failed()).count();

    for outcome in &outcomes {
        match &outcome.outcome {
            docsort::Outcome::Done { decision, organization } => {
                tracing::info!(
                    "[Main] {} -> {} ({:.2}) at {}",
                    outcome.file_name,
                    decision.label,
                    decision.confidence,
                    organization.destination.display()
                );
            }
            docsort::Outcome::ManualReview { decision } => {
                tracing::warn!(
                    "[Main] {} needs manual review: {}",
                    outcome.file_name,
                    decision.rationale.join("; ")
                );
            }
            docsort::Outcome::Failed { error } => {
                tracing::error!("[Main] {} failed: {}", outcome.file_name, error);
            }
        }
    }

    tracing::info!(
        "[Main] Finished: {} filed, {} for review, {} failed ({} tokens used)",
        done,
        review,
        failed,
        inference.tokens_used()
    );

    if failed > 0 && done == 0 && review == 0 {
        std::process::exit(1);
    }
}

/// Collect PDF paths from the input folder (non-recursive scan would miss
/// dropped subfolders, so walk the tree).
fn scan_input_folder(settings: &Settings) -> Vec<PathBuf> {
    WalkDir::new(&settings.intake.input_folder)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str() == "application/pdf")
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(feature = "pdfium")]
fn default_renderer() -> Arc<dyn PageRenderer> {
    Arc::new(docsort::document::PdfiumRenderer)
}

#[cfg(not(feature = "pdfium"))]
fn default_renderer() -> Arc<dyn PageRenderer> {
    Arc::new(docsort::document::NoopRenderer)
}
