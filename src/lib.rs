//! docsort - multi-agent PDF domain classification and filing engine
//!
//! A document flows through a small orchestration state machine: its text
//! and page previews are extracted, two classifiers (layout and
//! terminology) run concurrently over the representations, their verdicts
//! are fused by a deterministic policy, and the decision is handed to a
//! remote file-operations collaborator for placement. Persistence, the
//! inference service, and file placement are all external collaborators
//! behind narrow traits.

pub mod classify;
pub mod config;
pub mod document;
pub mod domain;
pub mod error;
pub mod fusion;
pub mod inference;
pub mod organize;
pub mod persist;
pub mod workflow;

pub use config::Settings;
pub use domain::{DomainLabel, DomainSet};
pub use error::PipelineError;
pub use fusion::{fuse, FusionConfig, FusionDecision};
pub use workflow::{Document, FinalOutcome, Outcome, WorkflowEngine, WorkerPool};
