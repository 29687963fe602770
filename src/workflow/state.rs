//! Workflow state machine types
//!
//! A document moves through a strictly forward finite state machine:
//! `Received -> Represented -> Classified -> Decided -> Organized`, with
//! `Failed` reachable from any non-terminal state and no back-edges. The
//! transition table is explicit so the forward-only invariant is
//! mechanically checkable. Every transition is timestamped into the
//! document's history, which becomes the audit trail of the final outcome.

use crate::error::PipelineError;
use crate::fusion::FusionDecision;
use crate::organize::OrganizationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Engine states, in order. `Organized` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Represented,
    Classified,
    Decided,
    Organized,
    Failed,
}

impl Stage {
    /// The forward-only transition table.
    pub fn can_advance_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Received, Stage::Represented)
                | (Stage::Represented, Stage::Classified)
                | (Stage::Classified, Stage::Decided)
                | (Stage::Decided, Stage::Organized)
                | (Stage::Received, Stage::Failed)
                | (Stage::Represented, Stage::Failed)
                | (Stage::Classified, Stage::Failed)
                | (Stage::Decided, Stage::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Organized | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Represented => "represented",
            Stage::Classified => "classified",
            Stage::Decided => "decided",
            Stage::Organized => "organized",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped state-machine transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// A document under processing. Owned exclusively by one engine execution
/// for the duration of `process`.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub file_name: String,
    stage: Stage,
    history: Vec<StageTransition>,
}

impl Document {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self::with_id(Uuid::new_v4(), source_path)
    }

    /// Construct with an explicit identity (re-submissions of the same
    /// document carry the same id).
    pub fn with_id(id: Uuid, source_path: impl Into<PathBuf>) -> Self {
        let source_path = source_path.into();
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            id,
            source_path,
            file_name,
            stage: Stage::Received,
            history: vec![StageTransition {
                stage: Stage::Received,
                at: Utc::now(),
            }],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    /// Advance through the state machine. Illegal transitions are refused
    /// and logged; the table above is the single source of truth.
    pub(crate) fn advance(&mut self, next: Stage) -> bool {
        if !self.stage.can_advance_to(next) {
            tracing::error!(
                "[Workflow] Refusing illegal transition {} -> {} for {}",
                self.stage,
                next,
                self.id
            );
            return false;
        }

        self.stage = next;
        self.history.push(StageTransition {
            stage: next,
            at: Utc::now(),
        });
        true
    }
}

/// Terminal result of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Outcome {
    /// Classified and filed. Carries exactly one decision and one
    /// successful organization result.
    Done {
        decision: FusionDecision,
        organization: OrganizationResult,
    },
    /// The pipeline could not decide confidently; a human must classify.
    ManualReview { decision: FusionDecision },
    /// Processing failed; no file was left in an ambiguous location.
    Failed { error: PipelineError },
}

/// What `process` returns: the terminal outcome plus the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalOutcome {
    pub document_id: Uuid,
    pub file_name: String,
    pub outcome: Outcome,
    pub transitions: Vec<StageTransition>,
}

impl FinalOutcome {
    pub fn new(document: &Document, outcome: Outcome) -> Self {
        Self {
            document_id: document.id,
            file_name: document.file_name.clone(),
            outcome,
            transitions: document.history().to_vec(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.outcome, Outcome::Done { .. })
    }

    pub fn is_manual_review(&self) -> bool {
        matches!(self.outcome, Outcome::ManualReview { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions_are_legal() {
        let order = [
            Stage::Received,
            Stage::Represented,
            Stage::Classified,
            Stage::Decided,
            Stage::Organized,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_back_edges_or_skips() {
        assert!(!Stage::Represented.can_advance_to(Stage::Received));
        assert!(!Stage::Decided.can_advance_to(Stage::Classified));
        assert!(!Stage::Received.can_advance_to(Stage::Classified));
        assert!(!Stage::Received.can_advance_to(Stage::Organized));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in [
            Stage::Received,
            Stage::Represented,
            Stage::Classified,
            Stage::Decided,
            Stage::Organized,
            Stage::Failed,
        ] {
            assert!(!Stage::Organized.can_advance_to(next));
            assert!(!Stage::Failed.can_advance_to(next));
        }
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        for from in [
            Stage::Received,
            Stage::Represented,
            Stage::Classified,
            Stage::Decided,
        ] {
            assert!(from.can_advance_to(Stage::Failed));
        }
    }

    #[test]
    fn test_advance_records_history() {
        let mut doc = Document::new("/in/a.pdf");
        assert_eq!(doc.stage(), Stage::Received);
        assert!(doc.advance(Stage::Represented));
        assert!(doc.advance(Stage::Classified));
        assert_eq!(doc.history().len(), 3);
        assert_eq!(doc.history()[2].stage, Stage::Classified);
    }

    #[test]
    fn test_illegal_advance_refused() {
        let mut doc = Document::new("/in/a.pdf");
        assert!(!doc.advance(Stage::Organized));
        assert_eq!(doc.stage(), Stage::Received);
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn test_file_name_derived_from_path() {
        let doc = Document::new("/input/reports/q3.pdf");
        assert_eq!(doc.file_name, "q3.pdf");
    }
}
