//! Pipeline error taxonomy
//!
//! Every failure mode in the pipeline is a typed variant here. Stage code
//! returns these through `Result`; the workflow engine converts whatever
//! survives its retry policy into a terminal outcome, so no error ever
//! propagates past `process`. Variants are serde-tagged so they can ride
//! inside persisted audit records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by pipeline stages.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum PipelineError {
    /// The document could not be turned into a representation
    /// (unreadable, corrupt, or over the configured size limit).
    #[error("representation failed: {0}")]
    Representation(String),

    /// A classifier call exceeded its per-agent timeout.
    #[error("{agent} classifier timed out after {timeout_ms}ms")]
    ClassifierTimeout { agent: String, timeout_ms: u64 },

    /// The inference collaborator failed (I/O, API error, unparseable reply).
    #[error("{agent} classifier upstream error: {message}")]
    ClassifierUpstream { agent: String, message: String },

    /// Neither classifier produced a usable label.
    #[error("fusion ambiguous: no classifier produced a usable label")]
    FusionAmbiguous,

    /// File placement failed. `transient` is true only for connectivity
    /// causes, where a retry may succeed without risking a duplicate.
    #[error("organization failed: {message}")]
    Organization { message: String, transient: bool },

    /// The per-document deadline elapsed before a terminal stage.
    #[error("document deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    /// A `process` call for this document identity is already running.
    #[error("document {0} is already being processed")]
    AlreadyInFlight(String),
}

impl PipelineError {
    /// Whether the retry policy may attempt the failed operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ClassifierTimeout { .. } | Self::ClassifierUpstream { .. } => true,
            Self::Organization { transient, .. } => *transient,
            Self::Representation(_)
            | Self::FusionAmbiguous
            | Self::DeadlineExceeded(_)
            | Self::AlreadyInFlight(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::ClassifierTimeout {
            agent: "vision".into(),
            timeout_ms: 100
        }
        .is_transient());
        assert!(PipelineError::Organization {
            message: "connection refused".into(),
            transient: true
        }
        .is_transient());
        assert!(!PipelineError::Representation("corrupt".into()).is_transient());
        assert!(!PipelineError::Organization {
            message: "destination unwritable".into(),
            transient: false
        }
        .is_transient());
        assert!(!PipelineError::DeadlineExceeded(2000).is_transient());
    }

    #[test]
    fn test_serializes_tagged() {
        let err = PipelineError::Representation("bad xref table".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "representation");
        assert_eq!(json["detail"], "bad xref table");
    }
}
