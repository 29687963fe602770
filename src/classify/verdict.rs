//! Classifier verdicts
//!
//! A [`ClassifierVerdict`] is one classifier's confidence-scored output for
//! one document. The error flag distinguishes "ran and found nothing"
//! (label `unknown`, not errored) from "failed to run" (errored). Verdicts
//! are immutable once produced and ride into the fusion decision for audit.

use crate::domain::DomainLabel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which classifier produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    Vision,
    Text,
}

impl VerdictSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for VerdictSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classifier's labeled, confidence-scored output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierVerdict {
    pub source: VerdictSource,
    pub label: DomainLabel,
    /// In [0.0, 1.0]; exactly 0.0 iff the label is `unknown`.
    pub confidence: f32,
    /// Supporting evidence: layout cues (vision) or matched terminology (text).
    pub evidence: Vec<String>,
    /// True when the classifier failed to run (timeout, upstream error).
    pub errored: bool,
    pub error_detail: Option<String>,
}

impl ClassifierVerdict {
    /// A successful verdict. Enforces the confidence discipline: `unknown`
    /// is pinned to 0.0, any other label must land in (0.0, 1.0] — a
    /// non-positive confidence on a real label collapses to inconclusive.
    pub fn conclusive(
        source: VerdictSource,
        label: DomainLabel,
        confidence: f32,
        evidence: Vec<String>,
    ) -> Self {
        if label.is_unknown() || confidence <= 0.0 || !confidence.is_finite() {
            let mut verdict = Self::inconclusive(source);
            verdict.evidence = evidence;
            return verdict;
        }

        Self {
            source,
            label,
            confidence: confidence.min(1.0),
            evidence,
            errored: false,
            error_detail: None,
        }
    }

    /// The classifier ran but found nothing to go on.
    pub fn inconclusive(source: VerdictSource) -> Self {
        Self {
            source,
            label: DomainLabel::unknown(),
            confidence: 0.0,
            evidence: Vec::new(),
            errored: false,
            error_detail: None,
        }
    }

    /// The classifier failed to run (timeout or upstream error).
    pub fn failed(source: VerdictSource, detail: impl Into<String>) -> Self {
        Self {
            source,
            label: DomainLabel::unknown(),
            confidence: 0.0,
            evidence: Vec::new(),
            errored: true,
            error_detail: Some(detail.into()),
        }
    }

    /// True when the verdict carries a usable (non-errored, known) label.
    pub fn is_usable(&self) -> bool {
        !self.errored && !self.label.is_unknown()
    }
}
