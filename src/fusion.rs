//! Decision fusion
//!
//! [`fuse`] combines the two classifier verdicts into one
//! [`FusionDecision`]. It is a pure function: no I/O, no clock, no
//! randomness — identical verdict pairs always produce identical decisions,
//! which keeps the audit trail reproducible.
//!
//! Policy, in order:
//! 1. both verdicts errored -> `unknown`, flagged for manual review
//! 2. exactly one errored -> the survivor's label and confidence, verbatim
//! 3. labels agree -> weighted combination of the confidences; a
//!    zero-confidence side is excluded from the score and kept for audit
//! 4. labels disagree -> higher weighted confidence wins; within the
//!    equality epsilon the text label is preferred (terminology is the
//!    stronger discriminator than layout), the tie-break flag is set, and
//!    the confidence is scaled down by the penalty factor

use crate::classify::{ClassifierVerdict, VerdictSource};
use crate::domain::DomainLabel;
use serde::{Deserialize, Serialize};

/// Fusion policy knobs. Weights must be non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionConfig {
    pub vision_weight: f32,
    pub text_weight: f32,
    /// Weighted confidences within this distance count as a tie.
    pub tie_epsilon: f32,
    /// Multiplier applied to the confidence when a tie-break fires.
    pub tie_break_penalty: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            vision_weight: 0.5,
            text_weight: 0.5,
            tie_epsilon: 0.05,
            tie_break_penalty: 0.85,
        }
    }
}

/// The final, immutable classification decision for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusionDecision {
    pub label: DomainLabel,
    pub confidence: f32,
    /// Per-source breakdown, retained for audit.
    pub vision: ClassifierVerdict,
    pub text: ClassifierVerdict,
    /// True when the tie-break rule decided the label.
    pub tie_break: bool,
    /// True when no classifier produced a usable label and a human must
    /// classify the document.
    pub needs_review: bool,
    pub rationale: Vec<String>,
}

/// Fuse the two verdicts into one decision. Pure and deterministic.
pub fn fuse(
    vision: &ClassifierVerdict,
    text: &ClassifierVerdict,
    config: &FusionConfig,
) -> FusionDecision {
    let (label, confidence, tie_break, rationale) = fuse_inner(vision, text, config);
    let needs_review = label.is_unknown();

    FusionDecision {
        label,
        confidence: confidence.clamp(0.0, 1.0),
        vision: vision.clone(),
        text: text.clone(),
        tie_break,
        needs_review,
        rationale,
    }
}

fn fuse_inner(
    vision: &ClassifierVerdict,
    text: &ClassifierVerdict,
    config: &FusionConfig,
) -> (DomainLabel, f32, bool, Vec<String>) {
    let vision_weight = config.vision_weight.max(0.0);
    let text_weight = config.text_weight.max(0.0);

    // 1. Nothing ran.
    if vision.errored && text.errored {
        return (
            DomainLabel::unknown(),
            0.0,
            false,
            vec!["both classifiers failed to run".to_string()],
        );
    }

    // 2. One side failed to run: pass the survivor through verbatim.
    if vision.errored || text.errored {
        let (failed, survivor) = if vision.errored {
            (vision, text)
        } else {
            (text, vision)
        };
        return (
            survivor.label.clone(),
            survivor.confidence,
            false,
            vec![format!(
                "{} classifier failed, using {} verdict alone",
                failed.source, survivor.source
            )],
        );
    }

    // Both ran. An unknown side carries no signal and contributes only to
    // the audit breakdown; it never wins a tie-break.
    match (vision.label.is_unknown(), text.label.is_unknown()) {
        (true, true) => {
            return (
                DomainLabel::unknown(),
                0.0,
                false,
                vec!["neither classifier found a classifiable signal".to_string()],
            );
        }
        (true, false) => {
            return (
                text.label.clone(),
                text.confidence,
                false,
                vec!["vision inconclusive, using text verdict alone".to_string()],
            );
        }
        (false, true) => {
            return (
                vision.label.clone(),
                vision.confidence,
                false,
                vec!["text inconclusive, using vision verdict alone".to_string()],
            );
        }
        (false, false) => {}
    }

    // 3. Agreement: weighted combination, excluding zero-confidence sides.
    if vision.label == text.label {
        let (mut wv, mut wt) = (vision_weight, text_weight);
        if vision.confidence == 0.0 {
            wv = 0.0;
        }
        if text.confidence == 0.0 {
            wt = 0.0;
        }
        let denominator = wv + wt;
        let confidence = if denominator > 0.0 {
            (wv * vision.confidence + wt * text.confidence) / denominator
        } else {
            0.0
        };
        return (
            vision.label.clone(),
            confidence,
            false,
            vec![format!(
                "classifiers agree on {} (vision {:.2}, text {:.2})",
                vision.label, vision.confidence, text.confidence
            )],
        );
    }

    // 4. Disagreement: compare weighted confidences.
    let vision_score = vision_weight * vision.confidence;
    let text_score = text_weight * text.confidence;

    if (vision_score - text_score).abs() <= config.tie_epsilon {
        return (
            text.label.clone(),
            text.confidence * config.tie_break_penalty,
            true,
            vec![format!(
                "tie within epsilon {:.2} ({} {:.2} vs {} {:.2}), preferring text",
                config.tie_epsilon, vision.label, vision_score, text.label, text_score
            )],
        );
    }

    let winner = if vision_score > text_score { vision } else { text };
    (
        winner.label.clone(),
        winner.confidence,
        false,
        vec![format!(
            "labels disagree, {} wins on weighted confidence ({:.2} vs {:.2})",
            winner.source,
            winner_score(winner.source, vision_score, text_score),
            loser_score(winner.source, vision_score, text_score)
        )],
    )
}

fn winner_score(winner: VerdictSource, vision_score: f32, text_score: f32) -> f32 {
    match winner {
        VerdictSource::Vision => vision_score,
        VerdictSource::Text => text_score,
    }
}

fn loser_score(winner: VerdictSource, vision_score: f32, text_score: f32) -> f32 {
    match winner {
        VerdictSource::Vision => text_score,
        VerdictSource::Text => vision_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::VerdictSource;
    use crate::domain::DomainSet;

    fn verdict(source: VerdictSource, label: &str, confidence: f32) -> ClassifierVerdict {
        ClassifierVerdict::conclusive(
            source,
            DomainSet::default().resolve(label),
            confidence,
            vec![],
        )
    }

    fn unknown_verdict(source: VerdictSource) -> ClassifierVerdict {
        ClassifierVerdict::inconclusive(source)
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let v = verdict(VerdictSource::Vision, "law", 0.6);
        let t = verdict(VerdictSource::Text, "finance", 0.8);
        let config = FusionConfig::default();
        assert_eq!(fuse(&v, &t, &config), fuse(&v, &t, &config));
    }

    #[test]
    fn test_both_errored_flags_manual_review() {
        let v = ClassifierVerdict::failed(VerdictSource::Vision, "timeout");
        let t = ClassifierVerdict::failed(VerdictSource::Text, "503");
        let decision = fuse(&v, &t, &FusionConfig::default());

        assert!(decision.label.is_unknown());
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.needs_review);
        assert!(!decision.tie_break);
    }

    #[test]
    fn test_one_errored_passes_survivor_through_exactly() {
        let v = ClassifierVerdict::failed(VerdictSource::Vision, "timeout");
        let t = verdict(VerdictSource::Text, "science", 0.9);
        let decision = fuse(&v, &t, &FusionConfig::default());

        assert_eq!(decision.label.as_str(), "science");
        assert_eq!(decision.confidence, 0.9);
        assert!(!decision.tie_break);
        assert!(!decision.needs_review);
    }

    #[test]
    fn test_agreement_keeps_label_under_any_nonnegative_weights() {
        let v = verdict(VerdictSource::Vision, "law", 0.6);
        let t = verdict(VerdictSource::Text, "law", 0.8);

        for (wv, wt) in [(0.5, 0.5), (0.3, 0.7), (0.0, 1.0), (2.0, 1.0)] {
            let config = FusionConfig {
                vision_weight: wv,
                text_weight: wt,
                ..FusionConfig::default()
            };
            let decision = fuse(&v, &t, &config);
            assert_eq!(decision.label.as_str(), "law");
            assert!(decision.confidence > 0.0 && decision.confidence <= 1.0);
        }
    }

    #[test]
    fn test_agreement_weighted_combination() {
        let v = verdict(VerdictSource::Vision, "finance", 0.6);
        let t = verdict(VerdictSource::Text, "finance", 0.8);
        let config = FusionConfig {
            vision_weight: 0.3,
            text_weight: 0.7,
            ..FusionConfig::default()
        };
        let decision = fuse(&v, &t, &config);
        // 0.3*0.6 + 0.7*0.8 = 0.74
        assert!((decision.confidence - 0.74).abs() < 1e-6);
    }

    #[test]
    fn test_tie_break_prefers_text_with_penalty() {
        let v = verdict(VerdictSource::Vision, "law", 0.70);
        let t = verdict(VerdictSource::Text, "finance", 0.72);
        let decision = fuse(&v, &t, &FusionConfig::default());

        assert_eq!(decision.label.as_str(), "finance");
        assert!(decision.tie_break);
        assert!(decision.confidence < 0.72);
        assert!(decision.confidence > 0.0);
    }

    #[test]
    fn test_clear_disagreement_skips_tie_break() {
        let v = verdict(VerdictSource::Vision, "law", 0.9);
        let t = verdict(VerdictSource::Text, "finance", 0.3);
        let decision = fuse(&v, &t, &FusionConfig::default());

        assert_eq!(decision.label.as_str(), "law");
        assert_eq!(decision.confidence, 0.9);
        assert!(!decision.tie_break);
    }

    #[test]
    fn test_both_unknown_flags_manual_review() {
        let decision = fuse(
            &unknown_verdict(VerdictSource::Vision),
            &unknown_verdict(VerdictSource::Text),
            &FusionConfig::default(),
        );

        assert!(decision.label.is_unknown());
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.needs_review);
    }

    #[test]
    fn test_unknown_side_never_wins_tie_break() {
        // Low-confidence vision verdict vs inconclusive text: the weighted
        // scores are within epsilon, but the unknown side must not be
        // preferred.
        let v = verdict(VerdictSource::Vision, "finance", 0.08);
        let t = unknown_verdict(VerdictSource::Text);
        let decision = fuse(&v, &t, &FusionConfig::default());

        assert_eq!(decision.label.as_str(), "finance");
        assert_eq!(decision.confidence, 0.08);
        assert!(!decision.tie_break);
    }

    #[test]
    fn test_verdicts_retained_for_audit() {
        let v = verdict(VerdictSource::Vision, "law", 0.7);
        let t = verdict(VerdictSource::Text, "law", 0.8);
        let decision = fuse(&v, &t, &FusionConfig::default());
        assert_eq!(decision.vision, v);
        assert_eq!(decision.text, t);
        assert!(!decision.rationale.is_empty());
    }
}
