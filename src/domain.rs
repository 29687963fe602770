//! Domain label set
//!
//! The set of subject-matter domains a document can be filed under is fixed
//! configuration supplied at startup. The core is parametric over the set:
//! labels are resolved against it, and anything outside it collapses to
//! `unknown`. Only `unknown` and `general` carry special meaning (both are
//! low-information fallbacks).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A resolved domain label, guaranteed to come from the configured set
/// (or be the `unknown` fallback).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainLabel(String);

impl DomainLabel {
    pub const UNKNOWN: &'static str = "unknown";
    pub const GENERAL: &'static str = "general";

    /// The `unknown` fallback label.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// True for labels that carry no real classification signal.
    pub fn is_low_information(&self) -> bool {
        self.0 == Self::UNKNOWN || self.0 == Self::GENERAL
    }
}

impl fmt::Display for DomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of domains the pipeline classifies into.
#[derive(Debug, Clone)]
pub struct DomainSet {
    labels: Vec<String>,
}

impl DomainSet {
    /// Build a set from explicit labels. `unknown` is always a member.
    pub fn new(labels: Vec<String>) -> Self {
        let mut labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        if !labels.iter().any(|l| l == DomainLabel::UNKNOWN) {
            labels.push(DomainLabel::UNKNOWN.to_string());
        }
        Self { labels }
    }

    /// Parse a comma-separated list (the `DOCSORT_DOMAINS` format).
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(',').map(|s| s.to_string()).collect())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.labels.iter().any(|l| *l == label)
    }

    /// Resolve a raw label (e.g. from a model response) against the set.
    /// Unrecognized labels collapse to `unknown`.
    pub fn resolve(&self, raw: &str) -> DomainLabel {
        let normalized = raw.trim().to_lowercase();
        if self.labels.iter().any(|l| *l == normalized) {
            DomainLabel(normalized)
        } else {
            DomainLabel::unknown()
        }
    }

    /// Comma-separated list of classifiable labels for prompt building
    /// (`unknown` excluded — models should not be offered the fallback).
    pub fn prompt_list(&self) -> String {
        self.labels
            .iter()
            .filter(|l| *l != DomainLabel::UNKNOWN)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for DomainSet {
    fn default() -> Self {
        Self::new(
            [
                "finance",
                "law",
                "science",
                "technology",
                "healthcare",
                "education",
                "business",
                "engineering",
                "arts",
                "general",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

/// Default per-domain keyword table used by the text classifier's fallback
/// path when a document yields too little text for an inference call.
pub fn default_keywords() -> HashMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        (
            "finance",
            &[
                "financial", "banking", "investment", "stock", "bond", "portfolio",
                "accounting", "audit", "revenue", "profit", "loss", "balance sheet",
                "income statement", "cash flow", "equity", "asset", "liability",
                "fiscal", "monetary", "securities", "derivatives", "hedge fund",
            ],
        ),
        (
            "law",
            &[
                "legal", "court", "judge", "attorney", "lawsuit", "plaintiff",
                "defendant", "verdict", "statute", "regulation", "compliance",
                "contract", "agreement", "litigation", "jurisdiction", "appeal",
                "prosecution", "defense", "testimony", "evidence", "judicial",
            ],
        ),
        (
            "science",
            &[
                "research", "experiment", "hypothesis", "theory", "methodology",
                "analysis", "data", "results", "conclusion", "abstract",
                "publication", "peer review", "scientific", "laboratory",
                "variable", "observation", "phenomenon", "empirical", "quantitative",
            ],
        ),
        (
            "technology",
            &[
                "software", "hardware", "algorithm", "programming", "code",
                "system", "application", "platform", "network", "database",
                "cloud", "artificial intelligence", "machine learning",
                "cybersecurity", "blockchain", "api", "framework", "architecture",
                "deployment",
            ],
        ),
        (
            "healthcare",
            &[
                "medical", "patient", "diagnosis", "treatment", "clinical",
                "hospital", "physician", "nurse", "therapy", "medication",
                "disease", "symptom", "health", "surgical", "pharmaceutical",
                "radiology", "pathology", "anatomy", "physiology",
            ],
        ),
        (
            "education",
            &[
                "teaching", "learning", "student", "curriculum", "course",
                "pedagogy", "instruction", "assessment", "academic", "university",
                "school", "education", "training", "classroom", "textbook",
                "syllabus", "enrollment", "degree", "diploma", "scholarship",
            ],
        ),
        (
            "business",
            &[
                "management", "strategy", "marketing", "sales", "customer",
                "product", "service", "business plan", "entrepreneurship",
                "startup", "operations", "supply chain", "vendor", "procurement",
                "logistics", "human resources", "employee", "organizational",
                "corporate",
            ],
        ),
        (
            "engineering",
            &[
                "design", "construction", "structural", "mechanical",
                "electrical", "civil", "chemical", "aerospace", "manufacturing",
                "cad", "blueprint", "specifications", "materials", "testing",
                "prototype", "maintenance", "installation", "inspection",
                "quality control",
            ],
        ),
        (
            "arts",
            &[
                "creative", "artistic", "visual", "performance", "music",
                "theater", "literature", "painting", "sculpture", "photography",
                "film", "media", "aesthetic", "exhibition", "gallery",
                "composition", "choreography", "narrative",
            ],
        ),
    ];

    table
        .iter()
        .map(|(domain, words)| {
            (
                domain.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect()
}
