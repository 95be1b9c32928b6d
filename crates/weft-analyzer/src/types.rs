use serde::{Deserialize, Serialize};

/// One keyword candidate out of the extractor's structured output.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawKeyword {
    pub term: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// One subject candidate out of the extractor's structured output. `subject_id` is the
/// extractor's proposed `keywordCombination`; the store recomputes it from `member_terms`
/// if absent or inconsistent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSubject {
    #[serde(default, rename = "subjectId")]
    pub subject_id: Option<String>,
    #[serde(rename = "memberTerms")]
    pub member_terms: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// Parsed extractor output before normalization/fuzzy-merge.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub keywords: Vec<RawKeyword>,
    #[serde(default)]
    pub subjects: Vec<RawSubject>,
}

/// Result of one full analysis pass, returned to the caller so
/// it can decide whether to fire `keywords:updated`/`subjects:updated`
///.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub keywords_written: usize,
    pub subjects_written: usize,
}

impl AnalysisReport {
    pub fn keywords_changed(&self) -> bool {
        self.keywords_written > 0
    }

    pub fn subjects_changed(&self) -> bool {
        self.subjects_written > 0
    }
}
