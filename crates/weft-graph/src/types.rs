use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weft_core::types::now_millis;

/// A normalized single-term concept. ID
/// field is `term` alone — successive versions of the "same" keyword share
/// an ID hash over `{$type$, term}` even as `frequency`/`subjects` change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    pub term: String,
    pub frequency: u64,
    /// Subject ID-hashes this keyword has been attached to. No duplicates.
    pub subjects: Vec<String>,
    pub score: f64,
    /// Running mean over every extractor confidence observed for this term (Open Question
    /// in, decided: running mean). `None` for objects written before this field existed.
    #[serde(default)]
    pub confidence: Option<f64>,
    pub created_at: i64,
    pub last_seen: i64,
}

impl Keyword {
    pub fn new(term: impl Into<String>, confidence: f64) -> Self {
        let now = now_millis();
        Self {
            term: term.into(),
            frequency: 1,
            subjects: Vec::new(),
            score: confidence,
            confidence: Some(confidence),
            created_at: now,
            last_seen: now,
        }
    }

    /// Folds a newly observed confidence into the running mean and bumps
    /// `frequency`/`lastSeen`.
    pub fn observe(&mut self, confidence: f64) {
        self.frequency += 1;
        let old = self.confidence.unwrap_or(confidence);
        let new_mean = old + (confidence - old) / self.frequency as f64;
        self.confidence = Some(new_mean);
        self.score = new_mean;
        self.last_seen = now_millis();
    }

    /// Adds `subject_id_hash` to the back-reference bag if not already
    /// present.
    pub fn link_subject(&mut self, subject_id_hash: &str) {
        if !self.subjects.iter().any(|s| s == subject_id_hash) {
            self.subjects.push(subject_id_hash.to_string());
        }
    }

    pub fn id_fields_value(&self) -> Value {
        json!({"$type$": "Keyword", "term": self.term})
    }

    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("Keyword always serializes");
        value["$type$"] = json!("Keyword");
        value
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("$type$").and_then(Value::as_str) != Some("Keyword") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// A half-open window during which a Subject was actively discussed. Invariant: `start <=
/// end`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// How close two recurrences of the same Subject must be to extend the
/// latest time range instead of appending a new one.
pub const TIME_RANGE_MERGE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// A cluster of Keywords discussed together within one topic. ID is the sorted,
/// `+`-joined set of member keyword terms (`keywordCombination`) — this makes the ID hash
/// derivable from the member terms alone, without consulting the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub topic: String,
    /// Keyword ID-hashes.
    pub keywords: Vec<String>,
    pub time_ranges: Vec<TimeRange>,
    pub message_count: u64,
    pub created_at: i64,
    pub last_seen_at: i64,
    #[serde(default)]
    pub archived: bool,
}

impl Subject {
    pub fn new(topic: impl Into<String>, id: impl Into<String>, keyword_id_hashes: Vec<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            topic: topic.into(),
            keywords: keyword_id_hashes,
            time_ranges: vec![TimeRange { start: now, end: now }],
            message_count: 1,
            created_at: now,
            last_seen_at: now,
            archived: false,
        }
    }

    /// Sorted `+`-joined combination ID for a set of member keyword terms.
    pub fn combination_id(terms: &[String]) -> String {
        let mut sorted: Vec<&str> = terms.iter().map(|s| s.as_str()).collect();
        sorted.sort_unstable();
        sorted.join("+")
    }

    /// Appends a new time range or extends the latest one when the recurrence falls
    /// within [`TIME_RANGE_MERGE_WINDOW_MS`] of it.
    pub fn record_recurrence(&mut self, now: i64) {
        self.message_count += 1;
        self.last_seen_at = now;
        match self.time_ranges.last_mut() {
            Some(last) if now - last.end <= TIME_RANGE_MERGE_WINDOW_MS => {
                last.end = now;
            }
            _ => self.time_ranges.push(TimeRange { start: now, end: now }),
        }
    }

    pub fn id_fields_value(&self) -> Value {
        json!({"$type$": "Subject", "id": self.id})
    }

    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("Subject always serializes");
        value["$type$"] = json!("Subject");
        value
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("$type$").and_then(Value::as_str) != Some("Subject") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// A keyword paired with the subjects it currently belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordWithSubjects {
    pub keyword: Keyword,
    pub subjects: Vec<Subject>,
}
