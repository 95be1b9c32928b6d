use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use weft_channels::{recent_window, ChannelManager, Message as RoomMessage};
use weft_core::types::TopicId;
use weft_graph::GraphStore;
use weft_llm::{ChatRequest, LlmProvider};

use crate::error::Result;
use crate::normalize::{fuzzy_merge, normalize_candidate_term, Candidate};
use crate::parse::parse_extraction_response;
use crate::prompt::build_extraction_prompt;
use crate::types::AnalysisReport;

const MAX_MESSAGE_WINDOW: usize = 200;
const ASSUMED_TOKENS_PER_MESSAGE: usize = 40;
const EXTRACTION_MAX_TOKENS: u32 = 1024;
const EXTRACTION_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_SUBJECT_MEMBERS: usize = 12;

/// Extracts Keywords and Subjects from a topic's message stream: a load-context -> call-
/// LLM -> persist two-stage pipeline. `last_analyzed_count` remembers, per topic, how
/// many messages were already folded into a Keyword/Subject version on the last pass —
/// the concrete mechanism behind "running the analyzer twice on the same unchanged
/// message tail produces no new object versions": a second call over a tail the analyzer
/// has already seen is a no-op before it ever reaches the LLM, rather than relying on
/// each write happening to recompute the same content hash. This is ephemeral, in-memory
/// state — after a restart the analyzer simply re-observes the tail once more.
pub struct TopicAnalyzer {
    channels: Arc<ChannelManager>,
    graph: Arc<GraphStore>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    last_analyzed_count: DashMap<String, usize>,
    max_subject_members: usize,
}

impl TopicAnalyzer {
    pub fn new(channels: Arc<ChannelManager>, graph: Arc<GraphStore>, llm: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            channels,
            graph,
            llm,
            model: model.into(),
            last_analyzed_count: DashMap::new(),
            max_subject_members: DEFAULT_MAX_SUBJECT_MEMBERS,
        }
    }

    /// Caps how many member keywords a single extracted Subject may carry; extras
    /// (lowest-confidence-ordering is the extractor's problem, not ours) are dropped.
    /// Defaults to 12 per the configuration surface's `maxSubjectMembers`.
    pub fn with_max_subject_members(mut self, max: usize) -> Self {
        self.max_subject_members = max.max(1);
        self
    }

    /// Runs one full analysis pass over `topic_id`'s message history. Does not itself
    /// fire `keywords:updated` / `subjects:updated` — the caller (C8) does that, since it
    /// alone knows whether the Message that triggered this pass is durable yet.
    pub async fn analyze(&self, topic_id: &TopicId) -> Result<AnalysisReport> {
        let channel_id = weft_core::types::ChannelId::from(topic_id.to_string());
        let messages = self
            .channels
            .iterate_topic_messages(&channel_id, topic_id)
            .await?;

        if let Some(last) = self.last_analyzed_count.get(topic_id.as_str()) {
            if *last >= messages.len() {
                debug!(topic_id = %topic_id, "no new messages since last analysis pass, skipping");
                return Ok(AnalysisReport::default());
            }
        }

        let window_size = self.message_window_size();
        let window = recent_window(&messages, window_size);
        if window.is_empty() {
            return Ok(AnalysisReport::default());
        }

        let active_subjects = self.graph.list_subjects(topic_id, false).await?;
        let prompt = build_extraction_prompt(window, &active_subjects);

        let response = self
            .llm
            .chat(&ChatRequest {
                model: self.model.clone(),
                messages: prompt,
                max_tokens: EXTRACTION_MAX_TOKENS,
                temperature: EXTRACTION_TEMPERATURE,
            })
            .await?;

        let extraction = parse_extraction_response(&response.content);
        let report = self.apply_extraction(topic_id, extraction).await?;
        self.last_analyzed_count.insert(topic_id.to_string(), messages.len());
        Ok(report)
    }

    /// Forgets the last-analyzed marker for `topic_id`, forcing the next
    /// [`Self::analyze`] call to run even if no new messages arrived.
    /// Tests use this to exercise re-analysis of an unchanged tail; the
    /// live system never needs it since `last_analyzed_count` only grows.
    pub fn reset_watermark(&self, topic_id: &TopicId) {
        self.last_analyzed_count.remove(topic_id.as_str());
    }

    /// Ad-hoc keyword preview for draft text that hasn't been sent yet. Runs the same
    /// extraction prompt over a synthetic single-message window but never persists a
    /// Keyword/Subject version and never touches the watermark — it's a read-only
    /// preview, not an analysis pass.
    pub async fn extract_preview(&self, topic_id: &TopicId, draft_text: &str) -> Result<Vec<String>> {
        if draft_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let active_subjects = self.graph.list_subjects(topic_id, false).await?;
        let preview_message = RoomMessage::new_user(topic_id, "draft", draft_text);
        let prompt = build_extraction_prompt(std::slice::from_ref(&preview_message), &active_subjects);

        let response = self
            .llm
            .chat(&ChatRequest {
                model: self.model.clone(),
                messages: prompt,
                max_tokens: EXTRACTION_MAX_TOKENS,
                temperature: EXTRACTION_TEMPERATURE,
            })
            .await?;

        let extraction = parse_extraction_response(&response.content);
        Ok(extraction.keywords.into_iter().map(|k| k.term).collect())
    }

    fn message_window_size(&self) -> usize {
        let window = self.llm.context_window(&self.model) as usize / ASSUMED_TOKENS_PER_MESSAGE;
        window.clamp(1, MAX_MESSAGE_WINDOW)
    }

    async fn apply_extraction(
        &self,
        topic_id: &TopicId,
        extraction: crate::types::RawExtraction,
    ) -> Result<AnalysisReport> {
        let mut candidates = Vec::with_capacity(extraction.keywords.len());
        for kw in &extraction.keywords {
            let Some(term) = normalize_candidate_term(&kw.term) else { continue };
            let known_frequency = self
                .graph
                .get_keyword_by_term(topic_id, &term)
                .await?
                .map(|k| k.frequency)
                .unwrap_or(0);
            candidates.push(Candidate { term, confidence: kw.confidence, known_frequency });
        }
        let merged = fuzzy_merge(candidates);
        let canonical: std::collections::HashMap<String, f64> = merged
            .iter()
            .map(|c| (c.term.clone(), c.confidence))
            .collect();

        let mut report = AnalysisReport::default();

        // Step 6: standalone keywords (not referenced by any subject below)
        // get written directly; subject member keywords get written (and
        // linked) as part of `create_subject`.
        let mut used_in_subject = std::collections::HashSet::new();
        for subject in &extraction.subjects {
            for term in &subject.member_terms {
                if let Some(normalized) = normalize_candidate_term(term) {
                    used_in_subject.insert(normalized);
                }
            }
        }

        for (term, confidence) in &canonical {
            if used_in_subject.contains(term) {
                continue;
            }
            self.graph.create_keyword(topic_id, term, *confidence).await?;
            report.keywords_written += 1;
        }

        for subject in &extraction.subjects {
            let mut member_terms = Vec::with_capacity(subject.member_terms.len());
            for term in &subject.member_terms {
                let Some(normalized) = normalize_candidate_term(term) else { continue };
                member_terms.push(normalized);
            }
            if member_terms.is_empty() {
                continue;
            }
            if member_terms.len() > self.max_subject_members {
                debug!(
                    topic_id = %topic_id,
                    dropped = member_terms.len() - self.max_subject_members,
                    "subject exceeded max_subject_members, truncating"
                );
                member_terms.truncate(self.max_subject_members);
            }
            let (_, _) = self
                .graph
                .create_subject(
                    topic_id,
                    &member_terms,
                    subject.subject_id.as_deref(),
                    subject.confidence,
                )
                .await?;
            report.keywords_written += member_terms.len();
            report.subjects_written += 1;
            debug!(topic_id = %topic_id, members = member_terms.len(), "subject extracted");
        }

        Ok(report)
    }
}

/// Largest tail of `messages` the analyzer will ever send in one pass,
/// exposed so `weft-summary`'s restart-context builder can synthesize an
/// inline analysis over the same bound.
pub fn bounded_tail(messages: &[RoomMessage], max: usize) -> &[RoomMessage] {
    recent_window(messages, max.min(MAX_MESSAGE_WINDOW))
}
