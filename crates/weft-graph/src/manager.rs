use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use weft_channels::ChannelManager;
use weft_core::types::{now_millis, ChannelId, TopicId};
use weft_store::ObjectStore;

use crate::error::{GraphError, Result};
use crate::types::{Keyword, KeywordWithSubjects, Subject};

const KEYWORD_AUTHOR: &str = "topic-analyzer";

fn keyword_id_hash(term: &str) -> Result<String> {
    let kw_stub = serde_json::json!({"$type$": "Keyword", "term": term});
    Ok(weft_store::canonical::id_hash(&kw_stub, &["$type$", "term"])?)
}

fn subject_id_hash(id: &str) -> Result<String> {
    let subj_stub = serde_json::json!({"$type$": "Subject", "id": id});
    Ok(weft_store::canonical::id_hash(&subj_stub, &["$type$", "id"])?)
}

struct TtlCache<T: Clone> {
    entries: DashMap<String, (T, Instant)>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    fn new(ttl_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_millis(ttl_ms),
        }
    }

    fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        let (value, at) = entry.value();
        if at.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    fn put(&self, key: String, value: T) {
        self.entries.insert(key, (value, Instant::now()));
    }

    fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Typed store for Keyword, Subject, and their reverse indices. Wraps [`ObjectStore`] for
/// persistence and [`ChannelManager`] for the per-topic channel that keyword/subject
/// writes are also logged into, so `getKeywordByTerm` can answer from channel history
/// instead of a separate index.
pub struct GraphStore {
    store: Arc<ObjectStore>,
    channels: Arc<ChannelManager>,
    keyword_listing_cache: TtlCache<Vec<Keyword>>,
    subject_listing_cache: TtlCache<Vec<Subject>>,
}

impl GraphStore {
    pub fn new(store: Arc<ObjectStore>, channels: Arc<ChannelManager>, cache_ttl_ms: u64) -> Self {
        Self {
            store,
            channels,
            keyword_listing_cache: TtlCache::new(cache_ttl_ms),
            subject_listing_cache: TtlCache::new(cache_ttl_ms),
        }
    }

    /// Loads or creates the Keyword identified by `term`, folding `confidence` into its
    /// running-mean score, then persists the new version and logs a reference into the
    /// topic's channel. Returns the Keyword and its ID hash.
    pub async fn create_keyword(
        &self,
        topic_id: &TopicId,
        term: &str,
        confidence: f64,
    ) -> Result<(Keyword, String)> {
        let term = normalize_term(term)?;
        let id_hash = keyword_id_hash(&term)?;

        let mut keyword = match self.store.get_by_id_hash(&id_hash).await {
            Ok(value) => Keyword::from_value(&value)
                .ok_or_else(|| GraphError::InvariantViolation("stored Keyword has wrong $type$".into()))?,
            Err(weft_store::StoreError::NotFound(_)) => Keyword::new(term.clone(), confidence),
            Err(e) => return Err(e.into()),
        };
        keyword.observe(confidence);

        let content_hash = self.store.store_versioned(&id_hash, &keyword.to_value()).await?;
        self.log_write(topic_id, &content_hash).await?;
        self.keyword_listing_cache.invalidate(topic_id.as_str());

        debug!(topic_id = %topic_id, term = %keyword.term, frequency = keyword.frequency, "keyword upserted");
        Ok((keyword, id_hash))
    }

    /// Creates (or records a recurrence of) the Subject identified by the sorted `+`-join
    /// of `keyword_terms`. Ensures every member Keyword is persisted first, then stores
    /// the Subject, then links each member Keyword's back-reference bag to it — in that
    /// order, so a Keyword never references a Subject ID hash that doesn't resolve yet.
    pub async fn create_subject(
        &self,
        topic_id: &TopicId,
        keyword_terms: &[String],
        keyword_combination_id: Option<&str>,
        confidence: f64,
    ) -> Result<(Subject, String)> {
        if keyword_terms.is_empty() {
            return Err(GraphError::InvariantViolation(
                "subject must have at least one member keyword".into(),
            ));
        }

        let mut keyword_id_hashes = Vec::with_capacity(keyword_terms.len());
        for term in keyword_terms {
            let (_, id_hash) = self.create_keyword(topic_id, term, confidence).await?;
            keyword_id_hashes.push(id_hash);
        }

        let normalized_terms: Vec<String> = keyword_terms
            .iter()
            .map(|t| normalize_term(t))
            .collect::<Result<_>>()?;
        let id = keyword_combination_id
            .map(str::to_string)
            .unwrap_or_else(|| Subject::combination_id(&normalized_terms));
        let id_hash = subject_id_hash(&id)?;

        let now = now_millis();
        let mut subject = match self.store.get_by_id_hash(&id_hash).await {
            Ok(value) => {
                let mut existing = Subject::from_value(&value)
                    .ok_or_else(|| GraphError::InvariantViolation("stored Subject has wrong $type$".into()))?;
                existing.record_recurrence(now);
                existing
            }
            Err(weft_store::StoreError::NotFound(_)) => {
                Subject::new(topic_id.to_string(), id.clone(), keyword_id_hashes.clone())
            }
            Err(e) => return Err(e.into()),
        };
        for hash in &keyword_id_hashes {
            if !subject.keywords.iter().any(|k| k == hash) {
                subject.keywords.push(hash.clone());
            }
        }

        let content_hash = self.store.store_versioned(&id_hash, &subject.to_value()).await?;
        self.log_write(topic_id, &content_hash).await?;

        for hash in &keyword_id_hashes {
            self.add_keyword_to_subject_by_hash(topic_id, hash, &id_hash).await?;
        }
        self.subject_listing_cache.invalidate(topic_id.as_str());

        debug!(topic_id = %topic_id, subject_id = %subject.id, "subject upserted");
        Ok((subject, id_hash))
    }

    /// Adds `subject_id_hash` to the named Keyword's back-reference bag, writing a new
    /// Keyword version. The Subject must already be durable — callers invoke this only
    /// after `create_subject`'s own store write has completed.
    pub async fn add_keyword_to_subject(
        &self,
        topic_id: &TopicId,
        term: &str,
        subject_id_hash: &str,
    ) -> Result<()> {
        let term = normalize_term(term)?;
        let id_hash = keyword_id_hash(&term)?;
        self.add_keyword_to_subject_by_hash(topic_id, &id_hash, subject_id_hash).await
    }

    async fn add_keyword_to_subject_by_hash(
        &self,
        topic_id: &TopicId,
        keyword_id_hash: &str,
        subject_id_hash: &str,
    ) -> Result<()> {
        let mut keyword = match self.store.get_by_id_hash(keyword_id_hash).await {
            Ok(value) => Keyword::from_value(&value)
                .ok_or_else(|| GraphError::InvariantViolation("stored Keyword has wrong $type$".into()))?,
            Err(weft_store::StoreError::NotFound(id)) => return Err(GraphError::KeywordNotFound(id)),
            Err(e) => return Err(e.into()),
        };
        if keyword.subjects.iter().any(|s| s == subject_id_hash) {
            return Ok(());
        }
        keyword.link_subject(subject_id_hash);
        let content_hash = self
            .store
            .store_versioned(keyword_id_hash, &keyword.to_value())
            .await?;
        self.log_write(topic_id, &content_hash).await?;
        self.keyword_listing_cache.invalidate(topic_id.as_str());
        Ok(())
    }

    /// Returns the latest Keyword version matching `term` found by
    /// scanning the topic's channel history, rather than a direct ID-hash lookup.
    pub async fn get_keyword_by_term(&self, topic_id: &TopicId, term: &str) -> Result<Option<Keyword>> {
        let term = normalize_term(term)?;
        let channel_id = ChannelId::from(topic_id.to_string());
        let entries = self.channels.iterate_entries(std::slice::from_ref(&channel_id)).await?;
        let mut latest = None;
        for entry in entries {
            let value = self.store.get_by_content_hash(&entry.content_hash).await?;
            if let Some(kw) = Keyword::from_value(&value) {
                if kw.term == term {
                    latest = Some(kw);
                }
            }
        }
        Ok(latest)
    }

    pub async fn get_keyword_with_subjects(
        &self,
        topic_id: &TopicId,
        term: &str,
    ) -> Result<Option<KeywordWithSubjects>> {
        let Some(keyword) = self.get_keyword_by_term(topic_id, term).await? else {
            return Ok(None);
        };
        let mut subjects = Vec::with_capacity(keyword.subjects.len());
        for subject_hash in &keyword.subjects {
            if let Some(subject) = self.get_subject_by_hash(subject_hash).await? {
                subjects.push(subject);
            }
        }
        Ok(Some(KeywordWithSubjects { keyword, subjects }))
    }

    pub async fn find_subjects_by_keyword(&self, topic_id: &TopicId, term: &str) -> Result<Vec<Subject>> {
        let Some(keyword) = self.get_keyword_by_term(topic_id, term).await? else {
            return Ok(Vec::new());
        };
        let mut subjects = Vec::with_capacity(keyword.subjects.len());
        for hash in &keyword.subjects {
            if let Some(s) = self.get_subject_by_hash(hash).await? {
                if s.topic == topic_id.to_string() {
                    subjects.push(s);
                }
            }
        }
        Ok(subjects)
    }

    async fn get_subject_by_hash(&self, id_hash: &str) -> Result<Option<Subject>> {
        match self.store.get_by_id_hash(id_hash).await {
            Ok(value) => Ok(Subject::from_value(&value)),
            Err(weft_store::StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists active (non-archived, unless `include_archived`) Subjects for a topic,
    /// cached for the configured TTL.
    pub async fn list_subjects(&self, topic_id: &TopicId, include_archived: bool) -> Result<Vec<Subject>> {
        if let Some(cached) = self.subject_listing_cache.get(topic_id.as_str()) {
            return Ok(filter_archived(cached, include_archived));
        }

        let channel_id = ChannelId::from(topic_id.to_string());
        let entries = self.channels.iterate_entries(std::slice::from_ref(&channel_id)).await?;
        let mut seen_ids = std::collections::BTreeSet::new();
        for entry in &entries {
            let value = self.store.get_by_content_hash(&entry.content_hash).await?;
            if let Some(s) = Subject::from_value(&value) {
                seen_ids.insert(s.id);
            }
        }

        let mut subjects = Vec::with_capacity(seen_ids.len());
        for id in &seen_ids {
            let id_hash = subject_id_hash(id)?;
            if let Some(current) = self.get_subject_by_hash(&id_hash).await? {
                subjects.push(current);
            }
        }
        self.subject_listing_cache.put(topic_id.to_string(), subjects.clone());
        Ok(filter_archived(subjects, include_archived))
    }

    /// Lists the Keywords referenced by any of a topic's current Subjects, cached the
    /// same way as [`Self::list_subjects`].
    pub async fn list_keywords(&self, topic_id: &TopicId) -> Result<Vec<Keyword>> {
        if let Some(cached) = self.keyword_listing_cache.get(topic_id.as_str()) {
            return Ok(cached);
        }

        let subjects = self.list_subjects(topic_id, false).await?;
        let mut seen = std::collections::BTreeSet::new();
        let mut keywords = Vec::new();
        for subject in &subjects {
            for hash in &subject.keywords {
                if seen.insert(hash.clone()) {
                    if let Ok(value) = self.store.get_by_id_hash(hash).await {
                        if let Some(kw) = Keyword::from_value(&value) {
                            keywords.push(kw);
                        }
                    }
                }
            }
        }
        self.keyword_listing_cache.put(topic_id.to_string(), keywords.clone());
        Ok(keywords)
    }

    /// Marks a Subject archived by writing a new version. Archived subjects are excluded
    /// from [`Self::list_subjects`] unless `include_archived` is requested.
    pub async fn archive_subject(&self, topic_id: &TopicId, subject_id: &str) -> Result<()> {
        let id_hash = subject_id_hash(subject_id)?;
        let Some(mut subject) = self.get_subject_by_hash(&id_hash).await? else {
            return Err(GraphError::SubjectNotFound(subject_id.to_string()));
        };
        subject.archived = true;
        let content_hash = self.store.store_versioned(&id_hash, &subject.to_value()).await?;
        self.log_write(topic_id, &content_hash).await?;
        self.subject_listing_cache.invalidate(topic_id.as_str());
        Ok(())
    }

    /// Lists non-archived Subjects across every topic except `exclude`, for the proposal
    /// engine's cross-topic candidate set. Walks [`ChannelManager::list_channel_ids`]
    /// rather than maintaining a separate index — consistent with rule that reverse/
    /// cross-cutting views are always reconstructed, never persisted.
    pub async fn list_subjects_excluding_topic(&self, exclude: &TopicId) -> Result<Vec<Subject>> {
        let channel_ids = self.channels.list_channel_ids().await?;
        let mut out = Vec::new();
        for id in channel_ids {
            if id == exclude.as_str() {
                continue;
            }
            let topic = TopicId::from(id);
            out.extend(self.list_subjects(&topic, false).await?);
        }
        Ok(out)
    }

    /// Drops cached listings for `topic_id` so the next read rebuilds from the
    /// channel/store.
    pub fn invalidate(&self, topic_id: &TopicId) {
        self.subject_listing_cache.invalidate(topic_id.as_str());
        self.keyword_listing_cache.invalidate(topic_id.as_str());
    }

    async fn log_write(&self, topic_id: &TopicId, content_hash: &str) -> Result<()> {
        let channel_id = ChannelId::from(topic_id.to_string());
        self.channels
            .append_entry(&channel_id, content_hash, KEYWORD_AUTHOR, now_millis())
            .await?;
        Ok(())
    }
}

fn filter_archived(subjects: Vec<Subject>, include_archived: bool) -> Vec<Subject> {
    if include_archived {
        subjects
    } else {
        subjects.into_iter().filter(|s| !s.archived).collect()
    }
}

/// Normalizes a raw extractor term Keyword invariant: lowercase,
/// trimmed, alphanumeric+hyphen only, at most 50 characters.
pub fn normalize_term(raw: &str) -> Result<String> {
    let lowered = raw.trim().to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect();
    let truncated: String = cleaned.chars().take(50).collect();
    if truncated.is_empty() {
        return Err(GraphError::InvariantViolation(format!(
            "term `{}` normalizes to empty string",
            raw
        )));
    }
    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_subject_persists_keywords_before_subject() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = GraphStore::new(store.clone(), channels, 5_000);
        let topic = TopicId::from("t1");

        let terms = vec!["quantum".to_string(), "tunneling".to_string(), "semiconductors".to_string()];
        let (subject, _) = graph.create_subject(&topic, &terms, None, 0.9).await.unwrap();

        assert_eq!(subject.id, "quantum+semiconductors+tunneling");
        for term in &terms {
            let hash = keyword_id_hash(term).unwrap();
            let kw = store.get_by_id_hash(&hash).await.unwrap();
            let kw = Keyword::from_value(&kw).unwrap();
            assert!(kw.subjects.contains(&subject_id_hash(&subject.id).unwrap()));
        }
    }

    #[tokio::test]
    async fn recurrence_extends_time_range_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = GraphStore::new(store, channels, 5_000);
        let topic = TopicId::from("t2");

        let terms = vec!["rust".to_string(), "async".to_string()];
        let (first, _) = graph.create_subject(&topic, &terms, None, 0.8).await.unwrap();
        assert_eq!(first.message_count, 1);

        let (second, _) = graph.create_subject(&topic, &terms, None, 0.85).await.unwrap();
        assert_eq!(second.message_count, 2);
        assert_eq!(second.time_ranges.len(), 1);
    }
}
