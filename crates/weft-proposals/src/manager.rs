use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use weft_core::types::{now_millis, TopicId};
use weft_graph::{GraphStore, Subject};
use weft_store::ObjectStore;

use crate::error::{ProposalError, Result};
use crate::types::{JournalEntry, Proposal, SharePayload};

const ACTIVE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
const ACTIVE_FALLBACK_COUNT: usize = 20;
const USAGE_NORMALIZATION_CAP: f64 = 50.0;
const RESONANCE_HALF_LIFE_DAYS: f64 = 30.0;
const RECENCY_HALF_LIFE_MS: f64 = 30.0 * 24.0 * 60.0 * 60.0 * 1000.0;
const ASSOCIATION_CAP: f64 = 10.0;

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

/// Append-only journal at `journals/proposals.log`. Each line
/// is one [`JournalEntry`]; read back in full on startup to repopulate the
/// dismissed-set. Never compacted, same as [`weft_channels::channel::ChannelLog`].
struct ProposalJournal {
    path: std::path::PathBuf,
    write_lock: AsyncMutex<()>,
}

impl ProposalJournal {
    fn new(store_root: &std::path::Path) -> Self {
        Self {
            path: store_root.join("journals").join("proposals.log"),
            write_lock: AsyncMutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<JournalEntry>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut out = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }

    async fn append(&self, entry: &JournalEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Cross-topic relevance ranking and dismiss/share lifecycle.
/// Proposals are derived on every cache miss from live Subject state — only
/// the dismiss/share events themselves are durable, via [`ProposalJournal`].
pub struct ProposalEngine {
    store: Arc<ObjectStore>,
    graph: Arc<GraphStore>,
    cache: TtlCache<Vec<Proposal>>,
    /// `(topicId, pastSubjectIdHash)` pairs dismissed or already shared for
    /// this topic — loaded from the journal at construction and updated on
    /// every `dismiss`/`share` call so a proposal never resurfaces.
    dismissed: DashMap<(String, String), ()>,
    journal: ProposalJournal,
    top_k: usize,
    min_score: f64,
}

impl ProposalEngine {
    /// Replays `journals/proposals.log` to rebuild the dismissed-set, then
    /// returns a ready engine. Call once at startup.
    pub async fn open(store: Arc<ObjectStore>, graph: Arc<GraphStore>, cache_ttl_ms: u64, top_k: usize, min_score: f64) -> Result<Self> {
        let journal = ProposalJournal::new(store.root());
        let dismissed = DashMap::new();
        for entry in journal.read_all().await? {
            dismissed.insert(
                (entry.topic_id().to_string(), entry.past_subject_id_hash().to_string()),
                (),
            );
        }
        Ok(Self {
            store,
            graph,
            cache: TtlCache::new(cache_ttl_ms),
            dismissed,
            journal,
            top_k,
            min_score,
        })
    }

    /// Returns the top-K ranked Proposals for `topic_id`,
    /// serving from the 30s cache when fresh.
    pub async fn get_for_topic(&self, topic_id: &TopicId) -> Result<Vec<Proposal>> {
        if let Some(cached) = self.cache.get(topic_id.as_str()) {
            return Ok(cached);
        }

        let current_subjects = self.active_subjects(topic_id).await?;
        let current_keywords: HashSet<&str> = current_subjects
            .iter()
            .flat_map(|s| s.keywords.iter().map(String::as_str))
            .collect();

        let candidates = self.graph.list_subjects_excluding_topic(topic_id).await?;
        let now = now_millis();
        let mut proposals = Vec::new();
        for candidate in candidates {
            let id_hash = subject_id_hash(&candidate)?;
            if self.dismissed.contains_key(&(topic_id.to_string(), id_hash.clone())) {
                continue;
            }
            let score = score_subject(&candidate, &current_keywords, now);
            if score < self.min_score {
                continue;
            }
            proposals.push(Proposal {
                id: format!("{}-{}", topic_id, id_hash),
                topic_id: topic_id.to_string(),
                past_subject_id_hash: id_hash,
                score,
                rationale: rationale(&candidate, &current_keywords),
                created_at: now,
                dismissed: false,
            });
        }

        proposals.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        proposals.truncate(self.top_k);

        self.cache.put(topic_id.to_string(), proposals.clone());
        Ok(proposals)
    }

    /// Subjects recently active in `topic_id`: those last seen within the
    /// last 24h, falling back to the 20 most recently seen when nothing
    /// falls inside that window.
    async fn active_subjects(&self, topic_id: &TopicId) -> Result<Vec<Subject>> {
        let mut subjects = self.graph.list_subjects(topic_id, false).await?;
        let now = now_millis();
        let recent: Vec<Subject> = subjects
            .iter()
            .filter(|s| now - s.last_seen_at <= ACTIVE_WINDOW_MS)
            .cloned()
            .collect();
        if !recent.is_empty() {
            return Ok(recent);
        }
        subjects.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        subjects.truncate(ACTIVE_FALLBACK_COUNT);
        Ok(subjects)
    }

    /// Persists a dismissal journal entry and invalidates the cache so the proposal stops
    /// resurfacing immediately.
    pub async fn dismiss(&self, topic_id: &TopicId, past_subject_id_hash: &str) -> Result<()> {
        let entry = JournalEntry::Dismissed {
            topic_id: topic_id.to_string(),
            past_subject_id_hash: past_subject_id_hash.to_string(),
            at: now_millis(),
        };
        self.journal.append(&entry).await?;
        self.dismissed
            .insert((topic_id.to_string(), past_subject_id_hash.to_string()), ());
        self.cache.invalidate(topic_id.as_str());
        debug!(topic_id = %topic_id, subject = %past_subject_id_hash, "proposal dismissed");
        Ok(())
    }

    /// Builds the insertion payload for `past_subject_id_hash` and auto-dismisses it.
    pub async fn share(
        &self,
        topic_id: &TopicId,
        past_subject_id_hash: &str,
        include_messages: bool,
    ) -> Result<SharePayload> {
        let value = self.store.get_by_id_hash(past_subject_id_hash).await?;
        let subject = Subject::from_value(&value)
            .ok_or_else(|| ProposalError::SubjectNotFound(past_subject_id_hash.to_string()))?;

        let mut keywords = Vec::with_capacity(subject.keywords.len());
        for hash in &subject.keywords {
            if let Ok(kw_value) = self.store.get_by_id_hash(hash).await {
                if let Some(kw) = weft_graph::Keyword::from_value(&kw_value) {
                    keywords.push(kw.term);
                }
            }
        }

        let payload = SharePayload {
            subject_name: subject.id.clone(),
            keywords,
            message_excerpts: if include_messages { Some(Vec::new()) } else { None },
        };

        let entry = JournalEntry::Shared {
            topic_id: topic_id.to_string(),
            past_subject_id_hash: past_subject_id_hash.to_string(),
            at: now_millis(),
        };
        self.journal.append(&entry).await?;
        self.dismissed
            .insert((topic_id.to_string(), past_subject_id_hash.to_string()), ());
        self.cache.invalidate(topic_id.as_str());

        Ok(payload)
    }

    /// Drops the cached listing for `topic_id`, called when that topic's
    /// Subjects change.
    pub fn invalidate(&self, topic_id: &TopicId) {
        self.cache.invalidate(topic_id.as_str());
    }
}

fn subject_id_hash(subject: &Subject) -> Result<String> {
    let stub = subject.id_fields_value();
    Ok(weft_store::canonical::id_hash(&stub, &["$type$", "id"])?)
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// `resonance(p) = 0.5*normalized_usage + 0.3*exp(-days_since_use/30) +
/// 0.2*min(|associations|/10, 1)`. `associations` is the
/// Subject's own linked-keyword count; `normalized_usage` caps
/// `messageCount` at [`USAGE_NORMALIZATION_CAP`] messages.
fn resonance(subject: &Subject, now: i64) -> f64 {
    let normalized_usage = (subject.message_count as f64 / USAGE_NORMALIZATION_CAP).min(1.0);
    let days_since_use = ((now - subject.last_seen_at).max(0) as f64) / (24.0 * 60.0 * 60.0 * 1000.0);
    let usage_decay = (-days_since_use / RESONANCE_HALF_LIFE_DAYS).exp();
    let association_term = (subject.keywords.len() as f64 / ASSOCIATION_CAP).min(1.0);
    0.5 * normalized_usage + 0.3 * usage_decay + 0.2 * association_term
}

/// `recency_decay(t) = exp(-(now-t)/(30 days))`.
fn recency_decay(last_seen_at: i64, now: i64) -> f64 {
    let age_ms = (now - last_seen_at).max(0) as f64;
    (-age_ms / RECENCY_HALF_LIFE_MS).exp()
}

fn score_subject(candidate: &Subject, current_keywords: &HashSet<&str>, now: i64) -> f64 {
    let candidate_keywords: HashSet<&str> = candidate.keywords.iter().map(String::as_str).collect();
    let kw_jaccard = jaccard(&candidate_keywords, current_keywords);
    0.5 * kw_jaccard + 0.3 * resonance(candidate, now) + 0.2 * recency_decay(candidate.last_seen_at, now)
}

fn rationale(candidate: &Subject, current_keywords: &HashSet<&str>) -> String {
    let shared: Vec<&str> = candidate
        .keywords
        .iter()
        .map(String::as_str)
        .filter(|k| current_keywords.contains(k))
        .collect();
    if shared.is_empty() {
        format!("previously discussed in topic {}", candidate.topic)
    } else {
        format!(
            "shares {} keyword(s) with the current discussion",
            shared.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_channels::ChannelManager;
    use weft_core::types::{now_millis, TopicId};

    #[tokio::test]
    async fn scores_are_bounded_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), channels, 5_000));
        let other_topic = TopicId::new();
        let current_topic = TopicId::new();

        graph.create_keyword(&other_topic, "rust", 0.9).await.unwrap();
        graph
            .create_subject(&other_topic, &["rust".to_string()], Some("programming"), 0.8)
            .await
            .unwrap();

        graph.create_keyword(&current_topic, "rust", 0.7).await.unwrap();
        graph
            .create_subject(&current_topic, &["rust".to_string()], Some("programming2"), 0.6)
            .await
            .unwrap();

        let engine = ProposalEngine::open(store, graph, 30_000, 5, 0.0).await.unwrap();
        let proposals = engine.get_for_topic(&current_topic).await.unwrap();
        assert!(proposals.iter().all(|p| p.score >= 0.0 && p.score <= 1.0));
        for pair in proposals.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn dismissed_proposal_never_resurfaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), channels, 5_000));
        let other_topic = TopicId::new();
        let current_topic = TopicId::new();
        graph.create_keyword(&other_topic, "weft", 0.9).await.unwrap();
        graph
            .create_subject(&other_topic, &["weft".to_string()], Some("engine"), 0.9)
            .await
            .unwrap();
        graph.create_keyword(&current_topic, "weft", 0.9).await.unwrap();
        graph
            .create_subject(&current_topic, &["weft".to_string()], Some("engine2"), 0.9)
            .await
            .unwrap();

        let engine = ProposalEngine::open(store, graph, 0, 5, 0.0).await.unwrap();
        let before = engine.get_for_topic(&current_topic).await.unwrap();
        assert!(!before.is_empty());
        let hash = before[0].past_subject_id_hash.clone();
        engine.dismiss(&current_topic, &hash).await.unwrap();
        let after = engine.get_for_topic(&current_topic).await.unwrap();
        assert!(after.iter().all(|p| p.past_subject_id_hash != hash));
    }
}
