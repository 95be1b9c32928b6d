mod analyzer;
pub mod error;
mod normalize;
mod parse;
mod prompt;
pub mod types;

pub use analyzer::{bounded_tail, TopicAnalyzer};
pub use error::AnalyzerError;
pub use normalize::{fuzzy_merge, normalize_candidate_term, Candidate};
pub use parse::parse_extraction_response;
pub use prompt::build_extraction_prompt;
pub use types::{AnalysisReport, RawExtraction, RawKeyword, RawSubject};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weft_channels::{ChannelManager, TopicRoom};
    use weft_core::types::{ChannelId, TopicId};
    use weft_graph::GraphStore;
    use weft_llm::MockLlmProvider;
    use weft_store::ObjectStore;

    #[tokio::test]
    async fn extracts_keywords_and_subject_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), channels.clone(), 5_000));
        let llm = Arc::new(MockLlmProvider::new());

        let topic_id = TopicId::from("t1");
        let channel_id = ChannelId::from(topic_id.to_string());
        let room = TopicRoom::new(channel_id, topic_id.clone(), channels.clone());
        room.post_text("u1", "Quantum tunneling occurs in semiconductors.", vec![])
            .await
            .unwrap();

        llm.push_response(
            r#"{"keywords":[],"subjects":[{"memberTerms":["quantum","tunneling","semiconductors"],"description":"physics","confidence":0.9}]}"#,
        )
        .await;

        let analyzer = TopicAnalyzer::new(channels, graph.clone(), llm, "mock-model");
        let report = analyzer.analyze(&topic_id).await.unwrap();

        assert_eq!(report.subjects_written, 1);
        assert_eq!(report.keywords_written, 3);

        let subjects = graph.list_subjects(&topic_id, false).await.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].id, "quantum+semiconductors+tunneling");
        assert_eq!(subjects[0].message_count, 1);
    }

    #[tokio::test]
    async fn idempotent_on_unchanged_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ObjectStore::open(dir.path()).await.unwrap());
        let channels = Arc::new(ChannelManager::new(store.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), channels.clone(), 0));
        let llm = Arc::new(MockLlmProvider::new());

        let topic_id = TopicId::from("t2");
        let channel_id = ChannelId::from(topic_id.to_string());
        let room = TopicRoom::new(channel_id, topic_id.clone(), channels.clone());
        room.post_text("u1", "Let's talk about rust and tokio.", vec![])
            .await
            .unwrap();

        let canned = r#"{"keywords":[{"term":"rust","confidence":0.9}],"subjects":[]}"#;
        llm.push_response(canned).await;

        let analyzer = TopicAnalyzer::new(channels, graph.clone(), llm, "mock-model");
        let first = analyzer.analyze(&topic_id).await.unwrap();
        assert_eq!(first.keywords_written, 1);
        let keywords_after_first = graph.list_keywords(&topic_id).await.unwrap();

        // Same message tail, no new messages: the watermark should make
        // this call a no-op without even consuming a queued LLM response.
        let second = analyzer.analyze(&topic_id).await.unwrap();
        assert_eq!(second.keywords_written, 0);
        let keywords_after_second = graph.list_keywords(&topic_id).await.unwrap();

        assert_eq!(keywords_after_first.len(), keywords_after_second.len());
        assert_eq!(keywords_after_second[0].frequency, keywords_after_first[0].frequency);
    }
}
