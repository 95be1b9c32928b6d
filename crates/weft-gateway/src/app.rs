use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{routing::get, Router};
use dashmap::DashMap;
use weft_analyzer::TopicAnalyzer;
use weft_channels::ChannelManager;
use weft_core::config::WeftConfig;
use weft_graph::GraphStore;
use weft_llm::LlmProvider;
use weft_processor::MessageProcessor;
use weft_proposals::ProposalEngine;
use weft_store::ObjectStore;
use weft_summary::SummaryManager;

use crate::ws::broadcast::EventBroadcaster;

/// Central shared state, passed as `Arc<AppState>` to every Axum handler
/// and to the per-connection WS tasks. Holds one `Arc` of each subsystem
/// manager so handlers can reach any component without threading extra
/// parameters through the router.
pub struct AppState {
    pub config: WeftConfig,
    pub store: Arc<ObjectStore>,
    pub channels: Arc<ChannelManager>,
    pub graph: Arc<GraphStore>,
    pub analyzer: Arc<TopicAnalyzer>,
    pub summary: Arc<SummaryManager>,
    pub llm: Arc<dyn LlmProvider>,
    pub processor: Arc<MessageProcessor>,
    pub proposals: Arc<ProposalEngine>,
    pub broadcaster: EventBroadcaster,
    pub event_seq: AtomicU64,
    /// Active WS connections: conn_id -> nothing yet tracked beyond count,
    /// kept as a set so `/health` can report live connection count without
    /// a separate counter that could drift from reality.
    pub ws_clients: DashMap<String, ()>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        config: WeftConfig,
        store: Arc<ObjectStore>,
        channels: Arc<ChannelManager>,
        graph: Arc<GraphStore>,
        analyzer: Arc<TopicAnalyzer>,
        summary: Arc<SummaryManager>,
        llm: Arc<dyn LlmProvider>,
        processor: Arc<MessageProcessor>,
        proposals: Arc<ProposalEngine>,
    ) -> Self {
        Self {
            config,
            store,
            channels,
            graph,
            analyzer,
            summary,
            llm,
            processor,
            proposals,
            broadcaster: EventBroadcaster::new(),
            event_seq: AtomicU64::new(0),
            ws_clients: DashMap::new(),
        }
    }

    /// Monotonically increasing sequence stamped on every pushed event frame.
    pub fn next_seq(&self) -> u64 {
        self.event_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Assembles the full Axum router: `/ws` is the RPC + event-push
/// transport, `/health` is a liveness probe. UI
/// rendering and any other transport are out of scope.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
