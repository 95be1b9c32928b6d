use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use weft_analyzer::TopicAnalyzer;
use weft_channels::ChannelManager;
use weft_core::config::WeftConfig;
use weft_graph::GraphStore;
use weft_llm::{HttpLlmProvider, LlmProvider, MockLlmProvider};
use weft_processor::MessageProcessor;
use weft_proposals::ProposalEngine;
use weft_store::ObjectStore;
use weft_summary::SummaryManager;

mod app;
mod events;
mod http;
mod ws;

/// Process exit codes the surrounding app (desktop shell, supervisor,
/// whatever embeds this binary) can branch on without parsing stderr.
mod exit_code {
    pub const OK: i32 = 0;
    pub const STORE_CORRUPT: i32 = 2;
    pub const PROVIDER_UNREACHABLE: i32 = 3;
    pub const CONFIG_ERROR: i32 = 4;
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weft_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("WEFT_CONFIG").ok();
    let config = match WeftConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(exit_code::CONFIG_ERROR);
        }
    };

    match run(config).await {
        Ok(()) => std::process::exit(exit_code::OK),
        Err(code) => std::process::exit(code),
    }
}

async fn run(config: WeftConfig) -> Result<(), i32> {
    let store = ObjectStore::open(config.store.root.clone()).await.map_err(|e| {
        error!(error = %e, "store failed to open, objects directory may be corrupt");
        exit_code::STORE_CORRUPT
    })?;
    let store = Arc::new(store);

    let channels = Arc::new(ChannelManager::new(store.clone()));
    let graph = Arc::new(GraphStore::new(store.clone(), channels.clone(), config.analyzer.keyword_cache_ttl_ms));

    let llm = build_llm_provider(&config).await?;

    let analyzer = Arc::new(
        TopicAnalyzer::new(channels.clone(), graph.clone(), llm.clone(), config.llm.model.clone())
            .with_max_subject_members(config.analyzer.max_subject_members),
    );
    let summary = Arc::new(SummaryManager::new(
        store.clone(),
        channels.clone(),
        graph.clone(),
        analyzer.clone(),
        config.summary.verbatim_tail_turns,
    ));
    let processor = Arc::new(MessageProcessor::new(
        channels.clone(),
        graph.clone(),
        analyzer.clone(),
        summary.clone(),
        llm.clone(),
        config.llm.model.clone(),
        config.llm.reserved_for_response,
        config.processor.llm_retry_max,
        config.processor.llm_retry_backoff_ms,
    ));
    let proposals = ProposalEngine::open(
        store.clone(),
        graph.clone(),
        config.proposals.cache_ttl_ms,
        config.proposals.top_k,
        config.proposals.min_score,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "failed to replay proposal journal, store may be corrupt");
        exit_code::STORE_CORRUPT
    })?;
    let proposals = Arc::new(proposals);

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(
        config, store, channels, graph, analyzer, summary, llm, processor, proposals,
    ));

    tokio::spawn(events::run(state.clone()));

    let router = app::build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|e| {
            error!(error = %e, "invalid bind address in configuration");
            exit_code::CONFIG_ERROR
        })?;

    info!(%addr, "weft gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, "failed to bind listener");
        exit_code::CONFIG_ERROR
    })?;

    axum::serve(listener, router).await.map_err(|e| {
        error!(error = %e, "server terminated unexpectedly");
        exit_code::CONFIG_ERROR
    })
}

/// Picks the configured LLM backend and probes it once before serving traffic.
/// `WEFT_LLM_MOCK=1` swaps in the network-free mock, used for local development and the
/// gateway's own integration tests.
async fn build_llm_provider(config: &WeftConfig) -> Result<Arc<dyn LlmProvider>, i32> {
    if std::env::var("WEFT_LLM_MOCK").as_deref() == Ok("1") {
        info!("WEFT_LLM_MOCK=1, using mock LLM provider");
        return Ok(Arc::new(MockLlmProvider::new()));
    }

    let provider = HttpLlmProvider::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.context_window as u32,
    );

    let probe = weft_llm::ChatRequest {
        model: config.llm.model.clone(),
        messages: vec![weft_llm::Message::user("ping")],
        max_tokens: 1,
        temperature: 0.0,
    };
    if let Err(e) = provider.chat(&probe).await {
        error!(error = %e, base_url = %config.llm.base_url, "LLM provider unreachable at startup");
        return Err(exit_code::PROVIDER_UNREACHABLE);
    }
    info!(base_url = %config.llm.base_url, model = %config.llm.model, "connected to LLM provider");

    Ok(Arc::new(provider))
}
