//! # Quarry Tools
//!
//! Concrete collaborators for the Quarry research pipeline: HTTP search
//! backends, the page fetcher, LLM-backed stage agents, the citation
//! formatter, and the file publisher.

pub mod agents;
pub mod citation;
pub mod engines;
pub mod fetch;
pub mod http;
pub mod llm;
pub mod publish;

pub use agents::{
    LlmEditor, LlmExpander, LlmFactChecker, LlmGapAnalyzer, LlmSummarizer, LlmWriter,
};
pub use citation::ReferenceCitations;
pub use engines::{build_capabilities, credential_status};
pub use fetch::PageFetcher;
pub use llm::{ChatRequest, LlmClient, OpenAiCompatClient};
pub use publish::FilePublisher;

use quarry_core::config::LlmProvider;
use quarry_core::{CapabilityError, Collaborators, QuarryConfig, SearchAggregator, Tier};
use std::sync::Arc;
use tracing::{info, warn};

/// Page text kept per fetched source.
const MAX_PAGE_CHARS: usize = 20_000;

/// The search aggregator over every built-in backend.
pub fn build_search(config: &QuarryConfig) -> Result<SearchAggregator, CapabilityError> {
    let capabilities = build_capabilities(&config.engines, config.search.timeout())?;
    Ok(SearchAggregator::new(capabilities, &config.search))
}

/// The completion client for `tier`: the first provider in the tier's chain
/// whose API key is set, else the top-level endpoint.
pub fn llm_for_tier(
    config: &QuarryConfig,
    tier: Tier,
) -> Result<OpenAiCompatClient, CapabilityError> {
    let user_agent = &config.engines.user_agent;
    match config.llm.select_provider(tier, provider_available) {
        Some((name, provider)) => {
            info!(%tier, provider = name, model = %provider.model, "LLM provider selected");
            OpenAiCompatClient::for_provider(provider, &config.llm, user_agent)
        }
        None => {
            warn!(%tier, "No LLM provider in the tier chain has credentials; using default");
            OpenAiCompatClient::new(&config.llm, user_agent)
        }
    }
}

/// Keyless providers are always available; others need their key set.
pub fn provider_available(provider: &LlmProvider) -> bool {
    provider
        .api_key_env
        .as_deref()
        .is_none_or(|env| engines::read_key(env).is_some())
}

/// Wire the LLM-backed stages, citations and publisher for runs at `tier`.
pub fn build_collaborators(
    config: &QuarryConfig,
    tier: Tier,
) -> Result<Collaborators, CapabilityError> {
    let llm: Arc<dyn LlmClient> = Arc::new(llm_for_tier(config, tier)?);
    let fetcher = PageFetcher::new(
        http::client(&config.engines.user_agent, config.search.timeout())?,
        MAX_PAGE_CHARS,
    );

    Ok(Collaborators {
        expander: Arc::new(LlmExpander::new(llm.clone())),
        summarizer: Arc::new(LlmSummarizer::new(llm.clone(), fetcher)),
        fact_checker: Arc::new(LlmFactChecker::new(llm.clone())),
        gap_analyzer: Arc::new(LlmGapAnalyzer::new(llm.clone())),
        writer: Arc::new(LlmWriter::new(llm.clone())),
        editor: Arc::new(LlmEditor::new(llm)),
        citations: Arc::new(ReferenceCitations::new()),
        publisher: Arc::new(FilePublisher::from_config(&config.output)),
    })
}
