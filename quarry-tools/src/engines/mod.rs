//! HTTP search backends.
//!
//! Each backend turns one query into a list of [`SearchResult`]s. Response
//! parsing is a pure function over the decoded JSON so it can be tested on
//! fixtures; the `search` method only adds transport and error mapping.
//!
//! [`SearchResult`]: quarry_core::SearchResult

pub mod brave;
pub mod duckduckgo;
pub mod exa;
pub mod google_cse;
pub mod serpapi;
pub mod wikipedia;

pub use brave::BraveSearch;
pub use duckduckgo::DuckDuckGoSearch;
pub use exa::ExaSearch;
pub use google_cse::GoogleCseSearch;
pub use serpapi::SerpApiSearch;
pub use wikipedia::WikipediaSearch;

use quarry_core::config::EnginesConfig;
use quarry_core::{CapabilityError, SearchCapability};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::http;

/// Read an API key from the named environment variable. Blank values count
/// as missing.
pub fn read_key(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

pub(crate) fn not_configured(name: &str, env_var: &str) -> CapabilityError {
    CapabilityError::NotConfigured {
        name: name.to_string(),
        reason: format!("environment variable {} is not set", env_var),
    }
}

/// Register every backend. Backends without credentials are still
/// registered; they fail with `NotConfigured` when called, which the
/// aggregator isolates like any other backend failure.
pub fn build_capabilities(
    config: &EnginesConfig,
    timeout: Duration,
) -> Result<Vec<Arc<dyn SearchCapability>>, CapabilityError> {
    let client = http::client(&config.user_agent, timeout)?;
    let base = |engine: &str, default: &str| {
        config
            .base_url(engine)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    };

    let capabilities: Vec<Arc<dyn SearchCapability>> = vec![
        Arc::new(SerpApiSearch::new(
            client.clone(),
            base(serpapi::NAME, serpapi::DEFAULT_BASE_URL),
            read_key(&config.serpapi_api_key_env),
            config.serpapi_api_key_env.clone(),
        )),
        Arc::new(GoogleCseSearch::new(
            client.clone(),
            base(google_cse::NAME, google_cse::DEFAULT_BASE_URL),
            read_key(&config.google_api_key_env),
            read_key(&config.google_cse_id_env),
        )),
        Arc::new(ExaSearch::new(
            client.clone(),
            base(exa::NAME, exa::DEFAULT_BASE_URL),
            read_key(&config.exa_api_key_env),
            config.exa_api_key_env.clone(),
        )),
        Arc::new(BraveSearch::new(
            client.clone(),
            base(brave::NAME, brave::DEFAULT_BASE_URL),
            read_key(&config.brave_api_key_env),
            config.brave_api_key_env.clone(),
        )),
        Arc::new(DuckDuckGoSearch::new(
            client.clone(),
            base(duckduckgo::NAME, duckduckgo::DEFAULT_BASE_URL),
        )),
        Arc::new(WikipediaSearch::new(
            client,
            base(wikipedia::NAME, wikipedia::DEFAULT_BASE_URL),
        )),
    ];

    debug!(
        engines = ?capabilities.iter().map(|c| c.name()).collect::<Vec<_>>(),
        "Search backends registered"
    );
    Ok(capabilities)
}

/// Whether each backend has the credentials it needs, in registration order.
pub fn credential_status(config: &EnginesConfig) -> Vec<(&'static str, bool)> {
    vec![
        (
            serpapi::NAME,
            read_key(&config.serpapi_api_key_env).is_some(),
        ),
        (
            google_cse::NAME,
            read_key(&config.google_api_key_env).is_some()
                && read_key(&config.google_cse_id_env).is_some(),
        ),
        (exa::NAME, read_key(&config.exa_api_key_env).is_some()),
        (brave::NAME, read_key(&config.brave_api_key_env).is_some()),
        (duckduckgo::NAME, true),
        (wikipedia::NAME, true),
    ]
}
