//! Configuration system for Quarry.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/quarry/config.toml` and/or `.quarry/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{ExportFormat, Tier};

/// Top-level configuration for a Quarry installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarryConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Search aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Ordered engine names tried for free users.
    pub free_chain: Vec<String>,
    /// Ordered engine names tried for premium users. Paid engines come first.
    pub premium_chain: Vec<String>,
    /// Number of chain entries called concurrently in the fusion step.
    pub fusion_width: usize,
    /// Per-capability call timeout.
    pub timeout_secs: u64,
    pub results_per_query_free: usize,
    pub results_per_query_premium: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            free_chain: vec![
                "brave".to_string(),
                "duckduckgo".to_string(),
                "wikipedia".to_string(),
            ],
            premium_chain: vec![
                "serpapi".to_string(),
                "google_cse".to_string(),
                "exa".to_string(),
                "brave".to_string(),
                "duckduckgo".to_string(),
                "wikipedia".to_string(),
            ],
            fusion_width: 3,
            timeout_secs: 10,
            results_per_query_free: 5,
            results_per_query_premium: 10,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Controller tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Coverage score (0-100) at which the search loop stops early.
    pub convergence_threshold: u8,
    /// Expanded topics searched in the first round.
    pub first_round_queries: usize,
    /// Gap topics searched in each later round.
    pub gap_round_queries: usize,
    /// Coverage reported when no gap analysis runs.
    pub estimated_coverage: u8,
    pub basic_facts_per_summary: usize,
    pub basic_fact_confidence: u8,
    pub basic_fact_cap: usize,
    /// The writer receives at most `word_limit / facts_per_word_divisor` facts.
    pub facts_per_word_divisor: usize,
    pub summarize_concurrency: usize,
    /// Format published when none of the requested formats is allowed.
    pub default_export_format: String,
    /// Confidence at or above which a fact counts towards consensus.
    pub consensus_threshold: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: 80,
            first_round_queries: 5,
            gap_round_queries: 3,
            estimated_coverage: 75,
            basic_facts_per_summary: 5,
            basic_fact_confidence: 60,
            basic_fact_cap: 50,
            facts_per_word_divisor: 20,
            summarize_concurrency: 4,
            default_export_format: "pdf".to_string(),
            consensus_threshold: 80,
        }
    }
}

/// Credentials and endpoints for the search backends.
///
/// Keys are never stored here; each field names the environment variable
/// that holds the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginesConfig {
    pub brave_api_key_env: String,
    pub exa_api_key_env: String,
    pub serpapi_api_key_env: String,
    pub google_api_key_env: String,
    pub google_cse_id_env: String,
    pub user_agent: String,
    /// Base URL overrides keyed by engine name.
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            brave_api_key_env: "BRAVE_API_KEY".to_string(),
            exa_api_key_env: "EXA_API_KEY".to_string(),
            serpapi_api_key_env: "SERPAPI_API_KEY".to_string(),
            google_api_key_env: "GOOGLE_API_KEY".to_string(),
            google_cse_id_env: "GOOGLE_CSE_ID".to_string(),
            user_agent: format!("quarry/{}", env!("CARGO_PKG_VERSION")),
            base_urls: HashMap::new(),
        }
    }
}

impl EnginesConfig {
    pub fn base_url(&self, engine: &str) -> Option<&str> {
        self.base_urls.get(engine).map(String::as_str)
    }
}

/// Configuration for the OpenAI-compatible completion endpoints.
///
/// Each tier walks its own ordered provider list and uses the first provider
/// whose API key is present. The top-level endpoint is used when none is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    /// Provider names tried in order for free runs.
    #[serde(default)]
    pub free_providers: Vec<String>,
    /// Provider names tried in order for premium runs.
    #[serde(default)]
    pub premium_providers: Vec<String>,
    #[serde(default)]
    pub providers: HashMap<String, LlmProvider>,
}

/// One named completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProvider {
    pub base_url: String,
    pub model: String,
    /// `None` for endpoints that need no key, such as a local Ollama.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub max_tokens: usize,
}

impl LlmProvider {
    fn new(base_url: &str, model: &str, api_key_env: Option<&str>, max_tokens: usize) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.map(String::from),
            max_tokens,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        let providers = HashMap::from([
            (
                "groq".to_string(),
                LlmProvider::new(
                    "https://api.groq.com/openai/v1",
                    "llama-3.3-70b-versatile",
                    Some("GROQ_API_KEY"),
                    2048,
                ),
            ),
            (
                "gemini_flash".to_string(),
                LlmProvider::new(
                    "https://generativelanguage.googleapis.com/v1beta/openai",
                    "gemini-1.5-flash",
                    Some("GEMINI_API_KEY"),
                    2048,
                ),
            ),
            (
                "deepseek".to_string(),
                LlmProvider::new(
                    "https://api.deepseek.com/v1",
                    "deepseek-chat",
                    Some("DEEPSEEK_API_KEY"),
                    2048,
                ),
            ),
            (
                "ollama".to_string(),
                LlmProvider::new("http://localhost:11434/v1", "llama3:70b", None, 2048),
            ),
            (
                "gpt4".to_string(),
                LlmProvider::new(
                    "https://api.openai.com/v1",
                    "gpt-4-turbo-preview",
                    Some("OPENAI_API_KEY"),
                    4096,
                ),
            ),
            (
                "claude".to_string(),
                LlmProvider::new(
                    "https://api.anthropic.com/v1",
                    "claude-3-5-sonnet-20241022",
                    Some("ANTHROPIC_API_KEY"),
                    4096,
                ),
            ),
        ]);
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 120,
            free_providers: ["groq", "gemini_flash", "deepseek", "ollama"]
                .map(String::from)
                .to_vec(),
            premium_providers: ["gpt4", "claude"].map(String::from).to_vec(),
            providers,
        }
    }
}

impl LlmConfig {
    /// Ordered provider names for `tier`.
    pub fn provider_chain(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Free => &self.free_providers,
            Tier::Premium => &self.premium_providers,
        }
    }

    /// The first provider in `tier`'s chain that `available` accepts.
    pub fn select_provider(
        &self,
        tier: Tier,
        available: impl Fn(&LlmProvider) -> bool,
    ) -> Option<(&str, &LlmProvider)> {
        self.provider_chain(tier).iter().find_map(|name| {
            self.providers
                .get(name)
                .filter(|provider| available(provider))
                .map(|provider| (name.as_str(), provider))
        })
    }

    /// The top-level endpoint as a provider.
    pub fn default_provider(&self) -> LlmProvider {
        LlmProvider {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key_env: Some(self.api_key_env.clone()),
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Directory searched first for the PDF body font.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("research_outputs"),
            font_dir: None,
        }
    }
}

impl QuarryConfig {
    /// Reject settings that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.fusion_width == 0 {
            return Err(invalid("search.fusion_width must be at least 1"));
        }
        if self.search.timeout_secs == 0 {
            return Err(invalid("search.timeout_secs must be at least 1"));
        }
        if self.pipeline.convergence_threshold > 100 || self.pipeline.estimated_coverage > 100 {
            return Err(invalid("coverage thresholds must be within 0-100"));
        }
        if self.pipeline.facts_per_word_divisor == 0 {
            return Err(invalid("pipeline.facts_per_word_divisor must be at least 1"));
        }
        if self.pipeline.summarize_concurrency == 0 {
            return Err(invalid("pipeline.summarize_concurrency must be at least 1"));
        }
        for tier in [Tier::Free, Tier::Premium] {
            if let Some(name) = self
                .llm
                .provider_chain(tier)
                .iter()
                .find(|name| !self.llm.providers.contains_key(name.as_str()))
            {
                return Err(ConfigError::Invalid {
                    message: format!("llm provider '{name}' for the {tier} tier is not defined"),
                });
            }
        }
        self.default_export_format()?;
        Ok(())
    }

    /// The fallback publish format.
    pub fn default_export_format(&self) -> Result<ExportFormat, ConfigError> {
        self.pipeline
            .default_export_format
            .parse()
            .map_err(|message| ConfigError::Invalid { message })
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// Path of the user-level config file, if a home directory can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "quarry", "quarry")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration by merging defaults, config files, and environment variables.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&QuarryConfig>,
) -> Result<QuarryConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(QuarryConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".quarry").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // QUARRY_SEARCH__TIMEOUT_SECS, QUARRY_LLM__MODEL, ...
    figment = figment.merge(Env::prefixed("QUARRY_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
