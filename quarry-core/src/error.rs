//! Error types for the Quarry research core.
//!
//! Uses `thiserror` for public API error types. Only [`PolicyError`] and
//! [`PipelineError`] ever reach a `research()` caller; capability and stage
//! errors are absorbed at the aggregator and controller boundaries.

use std::path::PathBuf;

use crate::types::{Mode, Tier};

/// Top-level error type for the Quarry core library.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from tier/mode policy and subscription gating. Always fatal,
/// raised before any search call is issued.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("{mode} mode is not permitted for the {tier} tier; upgrade to premium")]
    ModeNotPermitted { tier: Tier, mode: Mode },

    #[error("Unknown tier: {value}")]
    UnknownTier { value: String },

    #[error("Unknown research mode: {value}")]
    UnknownMode { value: String },

    #[error("Daily limit reached ({limit} tasks); upgrade to premium for unlimited access")]
    QuotaExceeded { limit: u32 },

    #[error("Premium subscription expired; renew to keep premium access")]
    SubscriptionExpired,
}

/// Errors from a single search backend, scraper, or language-model endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("{name} is not configured: {reason}")]
    NotConfigured { name: String, reason: String },

    #[error("{name} request failed: {message}")]
    Transport { name: String, message: String },

    #[error("{name} rejected credentials (HTTP {status})")]
    Auth { name: String, status: u16 },

    #[error("{name} returned HTTP {status}")]
    Status { name: String, status: u16 },

    #[error("{name} timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    #[error("{name} response could not be parsed: {message}")]
    Parse { name: String, message: String },
}

impl CapabilityError {
    /// Name of the backend that produced the error.
    pub fn name(&self) -> &str {
        match self {
            Self::NotConfigured { name, .. }
            | Self::Transport { name, .. }
            | Self::Auth { name, .. }
            | Self::Status { name, .. }
            | Self::Timeout { name, .. }
            | Self::Parse { name, .. } => name,
        }
    }
}

/// Errors raised by an external stage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{stage} failed: {message}")]
    Failed { stage: String, message: String },

    #[error("{stage} produced no usable output")]
    Empty { stage: String },

    #[error("{stage} backend error: {source}")]
    Backend {
        stage: String,
        #[source]
        source: CapabilityError,
    },

    #[error("{stage} IO error: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub fn failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn backend(stage: impl Into<String>, source: CapabilityError) -> Self {
        Self::Backend {
            stage: stage.into(),
            source,
        }
    }
}

/// Errors from the search aggregator. Only raised when the whole fallback
/// chain is exhausted without a single result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("No search capability is available for the {tier} tier")]
    NoCapabilities { tier: Tier },

    #[error("All {attempted} search capabilities failed or returned nothing for \"{query}\"")]
    Exhausted { query: String, attempted: usize },
}

/// A required stage produced nothing usable; the whole run fails.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Search returned no usable results for \"{query}\"")]
    NoSearchResults { query: String },

    #[error("Report writing failed: {0}")]
    WriteFailed(#[source] StageError),

    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] StageError),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `QuarryError`.
pub type Result<T> = std::result::Result<T, QuarryError>;
