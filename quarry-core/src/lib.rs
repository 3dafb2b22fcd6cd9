//! # Quarry Core
//!
//! Core library for the Quarry research pipeline.
//! Provides the tier/mode policy resolver, the multi-source search
//! aggregator, stage collaborator contracts, query preprocessing, the usage
//! store, configuration, and the pipeline controller that drives them.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod query;
pub mod search;
pub mod types;
pub mod usage;

// Re-export commonly used types at the crate root.
pub use collaborators::{
    CitationFormatter, Collaborators, Expansion, FactChecker, GapAnalyzer, GapReport,
    PublishRequest, Publisher, QueryExpander, ReportEditor, ReportWriter, Summarizer,
    WriteRequest,
};
pub use config::{QuarryConfig, load_config};
pub use error::{
    CapabilityError, ConfigError, PipelineError, PolicyError, QuarryError, Result, SearchError,
    StageError,
};
pub use pipeline::{
    NoOpResearchCallback, ResearchCallback, ResearchController, ResearchPhase, ResearchRequest,
    ResearchResult, Statistics,
};
pub use policy::{TierLimits, resolve};
pub use search::{SearchAggregator, SearchCapability};
pub use types::{
    CitationStyle, ExportFormat, FactCandidate, Gap, Mode, Outline, OutlineSection, PageSummary,
    SearchResult, Severity, Tier, VerifiedFact,
};
pub use usage::{UsageReservation, UsageStats, UsageStore};
